use std::process::ExitCode;

use nutshell::format::error_report;
use nutshell::logging;
use nutshell::orchestrator::Status;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let _log_guard = logging::init();

    match nutshell::run().await {
        Ok(Status::Success) => ExitCode::SUCCESS,
        Ok(Status::Usage) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("{}", error_report(&err));
            ExitCode::FAILURE
        }
    }
}
