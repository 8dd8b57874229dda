use anyhow::{Context, Result};
use std::io::{self, BufRead, Write};
use tracing::{debug, warn};

use crate::format;
use crate::model::ToolCall;

/// Shows the call and reads a `y`/`n` answer; anything but `y` declines.
pub fn confirm_tool_call<R, W>(call: &ToolCall, input: &mut R, output: &mut W) -> Result<bool>
where
    R: BufRead,
    W: Write,
{
    write!(output, "{}", format::tool_use(call)).context("Failed to write to stdout")?;
    write!(output, "Do you agree to proceed? (y/n): ").context("Failed to write to stdout")?;
    output.flush().context("Failed to flush stdout")?;

    let mut answer = String::new();
    let read = input
        .read_line(&mut answer)
        .context("Failed to read stdin")?;
    writeln!(output).context("Failed to write to stdout")?;

    let approved = read > 0 && answer.trim().eq_ignore_ascii_case("y");
    debug!(tool_name = %call.name, approved, "tool confirmation answered");
    Ok(approved)
}

pub fn confirm_on_terminal(call: &ToolCall) -> bool {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    match confirm_tool_call(call, &mut stdin.lock(), &mut stdout) {
        Ok(approved) => approved,
        Err(err) => {
            warn!(tool_name = %call.name, error = %err, "tool confirmation failed, declining");
            false
        }
    }
}
