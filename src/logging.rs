use std::env;
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};

const DEFAULT_LOG_FILTER: &str = "warn";
const DEFAULT_LOG_FILE_PATH: &str = "logs/ch.log";
const CRATE_TARGET: &str = "nutshell";

type InitResult = Result<(), Box<dyn std::error::Error + Send + Sync + 'static>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn parse(raw: Option<&str>) -> Self {
        match raw.map(|value| value.trim().to_ascii_lowercase()).as_deref() {
            Some("json") => Self::Json,
            _ => Self::Pretty,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LogOutput {
    Stderr,
    File,
    Both,
}

impl LogOutput {
    fn parse(raw: Option<&str>) -> Self {
        match raw.map(|value| value.trim().to_ascii_lowercase()).as_deref() {
            Some("file") => Self::File,
            Some("both") => Self::Both,
            _ => Self::Stderr,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Stderr => "stderr",
            Self::File => "file",
            Self::Both => "both",
        }
    }
}

/// Logging knobs read from `CHAT_LOG_*`.
#[derive(Clone, Debug, PartialEq, Eq)]
struct LogSettings {
    filter: String,
    format: LogFormat,
    output: LogOutput,
    file_path: PathBuf,
}

impl LogSettings {
    fn from_env_with(mut get_var: impl FnMut(&str) -> Option<String>) -> Self {
        Self {
            filter: filter_directive(get_var("CHAT_LOG_LEVEL").as_deref()),
            format: LogFormat::parse(get_var("CHAT_LOG_FORMAT").as_deref()),
            output: LogOutput::parse(get_var("CHAT_LOG_OUTPUT").as_deref()),
            file_path: get_var("CHAT_LOG_FILE_PATH")
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE_PATH)),
        }
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_new(&self.filter).unwrap_or_else(|err| {
            eprintln!(
                "ch: invalid CHAT_LOG_LEVEL '{}': {err}; using '{DEFAULT_LOG_FILTER}'",
                self.filter
            );
            EnvFilter::new(DEFAULT_LOG_FILTER)
        })
    }
}

/// A bare level applies to this crate only, with dependencies kept at `warn`.
/// Anything that already looks like a filter directive is used as-is.
fn filter_directive(raw: Option<&str>) -> String {
    let Some(raw) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
        return DEFAULT_LOG_FILTER.to_string();
    };
    if raw.contains('=') || raw.contains(',') {
        return raw.to_string();
    }

    let level = match raw.to_ascii_lowercase().as_str() {
        "warning" => "warn".to_string(),
        "critical" | "fatal" => "error".to_string(),
        other => other.to_string(),
    };
    format!("warn,{CRATE_TARGET}={level}")
}

fn rolling_file(path: &Path) -> io::Result<(NonBlocking, WorkerGuard)> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| OsStr::new("ch.log"));

    fs::create_dir_all(dir)?;
    let appender = tracing_appender::rolling::daily(dir, file_name);
    Ok(tracing_appender::non_blocking(appender))
}

/// Falls back to stderr when the log file cannot be opened.
fn make_writer(settings: &LogSettings) -> (BoxMakeWriter, Option<WorkerGuard>) {
    if settings.output == LogOutput::Stderr {
        return (BoxMakeWriter::new(io::stderr), None);
    }

    match rolling_file(&settings.file_path) {
        Ok((file_writer, guard)) => {
            let writer = if settings.output == LogOutput::Both {
                BoxMakeWriter::new(io::stderr.and(file_writer))
            } else {
                BoxMakeWriter::new(file_writer)
            };
            (writer, Some(guard))
        }
        Err(err) => {
            let fallback = if settings.output == LogOutput::Both {
                "using stderr only"
            } else {
                "using stderr instead"
            };
            eprintln!(
                "ch: failed to initialize CHAT_LOG_OUTPUT={} at '{}': {err}; {fallback}",
                settings.output.as_str(),
                settings.file_path.display()
            );
            (BoxMakeWriter::new(io::stderr), None)
        }
    }
}

fn install(settings: &LogSettings, writer: BoxMakeWriter) -> InitResult {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(settings.env_filter())
        .with_writer(writer);
    match settings.format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
}

/// Keep the returned guard alive until exit so buffered file lines are flushed.
#[must_use = "dropping the guard stops file logging"]
pub fn init() -> Option<WorkerGuard> {
    let settings = LogSettings::from_env_with(|key| env::var(key).ok());
    let (writer, guard) = make_writer(&settings);
    install(&settings, writer).ok().and(guard)
}
