//! Logging infrastructure.
//!
//! Services log structured events through `tracing`; this module wires the
//! global subscriber: a non-blocking file writer for the service log plus a
//! stdout layer for interactive runs. The filter honors `RUST_LOG` and falls
//! back to the settings' default directive.

use std::fs;
use std::io;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Where and how verbosely the process logs.
#[derive(Clone, Debug)]
pub struct LogSettings {
    /// Directory the service log is written to.
    pub directory: PathBuf,
    /// File name of the service log.
    pub file_name: String,
    /// Filter directive applied when `RUST_LOG` is unset.
    pub default_filter: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("logs"),
            file_name: "visionflow.log".to_string(),
            // Keep dependency noise at info while surfacing service detail.
            default_filter: format!("info,{}=debug", env!("CARGO_PKG_NAME")),
        }
    }
}

impl LogSettings {
    /// Full path of the service log file.
    pub fn log_path(&self) -> PathBuf {
        self.directory.join(&self.file_name)
    }
}

/// Guard that must be kept alive for the duration of logging.
///
/// Dropping this guard will flush and close the log file writer.
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
}

/// Initialize the logging system.
///
/// Creates the log directory if needed, truncates the previous session's
/// log, and installs the global subscriber with file and stdout output.
///
/// # Errors
///
/// Returns an error if the log directory cannot be created or the previous
/// log cannot be truncated.
pub fn init_logging(settings: &LogSettings) -> Result<LoggingGuard, io::Error> {
    fs::create_dir_all(&settings.directory)?;
    // One log per session; truncate whatever the last run left behind.
    fs::write(settings.log_path(), "")?;

    let file_appender =
        tracing_appender::rolling::never(&settings.directory, &settings.file_name);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .with_target(true);

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_ansi(true)
        .with_target(false);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}
