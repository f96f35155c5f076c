//! Tracing initialization shared by the hub host and the tool-side CLI.
//!
//! Logs go to stderr by default; `--dev-log` appends to a well-known file in
//! the temp directory instead so several processes can be tailed together.

use tracing_subscriber::EnvFilter;

use crate::constants;

/// Initialize the global subscriber. Returns the appender guard that must be
/// kept alive for the lifetime of the process when dev logging is on.
pub fn init(
    dev_log: bool,
) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if dev_log {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(constants::dev_log_path())?;
        let (writer, guard) = tracing_appender::non_blocking(file);

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(false)
            .init();
        Ok(Some(guard))
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
        Ok(None)
    }
}
