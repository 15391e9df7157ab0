//! The `tracing`-backed [`Logger`] used in production; tests reach for
//! `haystack_core::NullLogger` instead.

use std::fmt;

use haystack_core::Logger;

/// Routes every level to a `tracing` event at the matching severity.
///
/// `fatal` logs at `tracing::error!` (there is no fatal level in
/// `tracing`) -- callers are expected to exit the process themselves
/// after logging a fatal message.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn fatal(&self, message: fmt::Arguments<'_>) {
        tracing::error!(fatal = true, "{message}");
    }

    fn error(&self, message: fmt::Arguments<'_>) {
        tracing::error!("{message}");
    }

    fn info(&self, message: fmt::Arguments<'_>) {
        tracing::info!("{message}");
    }

    fn debug(&self, message: fmt::Arguments<'_>) {
        tracing::debug!("{message}");
    }
}

/// Initializes the global `tracing` subscriber from `level`, accepting
/// the same values as the `--log-level` flag (`debug|info|error|silent`).
///
/// # Errors
///
/// Returns an error if a global subscriber has already been installed.
pub fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = match level {
        "silent" => "off",
        "error" => "error",
        "info" => "info",
        "debug" => "debug",
        other => anyhow::bail!("unknown log level {other:?} (expected debug|info|error|silent)"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .try_init()
        .map_err(|err| anyhow::anyhow!("failed to install tracing subscriber: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracing_logger_does_not_panic() {
        let logger = TracingLogger;
        haystack_core::log_fatal!(logger, "x={}", 1);
        haystack_core::log_error!(logger, "x={}", 1);
        haystack_core::log_info!(logger, "x={}", 1);
        haystack_core::log_debug!(logger, "x={}", 1);
    }

    #[test]
    fn rejects_unknown_level() {
        assert!(init_tracing("nonsense").is_err());
    }
}
