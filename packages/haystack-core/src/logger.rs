//! The logger capability: `fatal`/`error`/`info`/`debug`, printf-style.
//!
//! The core and storage layers depend only on this trait, never on a
//! concrete logging backend -- `haystack-server` supplies the `tracing`-
//! backed implementation used in production; tests use [`NullLogger`].

use std::fmt;

/// A logging sink with the four levels this system distinguishes.
///
/// Mirrors the reference's logger capability: callers format their own
/// message (`format!`-style) and hand it to the appropriate level method.
pub trait Logger: Send + Sync + 'static {
    /// Logs a message that precedes process termination.
    fn fatal(&self, message: fmt::Arguments<'_>);
    /// Logs a failure that the caller will recover from.
    fn error(&self, message: fmt::Arguments<'_>);
    /// Logs a routine, user-relevant event.
    fn info(&self, message: fmt::Arguments<'_>);
    /// Logs a diagnostic event useful only to developers.
    fn debug(&self, message: fmt::Arguments<'_>);
}

/// A logger that discards everything. Used by default in unit tests so
/// test output isn't dominated by background-worker chatter.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLogger;

impl Logger for NullLogger {
    fn fatal(&self, _message: fmt::Arguments<'_>) {}
    fn error(&self, _message: fmt::Arguments<'_>) {}
    fn info(&self, _message: fmt::Arguments<'_>) {}
    fn debug(&self, _message: fmt::Arguments<'_>) {}
}

/// Logs through `format_args!` so call sites read like `println!`:
/// `log_info!(logger, "listening on {addr}")`.
#[macro_export]
macro_rules! log_fatal {
    ($logger:expr, $($arg:tt)*) => { $logger.fatal(format_args!($($arg)*)) };
}
/// See [`log_fatal!`].
#[macro_export]
macro_rules! log_error {
    ($logger:expr, $($arg:tt)*) => { $logger.error(format_args!($($arg)*)) };
}
/// See [`log_fatal!`].
#[macro_export]
macro_rules! log_info {
    ($logger:expr, $($arg:tt)*) => { $logger.info(format_args!($($arg)*)) };
}
/// See [`log_fatal!`].
#[macro_export]
macro_rules! log_debug {
    ($logger:expr, $($arg:tt)*) => { $logger.debug(format_args!($($arg)*)) };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_logger_does_not_panic() {
        let logger = NullLogger;
        log_fatal!(logger, "x={}", 1);
        log_error!(logger, "x={}", 1);
        log_info!(logger, "x={}", 1);
        log_debug!(logger, "x={}", 1);
    }
}
