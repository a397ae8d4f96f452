//! Logger collaborator injected into persistence components.
//!
//! Components never log directly. They hold an `Arc<dyn Logger>` that defaults to
//! [`NullLogger`] and can be replaced through `with_logger` or found in references
//! under `*:logger:*:*:*`. [`TracingLogger`] forwards to `tracing`.

use std::{error::Error, fmt};

/// Severity of a log message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Receives log messages tagged with a correlation id.
pub trait Logger: Send + Sync + fmt::Debug {
    /// Records one message. Implementations must not fail.
    fn log(
        &self,
        level: LogLevel,
        correlation_id: Option<&str>,
        error: Option<&(dyn Error + 'static)>,
        message: fmt::Arguments<'_>,
    );

    fn trace(&self, correlation_id: Option<&str>, message: fmt::Arguments<'_>) {
        self.log(LogLevel::Trace, correlation_id, None, message);
    }

    fn debug(&self, correlation_id: Option<&str>, message: fmt::Arguments<'_>) {
        self.log(LogLevel::Debug, correlation_id, None, message);
    }

    fn info(&self, correlation_id: Option<&str>, message: fmt::Arguments<'_>) {
        self.log(LogLevel::Info, correlation_id, None, message);
    }

    fn error(
        &self,
        correlation_id: Option<&str>,
        error: Option<&(dyn Error + 'static)>,
        message: fmt::Arguments<'_>,
    ) {
        self.log(LogLevel::Error, correlation_id, error, message);
    }
}

/// Logger that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLogger;

impl Logger for NullLogger {
    fn log(&self, _: LogLevel, _: Option<&str>, _: Option<&(dyn Error + 'static)>, _: fmt::Arguments<'_>) {}
}

/// Logger that emits `tracing` events with a `correlation_id` field.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(
        &self,
        level: LogLevel,
        correlation_id: Option<&str>,
        error: Option<&(dyn Error + 'static)>,
        message: fmt::Arguments<'_>,
    ) {
        let correlation_id = correlation_id.unwrap_or_default();

        match (level, error) {
            (LogLevel::Error, Some(error)) => tracing::error!(correlation_id, error = %error, "{}", message),
            (LogLevel::Error, None) => tracing::error!(correlation_id, "{}", message),
            (LogLevel::Warn, _) => tracing::warn!(correlation_id, "{}", message),
            (LogLevel::Info, _) => tracing::info!(correlation_id, "{}", message),
            (LogLevel::Debug, _) => tracing::debug!(correlation_id, "{}", message),
            (LogLevel::Trace, _) => tracing::trace!(correlation_id, "{}", message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Default)]
    struct RecordingLogger {
        lines: Mutex<Vec<(LogLevel, Option<String>, String)>>,
    }

    impl Logger for RecordingLogger {
        fn log(
            &self,
            level: LogLevel,
            correlation_id: Option<&str>,
            _error: Option<&(dyn Error + 'static)>,
            message: fmt::Arguments<'_>,
        ) {
            self.lines
                .lock()
                .unwrap()
                .push((level, correlation_id.map(str::to_string), message.to_string()));
        }
    }

    #[test]
    fn helpers_forward_level_and_correlation_id() {
        let logger = Arc::new(RecordingLogger::default());
        let shared: Arc<dyn Logger> = logger.clone();

        shared.trace(Some("123"), format_args!("Deleted {} items", 3));
        shared.debug(None, format_args!("Opened"));

        let lines = logger.lines.lock().unwrap();
        assert_eq!(lines[0], (LogLevel::Trace, Some("123".to_string()), "Deleted 3 items".to_string()));
        assert_eq!(lines[1].0, LogLevel::Debug);
    }

    #[test]
    fn tracing_logger_accepts_every_level() {
        let err = std::io::Error::other("boom");

        TracingLogger.error(Some("123"), Some(&err), format_args!("failed"));
        TracingLogger.error(None, None, format_args!("failed"));
        TracingLogger.info(None, format_args!("info"));
        NullLogger.trace(None, format_args!("ignored"));
    }
}
