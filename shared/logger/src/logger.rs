//! Thread-safe non-blocking logger.

use crate::error::Result;
use crate::log_level::LogLevel;
use crate::log_message::LogMessage;
use crate::sink::{MemoryLog, Sink};
use std::path::PathBuf;

/// Thread-safe, non-blocking logger.
///
/// Cloneable; clones and loggers derived with [`Logger::for_component`]
/// share the same sink, so one file is drained by one writer thread.
///
/// # Examples
///
/// ```
/// use logging::{Logger, LogLevel, MemoryLog};
///
/// let capture = MemoryLog::new();
/// let logger = Logger::memory(LogLevel::Info, capture.clone()).for_component("sctp");
/// logger.info("association established");
/// assert!(capture.contains("[sctp]: association established"));
/// ```
#[derive(Clone)]
pub struct Logger {
    sink: Sink,
    level: LogLevel,
    component: Option<String>,
}

impl Logger {
    /// Creates a file logger with a dedicated writer thread.
    ///
    /// # Errors
    ///
    /// Returns error if the log file cannot be created or opened.
    pub fn new(log_path: PathBuf, level: LogLevel) -> Result<Self> {
        Ok(Logger {
            sink: Sink::file(&log_path, false)?,
            level,
            component: None,
        })
    }

    /// Creates a file logger tagged with a component name, optionally
    /// echoing every line to the console.
    ///
    /// # Errors
    ///
    /// Returns error if the log file cannot be created or opened.
    pub fn with_component(
        log_path: PathBuf,
        level: LogLevel,
        component: String,
        console_output: bool,
    ) -> Result<Self> {
        Ok(Logger {
            sink: Sink::file(&log_path, console_output)?,
            level,
            component: Some(component),
        })
    }

    /// Logger printing to stdout.
    pub fn console(level: LogLevel) -> Self {
        Logger {
            sink: Sink::Console,
            level,
            component: None,
        }
    }

    /// Logger capturing lines into `capture`.
    pub fn memory(level: LogLevel, capture: MemoryLog) -> Self {
        Logger {
            sink: Sink::Memory(capture),
            level,
            component: None,
        }
    }

    /// Logger that drops everything.
    pub fn disabled() -> Self {
        Logger {
            sink: Sink::Disabled,
            level: LogLevel::Error,
            component: None,
        }
    }

    /// Derives a logger with a different component sharing this sink and level.
    pub fn for_component(&self, component: &str) -> Self {
        Logger {
            sink: self.sink.clone(),
            level: self.level,
            component: Some(component.to_string()),
        }
    }

    /// Minimum level this logger records.
    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }

    /// Filters by level and hands the message to the sink.
    fn log(&self, level: LogLevel, message: &str) {
        if level >= self.level && !matches!(self.sink, Sink::Disabled) {
            self.sink
                .write(LogMessage::new(level, self.component.as_deref(), message));
        }
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sink = match self.sink {
            Sink::File { .. } => "file",
            Sink::Console => "console",
            Sink::Memory(_) => "memory",
            Sink::Disabled => "disabled",
        };
        f.debug_struct("Logger")
            .field("sink", &sink)
            .field("level", &self.level)
            .field("component", &self.component)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::thread;
    use std::time::Duration;
    use tempfile::tempdir;

    fn wait_for_write() {
        thread::sleep(Duration::from_millis(50));
    }

    #[test]
    fn test_logger_creates_file() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("test.log");

        let logger = Logger::new(log_path.clone(), LogLevel::Debug).unwrap();
        logger.info("Test message");
        wait_for_write();

        let content = fs::read_to_string(log_path).unwrap();
        assert!(content.contains("Test message"));
    }

    #[test]
    fn test_logger_respects_level() {
        let capture = MemoryLog::new();
        let logger = Logger::memory(LogLevel::Warn, capture.clone());

        logger.debug("Debug message");
        logger.info("Info message");
        logger.warn("Warn message");

        assert!(!capture.contains("Debug message"));
        assert!(!capture.contains("Info message"));
        assert!(capture.contains("Warn message"));
    }

    #[test]
    fn test_for_component_shares_file() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("test.log");

        let root = Logger::new(log_path.clone(), LogLevel::Info).unwrap();
        let sctp = root.for_component("sctp");
        let dtls = root.for_component("dtls");

        sctp.info("sack processed");
        dtls.warn("bad record mac");
        wait_for_write();

        let content = fs::read_to_string(log_path).unwrap();
        assert!(content.contains("[sctp]: sack processed"));
        assert!(content.contains("[dtls]: bad record mac"));
    }

    #[test]
    fn test_logger_clone_across_threads() {
        let capture = MemoryLog::new();
        let logger = Logger::memory(LogLevel::Info, capture.clone());
        let logger_clone = logger.clone();

        thread::spawn(move || logger_clone.info("Message from thread"))
            .join()
            .unwrap();
        logger.info("Message from main");

        assert!(capture.contains("Message from thread"));
        assert!(capture.contains("Message from main"));
    }

    #[test]
    fn test_disabled_logger_is_silent() {
        let logger = Logger::disabled();
        logger.error("nobody hears this");
        assert_eq!(logger.level(), LogLevel::Error);
    }
}
