//! Error types for logging operations.

use std::fmt;
use std::io;

/// Result type for logging operations.
pub type Result<T> = std::result::Result<T, LoggingError>;

/// Errors that can occur while setting up a logger.
#[derive(Debug)]
pub enum LoggingError {
    /// I/O error from file operations.
    Io(io::Error),
    /// The configuration asks for something the logger cannot do.
    Config(String),
}

impl fmt::Display for LoggingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoggingError::Io(err) => write!(f, "I/O error: {}", err),
            LoggingError::Config(msg) => write!(f, "Logging config error: {}", msg),
        }
    }
}

impl std::error::Error for LoggingError {}

impl From<io::Error> for LoggingError {
    fn from(err: io::Error) -> Self {
        LoggingError::Io(err)
    }
}
