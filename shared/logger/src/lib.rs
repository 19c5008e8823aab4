//! Thread-safe leveled logging shared by the workspace crates.
//!
//! A [`Logger`] writes to one of several sinks: a log file drained by a
//! dedicated writer thread, the console, an in-memory capture used by tests,
//! or nowhere at all.

mod config;
pub mod error;
mod log_level;
mod log_message;
mod logger;
mod sink;

pub use config::LoggingConfig;
pub use error::{LoggingError, Result};
pub use log_level::LogLevel;
pub use logger::Logger;
pub use sink::MemoryLog;
