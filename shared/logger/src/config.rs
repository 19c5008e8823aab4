use crate::error::{LoggingError, Result};
use crate::log_level::LogLevel;
use crate::logger::Logger;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Logging section of a configuration file.
///
/// Missing fields fall back to [`LoggingConfig::default`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_file_path: String,
    pub log_level: String,
    pub enable_console: bool,
    pub enable_file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            log_file_path: "peerlink.log".to_string(),
            log_level: "info".to_string(),
            enable_console: false,
            enable_file: false,
        }
    }
}

impl LoggingConfig {
    /// Parsed level; unknown strings map to Info.
    pub fn level(&self) -> LogLevel {
        self.log_level.parse().unwrap_or(LogLevel::Info)
    }

    /// Builds the logger this configuration describes.
    ///
    /// File output takes precedence and echoes to the console when both are
    /// enabled; with neither enabled the logger discards everything.
    pub fn build(&self, component: &str) -> Result<Logger> {
        let level = self.level();
        if self.enable_file {
            if self.log_file_path.trim().is_empty() {
                return Err(LoggingError::Config("empty log_file_path".to_string()));
            }
            Logger::with_component(
                PathBuf::from(&self.log_file_path),
                level,
                component.to_string(),
                self.enable_console,
            )
        } else if self.enable_console {
            Ok(Logger::console(level).for_component(component))
        } else {
            Ok(Logger::disabled())
        }
    }
}
