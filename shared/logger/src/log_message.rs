//! Internal log message structure.

use crate::log_level::LogLevel;
use chrono::Local;

/// A single formatted log record.
#[derive(Debug, Clone)]
pub(crate) struct LogMessage {
    pub timestamp: String,
    pub level: LogLevel,
    pub component: Option<String>,
    pub message: String,
}

impl LogMessage {
    /// Creates a message stamped with the current local time.
    pub fn new(level: LogLevel, component: Option<&str>, message: &str) -> Self {
        Self {
            timestamp: Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
            level,
            component: component.map(str::to_string),
            message: message.to_string(),
        }
    }

    /// Formats the message as one line: `[timestamp] LEVEL [component]: message\n`
    pub fn format(&self) -> String {
        match &self.component {
            Some(component) => format!(
                "[{}] {} [{}]: {}\n",
                self.timestamp, self.level, component, self.message
            ),
            None => format!("[{}] {}: {}\n", self.timestamp, self.level, self.message),
        }
    }
}
