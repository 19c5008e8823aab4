//! Destinations a [`Logger`](crate::Logger) can write to.

use crate::error::Result;
use crate::log_message::LogMessage;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Mutex};

/// Where formatted messages end up.
#[derive(Clone)]
pub(crate) enum Sink {
    /// Lines are sent to a writer thread that appends them to a file.
    File {
        sender: Sender<LogMessage>,
        echo_console: bool,
    },
    /// Lines are printed to stdout.
    Console,
    /// Lines are kept in memory.
    Memory(MemoryLog),
    /// Messages are discarded.
    Disabled,
}

impl Sink {
    /// Opens (or creates) `path` in append mode and starts its writer thread.
    pub fn file(path: &Path, echo_console: bool) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let (sender, receiver) = channel();
        std::thread::spawn(move || run_writer(file, receiver));
        Ok(Sink::File {
            sender,
            echo_console,
        })
    }

    pub fn write(&self, message: LogMessage) {
        match self {
            Sink::File {
                sender,
                echo_console,
            } => {
                if *echo_console {
                    print!("{}", message.format());
                }
                // The writer thread only exits once every sender is gone.
                let _ = sender.send(message);
            }
            Sink::Console => print!("{}", message.format()),
            Sink::Memory(log) => log.push(message.format()),
            Sink::Disabled => {}
        }
    }
}

/// Writer loop: runs until every sender has been dropped.
fn run_writer(mut file: File, receiver: Receiver<LogMessage>) {
    for message in receiver {
        if let Err(e) = file.write_all(message.format().as_bytes()) {
            eprintln!("Error writing log: {}", e);
            continue;
        }
        if let Err(e) = file.flush() {
            eprintln!("Error flushing log: {}", e);
        }
    }
}

/// Shared in-memory capture of formatted log lines.
///
/// Clones share the same buffer, so a test can keep one handle while the
/// logger under test writes through another.
#[derive(Debug, Clone, Default)]
pub struct MemoryLog {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, line: String) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line);
        }
    }

    /// Snapshot of every captured line.
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }

    /// True if any captured line contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.lines
            .lock()
            .map(|lines| lines.iter().any(|line| line.contains(needle)))
            .unwrap_or(false)
    }

    pub fn clear(&self) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_level::LogLevel;
    use std::fs;
    use std::thread;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn test_file_sink_creates_file() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("sink.log");

        let sink = Sink::file(&log_path, false);
        assert!(sink.is_ok());
        assert!(log_path.exists());
    }

    #[test]
    fn test_file_sink_writes_through_thread() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("sink.log");

        let sink = Sink::file(&log_path, false).unwrap();
        sink.write(LogMessage::new(LogLevel::Debug, None, "thread test"));
        drop(sink);

        thread::sleep(Duration::from_millis(100));

        let content = fs::read_to_string(log_path).unwrap();
        assert!(content.contains("thread test"));
    }

    #[test]
    fn test_memory_log_shared_between_clones() {
        let log = MemoryLog::new();
        let sink = Sink::Memory(log.clone());

        sink.write(LogMessage::new(LogLevel::Info, Some("dcep"), "ack sent"));

        assert_eq!(log.lines().len(), 1);
        assert!(log.contains("ack sent"));
        log.clear();
        assert!(log.lines().is_empty());
    }
}
