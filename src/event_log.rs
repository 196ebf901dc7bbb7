//! Append-only event log
//!
//! One line per event, `YYYY-MM-DD HH:MM:SS [LEVEL]: message`. Warning,
//! error and health lines are duplicated into a separate health log so an
//! external monitor only has to tail one small file.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::logging::LogLevel;

// Process-wide sink, installed once by the binary
static EVENT_LOG: Mutex<Option<EventLog>> = parking_lot::const_mutex(None);

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Open handles for the event log and its health mirror
#[derive(Debug)]
pub struct EventLog {
    main_path: PathBuf,
    main: File,
    health: Option<File>,
    write_failed: bool,
}

impl EventLog {
    /// Open (creating if needed) both log files in append mode.
    pub fn open(main_path: &Path, health_path: Option<&Path>) -> io::Result<Self> {
        let main = open_append(main_path)?;
        let health = match health_path {
            Some(path) => Some(open_append(path)?),
            None => None,
        };

        Ok(Self {
            main_path: main_path.to_path_buf(),
            main,
            health,
            write_failed: false,
        })
    }

    pub fn main_path(&self) -> &Path {
        &self.main_path
    }

    /// Append one entry. Returns the write error, if any, so the caller can
    /// report it; the sink stays usable afterwards.
    pub fn write(&mut self, level: LogLevel, message: &str) -> io::Result<()> {
        let timestamp = chrono::Local::now().format(TIMESTAMP_FORMAT).to_string();
        let line = format_line(&timestamp, level, message);

        self.main.write_all(line.as_bytes())?;
        self.main.flush()?;

        if level.mirrors_to_health() {
            if let Some(ref mut health) = self.health {
                health.write_all(line.as_bytes())?;
                health.flush()?;
            }
        }
        Ok(())
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Render one log line, newline included
pub fn format_line(timestamp: &str, level: LogLevel, message: &str) -> String {
    format!("{} [{}]: {}\n", timestamp, level.label(), message)
}

/// Install the process-wide event log, replacing any previous one.
pub fn init(main_path: &Path, health_path: Option<&Path>) -> io::Result<()> {
    let log = EventLog::open(main_path, health_path)?;
    *EVENT_LOG.lock() = Some(log);
    Ok(())
}

/// Drop the process-wide event log; later entries go to the console only.
pub fn close() {
    *EVENT_LOG.lock() = None;
}

pub fn is_initialized() -> bool {
    EVENT_LOG.lock().is_some()
}

/// Append to the process-wide event log if one is installed.
///
/// The first failed write is reported on the console; later failures are
/// dropped until a write succeeds again.
pub fn append(level: LogLevel, message: &str) {
    let mut guard = EVENT_LOG.lock();
    let Some(ref mut log) = *guard else {
        return;
    };

    match log.write(level, message) {
        Ok(()) => log.write_failed = false,
        Err(e) => {
            if !log.write_failed {
                log.write_failed = true;
                tracing::warn!("event log write to {} failed: {}", log.main_path.display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_format_line() {
        let line = format_line("2024-05-01 12:00:00", LogLevel::Warning, "low battery");
        assert_eq!(line, "2024-05-01 12:00:00 [WARNING]: low battery\n");
    }

    #[test]
    fn test_open_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let main = dir.path().join("nested/logs/events.txt");
        let log = EventLog::open(&main, None).unwrap();
        assert_eq!(log.main_path(), main.as_path());
        assert!(main.exists());
    }

    #[test]
    fn test_health_mirror_receives_only_alert_levels() {
        let dir = tempfile::tempdir().unwrap();
        let main = dir.path().join("events.txt");
        let health = dir.path().join("health.txt");
        let mut log = EventLog::open(&main, Some(&health)).unwrap();

        log.write(LogLevel::Info, "started").unwrap();
        log.write(LogLevel::Error, "boom").unwrap();
        log.write(LogLevel::Health, "Health check: {}").unwrap();

        let main_text = fs::read_to_string(&main).unwrap();
        let health_text = fs::read_to_string(&health).unwrap();
        assert_eq!(main_text.lines().count(), 3);
        assert_eq!(health_text.lines().count(), 2);
        assert!(!health_text.contains("started"));
        assert!(health_text.contains("[ERROR]: boom"));
        assert!(health_text.contains("[HEALTH]: Health check: {}"));
    }

    #[test]
    fn test_reopen_appends() {
        let dir = tempfile::tempdir().unwrap();
        let main = dir.path().join("events.txt");
        EventLog::open(&main, None).unwrap().write(LogLevel::Info, "one").unwrap();
        EventLog::open(&main, None).unwrap().write(LogLevel::Info, "two").unwrap();

        let text = fs::read_to_string(&main).unwrap();
        assert!(text.lines().next().unwrap().ends_with("[INFO]: one"));
        assert!(text.lines().nth(1).unwrap().ends_with("[INFO]: two"));
    }

    #[test]
    #[serial]
    fn test_global_sink_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let main = dir.path().join("events.txt");

        append(LogLevel::Info, "dropped before init");
        init(&main, None).unwrap();
        assert!(is_initialized());
        append(LogLevel::Info, "kept");
        close();
        assert!(!is_initialized());
        append(LogLevel::Info, "dropped after close");

        let text = fs::read_to_string(&main).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(text.contains("kept"));
    }
}
