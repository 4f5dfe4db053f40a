//! Log forwarding
//!
//! Load drivers forward their log records to a sink owned by the benchmark
//! controller, which persists them centrally. Locally every record is also
//! emitted through `tracing`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::Level;

use crate::{DlBenchError, Result};

/// A single forwarded log message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub target: String,
    pub message: String,
}

impl LogRecord {
    pub fn new(level: Level, target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level: level.as_str().to_string(),
            target: target.into(),
            message: message.into(),
        }
    }

    /// Format the record as a single log line
    pub fn format_line(&self) -> String {
        format!(
            "{} {:<5} {}: {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            self.level,
            self.target,
            self.message
        )
    }
}

/// Central log sink reachable from every load driver
pub trait LogSink: Send + Sync {
    fn log_message(&self, record: LogRecord) -> Result<()>;
}

/// Sink appending records to a log file
pub struct FileLogSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileLogSink {
    /// Open (or create) the given log file for appending
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Create a timestamped log file `benchmark_YYYYMMDD_HHMMSS.log` inside `dir`
    pub fn in_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let name = format!("benchmark_{}.log", Utc::now().format("%Y%m%d_%H%M%S"));
        Self::open(dir.as_ref().join(name))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogSink for FileLogSink {
    fn log_message(&self, record: LogRecord) -> Result<()> {
        let mut file = self
            .file
            .lock()
            .map_err(|_| DlBenchError::Worker("Log file lock poisoned".to_string()))?;
        writeln!(file, "{}", record.format_line())?;
        Ok(())
    }
}

/// Sink keeping records in memory
#[derive(Default)]
pub struct MemoryLogSink {
    records: Mutex<Vec<LogRecord>>,
}

impl MemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything logged so far
    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

impl LogSink for MemoryLogSink {
    fn log_message(&self, record: LogRecord) -> Result<()> {
        self.records
            .lock()
            .map_err(|_| DlBenchError::Worker("Log buffer lock poisoned".to_string()))?
            .push(record);
        Ok(())
    }
}

/// Parse a configured log level name
pub fn parse_level(name: &str) -> Result<Level> {
    name.trim()
        .parse::<Level>()
        .map_err(|_| DlBenchError::Config(format!("Unknown log level: {}", name)))
}

/// Install the process-wide `tracing` subscriber
pub fn init_tracing(level: Level) {
    // A subscriber may already be installed (tests, embedding applications)
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(true)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_file_sink_appends_lines() {
        let dir = tempdir().unwrap();
        let sink = FileLogSink::in_dir(dir.path()).unwrap();
        let name = sink.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("benchmark_"));
        assert!(name.ends_with(".log"));

        sink.log_message(LogRecord::new(Level::INFO, "LoadDriver1", "first"))
            .unwrap();
        sink.log_message(LogRecord::new(Level::WARN, "LoadDriver2", "second"))
            .unwrap();

        let content = fs::read_to_string(sink.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("INFO"));
        assert!(lines[0].ends_with("LoadDriver1: first"));
        assert!(lines[1].contains("WARN"));
    }

    #[test]
    fn test_memory_sink_keeps_order() {
        let sink = MemoryLogSink::new();
        sink.log_message(LogRecord::new(Level::DEBUG, "a", "1")).unwrap();
        sink.log_message(LogRecord::new(Level::DEBUG, "b", "2")).unwrap();
        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].target, "a");
        assert_eq!(records[1].message, "2");
        assert_eq!(records[1].level, "DEBUG");
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("info").unwrap(), Level::INFO);
        assert_eq!(parse_level("WARN").unwrap(), Level::WARN);
        assert!(parse_level("verbose").is_err());
    }
}
