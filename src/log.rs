use anyhow::{Context, Result};
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

const LOG_CAPACITY: usize = 500;

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Default)]
pub struct ActivityLog {
    entries: Vec<LogEntry>,
    path: Option<PathBuf>,
}

impl ActivityLog {
    pub fn with_file(path: PathBuf) -> Self {
        Self {
            entries: Vec::new(),
            path: Some(path),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn info(&mut self, message: String) {
        self.push(LogLevel::Info, message);
    }

    pub fn warn(&mut self, message: String) {
        self.push(LogLevel::Warn, message);
    }

    pub fn error(&mut self, message: String) {
        self.push(LogLevel::Error, message);
    }

    /// Last `lines` lines of the log file, or of this process's entries when no
    /// file has been written yet.
    pub fn tail_text(&self, lines: usize) -> Result<String> {
        if lines == 0 {
            return Ok(String::new());
        }
        let raw = match &self.path {
            Some(path) if path.exists() => fs::read_to_string(path).context("read log file")?,
            _ => self.text_from_entries(),
        };
        let entries: Vec<&str> = raw.lines().collect();
        let start = entries.len().saturating_sub(lines);
        Ok(entries[start..].join("\n"))
    }

    fn text_from_entries(&self) -> String {
        self.entries
            .iter()
            .map(|entry| format!("[{}] {}", log_level_label(entry.level), entry.message))
            .collect::<Vec<String>>()
            .join("\n")
    }

    fn push(&mut self, level: LogLevel, message: String) {
        if let Some(path) = &self.path {
            let _ = append_log_file(path, level, &message);
        }

        self.entries.push(LogEntry { level, message });
        if self.entries.len() > LOG_CAPACITY {
            let overflow = self.entries.len() - LOG_CAPACITY;
            self.entries.drain(0..overflow);
        }
    }
}

fn log_level_label(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Info => "INFO",
        LogLevel::Warn => "WARN",
        LogLevel::Error => "ERROR",
    }
}

fn append_log_file(path: &Path, level: LogLevel, message: &str) -> std::io::Result<()> {
    let label = log_level_label(level);
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    writeln!(file, "[{label}] {message}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn appends_entries_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("presetsync.log");
        let mut log = ActivityLog::with_file(path.clone());

        log.info("catalog fetched".to_string());
        log.error("invariant broken".to_string());

        let raw = fs::read_to_string(path).unwrap();
        assert_eq!(raw, "[INFO] catalog fetched\n[ERROR] invariant broken\n");
        assert_eq!(log.tail_text(1).unwrap(), "[ERROR] invariant broken");
        assert_eq!(log.tail_text(0).unwrap(), "");
    }

    #[test]
    fn keeps_only_recent_entries() {
        let mut log = ActivityLog::default();
        for index in 0..LOG_CAPACITY + 3 {
            log.warn(format!("entry {index}"));
        }
        assert_eq!(log.entries.len(), LOG_CAPACITY);
        assert_eq!(log.entries[0].message, "entry 3");
        assert_eq!(
            log.tail_text(2).unwrap(),
            format!("[WARN] entry {}\n[WARN] entry {}", LOG_CAPACITY + 1, LOG_CAPACITY + 2)
        );
    }
}
