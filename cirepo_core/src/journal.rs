//! Progress reporting for repository jobs.
//!
//! Jobs report what they do through [`ProgressLog`]. The sinks here forward
//! entries to `tracing`, collect them in memory, or append them to the
//! repository journal file.

use crate::error::{Error, Result};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{error, info, warn};

/// Severity of a progress entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogItemType {
    Info,
    Warning,
    Error,
}

/// What happened to the object the entry is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogActionType {
    Create,
    Update,
    Delete,
    Skip,
    None,
}

impl LogItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogItemType::Info => "info",
            LogItemType::Warning => "warning",
            LogItemType::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "info" => Some(LogItemType::Info),
            "warning" => Some(LogItemType::Warning),
            "error" => Some(LogItemType::Error),
            _ => None,
        }
    }
}

impl LogActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogActionType::Create => "create",
            LogActionType::Update => "update",
            LogActionType::Delete => "delete",
            LogActionType::Skip => "skip",
            LogActionType::None => "none",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "create" => Some(LogActionType::Create),
            "update" => Some(LogActionType::Update),
            "delete" => Some(LogActionType::Delete),
            "skip" => Some(LogActionType::Skip),
            "none" => Some(LogActionType::None),
            _ => None,
        }
    }
}

impl fmt::Display for LogItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl fmt::Display for LogActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Sink for job progress.
pub trait ProgressLog {
    fn raise_log_progress(&self, message: &str, item_type: LogItemType, action: LogActionType);
}

impl<P: ProgressLog + ?Sized> ProgressLog for &P {
    fn raise_log_progress(&self, message: &str, item_type: LogItemType, action: LogActionType) {
        (**self).raise_log_progress(message, item_type, action);
    }
}

/// Fans every entry out to several sinks.
impl ProgressLog for Vec<Box<dyn ProgressLog>> {
    fn raise_log_progress(&self, message: &str, item_type: LogItemType, action: LogActionType) {
        for sink in self {
            sink.raise_log_progress(message, item_type, action);
        }
    }
}

/// Emits entries as `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProgress;

impl ProgressLog for TracingProgress {
    fn raise_log_progress(&self, message: &str, item_type: LogItemType, action: LogActionType) {
        match item_type {
            LogItemType::Info => info!(action = %action, "{}", message),
            LogItemType::Warning => warn!(action = %action, "{}", message),
            LogItemType::Error => error!(action = %action, "{}", message),
        }
    }
}

/// A recorded progress entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEntry {
    /// Unix timestamp in seconds.
    pub timestamp: i64,
    pub item_type: LogItemType,
    pub action: LogActionType,
    pub message: String,
}

impl ProgressEntry {
    pub fn new(message: impl Into<String>, item_type: LogItemType, action: LogActionType) -> Self {
        Self {
            timestamp: unix_now(),
            item_type,
            action,
            message: message.into(),
        }
    }

    /// Pipe-delimited journal line. The message goes last so it may contain `|`.
    pub fn to_line(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.timestamp,
            self.item_type,
            self.action,
            self.message.replace(['\r', '\n'], " ")
        )
    }

    pub fn from_line(line: &str) -> Result<Self> {
        let parts: Vec<&str> = line.splitn(4, '|').collect();
        if parts.len() != 4 {
            return Err(Error::invalid_argument(format!(
                "invalid journal entry format: expected 4 fields, got {}",
                parts.len()
            )));
        }

        let timestamp = parts[0].parse::<i64>().map_err(|_| {
            Error::invalid_argument(format!("invalid timestamp in journal entry: {}", parts[0]))
        })?;
        let item_type = LogItemType::parse(parts[1]).ok_or_else(|| {
            Error::invalid_argument(format!("invalid item type in journal entry: {}", parts[1]))
        })?;
        let action = LogActionType::parse(parts[2]).ok_or_else(|| {
            Error::invalid_argument(format!("invalid action in journal entry: {}", parts[2]))
        })?;

        Ok(Self {
            timestamp,
            item_type,
            action,
            message: parts[3].to_string(),
        })
    }
}

/// Collects entries in memory.
#[derive(Debug, Default)]
pub struct MemoryProgress {
    entries: Mutex<Vec<ProgressEntry>>,
}

impl MemoryProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<ProgressEntry> {
        self.entries.lock().clone()
    }

    /// Entries with the given severity and action.
    pub fn filter(&self, item_type: LogItemType, action: LogActionType) -> Vec<ProgressEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|entry| entry.item_type == item_type && entry.action == action)
            .cloned()
            .collect()
    }
}

impl ProgressLog for MemoryProgress {
    fn raise_log_progress(&self, message: &str, item_type: LogItemType, action: LogActionType) {
        self.entries
            .lock()
            .push(ProgressEntry::new(message, item_type, action));
    }
}

/// Append-only journal file of progress entries.
#[derive(Debug)]
pub struct ProgressJournal {
    path: PathBuf,
}

impl ProgressJournal {
    /// Open or create a journal at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            File::create(&path)?;
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, entry: &ProgressEntry) -> Result<()> {
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        writeln!(file, "{}", entry.to_line())?;
        file.flush()?;
        Ok(())
    }

    /// The most recent `count` entries, oldest first. Unparseable lines are skipped.
    pub fn read_recent(&self, count: usize) -> Result<Vec<ProgressEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(File::open(&self.path)?);
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }
            if let Ok(entry) = ProgressEntry::from_line(line) {
                entries.push(entry);
            }
        }

        let skip = entries.len().saturating_sub(count);
        Ok(entries.split_off(skip))
    }
}

impl ProgressLog for ProgressJournal {
    fn raise_log_progress(&self, message: &str, item_type: LogItemType, action: LogActionType) {
        let entry = ProgressEntry::new(message, item_type, action);
        // A journal that cannot be written must not abort the job.
        if let Err(err) = self.append(&entry) {
            warn!(path = %self.path.display(), error = %err, "failed to append journal entry");
        }
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_entry_line_roundtrip_keeps_pipes_in_message() {
        let entry = ProgressEntry {
            timestamp: 1737556252,
            item_type: LogItemType::Warning,
            action: LogActionType::Delete,
            message: "cms.user 'a|b' (ID 1) not deleted".to_string(),
        };
        let parsed = ProgressEntry::from_line(&entry.to_line()).unwrap();
        assert_eq!(parsed, entry);
    }

    #[test]
    fn test_entry_newlines_flattened() {
        let entry = ProgressEntry::new("line one\nline two", LogItemType::Info, LogActionType::None);
        assert!(!entry.to_line().contains('\n'));
    }

    #[test]
    fn test_entry_invalid_format() {
        assert!(ProgressEntry::from_line("invalid|format").is_err());
        assert!(ProgressEntry::from_line("1|loud|delete|x").is_err());
        assert!(ProgressEntry::from_line("x|info|delete|x").is_err());
    }

    #[test]
    fn test_journal_open_creates_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("journal");
        assert!(!path.exists());

        ProgressJournal::open(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_journal_read_recent() {
        let temp_dir = TempDir::new().unwrap();
        let journal = ProgressJournal::open(temp_dir.path().join("journal")).unwrap();

        for i in 0..10 {
            journal.raise_log_progress(
                &format!("object {}", i),
                LogItemType::Info,
                LogActionType::Delete,
            );
        }

        let recent = journal.read_recent(3).unwrap();
        let messages: Vec<&str> = recent.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, ["object 7", "object 8", "object 9"]);
        assert_eq!(journal.read_recent(50).unwrap().len(), 10);
    }

    #[test]
    fn test_journal_skips_garbage_lines() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("journal");
        std::fs::write(&path, "garbage\n\n1|info|skip|kept\n").unwrap();

        let journal = ProgressJournal::open(&path).unwrap();
        let recent = journal.read_recent(10).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].message, "kept");
    }

    #[test]
    fn test_memory_progress_and_fan_out() {
        let memory = std::sync::Arc::new(MemoryProgress::new());

        struct Shared(std::sync::Arc<MemoryProgress>);
        impl ProgressLog for Shared {
            fn raise_log_progress(&self, message: &str, item_type: LogItemType, action: LogActionType) {
                self.0.raise_log_progress(message, item_type, action);
            }
        }

        let sinks: Vec<Box<dyn ProgressLog>> = vec![
            Box::new(TracingProgress),
            Box::new(Shared(memory.clone())),
            Box::new(Shared(memory.clone())),
        ];
        sinks.raise_log_progress("deleted", LogItemType::Info, LogActionType::Delete);
        sinks.raise_log_progress("blocked", LogItemType::Warning, LogActionType::Delete);

        assert_eq!(memory.entries().len(), 4);
        assert_eq!(memory.filter(LogItemType::Warning, LogActionType::Delete).len(), 2);
    }
}
