//! Output formatting for CLI commands.
//!
//! Commands hand their result to [`OutputWriter::report`], which prints it
//! as text or wraps it in the JSON envelope shared by every command.

use anyhow::Result;
use cirepo_core::{
    DeleteReport, DriftReport, LogActionType, LogItemType, ProgressEntry, RepositoryLocations,
    StoreReport,
};
use serde::Serialize;
use std::io::{self, Write};

/// Exit code of a command that found nothing to complain about.
pub const RESULT_OK: u8 = 0;
/// Exit code of a failed command.
pub const RESULT_ERROR: u8 = 1;
/// Exit code when the command ran but left work undone (drift, blocked objects).
pub const RESULT_INCOMPLETE: u8 = 2;

/// `{"success": .., "result_code": .., <body fields>}`
#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    success: bool,
    result_code: u8,
    #[serde(flatten)]
    body: &'a T,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

pub struct OutputWriter {
    json: bool,
}

impl OutputWriter {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    /// Print a command result and hand back its exit code.
    ///
    /// `text` only runs in text mode.
    pub fn report<T: Serialize>(
        &self,
        result_code: u8,
        body: &T,
        text: impl FnOnce(&T) -> String,
    ) -> Result<u8> {
        let mut stdout = io::stdout().lock();
        if self.json {
            let envelope = Envelope {
                success: true,
                result_code,
                body,
            };
            serde_json::to_writer_pretty(&mut stdout, &envelope)?;
            writeln!(stdout)?;
        } else {
            let text = text(body);
            if !text.is_empty() {
                stdout.write_all(text.as_bytes())?;
            }
        }
        stdout.flush()?;
        Ok(result_code)
    }

    /// Report a failed command on stderr and hand back its exit code.
    pub fn report_error(&self, error: &anyhow::Error) -> u8 {
        let mut stderr = io::stderr().lock();
        if self.json {
            let envelope = Envelope {
                success: false,
                result_code: RESULT_ERROR,
                body: &ErrorBody {
                    error: format!("{:#}", error),
                },
            };
            if let Ok(json) = serde_json::to_string_pretty(&envelope) {
                let _ = writeln!(stderr, "{}", json);
            }
        } else {
            let _ = writeln!(stderr, "Error: {:#}", error);
        }
        RESULT_ERROR
    }
}

#[derive(Debug, Serialize)]
pub struct InitOutput {
    pub root: String,
    pub algorithm: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash_length: Option<usize>,
    pub file_metadata: bool,
}

#[derive(Debug, Serialize)]
pub struct PutOutput {
    pub path: String,
    pub hash: String,
    pub bytes: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileHash {
    pub path: String,
    pub hash: String,
}

#[derive(Debug, Serialize)]
pub struct HashOutput {
    pub files: Vec<FileHash>,
}

#[derive(Debug, Serialize)]
pub struct RmOutput {
    pub path: String,
    pub deleted: bool,
}

#[derive(Debug, Serialize)]
pub struct LsOutput {
    pub locations: Vec<RepositoryLocations>,
}

#[derive(Debug, Serialize)]
pub struct StatusOutput {
    pub clean: bool,
    #[serde(flatten)]
    pub drift: DriftReport,
}

#[derive(Debug, Serialize)]
pub struct SnapshotOutput {
    pub files: usize,
    pub saved: usize,
    pub removed: usize,
}

#[derive(Debug, Serialize)]
pub struct StoreOutput {
    #[serde(flatten)]
    pub report: StoreReport,
}

#[derive(Debug, Serialize)]
pub struct ReconcileOutput {
    pub dry_run: bool,
    #[serde(flatten)]
    pub report: DeleteReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct JournalEntryInfo {
    pub timestamp: i64,
    pub timestamp_human: String,
    pub item_type: LogItemType,
    pub action: LogActionType,
    pub message: String,
}

impl From<ProgressEntry> for JournalEntryInfo {
    fn from(entry: ProgressEntry) -> Self {
        let timestamp_human = chrono::DateTime::from_timestamp(entry.timestamp, 0)
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| entry.timestamp.to_string());
        Self {
            timestamp: entry.timestamp,
            timestamp_human,
            item_type: entry.item_type,
            action: entry.action,
            message: entry.message,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct JournalOutput {
    pub entries: Vec<JournalEntryInfo>,
}
