//! Append-only loan journal.
//!
//! Every committed borrow and return is appended to a JSONL (JSON Lines)
//! file with file locking, giving an audit trail independent of the state
//! snapshot.

use crate::{LoanRecord, Result};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// What happened to a loan
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LoanEventKind {
    Borrowed,
    Returned,
}

/// One journal line: the loan as it stood right after the change
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoanEvent {
    pub id: Uuid,
    pub kind: LoanEventKind,
    pub recorded_at: DateTime<Utc>,
    pub loan: LoanRecord,
}

impl LoanEvent {
    pub fn new(kind: LoanEventKind, loan: LoanRecord, recorded_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            recorded_at,
            loan,
        }
    }
}

/// Event sink trait for persisting loan events
pub trait EventSink {
    fn append(&mut self, event: &LoanEvent) -> Result<()>;
}

/// JSONL-based event sink with file locking
pub struct JsonlJournal {
    path: PathBuf,
}

impl JsonlJournal {
    /// Create a new journal for the given path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Ensure the parent directory exists
    fn ensure_parent_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

impl EventSink for JsonlJournal {
    fn append(&mut self, event: &LoanEvent) -> Result<()> {
        self.ensure_parent_dir()?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        file.lock_exclusive()?;

        let mut writer = std::io::BufWriter::new(&file);
        let line = serde_json::to_string(event)?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        drop(writer);

        file.unlock()?;

        tracing::debug!("Journaled {:?} for loan {}", event.kind, event.loan.id);
        Ok(())
    }
}

/// Read all events from a journal file, oldest first
pub fn read_events(path: &Path) -> Result<Vec<LoanEvent>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path)?;
    file.lock_shared()?;

    let reader = BufReader::new(&file);
    let mut events = Vec::new();

    for (line_num, line_result) in reader.lines().enumerate() {
        let line = line_result?;
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<LoanEvent>(&line) {
            Ok(event) => events.push(event),
            Err(e) => {
                tracing::warn!("Failed to parse journal line {}: {}", line_num + 1, e);
            }
        }
    }

    file.unlock()?;
    tracing::debug!("Read {} events from journal", events.len());
    Ok(events)
}
