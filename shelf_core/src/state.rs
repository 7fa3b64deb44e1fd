//! Library state persistence.
//!
//! The catalog, the loan ledger and the accounts live together in one JSON
//! document so a borrow or return is committed by a single atomic rename.

use crate::{Accounts, Catalog, Error, Ledger, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Everything the library persists
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct LibraryState {
    #[serde(default)]
    pub catalog: Catalog,
    #[serde(default)]
    pub ledger: Ledger,
    #[serde(default)]
    pub accounts: Accounts,
}

impl LibraryState {
    /// Load state from a file
    ///
    /// Returns empty state if the file doesn't exist. A file that exists but
    /// cannot be parsed is an error: silently starting over would lose loans.
    /// Callers are expected to hold the store lock.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!("No state file found at {:?}, starting empty", path);
            return Ok(Self::default());
        }

        let mut contents = String::new();
        File::open(path)?.read_to_string(&mut contents)?;

        let state = serde_json::from_str::<LibraryState>(&contents).map_err(|e| {
            Error::State(format!("Failed to parse state file {:?}: {}", path, e))
        })?;

        tracing::debug!(
            "Loaded state from {:?}: {} books, {} loans",
            path,
            state.catalog.len(),
            state.ledger.len()
        );
        Ok(state)
    }

    /// Save state to a file
    ///
    /// Atomically writes state by:
    /// 1. Writing to a temp file
    /// 2. Syncing to disk
    /// 3. Renaming over the original
    pub fn save(&self, path: &Path) -> Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| Error::State(format!("state path {:?} has no parent", path)))?;
        std::fs::create_dir_all(parent)?;

        // Unique temp file in the same directory for atomic rename
        let temp = NamedTempFile::new_in(parent)?;

        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            serde_json::to_writer(&mut writer, self)?;
            writer.flush()?;
        }

        temp.as_file().sync_all()?;

        // Atomically replace old state file
        temp.persist(path).map_err(|e| Error::Io(e.error))?;

        tracing::debug!("Saved state to {:?}", path);
        Ok(())
    }
}
