// src/sent_ledger.rs
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::portal_extract::ActivityRecord;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("File I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },

    #[error("JSON processing error")]
    Json(#[from] serde_json::Error),
}

fn io_context<S: Into<String>>(source: std::io::Error, context: S) -> LedgerError {
    LedgerError::Io {
        source,
        context: context.into(),
    }
}

/// Date key (`DD/MM/YYYY`) to content fingerprint of the last notification sent for that day.
#[derive(Debug, Clone)]
pub struct SentLedger {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl SentLedger {
    /// Reads the ledger. A missing, unreadable or corrupt file yields an empty ledger.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match Self::read_entries(&path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(
                    "Could not load sent ledger {:?}: {}. Starting with an empty ledger.",
                    path, e
                );
                BTreeMap::new()
            }
        };
        debug!("Loaded {} ledger entries from {:?}", entries.len(), path);
        Self { path, entries }
    }

    fn read_entries(path: &Path) -> Result<BTreeMap<String, String>, LedgerError> {
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let json_string = fs::read_to_string(path)
            .map_err(|e| io_context(e, format!("Failed to read ledger file: {:?}", path)))?;
        Ok(serde_json::from_str(&json_string)?)
    }

    pub fn was_sent(&self, date_key: &str, fingerprint: &str) -> bool {
        self.entries
            .get(date_key)
            .is_some_and(|stored| stored == fingerprint)
    }

    /// Records the fingerprint and rewrites the whole file via a temporary sibling and rename.
    pub fn mark_sent(&mut self, date_key: &str, fingerprint: &str) -> Result<(), LedgerError> {
        self.entries
            .insert(date_key.to_string(), fingerprint.to_string());
        self.persist()
    }

    fn persist(&self) -> Result<(), LedgerError> {
        let json_string = serde_json::to_string_pretty(&self.entries)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                io_context(e, format!("Failed to create ledger directory: {:?}", parent))
            })?;
        }

        let tmp_path = self.tmp_path();
        {
            let mut file = File::create(&tmp_path).map_err(|e| {
                io_context(e, format!("Failed to create temp ledger file: {:?}", tmp_path))
            })?;
            file.write_all(json_string.as_bytes()).map_err(|e| {
                io_context(e, format!("Failed to write temp ledger file: {:?}", tmp_path))
            })?;
            file.sync_all().map_err(|e| {
                io_context(e, format!("Failed to flush temp ledger file: {:?}", tmp_path))
            })?;
        }
        fs::rename(&tmp_path, &self.path).map_err(|e| {
            io_context(
                e,
                format!("Failed to replace ledger {:?} with {:?}", self.path, tmp_path),
            )
        })?;

        debug!("Persisted {} ledger entries to {:?}", self.entries.len(), self.path);
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "sent_ledger.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// SHA-256 over the ordered (task, note) pairs.
pub fn fingerprint(activities: &[ActivityRecord]) -> String {
    let pairs: Vec<(&str, &str)> = activities
        .iter()
        .map(|a| (a.task_description.as_str(), a.note.as_str()))
        .collect();
    // Serializing string tuples cannot fail.
    let encoded = serde_json::to_vec(&pairs).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(&encoded);
    hex::encode(hasher.finalize())
}
