//! JSON document ledger.
//!
//! Keeps every run in a single `{ "runs": [...] }` document. Appends hold an
//! exclusive lock on a sidecar `.lock` file for the whole
//! read-check-write cycle and replace the document through a rename, so a
//! reader sees either the old or the new file, never a partial one.

use async_trait::async_trait;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::storage::RunLedger;
use crate::types::{EndgameError, RunRecord};

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerFile {
    #[serde(default)]
    runs: Vec<RunRecord>,
}

pub struct JsonLedger {
    path: PathBuf,
}

fn storage_err(context: &str, e: impl std::fmt::Display) -> EndgameError {
    EndgameError::Storage(format!("{context}: {e}"))
}

/// `path` with `suffix` appended to the file name.
fn sidecar(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn read_document(path: &Path) -> Result<LedgerFile, EndgameError> {
    if !path.exists() {
        return Ok(LedgerFile::default());
    }
    let json = fs::read_to_string(path)
        .map_err(|e| storage_err(&format!("Failed to read ledger {}", path.display()), e))?;
    if json.trim().is_empty() {
        return Ok(LedgerFile::default());
    }
    serde_json::from_str(&json)
        .map_err(|e| storage_err(&format!("Failed to parse ledger {}", path.display()), e))
}

fn write_document(path: &Path, doc: &LedgerFile) -> Result<(), EndgameError> {
    let json = serde_json::to_string_pretty(doc).map_err(|e| storage_err("Failed to serialise ledger", e))?;
    let tmp = sidecar(path, ".tmp");

    let mut file = File::create(&tmp)
        .map_err(|e| storage_err(&format!("Failed to create {}", tmp.display()), e))?;
    file.write_all(json.as_bytes())
        .and_then(|_| file.sync_all())
        .map_err(|e| storage_err(&format!("Failed to write {}", tmp.display()), e))?;

    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        storage_err(&format!("Failed to replace {}", path.display()), e)
    })
}

fn append_locked(path: &Path, record: &RunRecord) -> Result<(), EndgameError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| storage_err(&format!("Failed to create {}", parent.display()), e))?;
    }

    let lock_path = sidecar(path, ".lock");
    let lock = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock_path)
        .map_err(|e| storage_err(&format!("Failed to open {}", lock_path.display()), e))?;
    lock.lock_exclusive()
        .map_err(|e| storage_err(&format!("Failed to lock {}", lock_path.display()), e))?;

    // The lock is released when `lock` is dropped at the end of this scope.
    let mut doc = read_document(path)?;
    if doc.runs.iter().any(|r| r.run_id == record.run_id) {
        warn!(run_id = %record.run_id, path = %path.display(), "Duplicate run id rejected");
        return Err(EndgameError::LedgerConflict(record.run_id.clone()));
    }
    doc.runs.push(record.clone());
    write_document(path, &doc)?;

    debug!(run_id = %record.run_id, runs = doc.runs.len(), "Ledger document rewritten");
    Ok(())
}

impl JsonLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RunLedger for JsonLedger {
    async fn append(&self, record: &RunRecord) -> Result<(), EndgameError> {
        let path = self.path.clone();
        let owned = record.clone();
        tokio::task::spawn_blocking(move || append_locked(&path, &owned))
            .await
            .map_err(|e| storage_err("Ledger append task failed", e))??;

        info!(run_id = %record.run_id, path = %self.path.display(), "Run appended to ledger");
        Ok(())
    }

    async fn runs(&self) -> Result<Vec<RunRecord>, EndgameError> {
        let path = self.path.clone();
        let doc = tokio::task::spawn_blocking(move || read_document(&path))
            .await
            .map_err(|e| storage_err("Ledger read task failed", e))??;
        Ok(doc.runs)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
