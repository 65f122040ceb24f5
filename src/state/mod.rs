//! Persisted state shared between consecutive updater processes.
//!
//! Two records exist:
//!
//! - the **self-update record**, written just before a handoff and read by the next process
//!   through `supdf=<path>`;
//! - the **auto-update record**, kept in the long-lived product directory so an unattended run
//!   resumes at the step where the previous one stopped.
//!
//! This module is the only writer of either record. Loads never fail silently: a record is
//! [`Loaded`], [`Absent`] or [`Corrupt`], and the caller decides what each means. Saves return
//! only after the bytes are on stable storage, which is what makes it safe to spawn the next
//! process right afterwards.
//!
//! [`Loaded`]: RecordStatus::Loaded
//! [`Absent`]: RecordStatus::Absent
//! [`Corrupt`]: RecordStatus::Corrupt

mod records;
mod working_dir;

pub use records::{
    AutoUpdateRecord, CURRENT_FORMAT_VERSION, SelfUpdateRecord, SelfUpdateState,
};
pub use working_dir::{WorkingDirKind, WorkingDirectory};

use crate::core::UpdraftError;
use crate::utils::fs::write_json_file;
use anyhow::{Context, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File name of the self-update record inside a working directory.
pub const SELF_UPDATE_FILE_NAME: &str = "selfupdate.state";

/// File name of the auto-update record inside the product directory.
pub const AUTO_UPDATE_FILE_NAME: &str = "autoupdate.state";

/// Outcome of loading a persisted record.
#[derive(Debug, Clone)]
pub enum RecordStatus<T> {
    /// No record exists
    Absent,
    /// The record was read and parsed
    Loaded(T),
    /// A record exists but cannot be used
    Corrupt(UpdraftError),
}

impl<T> RecordStatus<T> {
    pub const fn loaded(&self) -> Option<&T> {
        match self {
            Self::Loaded(record) => Some(record),
            _ => None,
        }
    }

    pub const fn is_corrupt(&self) -> bool {
        matches!(self, Self::Corrupt(_))
    }
}

/// Reads and writes the persisted records.
pub struct StateStore;

impl StateStore {
    /// Load the self-update record named on the command line.
    pub fn load_self_update(path: &Path) -> RecordStatus<SelfUpdateRecord> {
        let status = load_json(path, |reason| UpdraftError::SelfUpdateStateCorrupt {
            path: path.display().to_string(),
            reason,
        });
        if let RecordStatus::Corrupt(e) = &status {
            warn!("Self-update record unusable: {}", e.diagnostic().unwrap_or_default());
        }
        status
    }

    /// Durably write the self-update record.
    pub fn save_self_update(path: &Path, record: &SelfUpdateRecord) -> Result<()> {
        write_json_file(path, record)
            .with_context(|| format!("Failed to save self-update record {}", path.display()))?;
        debug!("Saved self-update record ({:?}) to {}", record.state, path.display());
        Ok(())
    }

    /// Load the auto-update record kept in `dir`.
    pub fn load_auto_update(dir: &Path) -> RecordStatus<AutoUpdateRecord> {
        let path = Self::auto_update_path(dir);
        let status = load_json(&path, |reason| UpdraftError::AutoUpdateStateCorrupt {
            path: path.display().to_string(),
            reason,
        });
        if let RecordStatus::Corrupt(e) = &status {
            warn!("Auto-update record unusable: {}", e.diagnostic().unwrap_or_default());
        }
        status
    }

    /// Durably write the auto-update record into `dir`.
    pub fn save_auto_update(dir: &Path, record: &AutoUpdateRecord) -> Result<()> {
        let path = Self::auto_update_path(dir);
        write_json_file(&path, record)
            .with_context(|| format!("Failed to save auto-update record {}", path.display()))?;
        debug!("Saved auto-update record at step {:?}", record.step);
        Ok(())
    }

    /// Remove the auto-update record once an unattended run has finished.
    pub fn clear_auto_update(dir: &Path) -> Result<()> {
        let path = Self::auto_update_path(dir);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to remove auto-update record {}", path.display())),
        }
    }

    pub fn auto_update_path(dir: &Path) -> PathBuf {
        dir.join(AUTO_UPDATE_FILE_NAME)
    }
}

fn load_json<T, F>(path: &Path, corrupt: F) -> RecordStatus<T>
where
    T: serde::de::DeserializeOwned,
    F: FnOnce(String) -> UpdraftError,
{
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return RecordStatus::Absent,
        Err(e) => return RecordStatus::Corrupt(corrupt(e.to_string())),
    };

    match serde_json::from_slice(&bytes) {
        Ok(record) => RecordStatus::Loaded(record),
        Err(e) => RecordStatus::Corrupt(corrupt(e.to_string())),
    }
}
