use super::SELF_UPDATE_FILE_NAME;
use crate::core::UpdraftError;
use crate::utils::fs::{ensure_dir, remove_dir_best_effort};
use std::path::{Path, PathBuf};

/// Who owns a working directory and how long it lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkingDirKind {
    /// Created by this process, removed when it exits
    PerRun,
    /// Handed over on the command line or by a previous process
    Supplied,
    /// Long-lived per-product directory of unattended runs, never removed by the updater
    Product,
}

/// Directory holding downloads, payloads, backups and state records of a run.
///
/// Unlike a scoped temp dir this is *not* removed on drop: it must survive a handoff to the next
/// process. Removal is the lifecycle guard's decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingDirectory {
    path: PathBuf,
    kind: WorkingDirKind,
}

impl WorkingDirectory {
    /// Create a fresh, uniquely named directory under `root`.
    pub fn per_run(root: &Path) -> Result<Self, UpdraftError> {
        let path = root.join(format!("updraft_{}", uuid::Uuid::new_v4().simple()));
        create(&path)?;
        Ok(Self {
            path,
            kind: WorkingDirKind::PerRun,
        })
    }

    /// Adopt an existing directory.
    pub fn supplied(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: WorkingDirKind::Supplied,
        }
    }

    /// Open (creating if needed) the long-lived directory of `product_name` under `data_root`.
    pub fn product(data_root: &Path, product_name: &str) -> Result<Self, UpdraftError> {
        let path = data_root.join(sanitize(product_name));
        create(&path)?;
        Ok(Self {
            path,
            kind: WorkingDirKind::Product,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub const fn kind(&self) -> WorkingDirKind {
        self.kind
    }

    pub fn is_long_lived(&self) -> bool {
        self.kind == WorkingDirKind::Product
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.path.join("downloads")
    }

    pub fn payload_dir(&self) -> PathBuf {
        self.path.join("payload")
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.path.join("backup")
    }

    pub fn server_file(&self) -> PathBuf {
        self.path.join("server.json")
    }

    pub fn self_update_file(&self) -> PathBuf {
        self.path.join(SELF_UPDATE_FILE_NAME)
    }

    /// Remove the directory, swallowing failures. Long-lived directories are left alone.
    pub fn remove(&self) -> bool {
        if self.is_long_lived() {
            return false;
        }
        remove_dir_best_effort(&self.path)
    }
}

fn create(path: &Path) -> Result<(), UpdraftError> {
    ensure_dir(path).map_err(|e| UpdraftError::WorkingDirectory {
        path: path.display().to_string(),
        reason: format!("{e:#}"),
    })
}

fn sanitize(product_name: &str) -> String {
    let cleaned: String = product_name
        .trim()
        .chars()
        .map(|c| {
            if matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') {
                '_'
            } else {
                c
            }
        })
        .collect();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "product".to_string()
    } else {
        cleaned
    }
}
