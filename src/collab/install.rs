//! Payload installation with rollback.
//!
//! Every file of the payload is copied into the base directory. An existing file is first copied
//! to the backup directory; a new file is journaled as created. When a copy fails, or the run is
//! cancelled, the journal is replayed in reverse so the previous installation is left untouched.
//! Files created by installs are listed in [`UNINSTALL_MANIFEST`] for the uninstaller.

use super::{InstallRequest, PatchInstaller};
use crate::core::UpdraftError;
use crate::utils::fs::{copy_with_permissions, ensure_parent_dir, write_json_file};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// File in the base directory listing what installs created, relative to the base directory.
pub const UNINSTALL_MANIFEST: &str = ".updraft-uninstall.json";

const MAX_RESTORE_ATTEMPTS: u32 = 3;

#[derive(Debug, Default, Serialize, Deserialize)]
pub(super) struct UninstallManifest {
    #[serde(default)]
    pub files: BTreeSet<PathBuf>,
}

impl UninstallManifest {
    pub(super) fn load(base_dir: &Path) -> anyhow::Result<Self> {
        let path = base_dir.join(UNINSTALL_MANIFEST);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read(&path)?;
        Ok(serde_json::from_slice(&content)?)
    }
}

#[derive(Debug)]
enum JournalEntry {
    Created(PathBuf),
    Replaced {
        target: PathBuf,
        backup: PathBuf,
    },
}

/// Copies the payload over the base directory and bumps the client file version.
#[derive(Debug, Clone)]
pub struct DirectoryInstaller {
    retry_delay: Duration,
}

impl Default for DirectoryInstaller {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_secs(1),
        }
    }
}

impl DirectoryInstaller {
    /// Installer with a custom delay between restore attempts.
    pub const fn with_retry_delay(retry_delay: Duration) -> Self {
        Self {
            retry_delay,
        }
    }

    fn apply(
        request: &InstallRequest,
        journal: &mut Vec<JournalEntry>,
        created: &mut BTreeSet<PathBuf>,
        cancel: &CancellationToken,
    ) -> Result<(), UpdraftError> {
        for entry in WalkDir::new(&request.payload_dir).sort_by_file_name() {
            if cancel.is_cancelled() {
                return Err(UpdraftError::Cancelled);
            }
            let entry = entry.map_err(|e| failure(e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&request.payload_dir)
                .map_err(|e| failure(e.to_string()))?
                .to_path_buf();
            let target = request.base_dir.join(&relative);

            if target.exists() {
                let backup = request.backup_dir.join(&relative);
                copy_with_permissions(&target, &backup).map_err(|e| failure(e.to_string()))?;
                journal.push(JournalEntry::Replaced {
                    target: target.clone(),
                    backup,
                });
            } else {
                ensure_parent_dir(&target).map_err(|e| failure(e.to_string()))?;
                journal.push(JournalEntry::Created(target.clone()));
                created.insert(relative);
            }

            copy_with_permissions(entry.path(), &target).map_err(|e| failure(e.to_string()))?;
            debug!("Installed {}", target.display());
        }
        Ok(())
    }

    fn finish(request: &InstallRequest, created: BTreeSet<PathBuf>) -> Result<(), UpdraftError> {
        let mut client = request.client.clone();
        client.installed_version.clone_from(&request.new_version);
        client
            .save(&request.client_file.path, request.client_file.format)
            .map_err(|e| failure(e.to_string()))?;

        let manifest_path = request.base_dir.join(UNINSTALL_MANIFEST);
        let recorded = UninstallManifest::load(&request.base_dir).and_then(|mut manifest| {
            manifest.files.extend(created);
            write_json_file(&manifest_path, &manifest)
        });
        if let Err(e) = recorded {
            warn!("Failed to update {}: {}", manifest_path.display(), e);
        }
        Ok(())
    }

    /// Undo the journal in reverse order. Returns whether every entry was restored.
    fn rollback(&self, journal: Vec<JournalEntry>) -> bool {
        let mut restored = true;
        for entry in journal.into_iter().rev() {
            let result = match &entry {
                JournalEntry::Created(path) => std::fs::remove_file(path).map_err(Into::into),
                JournalEntry::Replaced {
                    target,
                    backup,
                } => self.restore_with_retry(backup, target),
            };
            if let Err(e) = result {
                warn!("Rollback of {:?} failed: {}", entry, e);
                restored = false;
            }
        }
        restored
    }

    fn restore_with_retry(&self, backup: &Path, target: &Path) -> anyhow::Result<()> {
        let mut attempts = 0;
        loop {
            match copy_with_permissions(backup, target) {
                Ok(()) => return Ok(()),
                Err(e) if attempts < MAX_RESTORE_ATTEMPTS - 1 => {
                    warn!("Restore attempt {} failed: {}. Retrying...", attempts + 1, e);
                    std::thread::sleep(self.retry_delay);
                    attempts += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn failure(reason: String) -> UpdraftError {
    UpdraftError::InstallFailure {
        reason,
        rolled_back: false,
    }
}

impl PatchInstaller for DirectoryInstaller {
    fn install(
        &self,
        request: &InstallRequest,
        cancel: &CancellationToken,
    ) -> Result<(), UpdraftError> {
        let mut journal = Vec::new();
        let mut created = BTreeSet::new();

        let result = Self::apply(request, &mut journal, &mut created, cancel)
            .and_then(|()| Self::finish(request, created));

        match result {
            Ok(()) => {
                info!(
                    "Installed version {} into {}",
                    request.new_version,
                    request.base_dir.display()
                );
                Ok(())
            }
            Err(error) => {
                let rolled_back = self.rollback(journal);
                match error {
                    UpdraftError::Cancelled => Err(UpdraftError::Cancelled),
                    UpdraftError::InstallFailure {
                        reason,
                        ..
                    } => Err(UpdraftError::InstallFailure {
                        reason,
                        rolled_back,
                    }),
                    other => Err(other),
                }
            }
        }
    }
}
