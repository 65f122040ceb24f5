//! Binary replacement with a restorable backup.

use crate::utils::fs::copy_with_permissions;
use anyhow::{Context, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

const MAX_RESTORE_ATTEMPTS: u32 = 3;
const RESTORE_DELAY: Duration = Duration::from_secs(1);

/// A completed swap: `target` holds the new binary, `backup` the previous one.
#[derive(Debug)]
pub(super) struct BinarySwap {
    target: PathBuf,
    backup: PathBuf,
    had_previous: bool,
}

impl BinarySwap {
    /// Stage `new_binary` next to `target`, move `target` to `backup` and the staged copy into
    /// place. On failure `target` is put back before returning.
    pub(super) fn apply(new_binary: &Path, target: &Path, backup: &Path) -> Result<Self> {
        let staged = sibling(target, ".new");
        copy_with_permissions(new_binary, &staged)
            .with_context(|| format!("Failed to stage {}", new_binary.display()))?;
        set_executable(&staged)?;

        if backup.exists() {
            std::fs::remove_file(backup)
                .with_context(|| format!("Failed to remove stale backup {}", backup.display()))?;
        }

        let had_previous = target.exists();
        if had_previous {
            std::fs::rename(target, backup).with_context(|| {
                format!("Failed to back up {} to {}", target.display(), backup.display())
            })?;
        }

        move_into_place(&staged, target, backup, had_previous)?;

        debug!("Swapped {} into {}", new_binary.display(), target.display());
        Ok(Self {
            target: target.to_path_buf(),
            backup: backup.to_path_buf(),
            had_previous,
        })
    }

    /// Put the previous binary back, retrying when the file is briefly locked.
    pub(super) fn restore(self) -> Result<()> {
        if !self.had_previous {
            return std::fs::remove_file(&self.target)
                .with_context(|| format!("Failed to remove {}", self.target.display()));
        }

        let mut attempts = 0;
        loop {
            match self.attempt_restore() {
                Ok(()) => return Ok(()),
                Err(e) if attempts < MAX_RESTORE_ATTEMPTS - 1 => {
                    warn!("Restore attempt {} failed: {}. Retrying...", attempts + 1, e);
                    std::thread::sleep(RESTORE_DELAY);
                    attempts += 1;
                }
                Err(e) => {
                    return Err(e).context(format!(
                        "Failed to restore backup after {MAX_RESTORE_ATTEMPTS} attempts"
                    ));
                }
            }
        }
    }

    fn attempt_restore(&self) -> Result<()> {
        if self.target.exists() {
            std::fs::remove_file(&self.target)?;
        }
        std::fs::rename(&self.backup, &self.target)?;
        Ok(())
    }
}

/// Rename `staged` onto `target`. On failure the backup is moved back when there was one.
fn move_into_place(
    staged: &Path,
    target: &Path,
    backup: &Path,
    had_previous: bool,
) -> Result<()> {
    let Err(e) = std::fs::rename(staged, target) else {
        return Ok(());
    };
    if let Err(cleanup) = std::fs::remove_file(staged) {
        debug!("Could not remove staged {}: {}", staged.display(), cleanup);
    }
    let error = anyhow::Error::new(e).context(format!("Failed to install {}", target.display()));
    if !had_previous {
        return Err(error);
    }
    match std::fs::rename(backup, target) {
        Ok(()) => Err(error),
        Err(restore) => {
            warn!(
                "Previous binary left at {} after a failed swap: {}",
                backup.display(),
                restore
            );
            Err(error.context(format!(
                "The previous binary could not be restored from {}: {}",
                backup.display(),
                restore
            )))
        }
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

fn set_executable(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
            .with_context(|| format!("Cannot set executable permission on {}", path.display()))?;
    }
    let _ = path;
    Ok(())
}
