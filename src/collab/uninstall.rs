use super::install::{UNINSTALL_MANIFEST, UninstallManifest};
use super::{Uninstaller, checkpoint};
use crate::core::UpdraftError;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Removes the files listed in the uninstall manifest, then any directory left empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestUninstaller;

impl Uninstaller for ManifestUninstaller {
    fn uninstall(&self, base_dir: &Path, cancel: &CancellationToken) -> Result<(), UpdraftError> {
        let failed = |reason: String| UpdraftError::UninstallFailure {
            reason,
        };
        let manifest = UninstallManifest::load(base_dir).map_err(|e| failed(e.to_string()))?;
        if manifest.files.is_empty() {
            info!("Nothing recorded for removal in {}", base_dir.display());
        }

        for relative in manifest.files.iter().rev() {
            checkpoint(cancel)?;
            let path = base_dir.join(relative);
            match std::fs::remove_file(&path) {
                Ok(()) => debug!("Removed {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(failed(format!("{}: {e}", path.display()))),
            }

            // Drop parents that became empty, stopping at the base directory.
            let mut parent = path.parent();
            while let Some(dir) = parent {
                if dir == base_dir || std::fs::remove_dir(dir).is_err() {
                    break;
                }
                parent = dir.parent();
            }
        }

        let manifest_path = base_dir.join(UNINSTALL_MANIFEST);
        if let Err(e) = std::fs::remove_file(&manifest_path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!("Failed to remove {}: {}", manifest_path.display(), e);
        }
        Ok(())
    }
}
