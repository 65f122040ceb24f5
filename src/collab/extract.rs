use super::{PackageExtractor, checkpoint};
use crate::core::UpdraftError;
use crate::utils::fs::{copy_with_permissions, ensure_dir};
use std::fs::File;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Unpacks `.zip` packages into the payload directory. Any other package is copied in as-is.
///
/// Entries that would escape the payload directory are rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipExtractor;

impl ZipExtractor {
    fn extract_zip(
        archive_path: &Path,
        destination: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), UpdraftError> {
        let failed = |reason: String| UpdraftError::ExtractionFailed {
            archive: archive_path.display().to_string(),
            reason,
        };

        let file = File::open(archive_path).map_err(|e| failed(e.to_string()))?;
        let mut archive = zip::ZipArchive::new(file).map_err(|e| failed(e.to_string()))?;

        for index in 0..archive.len() {
            checkpoint(cancel)?;
            let mut entry = archive.by_index(index).map_err(|e| failed(e.to_string()))?;
            let Some(relative) = entry.enclosed_name() else {
                return Err(failed(format!("entry '{}' escapes the payload", entry.name())));
            };
            let target = destination.join(relative);

            if entry.is_dir() {
                ensure_dir(&target).map_err(|e| failed(e.to_string()))?;
                continue;
            }
            if let Some(parent) = target.parent() {
                ensure_dir(parent).map_err(|e| failed(e.to_string()))?;
            }

            let mut out = File::create(&target).map_err(|e| failed(e.to_string()))?;
            std::io::copy(&mut entry, &mut out).map_err(|e| failed(e.to_string()))?;

            #[cfg(unix)]
            if let Some(mode) = entry.unix_mode() {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(&target, std::fs::Permissions::from_mode(mode))
                    .map_err(|e| failed(e.to_string()))?;
            }
        }

        debug!("Extracted {}", archive_path.display());
        Ok(())
    }
}

impl PackageExtractor for ZipExtractor {
    fn extract(
        &self,
        archives: &[PathBuf],
        destination: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), UpdraftError> {
        ensure_dir(destination).map_err(|e| UpdraftError::ExtractionFailed {
            archive: destination.display().to_string(),
            reason: e.to_string(),
        })?;

        for archive in archives {
            checkpoint(cancel)?;
            let is_zip = archive
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"));
            if is_zip {
                Self::extract_zip(archive, destination, cancel)?;
            } else {
                let Some(name) = archive.file_name() else {
                    warn!("Skipping package without a file name: {}", archive.display());
                    continue;
                };
                copy_with_permissions(archive, &destination.join(name)).map_err(|e| {
                    UpdraftError::ExtractionFailed {
                        archive: archive.display().to_string(),
                        reason: e.to_string(),
                    }
                })?;
            }
        }
        Ok(())
    }
}
