use super::transport::{TransferError, Transport};
use super::verification::ChecksumVerifier;
use super::{PackageDownloader, checkpoint};
use crate::core::UpdraftError;
use crate::metadata::UpdatePackage;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Downloads packages and verifies their checksums.
///
/// A package already present with a matching checksum is not fetched again, which lets a resumed
/// auto-update skip finished downloads.
#[derive(Debug, Clone)]
pub struct VerifyingDownloader {
    transport: Transport,
}

impl VerifyingDownloader {
    pub fn new(transport: Transport) -> Self {
        Self {
            transport,
        }
    }

    fn download_one(
        &self,
        package: &UpdatePackage,
        destination: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, UpdraftError> {
        let failed = |reason: String| UpdraftError::DownloadFailed {
            name: package.name.clone(),
            reason,
        };

        // Only the final component of the name is honoured.
        let file_name = Path::new(&package.name)
            .file_name()
            .ok_or_else(|| failed("package name is not a file name".to_string()))?;
        let target = destination.join(file_name);

        if target.exists() && verify(&target, &package.sha256).is_ok_and(|ok| ok) {
            debug!("Package {} already downloaded", package.name);
            return Ok(target);
        }

        self.transport.fetch(&package.url, &target, cancel).map_err(|e| match e {
            TransferError::Cancelled => UpdraftError::Cancelled,
            TransferError::Failed(reason) => failed(reason),
        })?;

        let actual = ChecksumVerifier::compute_sha256(&target).map_err(|e| failed(e.to_string()))?;
        if !ChecksumVerifier::matches(&actual, &package.sha256) {
            let _ = std::fs::remove_file(&target);
            return Err(UpdraftError::ChecksumMismatch {
                name: package.name.clone(),
                expected: package.sha256.clone(),
                actual,
            });
        }

        info!("Downloaded {}", package.name);
        Ok(target)
    }
}

fn verify(path: &Path, expected: &str) -> anyhow::Result<bool> {
    let actual = ChecksumVerifier::compute_sha256(path)?;
    Ok(ChecksumVerifier::matches(&actual, expected))
}

impl PackageDownloader for VerifyingDownloader {
    fn download(
        &self,
        packages: &[UpdatePackage],
        destination: &Path,
        cancel: &CancellationToken,
    ) -> Result<Vec<PathBuf>, UpdraftError> {
        let mut files = Vec::with_capacity(packages.len());
        for package in packages {
            checkpoint(cancel)?;
            files.push(self.download_one(package, destination, cancel)?);
        }
        Ok(files)
    }
}
