use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Verifies the integrity of downloaded packages using SHA256 checksums.
///
/// Checksums are written as `sha256:<hex>`; the prefix is optional when verifying and the
/// comparison ignores case.
pub struct ChecksumVerifier;

impl ChecksumVerifier {
    /// Compute the SHA256 checksum of a file, streamed in chunks.
    ///
    /// Returns the checksum as `sha256:<hex>`.
    pub fn compute_sha256(file_path: &Path) -> Result<String> {
        debug!("Computing SHA256 checksum for: {:?}", file_path);

        let mut file = File::open(file_path)
            .with_context(|| format!("Failed to read file: {file_path:?}"))?;
        let mut hasher = Sha256::new();
        let mut buffer = [0u8; 16 * 1024];
        loop {
            let read = file
                .read(&mut buffer)
                .with_context(|| format!("Failed to read file: {file_path:?}"))?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }

        Ok(format!("sha256:{:x}", hasher.finalize()))
    }

    /// Whether `actual` (as produced by [`Self::compute_sha256`]) matches `expected`.
    pub fn matches(actual: &str, expected: &str) -> bool {
        normalize(actual) == normalize(expected)
    }
}

fn normalize(checksum: &str) -> String {
    let checksum = checksum.trim().to_lowercase();
    match checksum.strip_prefix("sha256:") {
        Some(hex) => hex.to_string(),
        None => checksum,
    }
}
