//! Byte transfer from URLs and local paths.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const CHUNK_SIZE: usize = 64 * 1024;

/// Why a transfer stopped.
#[derive(Debug)]
pub enum TransferError {
    Cancelled,
    Failed(String),
}

/// Fetches `http(s)://` URLs with a blocking `reqwest` client and copies `file://` URLs or plain
/// paths from disk. Must run on a blocking thread.
#[derive(Debug, Clone)]
pub struct Transport {
    timeout: Duration,
    user_agent: String,
}

impl Transport {
    pub fn new(timeout_secs: u64, user_agent: String) -> Self {
        Self {
            timeout: Duration::from_secs(timeout_secs),
            user_agent,
        }
    }

    /// Copy `location` into `destination`, checking `cancel` between chunks.
    ///
    /// A partial file is removed on failure or cancellation.
    pub fn fetch(
        &self,
        location: &str,
        destination: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), TransferError> {
        debug!("Fetching {} -> {}", location, destination.display());

        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent).map_err(|e| TransferError::Failed(e.to_string()))?;
        }

        let result = if location.starts_with("http://") || location.starts_with("https://") {
            self.fetch_http(location, destination, cancel)
        } else {
            let path = location.strip_prefix("file://").unwrap_or(location);
            File::open(path)
                .map_err(|e| TransferError::Failed(format!("{path}: {e}")))
                .and_then(|mut source| copy_chunked(&mut source, destination, cancel))
        };

        if result.is_err() {
            let _ = std::fs::remove_file(destination);
        }
        result
    }

    fn fetch_http(
        &self,
        url: &str,
        destination: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), TransferError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .user_agent(&self.user_agent)
            .build()
            .map_err(|e| TransferError::Failed(e.to_string()))?;

        let mut response = client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| TransferError::Failed(e.to_string()))?;

        copy_chunked(&mut response, destination, cancel)
    }
}

fn copy_chunked(
    source: &mut impl Read,
    destination: &Path,
    cancel: &CancellationToken,
) -> Result<(), TransferError> {
    let mut file = File::create(destination)
        .map_err(|e| TransferError::Failed(format!("{}: {e}", destination.display())))?;
    let mut buffer = vec![0u8; CHUNK_SIZE];

    loop {
        if cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }
        let read = source.read(&mut buffer).map_err(|e| TransferError::Failed(e.to_string()))?;
        if read == 0 {
            break;
        }
        file.write_all(&buffer[..read]).map_err(|e| TransferError::Failed(e.to_string()))?;
    }

    file.sync_all().map_err(|e| TransferError::Failed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn transport() -> Transport {
        Transport::new(5, "updraft-test".to_string())
    }

    #[test]
    fn test_fetch_local_path_and_file_url() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("source.bin");
        std::fs::write(&source, vec![7u8; CHUNK_SIZE * 2 + 5]).unwrap();

        let dest = temp.path().join("out").join("a.bin");
        transport().fetch(source.to_str().unwrap(), &dest, &CancellationToken::new()).unwrap();
        assert_eq!(std::fs::read(&dest).unwrap().len(), CHUNK_SIZE * 2 + 5);

        let dest = temp.path().join("b.bin");
        let url = format!("file://{}", source.display());
        transport().fetch(&url, &dest, &CancellationToken::new()).unwrap();
        assert!(dest.exists());
    }

    #[test]
    fn test_fetch_missing_source_leaves_nothing() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("a.bin");
        let result = transport().fetch(
            temp.path().join("nope").to_str().unwrap(),
            &dest,
            &CancellationToken::new(),
        );
        assert!(matches!(result, Err(TransferError::Failed(_))));
        assert!(!dest.exists());
    }

    #[test]
    fn test_fetch_cancelled() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("source.bin");
        std::fs::write(&source, b"data").unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let dest = temp.path().join("a.bin");
        let result = transport().fetch(source.to_str().unwrap(), &dest, &cancel);
        assert!(matches!(result, Err(TransferError::Cancelled)));
        assert!(!dest.exists());
    }
}
