//! Collaborators performing the actual work of each step.
//!
//! The step sequencer never touches the network or the install directory itself. Each step hands
//! its work to one of the traits below, running on a blocking task, and waits for the single
//! completion event. Implementations must observe the [`CancellationToken`] at their checkpoints
//! and return [`UpdraftError::Cancelled`] once they have stopped.
//!
//! [`Collaborators::standard`] wires the default implementations:
//!
//! | step | trait | default |
//! |---|---|---|
//! | Checking | [`UpdateChecker`] | [`ServerFileChecker`] |
//! | Downloading | [`PackageDownloader`] | [`VerifyingDownloader`] |
//! | Extracting | [`PackageExtractor`] | [`ZipExtractor`] |
//! | Installing | [`PatchInstaller`] | [`DirectoryInstaller`] |
//! | Uninstall | [`Uninstaller`] | [`ManifestUninstaller`] |
//!
//! [`UpdraftError::Cancelled`]: crate::core::UpdraftError::Cancelled

mod check;
mod download;
mod extract;
mod install;
mod transport;
mod uninstall;
pub mod verification;

pub use check::ServerFileChecker;
pub use download::VerifyingDownloader;
pub use extract::ZipExtractor;
pub use install::{DirectoryInstaller, UNINSTALL_MANIFEST};
pub use transport::Transport;
pub use uninstall::ManifestUninstaller;

use crate::args::ClientFileLocation;
use crate::config::UpdaterConfig;
use crate::core::UpdraftError;
use crate::metadata::{ClientMetadata, SelfServerMetadata, ServerMetadata, UpdatePackage};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Input of the Checking step.
#[derive(Debug, Clone)]
pub struct CheckRequest {
    /// Server file locations, tried in order
    pub sources: Vec<String>,
    /// Where the fetched server file is stored
    pub destination: PathBuf,
    pub installed_version: String,
    /// Version of the running updater
    pub updater_version: String,
}

/// Result of the Checking step.
#[derive(Debug, Clone)]
pub struct CheckReport {
    pub server_file: PathBuf,
    pub server: ServerMetadata,
    pub update_available: bool,
    /// Newer updater that must replace this one before installing
    pub self_update: Option<SelfServerMetadata>,
}

/// Input of the Installing step.
#[derive(Debug, Clone)]
pub struct InstallRequest {
    /// Extracted payload
    pub payload_dir: PathBuf,
    pub base_dir: PathBuf,
    /// Where overwritten files are kept until the install succeeds
    pub backup_dir: PathBuf,
    pub client_file: ClientFileLocation,
    pub client: ClientMetadata,
    pub new_version: String,
}

/// Fetches and evaluates the server file.
pub trait UpdateChecker: Send + Sync {
    fn check(
        &self,
        request: &CheckRequest,
        cancel: &CancellationToken,
    ) -> Result<CheckReport, UpdraftError>;
}

/// Fetches and verifies update packages; returns the local file of each package.
pub trait PackageDownloader: Send + Sync {
    fn download(
        &self,
        packages: &[UpdatePackage],
        destination: &Path,
        cancel: &CancellationToken,
    ) -> Result<Vec<PathBuf>, UpdraftError>;
}

/// Unpacks downloaded packages into the payload directory.
pub trait PackageExtractor: Send + Sync {
    fn extract(
        &self,
        archives: &[PathBuf],
        destination: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), UpdraftError>;
}

/// Applies the payload. Must leave the previous installation intact when it fails.
pub trait PatchInstaller: Send + Sync {
    fn install(
        &self,
        request: &InstallRequest,
        cancel: &CancellationToken,
    ) -> Result<(), UpdraftError>;
}

/// Removes what previous installs created.
pub trait Uninstaller: Send + Sync {
    fn uninstall(&self, base_dir: &Path, cancel: &CancellationToken) -> Result<(), UpdraftError>;
}

/// The full set of collaborators handed to the sequencer.
#[derive(Clone)]
pub struct Collaborators {
    pub checker: Arc<dyn UpdateChecker>,
    pub downloader: Arc<dyn PackageDownloader>,
    pub extractor: Arc<dyn PackageExtractor>,
    pub installer: Arc<dyn PatchInstaller>,
    pub uninstaller: Arc<dyn Uninstaller>,
}

impl Collaborators {
    /// Default implementations configured from `config`.
    pub fn standard(config: &UpdaterConfig) -> Self {
        let transport = Transport::new(config.http_timeout_secs, config.user_agent.clone());
        Self {
            checker: Arc::new(ServerFileChecker::new(transport.clone())),
            downloader: Arc::new(VerifyingDownloader::new(transport)),
            extractor: Arc::new(ZipExtractor),
            installer: Arc::new(DirectoryInstaller::default()),
            uninstaller: Arc::new(ManifestUninstaller),
        }
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// Returns [`UpdraftError::Cancelled`] once cancellation was requested.
pub(crate) fn checkpoint(cancel: &CancellationToken) -> Result<(), UpdraftError> {
    if cancel.is_cancelled() {
        Err(UpdraftError::Cancelled)
    } else {
        Ok(())
    }
}
