//! Server metadata file.

use crate::core::UpdraftError;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// What a package does to the machine. Drives the elevation decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Files under the install directory
    UserFiles,
    /// Files in shared system locations
    SystemFiles,
    /// Per-user registry or preference entries
    UserRegistry,
    /// Machine-wide registry entries
    SystemRegistry,
    /// Installing, stopping or starting services
    Service,
}

/// One downloadable update package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePackage {
    /// File name of the package in the working directory
    pub name: String,
    /// Download location (URL, `file://` URL or local path)
    pub url: String,
    /// `sha256:<hex>` checksum
    pub sha256: String,
    #[serde(default)]
    pub operations: Vec<OperationKind>,
}

/// Descriptor of a newer updater executable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelfServerMetadata {
    pub version: String,
    pub url: String,
    pub sha256: String,
    /// File name of the executable once downloaded
    pub executable: String,
}

impl SelfServerMetadata {
    /// The download entry for the new updater.
    pub fn as_package(&self) -> UpdatePackage {
        UpdatePackage {
            name: self.executable.clone(),
            url: self.url.clone(),
            sha256: self.sha256.clone(),
            operations: Vec::new(),
        }
    }

    /// Whether this updater is newer than `running`.
    pub fn is_newer_than(&self, running: &str) -> bool {
        match (parse_version(&self.version), parse_version(running)) {
            (Some(offered), Some(current)) => offered > current,
            _ => false,
        }
    }
}

/// Description of the newest release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerMetadata {
    pub new_version: String,
    /// "What's new" text
    #[serde(default)]
    pub changes: String,
    #[serde(default)]
    pub packages: Vec<UpdatePackage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updater: Option<SelfServerMetadata>,
}

impl ServerMetadata {
    /// Load a fetched server file.
    pub fn load(path: &Path) -> Result<Self, UpdraftError> {
        let corrupt = |reason: String| UpdraftError::ServerMetadataCorrupt {
            path: path.display().to_string(),
            reason,
        };
        let content = std::fs::read(path).map_err(|e| corrupt(e.to_string()))?;
        let metadata: Self = serde_json::from_slice(&content).map_err(|e| corrupt(e.to_string()))?;
        if parse_version(&metadata.new_version).is_none() {
            return Err(corrupt(format!("invalid version '{}'", metadata.new_version)));
        }
        Ok(metadata)
    }

    /// Whether the announced version is newer than `installed`.
    ///
    /// An installed version that does not parse is treated as outdated.
    pub fn is_newer_than(&self, installed: &str) -> bool {
        match (parse_version(&self.new_version), parse_version(installed)) {
            (Some(offered), Some(current)) => offered > current,
            (Some(_), None) => true,
            _ => false,
        }
    }

    /// Every operation kind any package performs.
    pub fn operations(&self) -> Vec<OperationKind> {
        let mut kinds: Vec<OperationKind> =
            self.packages.iter().flat_map(|p| p.operations.iter().copied()).collect();
        kinds.sort_unstable();
        kinds.dedup();
        kinds
    }
}

fn parse_version(raw: &str) -> Option<Version> {
    let raw = raw.trim();
    Version::parse(raw.strip_prefix('v').unwrap_or(raw)).ok()
}
