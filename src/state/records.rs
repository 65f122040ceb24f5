use crate::sequencer::UpdateStepOn;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Version written into every new self-update record. Older records use the legacy protocol.
pub const CURRENT_FORMAT_VERSION: u32 = 2;

const fn legacy_format_version() -> u32 {
    1
}

/// Progress of a self-update across process boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelfUpdateState {
    /// No self-update in progress
    None,
    /// A newer updater was found and is being downloaded
    WillUpdate,
    /// The updater replaced itself; the new process installs the product update
    FullUpdate,
    /// The updater relaunched (usually elevated) to finish a regular update
    ContinuingRegularUpdate,
}

/// Message from one updater process to the next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelfUpdateRecord {
    /// Records without this field predate the current handoff protocol
    #[serde(default = "legacy_format_version")]
    pub format_version: u32,
    pub state: SelfUpdateState,
    /// Replacement updater binary
    #[serde(default)]
    pub new_executable: Option<PathBuf>,
    /// Updater binary to be replaced, or the `.old` copy left by a swap
    #[serde(default)]
    pub old_executable: Option<PathBuf>,
    /// Server file already fetched by the previous process
    #[serde(default)]
    pub server_file: Option<PathBuf>,
    #[serde(default)]
    pub client_file: Option<PathBuf>,
    #[serde(default)]
    pub base_dir: Option<PathBuf>,
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
    #[serde(default)]
    pub elevation_required: bool,
    #[serde(default)]
    pub auto_update: bool,
    /// Arguments for the relaunch performed by the legacy protocol
    #[serde(default)]
    pub relaunch_args: Vec<String>,
    #[serde(default = "Utc::now")]
    pub saved_at: DateTime<Utc>,
}

impl SelfUpdateRecord {
    pub fn new(state: SelfUpdateState) -> Self {
        Self {
            format_version: CURRENT_FORMAT_VERSION,
            state,
            new_executable: None,
            old_executable: None,
            server_file: None,
            client_file: None,
            base_dir: None,
            temp_dir: None,
            elevation_required: false,
            auto_update: false,
            relaunch_args: Vec::new(),
            saved_at: Utc::now(),
        }
    }

    /// Whether the record was written by an updater speaking the legacy protocol.
    pub const fn is_legacy(&self) -> bool {
        self.format_version < CURRENT_FORMAT_VERSION
    }
}

/// Where an unattended run stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoUpdateRecord {
    pub step: UpdateStepOn,
    /// Long-lived product directory holding this record and the downloads
    pub temp_dir: PathBuf,
    #[serde(default)]
    pub server_file: Option<PathBuf>,
    /// Packages fully downloaded and verified
    #[serde(default)]
    pub downloaded: Vec<PathBuf>,
    #[serde(default)]
    pub extracted: bool,
    pub saved_at: DateTime<Utc>,
}

impl AutoUpdateRecord {
    pub fn new(step: UpdateStepOn, temp_dir: &Path) -> Self {
        Self {
            step,
            temp_dir: temp_dir.to_path_buf(),
            server_file: None,
            downloaded: Vec::new(),
            extracted: false,
            saved_at: Utc::now(),
        }
    }
}
