//! Operating mode resolution.
//!
//! [`ModeResolver::resolve`] is a pure function of the typed arguments, the persisted state
//! snapshot and the outcome of loading the client file. Rules are evaluated in order and the first
//! match wins:
//!
//! 1. `supdf` with a legacy record → [`OperatingMode::SelfUpdateHandoff`] (legacy shim)
//! 2. client file failed to load → error
//! 3. `autoupdate` → [`OperatingMode::AutoUpdate`], degrading to a fresh check when the
//!    auto-update record is corrupt
//! 4. record in `FullUpdate` → [`OperatingMode::SelfUpdateHandoff`] (continue as the new updater)
//! 5. record in `ContinuingRegularUpdate` → [`OperatingMode::ContinuingAfterRelaunch`]
//! 6. `uninstall` → [`OperatingMode::Uninstalling`]
//! 7. otherwise → [`OperatingMode::Interactive`]
//!
//! A run started with `supdf` never reaches rules 3, 6 or 7: a record that is missing, corrupt or
//! in a state that cannot be continued is an error.

use crate::args::{QuickCheck, UpdaterArgs};
use crate::core::UpdraftError;
use crate::metadata::ClientMetadata;
use crate::sequencer::UpdateStepOn;
use crate::state::{AutoUpdateRecord, RecordStatus, SelfUpdateRecord, SelfUpdateState};
use tracing::{info, warn};

/// How a self-update handoff continues in this process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandoffEntry {
    /// Copy the replacement binary into place and relaunch it; no steps run here
    Legacy(SelfUpdateRecord),
    /// This process is the new updater; install the product update
    ContinueSelfUpdated(SelfUpdateRecord),
}

/// Where an unattended run starts.
#[derive(Debug, Clone)]
pub enum AutoUpdateEntry {
    /// No previous progress
    Fresh,
    /// Continue from the recorded step
    Resume(AutoUpdateRecord),
    /// The record was unusable; the single fallback to a fresh check is already spent
    Degraded(UpdraftError),
}

/// Behaviour of this process, fixed once at startup.
#[derive(Debug, Clone)]
pub enum OperatingMode {
    SelfUpdateHandoff(HandoffEntry),
    AutoUpdate(AutoUpdateEntry),
    ContinuingAfterRelaunch(SelfUpdateRecord),
    Interactive { quick_check: Option<QuickCheck> },
    Uninstalling { silent: bool },
}

impl OperatingMode {
    /// First step the sequencer enters, `None` when no step runs in this process.
    pub fn entry_step(&self) -> Option<UpdateStepOn> {
        match self {
            Self::SelfUpdateHandoff(HandoffEntry::Legacy(_)) => None,
            Self::SelfUpdateHandoff(HandoffEntry::ContinueSelfUpdated(_))
            | Self::ContinuingAfterRelaunch(_) => Some(UpdateStepOn::Installing),
            Self::AutoUpdate(AutoUpdateEntry::Resume(record)) => Some(resume_step(record.step)),
            Self::AutoUpdate(_) | Self::Interactive { .. } => Some(UpdateStepOn::Checking),
            Self::Uninstalling { .. } => Some(UpdateStepOn::Uninstall),
        }
    }

    /// Whether this process continues a handoff started by a previous one. A legacy record is
    /// still the old updater finishing its own replacement.
    pub const fn is_continuation(&self) -> bool {
        matches!(
            self,
            Self::SelfUpdateHandoff(HandoffEntry::ContinueSelfUpdated(_))
                | Self::ContinuingAfterRelaunch(_)
        )
    }
}

/// Step an unattended run resumes at. Anything but an in-progress update restarts the check.
pub const fn resume_step(recorded: UpdateStepOn) -> UpdateStepOn {
    match recorded {
        UpdateStepOn::Downloading | UpdateStepOn::Extracting | UpdateStepOn::Installing => recorded,
        _ => UpdateStepOn::Checking,
    }
}

/// Snapshot consumed by [`ModeResolver::resolve`].
#[derive(Debug, Clone, Copy)]
pub struct ModeInputs<'a> {
    pub args: &'a UpdaterArgs,
    pub self_update: &'a RecordStatus<SelfUpdateRecord>,
    pub auto_update: &'a RecordStatus<AutoUpdateRecord>,
    pub client: Result<&'a ClientMetadata, &'a UpdraftError>,
}

pub struct ModeResolver;

impl ModeResolver {
    pub fn resolve(inputs: ModeInputs<'_>) -> Result<OperatingMode, UpdraftError> {
        let handoff = inputs.args.self_update_file.is_some();
        let record = if handoff { inputs.self_update.loaded() } else { None };

        // 1
        if let Some(record) = record.filter(|r| r.is_legacy()) {
            info!("Continuing a legacy self-update");
            return Ok(OperatingMode::SelfUpdateHandoff(HandoffEntry::Legacy(record.clone())));
        }

        // 2
        if let Err(e) = inputs.client {
            return Err(e.clone());
        }

        // 3
        if !handoff && inputs.args.auto_update {
            let entry = match inputs.auto_update {
                RecordStatus::Absent => AutoUpdateEntry::Fresh,
                RecordStatus::Loaded(record) => AutoUpdateEntry::Resume(record.clone()),
                RecordStatus::Corrupt(e) => {
                    warn!("Auto-update record is unusable, starting over with a fresh check");
                    AutoUpdateEntry::Degraded(e.clone())
                }
            };
            return Ok(OperatingMode::AutoUpdate(entry));
        }

        if handoff {
            return match inputs.self_update {
                // 4
                RecordStatus::Loaded(record) if record.state == SelfUpdateState::FullUpdate => {
                    Ok(OperatingMode::SelfUpdateHandoff(HandoffEntry::ContinueSelfUpdated(
                        record.clone(),
                    )))
                }
                // 5
                RecordStatus::Loaded(record)
                    if record.state == SelfUpdateState::ContinuingRegularUpdate =>
                {
                    Ok(OperatingMode::ContinuingAfterRelaunch(record.clone()))
                }
                RecordStatus::Loaded(record) => Err(UpdraftError::UnexpectedSelfUpdateState {
                    state: format!("{:?}", record.state),
                }),
                RecordStatus::Corrupt(e) => Err(e.clone()),
                RecordStatus::Absent => Err(UpdraftError::SelfUpdateStateMissing {
                    path: inputs
                        .args
                        .self_update_file
                        .as_deref()
                        .map(|p| p.display().to_string())
                        .unwrap_or_default(),
                }),
            };
        }

        // 6
        if inputs.args.uninstall {
            return Ok(OperatingMode::Uninstalling {
                silent: inputs.args.silent,
            });
        }

        // 7
        Ok(OperatingMode::Interactive {
            quick_check: inputs.args.quick_check,
        })
    }
}
