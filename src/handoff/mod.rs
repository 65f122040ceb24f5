//! Handoff to the next updater process.
//!
//! A handoff runs in a fixed order, and each stage starts only after the previous one finished:
//!
//! 1. persist the self-update record and sync it to disk
//! 2. when a new updater was downloaded, swap it into place, keeping the old binary as `.old`
//! 3. spawn the updater with `-supdf=<record> -ns`
//!
//! If a stage fails the previous installation is restored and a
//! [`HandoffFailure`](UpdraftError::HandoffFailure) is returned. The caller exits after a
//! successful handoff; the spawned process removes the `.old` binary once it is running.

mod launcher;
mod swap;

pub use launcher::{LaunchCommand, ProcessLauncher, SystemLauncher};

use crate::args::flags;
use crate::core::UpdraftError;
use crate::state::{SelfUpdateRecord, StateStore};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use swap::BinarySwap;
use tracing::{debug, info, warn};

/// Everything needed to hand the update over to the next process.
#[derive(Debug, Clone)]
pub struct HandoffPlan {
    /// Record the next process reads; its `new_executable` and `old_executable` drive the swap
    pub record: SelfUpdateRecord,
    pub record_path: PathBuf,
    /// Binary of the running updater, relaunched after the swap
    pub current_executable: PathBuf,
    pub elevate: bool,
}

/// A process started by a handoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchedProcess {
    pub pid: u32,
    pub command: LaunchCommand,
}

/// Performs handoffs through a [`ProcessLauncher`].
#[derive(Clone)]
pub struct SelfUpdateCoordinator {
    launcher: Arc<dyn ProcessLauncher>,
}

impl SelfUpdateCoordinator {
    pub fn new(launcher: Arc<dyn ProcessLauncher>) -> Self {
        Self {
            launcher,
        }
    }

    /// Persist, swap, spawn.
    pub fn begin_handoff(&self, plan: &HandoffPlan) -> Result<LaunchedProcess, UpdraftError> {
        StateStore::save_self_update(&plan.record_path, &plan.record)
            .map_err(|e| failure("record", format!("{e:#}")))?;
        debug!("Self-update record written to {}", plan.record_path.display());

        let swap = match &plan.record.new_executable {
            Some(new_executable) => {
                let backup = plan
                    .record
                    .old_executable
                    .clone()
                    .unwrap_or_else(|| backup_path(&plan.current_executable));
                let swap = BinarySwap::apply(new_executable, &plan.current_executable, &backup)
                    .map_err(|e| failure("binary swap", format!("{e:#}")))?;
                Some(swap)
            }
            None => None,
        };

        let launched = self.launch(LaunchCommand {
            program: plan.current_executable.clone(),
            args: continuation_args(&plan.record_path),
            elevated: plan.elevate,
        });
        if launched.is_err()
            && let Some(swap) = swap
            && let Err(restore) = swap.restore()
        {
            warn!("Failed to restore the previous updater: {restore:#}");
        }
        launched
    }

    /// Relaunch `executable` elevated to continue from an existing record. Nothing is written.
    pub fn relaunch_elevated(
        &self,
        executable: &Path,
        record_path: &Path,
    ) -> Result<LaunchedProcess, UpdraftError> {
        self.launch(LaunchCommand {
            program: executable.to_path_buf(),
            args: continuation_args(record_path),
            elevated: true,
        })
    }

    fn launch(&self, command: LaunchCommand) -> Result<LaunchedProcess, UpdraftError> {
        match self.launcher.launch(&command) {
            Ok(pid) => {
                info!("Handed off to process {} ({})", pid, command.program.display());
                Ok(LaunchedProcess {
                    pid,
                    command,
                })
            }
            Err(e) => Err(failure("spawn", e.to_string())),
        }
    }

    /// Legacy protocol: copy the replacement binary over the old one and relaunch the old path
    /// with the recorded arguments. No step runs in this process.
    pub fn complete_legacy(
        &self,
        record: &SelfUpdateRecord,
    ) -> Result<LaunchedProcess, UpdraftError> {
        let (Some(new_executable), Some(old_executable)) =
            (&record.new_executable, &record.old_executable)
        else {
            return Err(failure("record", "legacy record lacks executable paths".to_string()));
        };

        let backup = backup_path(old_executable);
        let swap = BinarySwap::apply(new_executable, old_executable, &backup)
            .map_err(|e| failure("binary swap", format!("{e:#}")))?;

        let launched = self.launch(LaunchCommand {
            program: old_executable.clone(),
            args: record.relaunch_args.clone(),
            elevated: false,
        });
        if launched.is_err()
            && let Err(restore) = swap.restore()
        {
            warn!("Failed to restore the previous updater: {restore:#}");
        }
        launched
    }
}

impl std::fmt::Debug for SelfUpdateCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelfUpdateCoordinator").finish_non_exhaustive()
    }
}

/// Arguments that make the next process continue from `record_path`.
pub fn continuation_args(record_path: &Path) -> Vec<String> {
    vec![
        format!("-{}={}", flags::SELF_UPDATE_FILE, record_path.display()),
        format!("-{}", flags::NEW_SELF),
    ]
}

/// Where a swap keeps the replaced binary: the same path with `.old` appended.
pub fn backup_path(executable: &Path) -> PathBuf {
    let mut name = OsString::from(executable.as_os_str());
    name.push(".old");
    PathBuf::from(name)
}

/// Remove the binary a previous swap left behind. Returns whether something was removed.
pub fn finish_self_replacement(record: &SelfUpdateRecord) -> bool {
    let Some(old) = &record.old_executable else {
        return false;
    };
    match std::fs::remove_file(old) {
        Ok(()) => {
            debug!("Removed replaced updater {}", old.display());
            true
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            warn!("Failed to remove replaced updater {}: {}", old.display(), e);
            false
        }
    }
}

fn failure(stage: &str, reason: String) -> UpdraftError {
    UpdraftError::HandoffFailure {
        stage: stage.to_string(),
        reason,
    }
}
