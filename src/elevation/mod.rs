//! Privilege elevation decision.
//!
//! Only the decision lives here. How a process is actually relaunched with more privileges is
//! the launcher's business (see [`crate::handoff::ProcessLauncher`]).
//!
//! | admin | needs elevation | continuation | decision |
//! |---|---|---|---|
//! | any | no | any | [`ProceedDirect`](ElevationDecision::ProceedDirect) |
//! | yes | yes | any | [`ProceedDirect`](ElevationDecision::ProceedDirect) |
//! | no | yes | no | [`RelaunchElevated`](ElevationDecision::RelaunchElevated) |
//! | no | yes | yes | [`ElevationDeniedFatal`](ElevationDecision::ElevationDeniedFatal) |
//!
//! A continuation that is still unprivileged means the elevation was declined or failed, so it
//! must not relaunch again.

use crate::metadata::OperationKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Outcome of [`ElevationGate::evaluate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElevationDecision {
    ProceedDirect,
    RelaunchElevated,
    ElevationDeniedFatal,
}

/// What the next step is about to touch.
#[derive(Debug, Clone, Copy)]
pub struct PendingOperation<'a> {
    pub install_dir: &'a Path,
    pub operations: &'a [OperationKind],
}

/// Decides whether the pending work needs administrator rights and what to do about it.
#[derive(Debug, Clone)]
pub struct ElevationGate {
    protected_roots: Vec<PathBuf>,
    continuation: bool,
}

impl ElevationGate {
    /// `continuation` marks a process started by a handoff (`ns`, or a continuing self-update
    /// state).
    pub const fn new(protected_roots: Vec<PathBuf>, continuation: bool) -> Self {
        Self {
            protected_roots,
            continuation,
        }
    }

    pub const fn is_continuation(&self) -> bool {
        self.continuation
    }

    /// Pure predicate over the install location and the operation kinds.
    pub fn requires_elevation(&self, pending: &PendingOperation<'_>) -> bool {
        let system_operation = pending.operations.iter().any(|op| {
            matches!(
                op,
                OperationKind::SystemFiles | OperationKind::SystemRegistry | OperationKind::Service
            )
        });
        let protected_dir =
            self.protected_roots.iter().any(|root| pending.install_dir.starts_with(root));

        debug!(
            "Elevation check for {}: protected_dir={}, system_operation={}",
            pending.install_dir.display(),
            protected_dir,
            system_operation
        );
        system_operation || protected_dir
    }

    pub const fn evaluate(&self, is_admin: bool, requires: bool) -> ElevationDecision {
        if !requires || is_admin {
            ElevationDecision::ProceedDirect
        } else if self.continuation {
            ElevationDecision::ElevationDeniedFatal
        } else {
            ElevationDecision::RelaunchElevated
        }
    }
}

/// Install roots writable only by administrators on this platform.
pub fn platform_protected_roots() -> Vec<PathBuf> {
    if cfg!(windows) {
        ["ProgramFiles", "ProgramFiles(x86)", "ProgramW6432", "SystemRoot"]
            .iter()
            .filter_map(|var| std::env::var_os(var))
            .map(PathBuf::from)
            .collect()
    } else if cfg!(target_os = "macos") {
        ["/Applications", "/Library", "/System", "/usr", "/opt", "/bin", "/sbin"]
            .iter()
            .map(PathBuf::from)
            .collect()
    } else {
        ["/usr", "/opt", "/bin", "/sbin", "/lib", "/etc", "/var/lib"]
            .iter()
            .map(PathBuf::from)
            .collect()
    }
}

/// Whether the current process runs with administrator rights.
#[cfg(unix)]
pub fn process_is_elevated() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}

/// Whether the current process runs with administrator rights.
///
/// Token inspection is not wired up on this platform, so the process always reports
/// unprivileged and relies on the launcher's elevation command.
#[cfg(not(unix))]
pub fn process_is_elevated() -> bool {
    false
}
