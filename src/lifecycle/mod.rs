//! Close and termination policy.
//!
//! [`LifecycleGuard`] answers two questions: may the process close right now without asking,
//! and may the working directory be deleted when it exits. Both depend on whether a handoff to
//! another process is pending, because that process still needs the working directory.

use crate::sequencer::Frame;
use crate::state::WorkingDirectory;
use tracing::{debug, info};

/// Answer to a close request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseDecision {
    AllowImmediate,
    RequireConfirmation,
}

/// Handoff the running process is about to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingHandoff {
    /// Relaunch with administrator rights
    Elevation,
    /// Replace the updater with a newer build
    SelfUpdate,
}

/// Tracks the facts the close and cleanup decisions depend on.
#[derive(Debug, Clone, Default)]
pub struct LifecycleGuard {
    elevation_pending: bool,
    self_update_pending: bool,
    auto_update: bool,
    silent: bool,
    cancelled: bool,
    frame: Option<Frame>,
}

impl LifecycleGuard {
    pub fn new(auto_update: bool, silent: bool) -> Self {
        Self {
            auto_update,
            silent,
            ..Self::default()
        }
    }

    pub fn note_frame(&mut self, frame: Frame) {
        self.frame = Some(frame);
    }

    pub fn mark_handoff(&mut self, handoff: PendingHandoff) {
        match handoff {
            PendingHandoff::Elevation => self.elevation_pending = true,
            PendingHandoff::SelfUpdate => self.self_update_pending = true,
        }
    }

    /// Forget pending handoffs after the handoff failed.
    pub fn clear_handoff(&mut self) {
        self.elevation_pending = false;
        self.self_update_pending = false;
    }

    pub fn mark_cancelled(&mut self) {
        self.cancelled = true;
    }

    pub fn handoff_pending(&self) -> bool {
        self.elevation_pending || self.self_update_pending
    }

    /// Close immediately when a handoff is pending, the run is unattended (silent or
    /// auto-update), the user already cancelled, or there is nothing left to lose (the Error
    /// or finish frame, or no frame yet).
    pub fn request_close(&self) -> CloseDecision {
        let settled = matches!(self.frame, None | Some(Frame::Error | Frame::WelcomeFinish));
        if self.handoff_pending() || self.silent || self.auto_update || self.cancelled || settled {
            CloseDecision::AllowImmediate
        } else {
            CloseDecision::RequireConfirmation
        }
    }

    /// Delete the working directory unless a continuation still needs it or it belongs to an
    /// unattended run. Returns whether it was removed.
    pub fn on_terminate(&self, working_dir: &WorkingDirectory) -> bool {
        if self.handoff_pending() || self.auto_update {
            info!(
                "Keeping working directory {} for the next process",
                working_dir.path().display()
            );
            return false;
        }
        debug!("Removing working directory {}", working_dir.path().display());
        working_dir.remove()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_close_during_work_needs_confirmation() {
        let mut guard = LifecycleGuard::new(false, false);
        guard.note_frame(Frame::InstallUpdates);
        assert_eq!(guard.request_close(), CloseDecision::RequireConfirmation);

        guard.mark_cancelled();
        assert_eq!(guard.request_close(), CloseDecision::AllowImmediate);
    }

    #[test]
    fn test_close_allowed_when_settled_or_unattended() {
        let mut guard = LifecycleGuard::new(false, false);
        assert_eq!(guard.request_close(), CloseDecision::AllowImmediate);
        guard.note_frame(Frame::Error);
        assert_eq!(guard.request_close(), CloseDecision::AllowImmediate);

        let mut silent = LifecycleGuard::new(false, true);
        silent.note_frame(Frame::Uninstall);
        assert_eq!(silent.request_close(), CloseDecision::AllowImmediate);

        let mut auto = LifecycleGuard::new(true, false);
        auto.note_frame(Frame::InstallUpdates);
        assert_eq!(auto.request_close(), CloseDecision::AllowImmediate);

        let mut handoff = LifecycleGuard::new(false, false);
        handoff.note_frame(Frame::InstallUpdates);
        handoff.mark_handoff(PendingHandoff::SelfUpdate);
        assert_eq!(handoff.request_close(), CloseDecision::AllowImmediate);
    }

    #[test]
    fn test_terminate_removes_per_run_directory() {
        let temp = TempDir::new().unwrap();
        let dir = WorkingDirectory::per_run(temp.path()).unwrap();
        assert!(dir.path().exists());

        assert!(LifecycleGuard::new(false, false).on_terminate(&dir));
        assert!(!dir.path().exists());
    }

    #[test]
    fn test_terminate_keeps_directory_for_handoff() {
        let temp = TempDir::new().unwrap();
        let dir = WorkingDirectory::per_run(temp.path()).unwrap();

        let mut guard = LifecycleGuard::new(false, false);
        guard.mark_handoff(PendingHandoff::Elevation);
        assert!(!guard.on_terminate(&dir));
        assert!(dir.path().exists());

        guard.clear_handoff();
        assert!(guard.on_terminate(&dir));
    }

    #[test]
    fn test_terminate_keeps_auto_update_directory() {
        let temp = TempDir::new().unwrap();
        let dir = WorkingDirectory::per_run(temp.path()).unwrap();
        assert!(!LifecycleGuard::new(true, false).on_terminate(&dir));
        assert!(dir.path().exists());
    }
}
