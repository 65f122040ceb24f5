use serde::{Deserialize, Serialize};

/// Step of the update lifecycle. Persisted in the auto-update record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpdateStepOn {
    Nothing,
    Checking,
    Downloading,
    Extracting,
    Installing,
    Uninstall,
    Error,
}

/// Page shown by the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Frame {
    Welcome,
    Checking,
    UpdateAvailable,
    InstallUpdates,
    Uninstall,
    Error,
    WelcomeFinish,
}

/// Position of the sequencer: a lifecycle step or the terminal `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Step(UpdateStepOn),
    Done,
}

impl Phase {
    /// The frame shown while in this phase. Total and fixed.
    pub const fn frame(self) -> Frame {
        match self {
            Self::Step(UpdateStepOn::Nothing) => Frame::Welcome,
            Self::Step(UpdateStepOn::Checking) => Frame::Checking,
            Self::Step(
                UpdateStepOn::Downloading | UpdateStepOn::Extracting | UpdateStepOn::Installing,
            ) => Frame::InstallUpdates,
            Self::Step(UpdateStepOn::Uninstall) => Frame::Uninstall,
            Self::Step(UpdateStepOn::Error) => Frame::Error,
            Self::Done => Frame::WelcomeFinish,
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Step(UpdateStepOn::Error))
    }
}

impl From<UpdateStepOn> for Phase {
    fn from(step: UpdateStepOn) -> Self {
        Self::Step(step)
    }
}

/// How a run that reached `Done` ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The update was installed
    Updated,
    /// The installed version is current
    AlreadyCurrent,
    /// The product was removed
    Uninstalled,
    /// The user declined or cancelled the update
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_mapping() {
        assert_eq!(Phase::Step(UpdateStepOn::Nothing).frame(), Frame::Welcome);
        assert_eq!(Phase::Step(UpdateStepOn::Checking).frame(), Frame::Checking);
        for step in [UpdateStepOn::Downloading, UpdateStepOn::Extracting, UpdateStepOn::Installing]
        {
            assert_eq!(Phase::Step(step).frame(), Frame::InstallUpdates);
        }
        assert_eq!(Phase::Step(UpdateStepOn::Uninstall).frame(), Frame::Uninstall);
        assert_eq!(Phase::Step(UpdateStepOn::Error).frame(), Frame::Error);
        assert_eq!(Phase::Done.frame(), Frame::WelcomeFinish);
    }

    #[test]
    fn test_terminal_phases() {
        assert!(Phase::Done.is_terminal());
        assert!(Phase::Step(UpdateStepOn::Error).is_terminal());
        assert!(!Phase::Step(UpdateStepOn::Installing).is_terminal());
    }
}
