//! Scripted stand-ins for the collaborator, presenter and launcher seams.

use crate::collab::{
    CheckReport, CheckRequest, Collaborators, InstallRequest, PackageDownloader, PackageExtractor,
    PatchInstaller, UpdateChecker, Uninstaller,
};
use crate::core::{ErrorContext, UpdraftError};
use crate::handoff::{LaunchCommand, ProcessLauncher};
use crate::metadata::{ServerMetadata, UpdatePackage};
use crate::presenter::{Presenter, UpdateOffer};
use crate::sequencer::{Frame, UpdateStepOn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// What a faked step does when it runs.
#[derive(Debug, Clone)]
pub enum Behavior {
    Succeed,
    Fail(UpdraftError),
    /// Wait for cancellation, succeeding if none arrives within the duration
    Stall(Duration),
}

/// One fake implementing every collaborator trait. Steps succeed unless scripted otherwise.
#[derive(Debug)]
pub struct FakeWork {
    report: Option<CheckReport>,
    behaviors: HashMap<UpdateStepOn, Behavior>,
    calls: Mutex<Vec<UpdateStepOn>>,
}

impl FakeWork {
    /// Checking returns `report`.
    pub fn new(report: CheckReport) -> Self {
        Self {
            report: Some(report),
            behaviors: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Checking fails as unreachable unless scripted otherwise.
    pub fn without_report() -> Self {
        Self {
            report: None,
            behaviors: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn with(mut self, step: UpdateStepOn, behavior: Behavior) -> Self {
        self.behaviors.insert(step, behavior);
        self
    }

    /// Shared handle plus the collaborator bundle backed by it.
    pub fn into_collaborators(self) -> (Arc<Self>, Collaborators) {
        let work = Arc::new(self);
        let collaborators = Collaborators {
            checker: work.clone(),
            downloader: work.clone(),
            extractor: work.clone(),
            installer: work.clone(),
            uninstaller: work.clone(),
        };
        (work, collaborators)
    }

    /// Steps that ran, in order.
    pub fn calls(&self) -> Vec<UpdateStepOn> {
        self.calls.lock().unwrap().clone()
    }

    /// A check report announcing `new_version` with one user-files package.
    pub fn report(new_version: &str, update_available: bool) -> CheckReport {
        CheckReport {
            server_file: PathBuf::from("server.json"),
            server: ServerMetadata {
                new_version: new_version.to_string(),
                changes: "Bug fixes".to_string(),
                packages: vec![UpdatePackage {
                    name: "payload.zip".to_string(),
                    url: "payload.zip".to_string(),
                    sha256: "sha256:00".to_string(),
                    operations: Vec::new(),
                }],
                updater: None,
            },
            update_available,
            self_update: None,
        }
    }

    fn run(&self, step: UpdateStepOn, cancel: &CancellationToken) -> Result<(), UpdraftError> {
        self.calls.lock().unwrap().push(step);
        match self.behaviors.get(&step).cloned().unwrap_or(Behavior::Succeed) {
            Behavior::Succeed => Ok(()),
            Behavior::Fail(error) => Err(error),
            Behavior::Stall(limit) => {
                let started = Instant::now();
                while started.elapsed() < limit {
                    if cancel.is_cancelled() {
                        return Err(UpdraftError::Cancelled);
                    }
                    std::thread::sleep(Duration::from_millis(5));
                }
                Ok(())
            }
        }
    }
}

impl UpdateChecker for FakeWork {
    fn check(
        &self,
        request: &CheckRequest,
        cancel: &CancellationToken,
    ) -> Result<CheckReport, UpdraftError> {
        self.run(UpdateStepOn::Checking, cancel)?;
        let mut report = self.report.clone().ok_or_else(|| UpdraftError::ServerMetadataUnreachable {
            location: request.sources.first().cloned().unwrap_or_default(),
            reason: "no report scripted".to_string(),
        })?;
        report.server_file.clone_from(&request.destination);
        Ok(report)
    }
}

impl PackageDownloader for FakeWork {
    fn download(
        &self,
        packages: &[UpdatePackage],
        destination: &Path,
        cancel: &CancellationToken,
    ) -> Result<Vec<PathBuf>, UpdraftError> {
        self.run(UpdateStepOn::Downloading, cancel)?;
        Ok(packages.iter().map(|p| destination.join(&p.name)).collect())
    }
}

impl PackageExtractor for FakeWork {
    fn extract(
        &self,
        _archives: &[PathBuf],
        _destination: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), UpdraftError> {
        self.run(UpdateStepOn::Extracting, cancel)
    }
}

impl PatchInstaller for FakeWork {
    fn install(
        &self,
        _request: &InstallRequest,
        cancel: &CancellationToken,
    ) -> Result<(), UpdraftError> {
        self.run(UpdateStepOn::Installing, cancel)
    }
}

impl Uninstaller for FakeWork {
    fn uninstall(&self, _base_dir: &Path, cancel: &CancellationToken) -> Result<(), UpdraftError> {
        self.run(UpdateStepOn::Uninstall, cancel)
    }
}

/// Presenter that records everything and answers prompts from its settings.
#[derive(Debug)]
pub struct RecordingPresenter {
    frames: Mutex<Vec<Frame>>,
    offers: Mutex<Vec<UpdateOffer>>,
    errors: Mutex<Vec<String>>,
    changes: Mutex<Vec<String>>,
    accept_update: bool,
    confirm_cancel: bool,
    cancel_prompts: AtomicUsize,
    revealed: AtomicBool,
}

impl Default for RecordingPresenter {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingPresenter {
    /// Accepts updates and confirms cancellation.
    pub fn new() -> Self {
        Self {
            frames: Mutex::new(Vec::new()),
            offers: Mutex::new(Vec::new()),
            errors: Mutex::new(Vec::new()),
            changes: Mutex::new(Vec::new()),
            accept_update: true,
            confirm_cancel: true,
            cancel_prompts: AtomicUsize::new(0),
            revealed: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn declining_updates(mut self) -> Self {
        self.accept_update = false;
        self
    }

    #[must_use]
    pub fn refusing_cancel(mut self) -> Self {
        self.confirm_cancel = false;
        self
    }

    pub fn frames(&self) -> Vec<Frame> {
        self.frames.lock().unwrap().clone()
    }

    pub fn offers(&self) -> Vec<UpdateOffer> {
        self.offers.lock().unwrap().clone()
    }

    /// Messages of the errors shown.
    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }

    pub fn changes(&self) -> Vec<String> {
        self.changes.lock().unwrap().clone()
    }

    pub fn cancel_prompts(&self) -> usize {
        self.cancel_prompts.load(Ordering::SeqCst)
    }

    pub fn revealed(&self) -> bool {
        self.revealed.load(Ordering::SeqCst)
    }
}

impl Presenter for RecordingPresenter {
    fn frame_changed(&self, frame: Frame) {
        self.frames.lock().unwrap().push(frame);
    }

    fn confirm_update(&self, offer: &UpdateOffer) -> bool {
        self.offers.lock().unwrap().push(offer.clone());
        self.accept_update
    }

    fn confirm_cancel(&self) -> bool {
        self.cancel_prompts.fetch_add(1, Ordering::SeqCst);
        self.confirm_cancel
    }

    fn show_changes(&self, changes: &str) {
        self.changes.lock().unwrap().push(changes.to_string());
    }

    fn show_error(&self, error: &ErrorContext) {
        self.errors.lock().unwrap().push(error.message.clone());
    }

    fn reveal(&self) {
        self.revealed.store(true, Ordering::SeqCst);
    }
}

/// Launcher that records commands instead of starting processes.
#[derive(Debug, Default)]
pub struct RecordingLauncher {
    launches: Mutex<Vec<LaunchCommand>>,
    fail: bool,
}

impl RecordingLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every launch fails with a permission error.
    pub fn failing() -> Self {
        Self {
            launches: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn launches(&self) -> Vec<LaunchCommand> {
        self.launches.lock().unwrap().clone()
    }
}

impl ProcessLauncher for RecordingLauncher {
    fn launch(&self, command: &LaunchCommand) -> std::io::Result<u32> {
        self.launches.lock().unwrap().push(command.clone());
        if self.fail {
            Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "launch refused"))
        } else {
            Ok(4242)
        }
    }
}
