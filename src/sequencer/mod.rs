//! Step sequencer.
//!
//! The sequencer owns the current [`Phase`] and is the only place that changes it. Each phase
//! change shows exactly one frame. Work for a step runs on a blocking task through one of the
//! [`collab`](crate::collab) traits; its completion comes back as a single event on a channel,
//! so only one step is ever in flight.
//!
//! ```text
//! Checking ──► Downloading ──► Extracting ──► [elevation / self-update] ──► Installing ──► Done
//!     │              │              │                                          │
//!     └──────────────┴──────────────┴────────────► Error ◄─────────────────────┘
//! Uninstall ──► Done
//! ```
//!
//! `Error` and `Done` absorb every later transition. A close request either cancels right away
//! or after the presenter confirms, depending on the [`LifecycleGuard`]; the in-flight
//! collaborator then stops at its next checkpoint and the run ends in
//! [`Completion::Cancelled`].

mod step;

pub use step::{Completion, Frame, Phase, UpdateStepOn};

use crate::args::{ClientFileLocation, QuickCheck};
use crate::collab::{CheckReport, CheckRequest, Collaborators, InstallRequest};
use crate::core::{ErrorContext, UpdraftError};
use crate::elevation::{ElevationDecision, ElevationGate, PendingOperation};
use crate::lifecycle::{CloseDecision, LifecycleGuard, PendingHandoff};
use crate::metadata::{ClientMetadata, SelfServerMetadata, ServerMetadata};
use crate::mode::resume_step;
use crate::presenter::{Presenter, UpdateOffer};
use crate::state::{AutoUpdateRecord, SelfUpdateState, StateStore, WorkingDirectory};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Where a run starts.
#[derive(Debug, Clone)]
pub enum Entry {
    /// Fresh check for updates
    Check,
    /// Persisted progress was unusable; check again if the fallback allows it
    Degraded(UpdraftError),
    /// Continue an unattended run from its record
    Resume(AutoUpdateRecord),
    /// Continue after a handoff: the previous process already downloaded and extracted
    Install {
        server_file: PathBuf,
        show_changes: bool,
    },
    Uninstall,
}

/// Everything a run needs to know about the product and its surroundings.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub base_dir: PathBuf,
    pub working_dir: WorkingDirectory,
    pub client_file: ClientFileLocation,
    pub client: ClientMetadata,
    /// Server file locations after any command-line override
    pub server_sources: Vec<String>,
    pub updater_version: String,
    pub is_admin: bool,
    /// Unattended run: no prompts, progress persisted per step
    pub auto_update: bool,
    pub quick_check: Option<QuickCheck>,
}

/// A handoff the caller must perform before installing can go on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoffRequest {
    /// State recorded for the next process
    pub state: SelfUpdateState,
    /// Launch the next process with administrator rights
    pub elevate: bool,
    /// Downloaded updater that replaces the running one
    pub new_executable: Option<PathBuf>,
    pub server_file: PathBuf,
}

impl HandoffRequest {
    pub const fn pending(&self) -> PendingHandoff {
        if self.new_executable.is_some() {
            PendingHandoff::SelfUpdate
        } else {
            PendingHandoff::Elevation
        }
    }
}

/// How [`StepSequencer::run`] ended.
#[derive(Debug)]
pub enum RunOutcome {
    Completed(Completion),
    /// The Error frame was shown
    Failed(ErrorContext),
    Handoff(HandoffRequest),
}

/// Allows a single fallback from unusable persisted progress to a fresh check.
#[derive(Debug, Default)]
pub struct FallbackGuard {
    spent: bool,
}

impl FallbackGuard {
    /// Step to restart at, or the error back when it cannot be recovered from.
    pub fn degrade(&mut self, error: UpdraftError) -> Result<UpdateStepOn, UpdraftError> {
        if self.spent || !error.recoverable_on_resume() {
            return Err(error);
        }
        self.spent = true;
        warn!("{error}; starting over with a fresh check");
        Ok(UpdateStepOn::Checking)
    }

    pub const fn is_spent(&self) -> bool {
        self.spent
    }
}

enum StepOutput {
    Checked(Box<CheckReport>),
    Downloaded(Vec<PathBuf>),
    Extracted,
    Installed,
    Uninstalled,
}

struct StepEvent {
    step: UpdateStepOn,
    result: Result<StepOutput, UpdraftError>,
}

enum Flow {
    Continue,
    Finish(RunOutcome),
}

/// Drives one run through the update lifecycle.
pub struct StepSequencer {
    ctx: RunContext,
    collaborators: Collaborators,
    presenter: Arc<dyn Presenter>,
    gate: ElevationGate,
    guard: LifecycleGuard,
    phase: Phase,
    cancel: CancellationToken,
    fallback: FallbackGuard,
    server: Option<ServerMetadata>,
    server_file: Option<PathBuf>,
    downloaded: Vec<PathBuf>,
    self_update: Option<SelfServerMetadata>,
    events_tx: mpsc::Sender<StepEvent>,
    events_rx: mpsc::Receiver<StepEvent>,
    in_flight: Option<UpdateStepOn>,
}

impl StepSequencer {
    pub fn new(
        ctx: RunContext,
        collaborators: Collaborators,
        presenter: Arc<dyn Presenter>,
        gate: ElevationGate,
        guard: LifecycleGuard,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(1);
        Self {
            ctx,
            collaborators,
            presenter,
            gate,
            guard,
            phase: Phase::Step(UpdateStepOn::Nothing),
            cancel: CancellationToken::new(),
            fallback: FallbackGuard::default(),
            server: None,
            server_file: None,
            downloaded: Vec::new(),
            self_update: None,
            events_tx,
            events_rx,
            in_flight: None,
        }
    }

    pub const fn phase(&self) -> Phase {
        self.phase
    }

    pub const fn context(&self) -> &RunContext {
        &self.ctx
    }

    pub const fn guard(&self) -> &LifecycleGuard {
        &self.guard
    }

    pub fn guard_mut(&mut self) -> &mut LifecycleGuard {
        &mut self.guard
    }

    pub const fn server(&self) -> Option<&ServerMetadata> {
        self.server.as_ref()
    }

    /// Run until `Done`, `Error` or a handoff. Each message on `close_requests` is a request to
    /// close the updater.
    pub async fn run(
        &mut self,
        entry: Entry,
        mut close_requests: mpsc::Receiver<()>,
    ) -> RunOutcome {
        let mut flow = self.start(entry);
        loop {
            if let Flow::Finish(outcome) = flow {
                return outcome;
            }
            if self.in_flight.is_none() {
                return self.fail(UpdraftError::Other {
                    message: format!("no work in progress at {:?}", self.phase),
                });
            }

            flow = tokio::select! {
                Some(event) = self.events_rx.recv() => self.on_event(event).await,
                Some(()) = close_requests.recv() => {
                    self.on_close_request().await;
                    Flow::Continue
                }
                else => self.fail_flow(UpdraftError::Other {
                    message: "step events channel closed".to_string(),
                }),
            };
        }
    }

    /// Route to the Error step and show the error. Also used by the caller when a handoff fails.
    pub fn fail(&mut self, error: UpdraftError) -> RunOutcome {
        error!("Update failed: {error}");
        self.transition(Phase::Step(UpdateStepOn::Error));
        self.persist_progress(UpdateStepOn::Error);

        let context = ErrorContext::from(error);
        match self.ctx.quick_check {
            Some(QuickCheck {
                suppress_errors: true,
            }) => debug!("Error display suppressed"),
            Some(_) => {
                self.presenter.reveal();
                self.presenter.show_error(&context);
            }
            None => self.presenter.show_error(&context),
        }
        RunOutcome::Failed(context)
    }

    fn start(&mut self, entry: Entry) -> Flow {
        match entry {
            Entry::Check => self.enter(UpdateStepOn::Checking),
            Entry::Degraded(error) => self.degrade(error),
            Entry::Resume(record) => self.resume(record),
            Entry::Install {
                server_file,
                show_changes,
            } => match ServerMetadata::load(&server_file) {
                Ok(server) => {
                    if show_changes {
                        self.presenter.show_changes(&server.changes);
                    }
                    self.server = Some(server);
                    self.server_file = Some(server_file);
                    self.before_install()
                }
                Err(e) => self.fail_flow(e),
            },
            Entry::Uninstall => self.enter(UpdateStepOn::Uninstall),
        }
    }

    fn degrade(&mut self, error: UpdraftError) -> Flow {
        match self.fallback.degrade(error) {
            Ok(step) => self.enter(step),
            Err(e) => self.fail_flow(e),
        }
    }

    fn resume(&mut self, record: AutoUpdateRecord) -> Flow {
        let step = resume_step(record.step);
        if step == UpdateStepOn::Checking {
            return self.enter(UpdateStepOn::Checking);
        }

        let Some(server_file) = record.server_file.clone() else {
            return self.degrade(UpdraftError::AutoUpdateStateCorrupt {
                path: StateStore::auto_update_path(self.ctx.working_dir.path())
                    .display()
                    .to_string(),
                reason: "no server file recorded".to_string(),
            });
        };

        match ServerMetadata::load(&server_file) {
            Ok(server) => {
                info!("Resuming unattended update at {:?}", step);
                self.server = Some(server);
                self.server_file = Some(server_file);
                self.downloaded = record.downloaded;
                match step {
                    UpdateStepOn::Extracting if self.downloaded.is_empty() => {
                        self.enter(UpdateStepOn::Downloading)
                    }
                    UpdateStepOn::Installing => self.before_install(),
                    other => self.enter(other),
                }
            }
            Err(e) => self.degrade(e),
        }
    }

    /// Change phase and show its frame. Ignored once a terminal phase was reached.
    fn transition(&mut self, next: Phase) -> bool {
        if self.phase.is_terminal() {
            warn!("Ignoring transition to {:?} after {:?}", next, self.phase);
            return false;
        }
        debug!("{:?} -> {:?}", self.phase, next);
        self.phase = next;
        let frame = next.frame();
        self.guard.note_frame(frame);
        self.presenter.frame_changed(frame);
        true
    }

    fn enter(&mut self, step: UpdateStepOn) -> Flow {
        if !self.transition(Phase::Step(step)) {
            return Flow::Continue;
        }
        self.persist_progress(step);

        match step {
            UpdateStepOn::Checking => self.spawn_check(),
            UpdateStepOn::Downloading => self.spawn_download(),
            UpdateStepOn::Extracting => self.spawn_extract(),
            UpdateStepOn::Installing => self.spawn_install(),
            UpdateStepOn::Uninstall => self.spawn_uninstall(),
            UpdateStepOn::Nothing | UpdateStepOn::Error => Flow::Continue,
        }
    }

    fn spawn<F>(&mut self, step: UpdateStepOn, work: F) -> Flow
    where
        F: FnOnce(&CancellationToken) -> Result<StepOutput, UpdraftError> + Send + 'static,
    {
        self.in_flight = Some(step);
        let events = self.events_tx.clone();
        let cancel = self.cancel.clone();
        tokio::task::spawn_blocking(move || {
            let result = work(&cancel);
            if events
                .blocking_send(StepEvent {
                    step,
                    result,
                })
                .is_err()
            {
                debug!("Sequencer gone, dropping result of {:?}", step);
            }
        });
        Flow::Continue
    }

    fn spawn_check(&mut self) -> Flow {
        let request = CheckRequest {
            sources: self.ctx.server_sources.clone(),
            destination: self.ctx.working_dir.server_file(),
            installed_version: self.ctx.client.installed_version.clone(),
            updater_version: self.ctx.updater_version.clone(),
        };
        let checker = Arc::clone(&self.collaborators.checker);
        self.spawn(UpdateStepOn::Checking, move |cancel| {
            checker.check(&request, cancel).map(|report| StepOutput::Checked(Box::new(report)))
        })
    }

    fn spawn_download(&mut self) -> Flow {
        let Some(server) = &self.server else {
            return self.fail_flow(missing_server());
        };
        let mut packages = server.packages.clone();
        if let Some(updater) = &self.self_update {
            packages.push(updater.as_package());
        }
        let destination = self.ctx.working_dir.downloads_dir();
        let downloader = Arc::clone(&self.collaborators.downloader);
        self.spawn(UpdateStepOn::Downloading, move |cancel| {
            downloader.download(&packages, &destination, cancel).map(StepOutput::Downloaded)
        })
    }

    fn spawn_extract(&mut self) -> Flow {
        let updater = self.updater_download();
        let archives: Vec<PathBuf> = self
            .downloaded
            .iter()
            .filter(|p| Some(p.as_path()) != updater.as_deref())
            .cloned()
            .collect();
        let destination = self.ctx.working_dir.payload_dir();
        let extractor = Arc::clone(&self.collaborators.extractor);
        self.spawn(UpdateStepOn::Extracting, move |cancel| {
            extractor.extract(&archives, &destination, cancel).map(|()| StepOutput::Extracted)
        })
    }

    fn spawn_install(&mut self) -> Flow {
        let Some(server) = &self.server else {
            return self.fail_flow(missing_server());
        };
        let request = InstallRequest {
            payload_dir: self.ctx.working_dir.payload_dir(),
            base_dir: self.ctx.base_dir.clone(),
            backup_dir: self.ctx.working_dir.backup_dir(),
            client_file: self.ctx.client_file.clone(),
            client: self.ctx.client.clone(),
            new_version: server.new_version.clone(),
        };
        let installer = Arc::clone(&self.collaborators.installer);
        self.spawn(UpdateStepOn::Installing, move |cancel| {
            installer.install(&request, cancel).map(|()| StepOutput::Installed)
        })
    }

    fn spawn_uninstall(&mut self) -> Flow {
        let base_dir = self.ctx.base_dir.clone();
        let uninstaller = Arc::clone(&self.collaborators.uninstaller);
        self.spawn(UpdateStepOn::Uninstall, move |cancel| {
            uninstaller.uninstall(&base_dir, cancel).map(|()| StepOutput::Uninstalled)
        })
    }

    async fn on_event(&mut self, event: StepEvent) -> Flow {
        self.in_flight = None;
        debug!("{:?} finished", event.step);

        let output = match event.result {
            Ok(output) => output,
            Err(UpdraftError::Cancelled) => return self.complete(Completion::Cancelled),
            Err(e) => return self.fail_flow(e),
        };

        // A step that finished just as the cancel landed still ends the run, unless the
        // install already went through.
        if self.cancel.is_cancelled() && !matches!(output, StepOutput::Installed) {
            return self.complete(Completion::Cancelled);
        }

        match output {
            StepOutput::Checked(report) => self.on_checked(*report).await,
            StepOutput::Downloaded(files) => {
                self.downloaded = files;
                self.enter(UpdateStepOn::Extracting)
            }
            StepOutput::Extracted => self.before_install(),
            StepOutput::Installed => self.complete(Completion::Updated),
            StepOutput::Uninstalled => self.complete(Completion::Uninstalled),
        }
    }

    async fn on_checked(&mut self, report: CheckReport) -> Flow {
        self.server_file = Some(report.server_file);
        self.self_update = report.self_update;
        self.server = Some(report.server);

        if !report.update_available {
            return self.complete(Completion::AlreadyCurrent);
        }
        if self.ctx.quick_check.is_some() {
            self.presenter.reveal();
        }

        if !self.ctx.auto_update {
            let offer = self.offer();
            let accepted = self.ask(move |presenter| presenter.confirm_update(&offer)).await;
            if !accepted {
                info!("Update declined");
                return self.complete(Completion::Cancelled);
            }
        }
        if let Some(updater) = &self.self_update {
            info!("Updater {} will replace this one before installing", updater.version);
        }
        self.enter(UpdateStepOn::Downloading)
    }

    /// Elevation and self-update checks run before every entry into Installing.
    fn before_install(&mut self) -> Flow {
        let Some(server_file) = self.server_file.clone() else {
            return self.fail_flow(missing_server());
        };
        let requires = self.requires_elevation();

        if let Some(new_executable) = self.updater_download() {
            return Flow::Finish(RunOutcome::Handoff(HandoffRequest {
                state: SelfUpdateState::FullUpdate,
                elevate: requires && !self.ctx.is_admin,
                new_executable: Some(new_executable),
                server_file,
            }));
        }

        match self.gate.evaluate(self.ctx.is_admin, requires) {
            ElevationDecision::ProceedDirect => self.enter(UpdateStepOn::Installing),
            ElevationDecision::RelaunchElevated => {
                info!("Administrator rights required, relaunching elevated");
                Flow::Finish(RunOutcome::Handoff(HandoffRequest {
                    state: SelfUpdateState::ContinuingRegularUpdate,
                    elevate: true,
                    new_executable: None,
                    server_file,
                }))
            }
            ElevationDecision::ElevationDeniedFatal => {
                self.fail_flow(UpdraftError::ElevationDenied)
            }
        }
    }

    fn requires_elevation(&self) -> bool {
        let operations = self.server.as_ref().map(ServerMetadata::operations).unwrap_or_default();
        self.gate.requires_elevation(&PendingOperation {
            install_dir: &self.ctx.base_dir,
            operations: &operations,
        })
    }

    async fn on_close_request(&mut self) {
        if self.cancel.is_cancelled() {
            return;
        }
        let confirmed = match self.guard.request_close() {
            CloseDecision::AllowImmediate => true,
            CloseDecision::RequireConfirmation => {
                self.ask(|presenter| presenter.confirm_cancel()).await
            }
        };
        if confirmed {
            info!("Cancelling {:?}", self.in_flight);
            self.guard.mark_cancelled();
            self.cancel.cancel();
        }
    }

    /// Run a blocking prompt. A prompt that panics counts as "no".
    async fn ask<F>(&self, question: F) -> bool
    where
        F: FnOnce(&dyn Presenter) -> bool + Send + 'static,
    {
        let presenter = Arc::clone(&self.presenter);
        tokio::task::spawn_blocking(move || question(presenter.as_ref())).await.unwrap_or(false)
    }

    fn complete(&mut self, completion: Completion) -> Flow {
        let quiet = completion == Completion::AlreadyCurrent && self.ctx.quick_check.is_some();
        if quiet {
            debug!("Quick check found no update");
            self.phase = Phase::Done;
        } else {
            self.transition(Phase::Done);
        }

        match completion {
            Completion::Updated | Completion::AlreadyCurrent => self.clear_progress(),
            Completion::Uninstalled | Completion::Cancelled => {}
        }
        info!("Run finished: {:?}", completion);
        Flow::Finish(RunOutcome::Completed(completion))
    }

    fn fail_flow(&mut self, error: UpdraftError) -> Flow {
        Flow::Finish(self.fail(error))
    }

    fn offer(&self) -> UpdateOffer {
        UpdateOffer {
            product: self.ctx.client.product_name.clone(),
            installed_version: self.ctx.client.installed_version.clone(),
            new_version: self.server.as_ref().map(|s| s.new_version.clone()).unwrap_or_default(),
            changes: self.server.as_ref().map(|s| s.changes.clone()).unwrap_or_default(),
        }
    }

    /// Local path of the downloaded replacement updater, if one is pending.
    fn updater_download(&self) -> Option<PathBuf> {
        let updater = self.self_update.as_ref()?;
        let name = Path::new(&updater.executable).file_name()?;
        Some(self.ctx.working_dir.downloads_dir().join(name))
    }

    fn persist_progress(&self, step: UpdateStepOn) {
        if !self.ctx.auto_update {
            return;
        }
        let dir = self.ctx.working_dir.path();
        let mut record = AutoUpdateRecord::new(step, dir);
        record.server_file.clone_from(&self.server_file);
        record.downloaded.clone_from(&self.downloaded);
        record.extracted = step == UpdateStepOn::Installing;
        if let Err(e) = StateStore::save_auto_update(dir, &record) {
            warn!("Failed to save unattended progress: {e:#}");
        }
    }

    fn clear_progress(&self) {
        if !self.ctx.auto_update {
            return;
        }
        if let Err(e) = StateStore::clear_auto_update(self.ctx.working_dir.path()) {
            warn!("Failed to clear unattended progress: {e:#}");
        }
    }
}

fn missing_server() -> UpdraftError {
    UpdraftError::Other {
        message: "server file was not loaded".to_string(),
    }
}
