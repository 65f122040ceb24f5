//! Top-level dispatcher.
//!
//! [`Updater`] turns raw process arguments into one run: it parses them, loads the persisted
//! records and the client file, resolves the [`OperatingMode`], then either finishes a legacy
//! self-update or drives a [`StepSequencer`]. Every error, whether it surfaces before the
//! sequencer exists or inside it, ends in the same Error presentation and exit status.

use crate::args::{Arguments, ClientFileLocation, QuickCheck, RealFs, UpdaterArgs};
use crate::collab::Collaborators;
use crate::config::UpdaterConfig;
use crate::core::{ErrorContext, UpdraftError};
use crate::elevation::{
    ElevationDecision, ElevationGate, PendingOperation, platform_protected_roots,
    process_is_elevated,
};
use crate::handoff::{
    HandoffPlan, ProcessLauncher, SelfUpdateCoordinator, backup_path, finish_self_replacement,
};
use crate::lifecycle::LifecycleGuard;
use crate::metadata::ClientMetadata;
use crate::mode::{AutoUpdateEntry, HandoffEntry, ModeInputs, ModeResolver, OperatingMode};
use crate::presenter::{ConsolePresenter, Presenter, Visibility};
use crate::sequencer::{
    Completion, Entry, Frame, HandoffRequest, RunContext, RunOutcome, StepSequencer,
};
use crate::state::{RecordStatus, SelfUpdateRecord, StateStore, WorkingDirectory};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Facts about the running executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEnvironment {
    /// Path of the running updater binary
    pub executable: PathBuf,
    /// Directory holding the executable; default base dir and client file location
    pub install_dir: PathBuf,
    pub is_admin: bool,
    pub updater_version: String,
}

impl HostEnvironment {
    pub fn detect() -> Result<Self> {
        let executable =
            std::env::current_exe().context("Cannot determine the updater executable path")?;
        let install_dir =
            executable.parent().map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        Ok(Self {
            executable,
            install_dir,
            is_admin: process_is_elevated(),
            updater_version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }
}

/// How the process exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Updated, already current, uninstalled or handed off
    Success,
    Failure,
    /// Cancelled by the user or update declined
    Cancelled,
}

impl ExitStatus {
    pub const fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
            Self::Cancelled => 2,
        }
    }
}

impl From<Completion> for ExitStatus {
    fn from(completion: Completion) -> Self {
        match completion {
            Completion::Updated | Completion::AlreadyCurrent | Completion::Uninstalled => {
                Self::Success
            }
            Completion::Cancelled => Self::Cancelled,
        }
    }
}

/// One updater process.
pub struct Updater {
    config: UpdaterConfig,
    host: HostEnvironment,
    collaborators: Collaborators,
    coordinator: SelfUpdateCoordinator,
    presenter: Option<Arc<dyn Presenter>>,
}

/// What the startup phase settled on.
struct Startup {
    args: UpdaterArgs,
    self_update: RecordStatus<SelfUpdateRecord>,
    client: Result<ClientMetadata, UpdraftError>,
    client_file: ClientFileLocation,
    base_dir: PathBuf,
    /// Long-lived directory of an unattended run
    product_dir: Option<WorkingDirectory>,
}

/// A resolved run handed to the sequencer.
struct Run {
    startup: Startup,
    client: ClientMetadata,
    mode: OperatingMode,
    gate: ElevationGate,
    unattended: bool,
}

impl Updater {
    pub fn new(
        config: UpdaterConfig,
        host: HostEnvironment,
        collaborators: Collaborators,
        launcher: Arc<dyn ProcessLauncher>,
    ) -> Self {
        Self {
            config,
            host,
            collaborators,
            coordinator: SelfUpdateCoordinator::new(launcher),
            presenter: None,
        }
    }

    /// Use `presenter` instead of a console presenter chosen from the arguments.
    #[must_use]
    pub fn with_presenter(mut self, presenter: Arc<dyn Presenter>) -> Self {
        self.presenter = Some(presenter);
        self
    }

    /// Run with Ctrl-C delivered as close requests.
    pub async fn run<I, S>(&self, raw_args: I) -> ExitStatus
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let (tx, rx) = mpsc::channel(4);
        let forward = tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                debug!("Close requested");
                if tx.send(()).await.is_err() {
                    break;
                }
            }
        });
        let status = self.run_with_close_requests(raw_args, rx).await;
        forward.abort();
        status
    }

    /// Run, treating each message on `close_requests` as a request to close the updater.
    pub async fn run_with_close_requests<I, S>(
        &self,
        raw_args: I,
        close_requests: mpsc::Receiver<()>,
    ) -> ExitStatus
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let arguments = Arguments::parse(raw_args);
        let args = UpdaterArgs::from_arguments(&arguments, &self.host.install_dir, &RealFs);
        debug!("Arguments: {:?}", args);

        let mut startup = Self::startup(args);
        let unattended = startup.args.auto_update
            || startup.self_update.loaded().is_some_and(|record| record.auto_update);
        let presenter = self.presenter_for(&startup.args, unattended);
        let quick_check = startup.args.quick_check;

        let auto_update = match (&startup.client, startup.args.auto_update) {
            (Ok(client), true) => {
                match WorkingDirectory::product(&self.config.data_root(), &client.product_name) {
                    Ok(dir) => {
                        let status = StateStore::load_auto_update(dir.path());
                        startup.product_dir = Some(dir);
                        status
                    }
                    Err(e) => return report_failure(presenter.as_ref(), quick_check, e),
                }
            }
            _ => RecordStatus::Absent,
        };

        let mode = ModeResolver::resolve(ModeInputs {
            args: &startup.args,
            self_update: &startup.self_update,
            auto_update: &auto_update,
            client: startup.client.as_ref(),
        });
        let mode = match mode {
            Ok(mode) => mode,
            Err(e) => return report_failure(presenter.as_ref(), quick_check, e),
        };
        info!("Operating mode: {:?}", mode);

        let gate = self.gate(startup.args.is_continuation() || mode.is_continuation());
        if let OperatingMode::SelfUpdateHandoff(HandoffEntry::Legacy(record)) = &mode {
            return self.complete_legacy(&startup.args, record, &gate, presenter.as_ref());
        }

        let client = match &startup.client {
            Ok(client) => client.clone(),
            Err(e) => return report_failure(presenter.as_ref(), quick_check, e.clone()),
        };
        let run = Run {
            startup,
            client,
            mode,
            gate,
            unattended,
        };
        self.drive(run, presenter, close_requests).await
    }

    /// Load the self-update record and the client file it points at.
    fn startup(args: UpdaterArgs) -> Startup {
        let self_update = match &args.self_update_file {
            Some(path) => StateStore::load_self_update(path),
            None => RecordStatus::Absent,
        };
        let record = self_update.loaded();

        let client_file = record
            .and_then(|r| r.client_file.clone())
            .map_or_else(|| args.client_file.clone(), ClientFileLocation::explicit);
        let base_dir =
            record.and_then(|r| r.base_dir.clone()).unwrap_or_else(|| args.base_dir.clone());
        let client = ClientMetadata::load(&client_file.path, client_file.format);

        Startup {
            args,
            self_update,
            client,
            client_file,
            base_dir,
            product_dir: None,
        }
    }

    async fn drive(
        &self,
        run: Run,
        presenter: Arc<dyn Presenter>,
        close_requests: mpsc::Receiver<()>,
    ) -> ExitStatus {
        let Run {
            startup,
            client,
            mode,
            gate,
            unattended,
        } = run;
        let working_dir = match self.working_dir(&startup) {
            Ok(dir) => dir,
            Err(e) => return report_failure(presenter.as_ref(), startup.args.quick_check, e),
        };
        debug!("Working directory: {}", working_dir.path().display());

        let replaced = match &mode {
            OperatingMode::SelfUpdateHandoff(HandoffEntry::ContinueSelfUpdated(record)) => {
                Some(record.clone())
            }
            _ => None,
        };
        let entry = entry_for(mode, startup.args.self_update_file.as_deref());
        if let (Ok(Entry::Install { .. }), Some(record)) = (&entry, &replaced) {
            finish_self_replacement(record);
        }
        let server_sources = startup
            .args
            .server_override
            .clone()
            .map_or_else(|| client.server_files.clone(), |server| vec![server]);

        let ctx = RunContext {
            base_dir: startup.base_dir.clone(),
            working_dir: working_dir.clone(),
            client_file: startup.client_file.clone(),
            client,
            server_sources,
            updater_version: self.host.updater_version.clone(),
            is_admin: self.host.is_admin,
            auto_update: unattended,
            quick_check: startup.args.quick_check,
        };
        let guard = LifecycleGuard::new(unattended, startup.args.silent);
        let mut sequencer =
            StepSequencer::new(ctx, self.collaborators.clone(), presenter, gate, guard);

        let outcome = match entry {
            Ok(entry) => sequencer.run(entry, close_requests).await,
            Err(e) => sequencer.fail(e),
        };
        let status = match outcome {
            RunOutcome::Completed(completion) => ExitStatus::from(completion),
            RunOutcome::Failed(_) => ExitStatus::Failure,
            RunOutcome::Handoff(request) => self.hand_off(&mut sequencer, &request),
        };

        sequencer.guard().on_terminate(&working_dir);
        status
    }

    /// Persist, swap and spawn the next process. A failed handoff routes to the Error step.
    fn hand_off(&self, sequencer: &mut StepSequencer, request: &HandoffRequest) -> ExitStatus {
        let ctx = sequencer.context();
        let mut record = SelfUpdateRecord::new(request.state);
        record.new_executable.clone_from(&request.new_executable);
        record.old_executable =
            request.new_executable.as_ref().map(|_| backup_path(&self.host.executable));
        record.server_file = Some(request.server_file.clone());
        record.client_file = Some(ctx.client_file.path.clone());
        record.base_dir = Some(ctx.base_dir.clone());
        record.temp_dir = Some(ctx.working_dir.path().to_path_buf());
        record.elevation_required = request.elevate;
        record.auto_update = ctx.auto_update;

        let plan = HandoffPlan {
            record,
            record_path: ctx.working_dir.self_update_file(),
            current_executable: self.host.executable.clone(),
            elevate: request.elevate,
        };

        sequencer.guard_mut().mark_handoff(request.pending());
        match self.coordinator.begin_handoff(&plan) {
            Ok(launched) => {
                info!("Continuing in process {}", launched.pid);
                ExitStatus::Success
            }
            Err(e) => {
                sequencer.guard_mut().clear_handoff();
                sequencer.fail(e);
                ExitStatus::Failure
            }
        }
    }

    /// Legacy record: put the replacement binary in place and relaunch it, elevating first when
    /// the old executable lives in a protected location.
    fn complete_legacy(
        &self,
        args: &UpdaterArgs,
        record: &SelfUpdateRecord,
        gate: &ElevationGate,
        presenter: &dyn Presenter,
    ) -> ExitStatus {
        let install_dir = record
            .old_executable
            .as_deref()
            .and_then(Path::parent)
            .unwrap_or(&self.host.install_dir);
        let requires = gate.requires_elevation(&PendingOperation {
            install_dir,
            operations: &[],
        });

        let result = match gate.evaluate(self.host.is_admin, requires) {
            ElevationDecision::ProceedDirect => self.coordinator.complete_legacy(record),
            ElevationDecision::RelaunchElevated => match &args.self_update_file {
                Some(record_path) => {
                    self.coordinator.relaunch_elevated(&self.host.executable, record_path)
                }
                None => Err(UpdraftError::SelfUpdateStateMissing {
                    path: String::new(),
                }),
            },
            ElevationDecision::ElevationDeniedFatal => Err(UpdraftError::ElevationDenied),
        };

        match result {
            Ok(launched) => {
                info!("Legacy self-update handed to process {}", launched.pid);
                ExitStatus::Success
            }
            Err(e) => report_failure(presenter, None, e),
        }
    }

    /// Record temp dir, then `tempdir`, then the product directory of unattended runs, then a
    /// fresh per-run directory.
    fn working_dir(&self, startup: &Startup) -> Result<WorkingDirectory, UpdraftError> {
        if let Some(dir) = startup.self_update.loaded().and_then(|r| r.temp_dir.clone()) {
            return Ok(WorkingDirectory::supplied(dir));
        }
        if let Some(dir) = &startup.product_dir {
            return Ok(dir.clone());
        }
        if let Some(dir) = &startup.args.temp_dir {
            return Ok(WorkingDirectory::supplied(dir.clone()));
        }
        WorkingDirectory::per_run(&self.config.temp_root())
    }

    fn gate(&self, continuation: bool) -> ElevationGate {
        let roots = self.config.protected_roots.clone().unwrap_or_else(platform_protected_roots);
        ElevationGate::new(roots, continuation)
    }

    fn presenter_for(&self, args: &UpdaterArgs, unattended: bool) -> Arc<dyn Presenter> {
        if let Some(presenter) = &self.presenter {
            return Arc::clone(presenter);
        }
        Arc::new(ConsolePresenter::new(visibility_for(args, unattended)))
    }
}

impl std::fmt::Debug for Updater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Updater")
            .field("config", &self.config)
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

fn visibility_for(args: &UpdaterArgs, unattended: bool) -> Visibility {
    if unattended || args.silent {
        Visibility::Silent
    } else if args.quick_check.is_some() {
        Visibility::Hidden
    } else {
        Visibility::Visible
    }
}

/// First sequencer entry for a resolved mode.
fn entry_for(mode: OperatingMode, record_path: Option<&Path>) -> Result<Entry, UpdraftError> {
    let server_file = |record: &SelfUpdateRecord| {
        record.server_file.clone().ok_or_else(|| UpdraftError::SelfUpdateStateCorrupt {
            path: record_path.map(|p| p.display().to_string()).unwrap_or_default(),
            reason: "no server file recorded".to_string(),
        })
    };

    match mode {
        OperatingMode::SelfUpdateHandoff(HandoffEntry::ContinueSelfUpdated(record)) => {
            Ok(Entry::Install {
                server_file: server_file(&record)?,
                show_changes: true,
            })
        }
        OperatingMode::ContinuingAfterRelaunch(record) => Ok(Entry::Install {
            server_file: server_file(&record)?,
            show_changes: false,
        }),
        OperatingMode::AutoUpdate(AutoUpdateEntry::Fresh) => Ok(Entry::Check),
        OperatingMode::AutoUpdate(AutoUpdateEntry::Resume(record)) => Ok(Entry::Resume(record)),
        OperatingMode::AutoUpdate(AutoUpdateEntry::Degraded(e)) => Ok(Entry::Degraded(e)),
        OperatingMode::Interactive { .. } => Ok(Entry::Check),
        OperatingMode::Uninstalling { .. } => Ok(Entry::Uninstall),
        OperatingMode::SelfUpdateHandoff(HandoffEntry::Legacy(_)) => Err(UpdraftError::Other {
            message: "legacy self-update runs no steps".to_string(),
        }),
    }
}

/// Error presentation for failures outside the sequencer.
fn report_failure(
    presenter: &dyn Presenter,
    quick_check: Option<QuickCheck>,
    error: UpdraftError,
) -> ExitStatus {
    error!("Update failed: {error}");
    presenter.frame_changed(Frame::Error);
    let context = ErrorContext::from(error);
    match quick_check {
        Some(QuickCheck {
            suppress_errors: true,
        }) => debug!("Error display suppressed"),
        Some(_) => {
            presenter.reveal();
            presenter.show_error(&context);
        }
        None => presenter.show_error(&context),
    }
    ExitStatus::Failure
}
