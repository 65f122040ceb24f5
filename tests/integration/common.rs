use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use updraft_cli::app::{ExitStatus, HostEnvironment, Updater};
use updraft_cli::collab::Collaborators;
use updraft_cli::config::UpdaterConfig;
use updraft_cli::test_utils::{
    RecordingLauncher, RecordingPresenter, ReleaseFixture, init_test_logging,
};

/// Version of the updater binary the fixture pretends to run.
pub const UPDATER_VERSION: &str = "1.0.0";

/// A fixture plus the host the updater runs on.
pub struct TestUpdater {
    pub fixture: ReleaseFixture,
    pub launcher: Arc<RecordingLauncher>,
    pub is_admin: bool,
    pub updater_version: String,
    pub config: UpdaterConfig,
}

impl TestUpdater {
    pub fn new(fixture: ReleaseFixture) -> Result<Self> {
        init_test_logging(None);
        std::fs::write(executable(&fixture), format!("updater {UPDATER_VERSION}"))?;
        let config = fixture.config();
        Ok(Self {
            fixture,
            launcher: Arc::new(RecordingLauncher::new()),
            is_admin: false,
            updater_version: UPDATER_VERSION.to_string(),
            config,
        })
    }

    pub fn executable(&self) -> PathBuf {
        executable(&self.fixture)
    }

    fn host(&self) -> HostEnvironment {
        HostEnvironment {
            executable: self.executable(),
            install_dir: self.fixture.base_dir(),
            is_admin: self.is_admin,
            updater_version: self.updater_version.clone(),
        }
    }

    /// Run once with `args`, recording into `presenter`.
    pub async fn run_with(&self, args: &[&str], presenter: &Arc<RecordingPresenter>) -> ExitStatus {
        let updater = Updater::new(
            self.config.clone(),
            self.host(),
            Collaborators::standard(&self.config),
            self.launcher.clone(),
        )
        .with_presenter(presenter.clone());
        let (_close_tx, close_rx) = mpsc::channel(1);
        updater.run_with_close_requests(args, close_rx).await
    }

    /// Run once with a fresh presenter that accepts every prompt.
    pub async fn run(&self, args: &[&str]) -> (ExitStatus, Arc<RecordingPresenter>) {
        let presenter = Arc::new(RecordingPresenter::new());
        let status = self.run_with(args, &presenter).await;
        (status, presenter)
    }

    /// Arguments of the most recent launch.
    pub fn last_launch_args(&self) -> Vec<String> {
        self.launcher.launches().last().map(|launch| launch.args.clone()).unwrap_or_default()
    }
}

fn executable(fixture: &ReleaseFixture) -> PathBuf {
    fixture.base_dir().join("updraft")
}
