use anyhow::Result;
use std::path::PathBuf;
use updraft_cli::app::ExitStatus;
use updraft_cli::handoff::backup_path;
use updraft_cli::sequencer::Frame;
use updraft_cli::state::{RecordStatus, SelfUpdateState, StateStore};
use updraft_cli::test_utils::ReleaseFixture;

use crate::common::TestUpdater;

/// Path of the self-update record named by a launch's `-supdf=` argument.
fn record_path(args: &[String]) -> PathBuf {
    args.iter()
        .find_map(|arg| arg.strip_prefix("-supdf="))
        .map(PathBuf::from)
        .expect("launch should carry -supdf")
}

fn as_strs(args: &[String]) -> Vec<&str> {
    args.iter().map(String::as_str).collect()
}

#[tokio::test]
async fn test_protected_update_relaunches_elevated() -> Result<()> {
    let updater =
        TestUpdater::new(ReleaseFixture::new("1.0.0", "1.1.0")?.with_system_operations()?)?;

    let (status, presenter) = updater.run(&[]).await;

    assert_eq!(status, ExitStatus::Success);
    let launches = updater.launcher.launches();
    assert_eq!(launches.len(), 1);
    assert!(launches[0].elevated);
    assert_eq!(launches[0].program, updater.executable());
    assert!(launches[0].args.contains(&"-ns".to_string()));

    let record = match StateStore::load_self_update(&record_path(&launches[0].args)) {
        RecordStatus::Loaded(record) => record,
        other => panic!("expected a record, got {other:?}"),
    };
    assert_eq!(record.state, SelfUpdateState::ContinuingRegularUpdate);
    assert!(record.elevation_required);
    assert!(record.new_executable.is_none());

    assert_eq!(updater.fixture.installed_version()?, "1.0.0");
    assert_eq!(updater.fixture.working_dirs()?.len(), 1, "working directory must survive");
    assert_ne!(presenter.frames().last(), Some(&Frame::Error));
    Ok(())
}

#[tokio::test]
async fn test_elevated_continuation_installs() -> Result<()> {
    let mut updater =
        TestUpdater::new(ReleaseFixture::new("1.0.0", "1.1.0")?.with_system_operations()?)?;
    let (status, _) = updater.run(&[]).await;
    assert_eq!(status, ExitStatus::Success);
    let args = updater.last_launch_args();

    updater.is_admin = true;
    let (status, presenter) = updater.run(&as_strs(&args)).await;

    assert_eq!(status, ExitStatus::Success);
    assert_eq!(presenter.frames(), vec![Frame::InstallUpdates, Frame::WelcomeFinish]);
    assert!(presenter.changes().is_empty(), "a relaunch does not re-show what's new");
    assert_eq!(updater.fixture.installed_version()?, "1.1.0");
    assert!(updater.fixture.working_dirs()?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_unprivileged_continuation_is_denied() -> Result<()> {
    let updater =
        TestUpdater::new(ReleaseFixture::new("1.0.0", "1.1.0")?.with_system_operations()?)?;
    let (_, _) = updater.run(&[]).await;
    let args = updater.last_launch_args();

    let (status, presenter) = updater.run(&as_strs(&args)).await;

    assert_eq!(status, ExitStatus::Failure);
    assert_eq!(presenter.frames(), vec![Frame::Error]);
    assert!(presenter.errors()[0].contains("administrator"));
    assert_eq!(updater.launcher.launches().len(), 1, "a continuation never relaunches again");
    assert_eq!(updater.fixture.installed_version()?, "1.0.0");
    Ok(())
}

#[tokio::test]
async fn test_continuation_record_without_ns_is_denied() -> Result<()> {
    let updater =
        TestUpdater::new(ReleaseFixture::new("1.0.0", "1.1.0")?.with_system_operations()?)?;
    let (_, _) = updater.run(&[]).await;
    let args: Vec<String> =
        updater.last_launch_args().into_iter().filter(|arg| arg != "-ns").collect();

    let (status, presenter) = updater.run(&as_strs(&args)).await;

    assert_eq!(status, ExitStatus::Failure);
    assert_eq!(presenter.frames(), vec![Frame::Error]);
    assert!(presenter.errors()[0].contains("non-administrator"));
    assert_eq!(updater.launcher.launches().len(), 1, "the recorded state is a continuation");
    assert_eq!(updater.fixture.installed_version()?, "1.0.0");
    Ok(())
}

#[tokio::test]
async fn test_newer_updater_replaces_itself_first() -> Result<()> {
    let updater = TestUpdater::new(ReleaseFixture::new("1.0.0", "1.1.0")?.with_updater("2.0.0")?)?;

    let (status, _) = updater.run(&[]).await;

    assert_eq!(status, ExitStatus::Success);
    assert_eq!(std::fs::read_to_string(updater.executable())?, "updater 2.0.0");
    assert_eq!(
        std::fs::read_to_string(backup_path(&updater.executable()))?,
        "updater 1.0.0"
    );
    let launches = updater.launcher.launches();
    assert_eq!(launches.len(), 1);
    assert!(!launches[0].elevated);

    let record = match StateStore::load_self_update(&record_path(&launches[0].args)) {
        RecordStatus::Loaded(record) => record,
        other => panic!("expected a record, got {other:?}"),
    };
    assert_eq!(record.state, SelfUpdateState::FullUpdate);
    assert_eq!(record.old_executable, Some(backup_path(&updater.executable())));
    assert_eq!(updater.fixture.installed_version()?, "1.0.0", "the new updater installs");
    Ok(())
}

#[tokio::test]
async fn test_new_updater_finishes_the_update() -> Result<()> {
    let mut updater =
        TestUpdater::new(ReleaseFixture::new("1.0.0", "1.1.0")?.with_updater("2.0.0")?)?;
    let (_, _) = updater.run(&[]).await;
    let args = updater.last_launch_args();

    updater.updater_version = "2.0.0".to_string();
    let (status, presenter) = updater.run(&as_strs(&args)).await;

    assert_eq!(status, ExitStatus::Success);
    assert_eq!(presenter.frames(), vec![Frame::InstallUpdates, Frame::WelcomeFinish]);
    assert_eq!(presenter.changes(), vec!["What's new in 1.1.0".to_string()]);
    assert!(!backup_path(&updater.executable()).exists(), "old updater is removed");
    assert_eq!(updater.fixture.installed_version()?, "1.1.0");
    assert!(updater.fixture.working_dirs()?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_failed_spawn_restores_updater() -> Result<()> {
    let mut updater =
        TestUpdater::new(ReleaseFixture::new("1.0.0", "1.1.0")?.with_updater("2.0.0")?)?;
    updater.launcher = std::sync::Arc::new(updraft_cli::test_utils::RecordingLauncher::failing());

    let (status, presenter) = updater.run(&[]).await;

    assert_eq!(status, ExitStatus::Failure);
    assert_eq!(presenter.frames().last(), Some(&Frame::Error));
    assert_eq!(
        presenter.errors(),
        vec!["The updater could not restart itself to continue.".to_string()]
    );
    assert_eq!(std::fs::read_to_string(updater.executable())?, "updater 1.0.0");
    assert!(updater.fixture.working_dirs()?.is_empty(), "nothing is pending after a failure");
    Ok(())
}

#[tokio::test]
async fn test_missing_record_is_fatal() -> Result<()> {
    let updater = TestUpdater::new(ReleaseFixture::new("1.0.0", "1.1.0")?)?;
    let supdf = format!("-supdf={}", updater.fixture.root().join("gone.state").display());

    let (status, presenter) = updater.run(&[&supdf, "-ns", "-uninstall"]).await;

    assert_eq!(status, ExitStatus::Failure);
    assert_eq!(presenter.frames(), vec![Frame::Error]);
    assert_eq!(
        presenter.errors(),
        vec!["Failed to continue the update after the updater restarted.".to_string()]
    );
    Ok(())
}
