use anyhow::Result;
use std::sync::Arc;
use updraft_cli::app::ExitStatus;
use updraft_cli::sequencer::Frame;
use updraft_cli::test_utils::{RecordingPresenter, ReleaseFixture};

use crate::common::TestUpdater;

#[tokio::test]
async fn test_interactive_update_installs_release() -> Result<()> {
    let updater = TestUpdater::new(ReleaseFixture::new("1.0.0", "1.1.0")?)?;

    let (status, presenter) = updater.run(&[]).await;

    assert_eq!(status, ExitStatus::Success);
    let base_dir = updater.fixture.base_dir();
    assert_eq!(std::fs::read_to_string(base_dir.join("bin/tool"))?, "v2");
    assert!(base_dir.join("NEW.txt").exists());
    assert_eq!(updater.fixture.installed_version()?, "1.1.0");

    let offers = presenter.offers();
    assert_eq!(offers.len(), 1);
    assert_eq!(offers[0].installed_version, "1.0.0");
    assert_eq!(offers[0].new_version, "1.1.0");
    assert_eq!(presenter.frames().first(), Some(&Frame::Checking));
    assert_eq!(presenter.frames().last(), Some(&Frame::WelcomeFinish));

    assert!(updater.fixture.working_dirs()?.is_empty(), "per-run directory should be removed");
    assert!(updater.launcher.launches().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_current_product_finishes_after_check() -> Result<()> {
    let updater = TestUpdater::new(ReleaseFixture::new("1.1.0", "1.1.0")?)?;

    let (status, presenter) = updater.run(&[]).await;

    assert_eq!(status, ExitStatus::Success);
    assert_eq!(presenter.frames(), vec![Frame::Checking, Frame::WelcomeFinish]);
    assert!(presenter.offers().is_empty());
    assert_eq!(std::fs::read_to_string(updater.fixture.base_dir().join("bin/tool"))?, "v1");
    Ok(())
}

#[tokio::test]
async fn test_declined_update_exits_cancelled() -> Result<()> {
    let updater = TestUpdater::new(ReleaseFixture::new("1.0.0", "1.1.0")?)?;
    let presenter = Arc::new(RecordingPresenter::new().declining_updates());

    let status = updater.run_with(&[], &presenter).await;

    assert_eq!(status, ExitStatus::Cancelled);
    assert_eq!(status.code(), 2);
    assert_eq!(updater.fixture.installed_version()?, "1.0.0");
    assert!(updater.fixture.working_dirs()?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_quick_check_without_update_stays_hidden() -> Result<()> {
    let updater = TestUpdater::new(ReleaseFixture::new("1.1.0", "1.1.0")?)?;

    let (status, presenter) = updater.run(&["-quickcheck"]).await;

    assert_eq!(status, ExitStatus::Success);
    assert_eq!(presenter.frames(), vec![Frame::Checking]);
    assert!(!presenter.revealed());
    Ok(())
}

#[tokio::test]
async fn test_quick_check_with_update_reveals_and_installs() -> Result<()> {
    let updater = TestUpdater::new(ReleaseFixture::new("1.0.0", "1.1.0")?)?;

    let (status, presenter) = updater.run(&["-quickcheck"]).await;

    assert_eq!(status, ExitStatus::Success);
    assert!(presenter.revealed());
    assert_eq!(updater.fixture.installed_version()?, "1.1.0");
    Ok(())
}

#[tokio::test]
async fn test_quick_check_noerr_fails_silently() -> Result<()> {
    let updater = TestUpdater::new(ReleaseFixture::new("1.0.0", "1.1.0")?)?;
    let missing = updater.fixture.root().join("nowhere/server.json");
    let server = format!("-server={}", missing.display());

    let (status, presenter) = updater.run(&["-quickcheck", "-noerr", &server]).await;

    assert_eq!(status, ExitStatus::Failure);
    assert!(presenter.errors().is_empty());
    assert!(!presenter.revealed());
    Ok(())
}

#[tokio::test]
async fn test_unreachable_server_shows_error() -> Result<()> {
    let updater = TestUpdater::new(ReleaseFixture::new("1.0.0", "1.1.0")?)?;
    let missing = updater.fixture.root().join("nowhere/server.json");
    let server = format!("-server={}", missing.display());

    let (status, presenter) = updater.run(&[&server]).await;

    assert_eq!(status, ExitStatus::Failure);
    assert_eq!(presenter.frames(), vec![Frame::Checking, Frame::Error]);
    assert_eq!(presenter.errors().len(), 1);
    assert_eq!(updater.fixture.installed_version()?, "1.0.0");
    Ok(())
}

#[tokio::test]
async fn test_missing_client_file_is_fatal() -> Result<()> {
    let updater = TestUpdater::new(ReleaseFixture::new("1.0.0", "1.1.0")?)?;
    let cdata = format!("-cdata={}", updater.fixture.root().join("absent.wyc").display());

    let (status, presenter) = updater.run(&[&cdata]).await;

    assert_eq!(status, ExitStatus::Failure);
    assert_eq!(presenter.frames(), vec![Frame::Error]);
    assert_eq!(
        presenter.errors(),
        vec!["Client file failed to load. The client file might be corrupt.".to_string()]
    );
    Ok(())
}

#[tokio::test]
async fn test_uninstall_removes_installed_files() -> Result<()> {
    let updater = TestUpdater::new(ReleaseFixture::new("1.0.0", "1.1.0")?)?;
    let (status, _) = updater.run(&[]).await;
    assert_eq!(status, ExitStatus::Success);
    let base_dir = updater.fixture.base_dir();
    assert!(base_dir.join("NEW.txt").exists());

    let (status, presenter) = updater.run(&["-uninstall"]).await;

    assert_eq!(status, ExitStatus::Success);
    assert_eq!(presenter.frames(), vec![Frame::Uninstall, Frame::WelcomeFinish]);
    assert!(!base_dir.join("NEW.txt").exists());
    assert!(base_dir.join("bin/tool").exists(), "replaced files are not part of the manifest");
    Ok(())
}
