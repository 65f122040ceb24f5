use anyhow::Result;
use updraft_cli::app::ExitStatus;
use updraft_cli::sequencer::{Frame, UpdateStepOn};
use updraft_cli::state::{AutoUpdateRecord, RecordStatus, StateStore};
use updraft_cli::test_utils::ReleaseFixture;

use crate::common::TestUpdater;

#[tokio::test]
async fn test_auto_update_uses_product_directory() -> Result<()> {
    let updater = TestUpdater::new(ReleaseFixture::new("1.0.0", "1.1.0")?)?;

    let (status, presenter) = updater.run(&["-autoupdate"]).await;

    assert_eq!(status, ExitStatus::Success);
    assert!(presenter.offers().is_empty(), "unattended runs never prompt");
    assert_eq!(updater.fixture.installed_version()?, "1.1.0");

    let product_dir = updater.fixture.product_dir();
    assert!(product_dir.is_dir(), "product directory is kept");
    assert!(matches!(StateStore::load_auto_update(&product_dir), RecordStatus::Absent));
    assert!(updater.fixture.working_dirs()?.is_empty(), "no per-run directory is created");
    Ok(())
}

#[tokio::test]
async fn test_failed_auto_update_records_error_step() -> Result<()> {
    let updater = TestUpdater::new(ReleaseFixture::new("1.0.0", "1.1.0")?)?;
    let missing = updater.fixture.root().join("nowhere/server.json");
    let server = format!("-server={}", missing.display());

    let (status, presenter) = updater.run(&["-autoupdate", &server]).await;

    assert_eq!(status, ExitStatus::Failure);
    assert_eq!(presenter.frames(), vec![Frame::Checking, Frame::Error]);
    match StateStore::load_auto_update(&updater.fixture.product_dir()) {
        RecordStatus::Loaded(record) => assert_eq!(record.step, UpdateStepOn::Error),
        other => panic!("expected a record, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_corrupt_record_falls_back_to_check() -> Result<()> {
    let updater = TestUpdater::new(ReleaseFixture::new("1.0.0", "1.1.0")?)?;
    let product_dir = updater.fixture.product_dir();
    std::fs::create_dir_all(&product_dir)?;
    std::fs::write(StateStore::auto_update_path(&product_dir), "{ not json")?;

    let (status, presenter) = updater.run(&["-autoupdate"]).await;

    assert_eq!(status, ExitStatus::Success);
    assert_eq!(presenter.frames().first(), Some(&Frame::Checking));
    assert_eq!(updater.fixture.installed_version()?, "1.1.0");
    assert!(matches!(StateStore::load_auto_update(&product_dir), RecordStatus::Absent));
    Ok(())
}

#[tokio::test]
async fn test_resume_at_downloading_skips_check() -> Result<()> {
    let updater = TestUpdater::new(ReleaseFixture::new("1.0.0", "1.1.0")?)?;
    let product_dir = updater.fixture.product_dir();
    std::fs::create_dir_all(&product_dir)?;
    let mut record = AutoUpdateRecord::new(UpdateStepOn::Downloading, &product_dir);
    record.server_file = Some(updater.fixture.server_file());
    StateStore::save_auto_update(&product_dir, &record)?;

    let (status, presenter) = updater.run(&["-autoupdate"]).await;

    assert_eq!(status, ExitStatus::Success);
    assert!(!presenter.frames().contains(&Frame::Checking));
    assert_eq!(presenter.frames().last(), Some(&Frame::WelcomeFinish));
    assert_eq!(updater.fixture.installed_version()?, "1.1.0");
    Ok(())
}

#[tokio::test]
async fn test_resume_with_vanished_server_file_checks_again() -> Result<()> {
    let updater = TestUpdater::new(ReleaseFixture::new("1.0.0", "1.1.0")?)?;
    let product_dir = updater.fixture.product_dir();
    std::fs::create_dir_all(&product_dir)?;
    let mut record = AutoUpdateRecord::new(UpdateStepOn::Extracting, &product_dir);
    record.server_file = Some(product_dir.join("gone.json"));
    StateStore::save_auto_update(&product_dir, &record)?;

    let (status, presenter) = updater.run(&["-autoupdate"]).await;

    assert_eq!(status, ExitStatus::Success);
    assert_eq!(presenter.frames().first(), Some(&Frame::Checking));
    assert_eq!(updater.fixture.installed_version()?, "1.1.0");
    Ok(())
}
