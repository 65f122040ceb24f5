use anyhow::Result;
use assert_cmd::Command;
use predicates::prelude::*;
use std::path::PathBuf;
use updraft_cli::config::CONFIG_PATH_ENV;
use updraft_cli::test_utils::ReleaseFixture;

/// Write the fixture's configuration and return its path.
fn write_config(fixture: &ReleaseFixture) -> Result<PathBuf> {
    let path = fixture.root().join("config.toml");
    std::fs::write(&path, toml::to_string(&fixture.config())?)?;
    Ok(path)
}

fn updraft(config: &PathBuf) -> Result<Command> {
    let mut cmd = Command::cargo_bin("updraft")?;
    cmd.env(CONFIG_PATH_ENV, config).env_remove("RUST_LOG");
    Ok(cmd)
}

fn product_args(fixture: &ReleaseFixture) -> [String; 2] {
    [
        format!("-cdata={}", fixture.client_file().display()),
        format!("-basedir={}", fixture.base_dir().display()),
    ]
}

#[test]
fn test_update_exits_zero() -> Result<()> {
    let fixture = ReleaseFixture::new("1.0.0", "1.1.0")?;
    let config = write_config(&fixture)?;

    updraft(&config)?.args(product_args(&fixture)).assert().success();

    assert_eq!(fixture.installed_version()?, "1.1.0");
    assert!(fixture.working_dirs()?.is_empty());
    Ok(())
}

#[test]
fn test_quick_check_without_update_exits_zero() -> Result<()> {
    let fixture = ReleaseFixture::new("1.1.0", "1.1.0")?;
    let config = write_config(&fixture)?;

    updraft(&config)?
        .arg("-quickcheck")
        .args(product_args(&fixture))
        .assert()
        .code(0)
        .stdout(predicate::str::is_empty());
    Ok(())
}

#[test]
fn test_missing_client_file_exits_one() -> Result<()> {
    let fixture = ReleaseFixture::new("1.0.0", "1.1.0")?;
    let config = write_config(&fixture)?;

    updraft(&config)?
        .arg(format!("-cdata={}", fixture.root().join("absent.wyc").display()))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Client file failed to load"));
    Ok(())
}

#[test]
fn test_missing_self_update_record_exits_one() -> Result<()> {
    let fixture = ReleaseFixture::new("1.0.0", "1.1.0")?;
    let config = write_config(&fixture)?;

    updraft(&config)?
        .arg(format!("-supdf={}", fixture.root().join("gone.state").display()))
        .arg("-ns")
        .assert()
        .code(1);
    Ok(())
}

#[test]
fn test_invalid_config_exits_one() -> Result<()> {
    let fixture = ReleaseFixture::new("1.0.0", "1.1.0")?;
    let config = fixture.root().join("config.toml");
    std::fs::write(&config, "http_timeout_secs = \"soon\"")?;

    updraft(&config)?
        .args(product_args(&fixture))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Failed to parse updater config"));
    Ok(())
}
