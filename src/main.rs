//! Updraft entry point.
//!
//! Loads the machine configuration, sets up logging and hands the raw arguments to
//! [`Updater`]. The process exit code is `0` on success (including a handoff to the next updater
//! process), `1` on failure and `2` when the user cancelled or declined the update.

use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use updraft_cli::app::{HostEnvironment, Updater};
use updraft_cli::collab::Collaborators;
use updraft_cli::config::UpdaterConfig;
use updraft_cli::core::user_friendly_error;
use updraft_cli::handoff::SystemLauncher;

#[tokio::main]
async fn main() -> ExitCode {
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    let config = match UpdaterConfig::load().await {
        Ok(config) => config,
        Err(e) => {
            user_friendly_error(e).display();
            return ExitCode::from(1);
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(config.log_level.as_deref().unwrap_or("warn"))
    });
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let host = match HostEnvironment::detect() {
        Ok(host) => host,
        Err(e) => {
            user_friendly_error(e).display();
            return ExitCode::from(1);
        }
    };

    let collaborators = Collaborators::standard(&config);
    let launcher = Arc::new(SystemLauncher::new(config.elevation_command.clone()));
    let updater = Updater::new(config, host, collaborators, launcher);

    let status = updater.run(std::env::args().skip(1)).await;
    ExitCode::from(status.code())
}
