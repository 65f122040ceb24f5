//! Updraft: a self-updating installer client.
//!
//! A run starts from the process arguments, decides what kind of run it is and then walks the
//! update lifecycle: check the server file, download and extract the packages, install them over
//! the product. When installing needs administrator rights, or a newer updater was published,
//! the run hands over to a fresh updater process and exits; the next process continues from a
//! persisted record.
//!
//! # Modules
//!
//! - [`args`]: lenient command-line interpretation
//! - [`state`]: the self-update and auto-update records, and the working directory
//! - [`mode`]: operating mode resolution
//! - [`elevation`]: the administrator-rights decision
//! - [`sequencer`]: the step state machine
//! - [`handoff`]: the two-process handoff protocol
//! - [`lifecycle`]: close and cleanup policy
//! - [`collab`]: the work behind each step, behind replaceable traits
//! - [`app`]: the top-level dispatcher used by the binary
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use updraft_cli::app::{HostEnvironment, Updater};
//! use updraft_cli::collab::Collaborators;
//! use updraft_cli::config::UpdaterConfig;
//! use updraft_cli::handoff::SystemLauncher;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = UpdaterConfig::load().await?;
//! let updater = Updater::new(
//!     config.clone(),
//!     HostEnvironment::detect()?,
//!     Collaborators::standard(&config),
//!     Arc::new(SystemLauncher::default()),
//! );
//! let status = updater.run(["-quickcheck", "-noerr"]).await;
//! std::process::exit(i32::from(status.code()));
//! # }
//! ```

pub mod app;
pub mod args;
pub mod collab;
pub mod config;
pub mod core;
pub mod elevation;
pub mod handoff;
pub mod lifecycle;
pub mod metadata;
pub mod mode;
pub mod presenter;
pub mod sequencer;
pub mod state;
pub mod utils;

// test_utils module is available for both unit tests and integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
