//! Configuration for the updater.
//!
//! Only machine-level settings live here. Everything that describes *what* is being updated
//! comes from the client metadata file and the command line.

mod global;

pub use global::{CONFIG_PATH_ENV, UpdaterConfig};
