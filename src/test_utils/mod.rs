//! Test utilities for Updraft
//!
//! Fakes for the collaborator, presenter and launcher seams, plus an on-disk fixture of an
//! installed product with a published release. Available to unit tests and, through the
//! `test-utils` feature, to the integration suite.
//!
//! # Example
//!
//! ```rust,no_run
//! use updraft_cli::test_utils::{ReleaseFixture, init_test_logging};
//!
//! init_test_logging(None);
//! let fixture = ReleaseFixture::new("1.0.0", "1.1.0").unwrap();
//! assert!(fixture.client_file().exists());
//! ```

pub mod fakes;
pub mod fixtures;

pub use fakes::{Behavior, FakeWork, RecordingLauncher, RecordingPresenter};
pub use fixtures::ReleaseFixture;

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Respects `RUST_LOG` when `level` is `None`; without either nothing is logged.
///
/// ```bash
/// RUST_LOG=updraft_cli=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .with_ansi(true)
            .try_init();
    });
}
