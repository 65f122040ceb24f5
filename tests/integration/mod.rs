//! Integration test suite for Updraft
//!
//! End-to-end runs of the updater against an on-disk product and release
//! ([`ReleaseFixture`](updraft_cli::test_utils::ReleaseFixture)), with the real collaborators
//! and a recording presenter and process launcher.
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **update_flow**: interactive updates, quick checks, declines, uninstall
//! - **handoff**: elevation and self-update handoffs, and the processes continuing them
//! - **unattended**: auto-update runs and resumption
//! - **binary**: exit codes of the `updraft` executable

mod binary;
mod common;
mod handoff;
mod unattended;
mod update_flow;
