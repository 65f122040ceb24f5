//! Core types shared by every module.
//!
//! Only error handling lives here for now:
//!
//! - [`UpdraftError`] - one variant per failure kind the step sequencer distinguishes
//! - [`ErrorContext`] - an error paired with the short message, diagnostic and suggestion shown
//!   in the Error frame
//! - [`user_friendly_error`] - build an [`ErrorContext`] from any [`anyhow::Error`]

pub mod error;

pub use error::{ErrorContext, UpdraftError, user_friendly_error};
