//! Error handling for Updraft
//!
//! This module provides the error types and user-facing error reporting for the updater. The
//! error system follows two principles:
//! 1. **Strongly-typed errors** so the step sequencer can tell a recoverable failure from a
//!    fatal one
//! 2. **User-friendly messages** that pair a short sentence with a detailed diagnostic
//!
//! # Architecture
//!
//! - [`UpdraftError`] - one variant per failure kind of the update lifecycle
//! - [`ErrorContext`] - wrapper adding the short user message, details and a suggestion
//!
//! Every fatal error converges on the same presentation: the Error frame shows
//! [`ErrorContext::message`] and [`ErrorContext::details`]. Internal fault text only ever appears
//! in the details half.
//!
//! # Examples
//!
//! ```rust,no_run
//! use updraft_cli::core::{UpdraftError, ErrorContext};
//!
//! let context = ErrorContext::new(UpdraftError::ElevationDenied)
//!     .with_suggestion("Run the update from an administrator account");
//!
//! context.display();
//! ```

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// The main error type for updater operations.
///
/// # Recoverability
///
/// Only [`AutoUpdateStateCorrupt`] and the server metadata failures are ever retried, and only
/// once, while an unattended run resumes from persisted state. Everything else is fatal and routes
/// the sequencer to the Error step.
///
/// [`AutoUpdateStateCorrupt`]: UpdraftError::AutoUpdateStateCorrupt
#[derive(Error, Debug)]
pub enum UpdraftError {
    /// The client metadata file is missing or could not be parsed
    #[error("Client file failed to load: {path}")]
    ClientMetadataCorrupt {
        /// Path of the client file that was read
        path: String,
        /// Parse or I/O failure
        reason: String,
    },

    /// None of the server metadata locations could be fetched
    #[error("Server file could not be downloaded from {location}")]
    ServerMetadataUnreachable {
        /// Last location tried
        location: String,
        /// Transport failure
        reason: String,
    },

    /// The server metadata file was fetched but is not valid
    #[error("Server file is invalid: {path}")]
    ServerMetadataCorrupt {
        /// Local path of the fetched server file
        path: String,
        /// Parse failure
        reason: String,
    },

    /// The process was relaunched to gain privileges but still lacks them
    #[error("The updater was relaunched for elevation but is still running without administrator rights")]
    ElevationDenied,

    /// The auto-update progress record could not be parsed
    #[error("Failed to load the auto-update state file: {path}")]
    AutoUpdateStateCorrupt {
        /// Path of the record
        path: String,
        /// Parse failure
        reason: String,
    },

    /// The self-update record handed over by the previous process could not be parsed
    #[error("Failed to load the self-update state file: {path}")]
    SelfUpdateStateCorrupt {
        /// Path of the record
        path: String,
        /// Parse failure
        reason: String,
    },

    /// The self-update record named on the command line does not exist
    #[error("Self-update state file not found: {path}")]
    SelfUpdateStateMissing {
        /// Path given through `supdf`
        path: String,
    },

    /// The self-update record holds a state that cannot be continued
    #[error("Self-update state '{state}' cannot be continued")]
    UnexpectedSelfUpdateState {
        /// State found in the record
        state: String,
    },

    /// A package could not be downloaded
    #[error("Failed to download '{name}'")]
    DownloadFailed {
        /// Package name
        name: String,
        /// Transport or I/O failure
        reason: String,
    },

    /// A downloaded package does not match its published checksum
    #[error("Checksum mismatch for '{name}': expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Package name
        name: String,
        /// Published checksum
        expected: String,
        /// Computed checksum
        actual: String,
    },

    /// A package archive could not be extracted
    #[error("Failed to extract '{archive}'")]
    ExtractionFailed {
        /// Archive path
        archive: String,
        /// Decompression or I/O failure
        reason: String,
    },

    /// Installing the update failed
    #[error("Installing the update failed{}", rollback_suffix(*.rolled_back))]
    InstallFailure {
        /// Underlying failure
        reason: String,
        /// Whether the previous installation was restored
        rolled_back: bool,
    },

    /// Removing the product failed
    #[error("Uninstalling failed")]
    UninstallFailure {
        /// Underlying failure
        reason: String,
    },

    /// The self-update or elevation handoff to the next process failed
    #[error("Failed to hand the update over to the next process during '{stage}'")]
    HandoffFailure {
        /// Handoff stage that failed
        stage: String,
        /// Underlying failure
        reason: String,
    },

    /// The in-flight step acknowledged a cancellation request
    #[error("The update was cancelled")]
    Cancelled,

    /// A working directory could not be created or used
    #[error("Working directory unavailable: {path}")]
    WorkingDirectory {
        /// Directory path
        path: String,
        /// Underlying failure
        reason: String,
    },

    /// IO error from [`std::io::Error`]
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Generic error for cases not covered above
    #[error("{message}")]
    Other {
        /// Error message
        message: String,
    },
}

impl Clone for UpdraftError {
    fn clone(&self) -> Self {
        match self {
            Self::IoError(e) => Self::IoError(std::io::Error::new(e.kind(), e.to_string())),
            Self::ClientMetadataCorrupt { path, reason } => Self::ClientMetadataCorrupt {
                path: path.clone(),
                reason: reason.clone(),
            },
            Self::ServerMetadataUnreachable { location, reason } => {
                Self::ServerMetadataUnreachable {
                    location: location.clone(),
                    reason: reason.clone(),
                }
            }
            Self::ServerMetadataCorrupt { path, reason } => Self::ServerMetadataCorrupt {
                path: path.clone(),
                reason: reason.clone(),
            },
            Self::ElevationDenied => Self::ElevationDenied,
            Self::AutoUpdateStateCorrupt { path, reason } => Self::AutoUpdateStateCorrupt {
                path: path.clone(),
                reason: reason.clone(),
            },
            Self::SelfUpdateStateCorrupt { path, reason } => Self::SelfUpdateStateCorrupt {
                path: path.clone(),
                reason: reason.clone(),
            },
            Self::SelfUpdateStateMissing { path } => Self::SelfUpdateStateMissing {
                path: path.clone(),
            },
            Self::UnexpectedSelfUpdateState { state } => Self::UnexpectedSelfUpdateState {
                state: state.clone(),
            },
            Self::DownloadFailed { name, reason } => Self::DownloadFailed {
                name: name.clone(),
                reason: reason.clone(),
            },
            Self::ChecksumMismatch { name, expected, actual } => Self::ChecksumMismatch {
                name: name.clone(),
                expected: expected.clone(),
                actual: actual.clone(),
            },
            Self::ExtractionFailed { archive, reason } => Self::ExtractionFailed {
                archive: archive.clone(),
                reason: reason.clone(),
            },
            Self::InstallFailure { reason, rolled_back } => Self::InstallFailure {
                reason: reason.clone(),
                rolled_back: *rolled_back,
            },
            Self::UninstallFailure { reason } => Self::UninstallFailure {
                reason: reason.clone(),
            },
            Self::HandoffFailure { stage, reason } => Self::HandoffFailure {
                stage: stage.clone(),
                reason: reason.clone(),
            },
            Self::Cancelled => Self::Cancelled,
            Self::WorkingDirectory { path, reason } => Self::WorkingDirectory {
                path: path.clone(),
                reason: reason.clone(),
            },
            Self::Other { message } => Self::Other {
                message: message.clone(),
            },
        }
    }
}

impl UpdraftError {
    /// Whether a resumed unattended run may fall back to a fresh check after this error.
    ///
    /// Failures while *at* the Checking step are never recoverable, whatever their kind.
    pub const fn recoverable_on_resume(&self) -> bool {
        matches!(
            self,
            Self::AutoUpdateStateCorrupt { .. }
                | Self::ServerMetadataUnreachable { .. }
                | Self::ServerMetadataCorrupt { .. }
        )
    }

    /// Short sentence shown as the headline of the Error frame.
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::ClientMetadataCorrupt { .. } => {
                "Client file failed to load. The client file might be corrupt."
            }
            Self::ServerMetadataUnreachable { .. } => {
                "Could not download the update information. Check your network connection."
            }
            Self::ServerMetadataCorrupt { .. } => "The update information is invalid.",
            Self::ElevationDenied => {
                "You proceeded to elevate the updater as a non-administrator. The update requires administrator rights."
            }
            Self::AutoUpdateStateCorrupt { .. } => "Failed to load the AutoUpdate State file.",
            Self::SelfUpdateStateCorrupt { .. }
            | Self::SelfUpdateStateMissing { .. }
            | Self::UnexpectedSelfUpdateState { .. } => {
                "Failed to continue the update after the updater restarted."
            }
            Self::DownloadFailed { .. } | Self::ChecksumMismatch { .. } => {
                "The update could not be downloaded."
            }
            Self::ExtractionFailed { .. } => "The downloaded update could not be extracted.",
            Self::InstallFailure { .. } => "The update could not be installed.",
            Self::UninstallFailure { .. } => "The product could not be uninstalled.",
            Self::HandoffFailure { .. } => "The updater could not restart itself to continue.",
            Self::Cancelled => "The update was cancelled.",
            Self::WorkingDirectory { .. } | Self::IoError(_) | Self::Other { .. } => {
                "The update failed."
            }
        }
    }

    /// Diagnostic detail for the Error frame, when the variant carries one.
    pub fn diagnostic(&self) -> Option<String> {
        match self {
            Self::ClientMetadataCorrupt { reason, .. }
            | Self::ServerMetadataUnreachable { reason, .. }
            | Self::ServerMetadataCorrupt { reason, .. }
            | Self::AutoUpdateStateCorrupt { reason, .. }
            | Self::SelfUpdateStateCorrupt { reason, .. }
            | Self::DownloadFailed { reason, .. }
            | Self::ExtractionFailed { reason, .. }
            | Self::UninstallFailure { reason }
            | Self::HandoffFailure { reason, .. }
            | Self::InstallFailure { reason, .. }
            | Self::WorkingDirectory { reason, .. } => Some(format!("{self}: {reason}")),
            Self::ElevationDenied | Self::Cancelled => None,
            _ => Some(self.to_string()),
        }
    }
}

const fn rollback_suffix(rolled_back: bool) -> &'static str {
    if rolled_back { " (changes were rolled back)" } else { "" }
}

/// Error context wrapper that pairs an error with presentation text.
///
/// `message` is the short user-facing sentence, `details` the diagnostic string shown beneath
/// it. Use [`user_friendly_error`] to build one from an arbitrary [`anyhow::Error`].
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: UpdraftError,
    /// Short message for the Error frame
    pub message: String,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional diagnostic details
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a context whose message and details come from the error itself.
    #[must_use]
    pub fn new(error: UpdraftError) -> Self {
        Self {
            message: error.user_message().to_string(),
            details: error.diagnostic(),
            suggestion: None,
            error,
        }
    }

    /// Add a suggestion for resolving the error
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Replace the diagnostic details
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Display the error context to stderr with terminal colors
    ///
    /// - Message: red and bold
    /// - Details: yellow
    /// - Suggestion: green
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.message);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

impl From<UpdraftError> for ErrorContext {
    fn from(error: UpdraftError) -> Self {
        create_error_context(error)
    }
}

/// Convert any error to a user-friendly [`ErrorContext`].
///
/// Known error types found in the chain are downcast and given tailored suggestions; anything
/// else becomes [`UpdraftError::Other`] with the full chain in the details.
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(ctx) = error.downcast_ref::<ErrorContext>() {
        return ErrorContext {
            error: ctx.error.clone(),
            message: ctx.message.clone(),
            suggestion: ctx.suggestion.clone(),
            details: ctx.details.clone(),
        };
    }

    if let Some(updraft_error) = error.downcast_ref::<UpdraftError>() {
        return create_error_context(updraft_error.clone());
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
        let details = format!("{error:#}");
        return match io_error.kind() {
            std::io::ErrorKind::PermissionDenied => ErrorContext::new(UpdraftError::IoError(
                std::io::Error::new(io_error.kind(), io_error.to_string()),
            ))
            .with_details(details)
            .with_suggestion("Relaunch the updater with administrator rights"),
            _ => ErrorContext::new(UpdraftError::IoError(std::io::Error::new(
                io_error.kind(),
                io_error.to_string(),
            )))
            .with_details(details),
        };
    }

    let details = format!("{error:#}");
    ErrorContext::new(UpdraftError::Other {
        message: error.to_string(),
    })
    .with_details(details)
}

fn create_error_context(error: UpdraftError) -> ErrorContext {
    match &error {
        UpdraftError::ServerMetadataUnreachable { .. } => ErrorContext::new(error).with_suggestion(
            "Check your internet connection, or pass server=<url> to use another source",
        ),
        UpdraftError::ElevationDenied => ErrorContext::new(error)
            .with_suggestion("Log in as an administrator and run the update again"),
        UpdraftError::ChecksumMismatch { .. } => ErrorContext::new(error)
            .with_suggestion("The download may be corrupted. Run the update again"),
        UpdraftError::InstallFailure { rolled_back: true, .. } => ErrorContext::new(error)
            .with_suggestion("Your previous version was kept. Close the running product and retry"),
        _ => ErrorContext::new(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = UpdraftError::ClientMetadataCorrupt {
            path: "client.wyc".to_string(),
            reason: "expected value at line 1".to_string(),
        };
        assert_eq!(error.to_string(), "Client file failed to load: client.wyc");

        let error = UpdraftError::InstallFailure {
            reason: "disk full".to_string(),
            rolled_back: true,
        };
        assert_eq!(error.to_string(), "Installing the update failed (changes were rolled back)");
    }

    #[test]
    fn test_error_context_carries_message_and_details() {
        let ctx = ErrorContext::new(UpdraftError::ClientMetadataCorrupt {
            path: "client.wyc".to_string(),
            reason: "expected value at line 1".to_string(),
        });

        assert!(ctx.message.starts_with("Client file failed to load."));
        assert!(ctx.details.as_deref().unwrap().contains("expected value at line 1"));
    }

    #[test]
    fn test_elevation_denied_has_dedicated_message() {
        let ctx = ErrorContext::from(UpdraftError::ElevationDenied);
        assert!(ctx.message.contains("non-administrator"));
        assert!(ctx.suggestion.is_some());
    }

    #[test]
    fn test_recoverable_on_resume() {
        assert!(
            UpdraftError::AutoUpdateStateCorrupt {
                path: "x".into(),
                reason: "y".into()
            }
            .recoverable_on_resume()
        );
        assert!(!UpdraftError::ElevationDenied.recoverable_on_resume());
        assert!(
            !UpdraftError::InstallFailure {
                reason: "x".into(),
                rolled_back: false
            }
            .recoverable_on_resume()
        );
    }

    #[test]
    fn test_user_friendly_error_downcasts() {
        let err = anyhow::Error::new(UpdraftError::ElevationDenied);
        let ctx = user_friendly_error(err);
        assert!(matches!(ctx.error, UpdraftError::ElevationDenied));
    }

    #[test]
    fn test_user_friendly_error_permission_denied() {
        use std::io::{Error, ErrorKind};

        let io_error = Error::new(ErrorKind::PermissionDenied, "access denied");
        let ctx = user_friendly_error(anyhow::Error::from(io_error));
        assert!(matches!(ctx.error, UpdraftError::IoError(_)));
        assert!(ctx.suggestion.is_some());
        assert!(ctx.details.is_some());
    }

    #[test]
    fn test_user_friendly_error_other_keeps_chain() {
        let err = anyhow::anyhow!("inner").context("outer");
        let ctx = user_friendly_error(err);
        assert!(ctx.details.as_deref().unwrap().contains("inner"));
    }
}
