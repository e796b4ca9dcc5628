//! Domain-specific errors.

use std::io;

use thiserror::Error;

/// A non-I/O failure raised while packaging one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub path: String,
    pub reason: String,
}

/// Everything that can go wrong between building a manifest and delivering
/// its package.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("assignment '{assignment}' uses packager '{identifier}', which is not registered")]
    PackagerNotFound {
        assignment: String,
        identifier: String,
    },

    #[error("assignment '{assignment}' has an invalid transport '{transport}': {reason}")]
    TargetResolution {
        assignment: String,
        transport: String,
        reason: String,
    },

    #[error("no protocol handles '{scheme}' transports (assignment '{assignment}')")]
    UnsupportedProtocol { assignment: String, scheme: String },

    /// `path` names the item being written when the stream failed.
    #[error("I/O failure while packaging '{assignment}'{}: {source}", at_item(.path))]
    Transfer {
        assignment: String,
        path: Option<String>,
        #[source]
        source: io::Error,
    },

    #[error("packager for '{assignment}' failed: {reason}")]
    Packaging { assignment: String, reason: String },

    #[error("failed to deliver package to {url}: {reason}")]
    Transport { url: String, reason: String },

    #[error("failed to package '{path}' for '{assignment}': {reason}")]
    ItemProcessing {
        assignment: String,
        path: String,
        reason: String,
    },

    #[error("submission of '{assignment}' was cancelled")]
    Cancelled { assignment: String },

    #[error("assignment '{assignment}' requires files that were not submitted: {}", .missing.join(", "))]
    MissingRequiredFiles {
        assignment: String,
        missing: Vec<String>,
    },
}

impl SubmitError {
    /// Configuration errors are detected before any bytes are written.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            SubmitError::PackagerNotFound { .. }
                | SubmitError::TargetResolution { .. }
                | SubmitError::UnsupportedProtocol { .. }
        )
    }
}

fn at_item(path: &Option<String>) -> String {
    path.as_ref()
        .map(|path| format!(" at '{path}'"))
        .unwrap_or_default()
}
