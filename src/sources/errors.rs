//! Fetch error types.

use std::path::PathBuf;

use thiserror::Error;

use crate::util::diagnostic::{suggestions, Diagnostic};

/// Error fetching a part's source.
///
/// Cloneable so that one failed fetch can be reported to every part that
/// shares the download.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("failed to download `{location}`: {message}")]
    Network {
        location: String,
        message: String,
        /// Timeouts, refused connections and 5xx responses
        transient: bool,
    },

    #[error("{reference} not found in `{location}`")]
    RefNotFound {
        location: String,
        reference: String,
        /// Depth of the shallow fetch that was searched, if any
        depth: Option<u32>,
    },

    #[error("{operation} needs more history than the depth-{depth} fetch of `{location}` provides")]
    ShallowHistory {
        location: String,
        depth: u32,
        operation: String,
    },

    #[error("checksum mismatch for `{location}`: expected {expected}, got {actual}")]
    ChecksumMismatch {
        location: String,
        expected: String,
        actual: String,
    },

    #[error("local source `{}` does not exist", path.display())]
    MissingLocal { path: PathBuf },

    #[error("git error for `{location}`: {message}")]
    Git { location: String, message: String },

    #[error("failed to unpack `{location}`: {message}")]
    Archive { location: String, message: String },

    #[error("{message}")]
    Io { message: String },

    #[error("fetch of `{location}` was cancelled")]
    Cancelled { location: String },
}

impl FetchError {
    /// Whether retrying the same fetch may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Network { transient: true, .. })
    }

    pub(crate) fn io(context: impl std::fmt::Display, err: impl std::fmt::Display) -> Self {
        FetchError::Io {
            message: format!("{}: {}", context, err),
        }
    }

    pub(crate) fn git(location: &str, err: git2::Error) -> Self {
        FetchError::Git {
            location: location.to_string(),
            message: err.message().to_string(),
        }
    }

    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let diag = Diagnostic::error(self.to_string());
        match self {
            FetchError::ShallowHistory { .. } => diag.with_suggestion(suggestions::SHALLOW_HISTORY),
            FetchError::RefNotFound { depth: Some(depth), .. } => diag
                .with_context(format!("only the latest {} commit(s) were fetched", depth))
                .with_suggestion(suggestions::SHALLOW_HISTORY),
            FetchError::ChecksumMismatch { .. } => diag.with_suggestion(
                "Update `source-checksum` if the archive changed upstream on purpose",
            ),
            FetchError::Network { transient, .. } => {
                let diag = diag.with_suggestion(suggestions::FETCH_FAILED);
                if *transient {
                    diag.with_context("the download was retried and failed again")
                } else {
                    diag
                }
            }
            _ => diag,
        }
    }
}
