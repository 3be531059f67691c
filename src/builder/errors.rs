//! Build error types.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::sources::FetchError;
use crate::util::diagnostic::{suggestions, Diagnostic};

/// Error building one part.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("failed to pull part `{part}`: {source}")]
    Fetch {
        part: String,
        #[source]
        source: FetchError,
    },

    #[error("part `{part}`: `{command}` failed with exit code {}", code.map_or_else(|| "unknown".to_string(), |c| c.to_string()))]
    CommandFailed {
        part: String,
        command: String,
        code: Option<i32>,
        log: PathBuf,
    },

    #[error("part `{part}`: failed to run `{command}`: {message}")]
    Spawn {
        part: String,
        command: String,
        message: String,
    },

    #[error("part `{part}`: `{command}` timed out after {}s", timeout.as_secs())]
    TimedOut {
        part: String,
        command: String,
        timeout: Duration,
    },

    #[error("part `{part}` was cancelled")]
    Cancelled { part: String },

    #[error("part `{part}`: {message}")]
    Io { part: String, message: String },
}

impl BuildError {
    pub fn part(&self) -> &str {
        match self {
            BuildError::Fetch { part, .. }
            | BuildError::CommandFailed { part, .. }
            | BuildError::Spawn { part, .. }
            | BuildError::TimedOut { part, .. }
            | BuildError::Cancelled { part }
            | BuildError::Io { part, .. } => part,
        }
    }

    pub fn is_fetch(&self) -> bool {
        matches!(self, BuildError::Fetch { .. })
    }

    /// Cancellation is a consequence of another failure, never the cause.
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            BuildError::Cancelled { .. }
                | BuildError::Fetch {
                    source: FetchError::Cancelled { .. },
                    ..
                }
        )
    }

    pub(crate) fn io(part: &str, err: impl std::fmt::Display) -> Self {
        BuildError::Io {
            part: part.to_string(),
            message: format!("{:#}", err),
        }
    }

    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            BuildError::Fetch { part, source } => source
                .to_diagnostic()
                .with_context(format!("while pulling part `{}`", part)),
            BuildError::CommandFailed { log, .. } => Diagnostic::error(self.to_string())
                .with_location(log.clone())
                .with_suggestion(suggestions::BUILD_FAILED),
            _ => Diagnostic::error(self.to_string()),
        }
    }
}
