//! Package emission error types.

use std::path::PathBuf;

use thiserror::Error;

use crate::util::diagnostic::{suggestions, Diagnostic};

/// An app command that cannot be bound to a file in the package.
#[derive(Debug, Error)]
pub enum EntryPointError {
    #[error("app `{app}`: command `{command}` not found in the package")]
    NotFound { app: String, command: String },

    #[error("app `{app}`: `{}` is not executable", path.display())]
    NotExecutable { app: String, path: PathBuf },

    #[error("app `{app}`: command `{command}` points outside the package")]
    OutsidePackage { app: String, command: String },

    #[error("app `{app}` has an empty command")]
    EmptyCommand { app: String },

    #[error("{message}")]
    Io { message: String },
}

impl EntryPointError {
    pub(crate) fn io(context: impl std::fmt::Display, err: impl std::fmt::Display) -> Self {
        EntryPointError::Io {
            message: format!("{}: {:#}", context, err),
        }
    }

    pub fn app(&self) -> Option<&str> {
        match self {
            EntryPointError::NotFound { app, .. }
            | EntryPointError::NotExecutable { app, .. }
            | EntryPointError::OutsidePackage { app, .. }
            | EntryPointError::EmptyCommand { app } => Some(app),
            EntryPointError::Io { .. } => None,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        let diag = Diagnostic::error(self.to_string());
        match self {
            EntryPointError::NotFound { .. } => diag
                .with_context("commands are resolved relative to the prime tree")
                .with_suggestion(suggestions::ENTRY_POINT),
            EntryPointError::NotExecutable { .. } => {
                diag.with_suggestion("Mark the file executable in the part's build step")
            }
            EntryPointError::OutsidePackage { .. } => {
                diag.with_suggestion("Use a path relative to the package root")
            }
            EntryPointError::EmptyCommand { .. } | EntryPointError::Io { .. } => diag,
        }
    }
}
