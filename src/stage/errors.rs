//! Stage assembly error types.

use std::path::PathBuf;

use thiserror::Error;

use crate::util::diagnostic::{suggestions, Diagnostic};

#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("`{}` is provided by both {first} and {second} with different contents", path.display())]
    Conflict {
        path: PathBuf,
        first: String,
        second: String,
    },

    #[error("part `{part}`: {rules} rule `{rule}` matches no file")]
    MissingPath {
        part: String,
        /// `stage` or `prime`
        rules: &'static str,
        rule: String,
    },

    #[error("part `{part}`: patchelf failed on `{}`: {message}", path.display())]
    Patchelf {
        part: String,
        path: PathBuf,
        message: String,
    },

    #[error("{message}")]
    Io { message: String },
}

impl AssemblyError {
    pub(crate) fn io(context: impl std::fmt::Display, err: impl std::fmt::Display) -> Self {
        AssemblyError::Io {
            message: format!("{}: {:#}", context, err),
        }
    }

    /// The part the error is attributed to, if any.
    pub fn part(&self) -> Option<&str> {
        match self {
            AssemblyError::MissingPath { part, .. } | AssemblyError::Patchelf { part, .. } => {
                Some(part)
            }
            _ => None,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        let diag = Diagnostic::error(self.to_string());
        match self {
            AssemblyError::Conflict { .. } => diag.with_suggestion(
                "Exclude the file from one of the parts with a `-path` stage rule",
            ),
            AssemblyError::MissingPath { rules, .. } => diag
                .with_context(format!("{} rules are relative to the part's files", rules))
                .with_suggestion("Fix the path, or use a glob if the file is optional"),
            AssemblyError::Patchelf { .. } => diag.with_suggestion(suggestions::PATCHELF),
            AssemblyError::Io { .. } => diag,
        }
    }
}
