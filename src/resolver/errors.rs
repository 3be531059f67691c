//! Resolution error types and diagnostics.

use thiserror::Error;

use crate::resolver::plan::Namespace;
use crate::util::diagnostic::{suggestions, Diagnostic};

/// Error while resolving or installing host packages.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("unknown {namespace} package `{package}`")]
    UnknownPackage {
        namespace: Namespace,
        package: String,
        requested_by: Vec<String>,
    },

    #[error("build packages are not installed: {}", packages.join(", "))]
    NotInstalled {
        namespace: Namespace,
        packages: Vec<String>,
    },

    #[error("no package manager configured for the {namespace} namespace")]
    NoBackend { namespace: Namespace },

    #[error("{manager} cannot {operation}")]
    Unsupported {
        manager: &'static str,
        operation: &'static str,
    },

    #[error("{manager} failed: {message}")]
    Backend {
        manager: &'static str,
        message: String,
    },
}

impl ResolveError {
    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            ResolveError::UnknownPackage {
                namespace,
                package,
                requested_by,
            } => {
                let mut diag = Diagnostic::error(format!(
                    "{} package `{}` does not exist",
                    namespace, package
                ));
                if !requested_by.is_empty() {
                    diag = diag.with_context(format!(
                        "requested by part{} {}",
                        if requested_by.len() == 1 { "" } else { "s" },
                        requested_by
                            .iter()
                            .map(|p| format!("`{}`", p))
                            .collect::<Vec<_>>()
                            .join(", ")
                    ));
                }
                diag.with_suggestion(suggestions::UNKNOWN_PACKAGE)
            }

            ResolveError::NotInstalled { namespace, packages } => {
                let command = match namespace {
                    Namespace::Deb => format!("sudo apt-get install {}", packages.join(" ")),
                    Namespace::Snap => format!("sudo snap install {}", packages.join(" ")),
                };
                Diagnostic::error(format!(
                    "{} build package{} missing on the host",
                    packages.len(),
                    if packages.len() == 1 { " is" } else { "s are" }
                ))
                .with_context(format!("missing: {}", packages.join(", ")))
                .with_suggestion(format!("Install them with `{}`", command))
                .with_suggestion("Or set `packages.install = true` in .dock/config.toml")
            }

            ResolveError::NoBackend { namespace } => Diagnostic::error(self.to_string())
                .with_suggestion(format!(
                    "Remove the {} packages from the manifest or configure `packages.backend`",
                    namespace
                )),

            ResolveError::Unsupported { .. } | ResolveError::Backend { .. } => {
                Diagnostic::error(self.to_string())
            }
        }
    }
}
