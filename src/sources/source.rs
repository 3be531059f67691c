//! Fetcher trait - common interface for all source kinds.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::{SourceSpec, SourceType};
use crate::sources::errors::FetchError;
use crate::util::process::CancelToken;

/// Ambient inputs to a fetch.
#[derive(Debug, Clone)]
pub struct FetchContext<'a> {
    /// Directory relative source locations are resolved against
    pub project_dir: &'a Path,
    pub cancel: &'a CancelToken,
    /// Network timeout per request
    pub timeout: Option<Duration>,
}

impl FetchContext<'_> {
    /// Resolve a local location against the project directory.
    pub fn resolve_local(&self, location: &str) -> PathBuf {
        let location = location.strip_prefix("file://").unwrap_or(location);
        let path = Path::new(location);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_dir.join(path)
        }
    }

    pub(crate) fn check_cancelled(&self, location: &str) -> Result<(), FetchError> {
        if self.cancel.is_cancelled() {
            Err(FetchError::Cancelled {
                location: location.to_string(),
            })
        } else {
            Ok(())
        }
    }
}

/// A fetched source tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedSource {
    /// Root of the fetched tree
    pub path: PathBuf,
    /// Commit id for git sources, digest for archives
    pub revision: Option<String>,
}

/// Fetches one kind of source.
pub trait Fetcher: Send + Sync {
    fn kind(&self) -> SourceType;

    /// Fetch `source` into `dest`, which does not exist yet.
    fn fetch(
        &self,
        source: &SourceSpec,
        dest: &Path,
        ctx: &FetchContext<'_>,
    ) -> Result<FetchedSource, FetchError>;
}
