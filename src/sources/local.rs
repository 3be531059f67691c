//! Local directory sources.

use std::path::Path;

use crate::core::{SourceSpec, SourceType};
use crate::sources::errors::FetchError;
use crate::sources::source::{FetchContext, FetchedSource, Fetcher};
use crate::util::context::WORK_DIR_NAME;
use crate::util::fs::{copy_entry, ensure_dir, list_tree};

/// Copies a directory next to the manifest into the part's source tree.
///
/// The work directory is skipped, so `source = "."` works.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFetcher;

impl LocalFetcher {
    pub fn new() -> Self {
        LocalFetcher
    }
}

impl Fetcher for LocalFetcher {
    fn kind(&self) -> SourceType {
        SourceType::Local
    }

    fn fetch(
        &self,
        source: &SourceSpec,
        dest: &Path,
        ctx: &FetchContext<'_>,
    ) -> Result<FetchedSource, FetchError> {
        let root = ctx.resolve_local(&source.location);
        if !root.is_dir() {
            return Err(FetchError::MissingLocal { path: root });
        }
        tracing::debug!("copying {} into {}", root.display(), dest.display());

        ensure_dir(dest).map_err(|e| FetchError::io(dest.display(), e))?;
        let files = list_tree(&root).map_err(|e| FetchError::io(root.display(), e))?;
        for rel in files.iter().filter(|rel| !in_work_dir(rel)) {
            ctx.check_cancelled(&source.location)?;
            copy_entry(&root.join(rel), &dest.join(rel))
                .map_err(|e| FetchError::io(rel.display(), e))?;
        }

        Ok(FetchedSource {
            path: dest.to_path_buf(),
            revision: None,
        })
    }
}

fn in_work_dir(rel: &Path) -> bool {
    rel.components()
        .next()
        .is_some_and(|c| c.as_os_str() == WORK_DIR_NAME)
}
