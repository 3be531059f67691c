//! Shared download cache.
//!
//! Parts that declare the same source share a single fetch. Each distinct
//! source gets its own cell, so unrelated downloads proceed concurrently
//! while identical ones wait for the first.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use crate::core::{SourceSpec, SourceType};
use crate::sources::errors::FetchError;
use crate::sources::git::GitFetcher;
use crate::sources::local::LocalFetcher;
use crate::sources::source::{FetchContext, FetchedSource, Fetcher};
use crate::sources::tarball::TarFetcher;
use crate::util::fs::{copy_dir_all, remove_dir_all_if_exists};
use crate::util::hash::CacheKey;

type FetchCell = Arc<OnceLock<Result<FetchedSource, FetchError>>>;

/// Per-invocation cache of fetched sources under `.dock/downloads`.
pub struct SourceCache {
    root: PathBuf,
    fetchers: HashMap<SourceType, Arc<dyn Fetcher>>,
    /// Extra attempts for transient failures
    retries: u32,
    cells: Mutex<HashMap<String, FetchCell>>,
}

impl SourceCache {
    /// Cache rooted at `root` with the built-in git, tar and local fetchers.
    pub fn new(root: impl Into<PathBuf>, retries: u32) -> Self {
        SourceCache {
            root: root.into(),
            fetchers: HashMap::new(),
            retries,
            cells: Mutex::new(HashMap::new()),
        }
        .with_fetcher(Arc::new(GitFetcher::new()))
        .with_fetcher(Arc::new(TarFetcher::new()))
        .with_fetcher(Arc::new(LocalFetcher::new()))
    }

    /// Register (or replace) the fetcher for its source type.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetchers.insert(fetcher.kind(), fetcher);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Key identifying a source: everything that affects what is fetched.
    pub fn key(source: &SourceSpec) -> String {
        let mut key = CacheKey::new();
        key.update_str(source.kind.as_str())
            .update_str(&source.location)
            .update_opt(source.reference.as_ref().map(|r| r.key()))
            .update_opt(source.reference.as_ref().map(|r| r.value()))
            .update_opt(source.depth.map(|d| d.to_string()).as_deref())
            .update_opt(source.checksum.as_ref().map(|c| c.hex()));
        format!("{}-{}", source.kind, key.finish_short())
    }

    /// Fetch `source` into the cache, or wait for an identical fetch already
    /// under way.
    pub fn fetch(
        &self,
        source: &SourceSpec,
        ctx: &FetchContext<'_>,
    ) -> Result<FetchedSource, FetchError> {
        let key = Self::key(source);
        let cell = {
            let mut cells = self.cells.lock().unwrap_or_else(|e| e.into_inner());
            cells.entry(key.clone()).or_default().clone()
        };
        cell.get_or_init(|| self.fetch_with_retry(source, &self.root.join(&key), ctx))
            .clone()
    }

    /// Fetch `source` and give `dest` its own copy of the tree.
    pub fn checkout(
        &self,
        source: &SourceSpec,
        dest: &Path,
        ctx: &FetchContext<'_>,
    ) -> Result<FetchedSource, FetchError> {
        let cached = self.fetch(source, ctx)?;
        copy_dir_all(&cached.path, dest).map_err(|e| FetchError::io(dest.display(), e))?;
        Ok(FetchedSource {
            path: dest.to_path_buf(),
            revision: cached.revision,
        })
    }

    fn fetch_with_retry(
        &self,
        source: &SourceSpec,
        dest: &Path,
        ctx: &FetchContext<'_>,
    ) -> Result<FetchedSource, FetchError> {
        let fetcher = self
            .fetchers
            .get(&source.kind)
            .ok_or_else(|| FetchError::Io {
                message: format!("no fetcher registered for {} sources", source.kind),
            })?;

        let mut attempt = 0;
        loop {
            let result = fetcher.fetch(source, dest, ctx);
            match result {
                Err(err) if err.is_transient() && attempt < self.retries => {
                    attempt += 1;
                    tracing::warn!("{}; retrying ({}/{})", err, attempt, self.retries);
                    remove_dir_all_if_exists(dest)
                        .map_err(|e| FetchError::io(dest.display(), e))?;
                }
                other => return other,
            }
        }
    }
}

impl std::fmt::Debug for SourceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceCache")
            .field("root", &self.root)
            .field("retries", &self.retries)
            .finish_non_exhaustive()
    }
}
