//! Git sources, fetched with libgit2.
//!
//! A part's repository is initialised fresh in its `src/` directory, the
//! requested ref is fetched (shallow when `source-depth` is set) and the
//! working tree is hard-reset to the resolved commit.

use std::path::Path;
use std::time::Instant;

use git2::{
    AutotagOption, DescribeFormatOptions, DescribeOptions, Direction, ErrorClass, FetchOptions,
    RemoteCallbacks, Repository, ResetType,
};

use crate::core::{GitRef, SourceSpec, SourceType};
use crate::sources::errors::FetchError;
use crate::sources::source::{FetchContext, FetchedSource, Fetcher};

const REMOTE: &str = "origin";
const FALLBACK_BRANCHES: [&str; 2] = ["main", "master"];

#[derive(Debug, Default, Clone, Copy)]
pub struct GitFetcher;

impl GitFetcher {
    pub fn new() -> Self {
        GitFetcher
    }
}

impl Fetcher for GitFetcher {
    fn kind(&self) -> SourceType {
        SourceType::Git
    }

    fn fetch(
        &self,
        source: &SourceSpec,
        dest: &Path,
        ctx: &FetchContext<'_>,
    ) -> Result<FetchedSource, FetchError> {
        let location = source.location.as_str();
        ctx.check_cancelled(location)?;

        let url = remote_url(location, ctx);
        tracing::info!("fetching {} into {}", url, dest.display());

        let repo = Repository::init(dest).map_err(|e| FetchError::git(location, e))?;
        let mut remote = repo
            .remote(REMOTE, &url)
            .map_err(|e| FetchError::git(location, e))?;

        let default_branch = match &source.reference {
            None => default_branch(&mut remote),
            Some(_) => None,
        };
        let refspecs = refspecs(source.reference.as_ref());

        let started = Instant::now();
        let mut callbacks = RemoteCallbacks::new();
        callbacks.transfer_progress(|_| {
            let timed_out = ctx.timeout.is_some_and(|t| started.elapsed() > t);
            !ctx.cancel.is_cancelled() && !timed_out
        });

        let mut options = FetchOptions::new();
        options.remote_callbacks(callbacks);
        options.download_tags(AutotagOption::All);
        if let Some(depth) = source.depth {
            if is_local(location) {
                tracing::debug!("ignoring source-depth {} for local repository {}", depth, url);
            } else {
                options.depth(depth as i32);
            }
        }

        if let Err(err) = remote.fetch(&refspecs, Some(&mut options), None) {
            if ctx.cancel.is_cancelled() {
                return Err(FetchError::Cancelled {
                    location: location.to_string(),
                });
            }
            if ctx.timeout.is_some_and(|t| started.elapsed() > t) {
                return Err(FetchError::Network {
                    location: location.to_string(),
                    message: "timed out".to_string(),
                    transient: true,
                });
            }
            return Err(fetch_error(location, err));
        }

        let commit = resolve(&repo, source, default_branch.as_deref())?;
        repo.set_head_detached(commit.id())
            .map_err(|e| FetchError::git(location, e))?;
        repo.reset(commit.as_object(), ResetType::Hard, None)
            .map_err(|e| FetchError::git(location, e))?;

        Ok(FetchedSource {
            path: dest.to_path_buf(),
            revision: Some(commit.id().to_string()),
        })
    }
}

/// `git describe --tags` of a checkout.
///
/// Shallow checkouts are rejected up front: their history is cut off, so
/// the nearest tag may simply not have been fetched.
pub fn describe(checkout: &Path, location: &str) -> Result<String, FetchError> {
    let repo = Repository::open(checkout).map_err(|e| FetchError::git(location, e))?;
    if repo.is_shallow() {
        return Err(FetchError::ShallowHistory {
            location: location.to_string(),
            depth: shallow_depth(&repo),
            operation: "`git describe`".to_string(),
        });
    }

    let mut options = DescribeOptions::new();
    options.describe_tags();
    let description = repo
        .describe(&options)
        .map_err(|e| FetchError::git(location, e))?;
    description
        .format(Some(&DescribeFormatOptions::new()))
        .map_err(|e| FetchError::git(location, e))
}

fn shallow_depth(repo: &Repository) -> u32 {
    let Ok(mut walk) = repo.revwalk() else {
        return 1;
    };
    if walk.push_head().is_err() {
        return 1;
    }
    walk.count().max(1) as u32
}

fn is_local(location: &str) -> bool {
    location.starts_with("file://") || !(location.contains("://") || location.starts_with("git@"))
}

fn remote_url(location: &str, ctx: &FetchContext<'_>) -> String {
    if is_local(location) {
        ctx.resolve_local(location).display().to_string()
    } else {
        location.to_string()
    }
}

fn refspecs(reference: Option<&GitRef>) -> Vec<String> {
    match reference {
        Some(GitRef::Tag(tag)) => vec![format!("+refs/tags/{0}:refs/tags/{0}", tag)],
        Some(GitRef::Branch(branch)) => {
            vec![format!("+refs/heads/{0}:refs/remotes/{1}/{0}", branch, REMOTE)]
        }
        Some(GitRef::Commit(_)) | None => {
            vec![format!("+refs/heads/*:refs/remotes/{}/*", REMOTE)]
        }
    }
}

/// Ask the remote for its HEAD branch.
fn default_branch(remote: &mut git2::Remote<'_>) -> Option<String> {
    let connection = match remote.connect_auth(Direction::Fetch, None, None) {
        Ok(connection) => connection,
        Err(err) => {
            tracing::debug!("could not query default branch: {}", err);
            return None;
        }
    };
    let branch = connection.default_branch().ok()?;
    let name = branch.as_str()?.strip_prefix("refs/heads/")?.to_string();
    Some(name)
}

fn resolve<'r>(
    repo: &'r Repository,
    source: &SourceSpec,
    default_branch: Option<&str>,
) -> Result<git2::Commit<'r>, FetchError> {
    let not_found = |reference: String| FetchError::RefNotFound {
        location: source.location.clone(),
        reference,
        depth: source.depth,
    };

    match &source.reference {
        Some(GitRef::Tag(tag)) => repo
            .find_reference(&format!("refs/tags/{}", tag))
            .and_then(|r| r.peel_to_commit())
            .map_err(|_| not_found(format!("tag `{}`", tag))),
        Some(GitRef::Branch(branch)) => repo
            .find_reference(&format!("refs/remotes/{}/{}", REMOTE, branch))
            .and_then(|r| r.peel_to_commit())
            .map_err(|_| not_found(format!("branch `{}`", branch))),
        Some(GitRef::Commit(commit)) => repo
            .revparse_single(commit)
            .and_then(|o| o.peel_to_commit())
            .map_err(|_| not_found(format!("commit `{}`", commit))),
        None => {
            let candidates = default_branch
                .into_iter()
                .chain(FALLBACK_BRANCHES)
                .map(|b| format!("refs/remotes/{}/{}", REMOTE, b));
            for name in candidates {
                if let Ok(commit) = repo.find_reference(&name).and_then(|r| r.peel_to_commit()) {
                    return Ok(commit);
                }
            }
            Err(not_found("default branch".to_string()))
        }
    }
}

fn fetch_error(location: &str, err: git2::Error) -> FetchError {
    match err.class() {
        ErrorClass::Net | ErrorClass::Http | ErrorClass::Ssl => FetchError::Network {
            location: location.to_string(),
            message: err.message().to_string(),
            transient: err.class() == ErrorClass::Net,
        },
        _ => FetchError::git(location, err),
    }
}
