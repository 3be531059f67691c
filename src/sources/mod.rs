//! Part sources.
//!
//! Fetchers bring a part's declared source (git repository, tarball or
//! local directory) into its `src/` tree.

pub mod cache;
pub mod errors;
pub mod git;
pub mod local;
pub mod source;
pub mod tarball;

pub use cache::SourceCache;
pub use errors::FetchError;
pub use git::{describe, GitFetcher};
pub use local::LocalFetcher;
pub use source::{FetchContext, FetchedSource, Fetcher};
pub use tarball::TarFetcher;
