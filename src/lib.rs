//! Dock - a manifest-driven build-and-bundle orchestrator
//!
//! A `dock.toml` manifest declares parts (build units with a source and a
//! build plugin) and apps (entry points). Dock resolves host packages,
//! fetches and builds every part, merges their outputs into a stage tree,
//! filters it into a prime tree, and emits a package descriptor.

pub mod builder;
pub mod core;
pub mod emitter;
pub mod ops;
pub mod resolver;
pub mod sources;
pub mod stage;
pub mod util;

/// Test utilities for Dock unit tests.
///
/// This module is only available when compiling with `--cfg test`. It
/// provides manifest builders, on-disk package repositories and script
/// helpers.
#[cfg(test)]
pub mod test_support;

pub use core::{App, Manifest, Part};
pub use util::context::GlobalContext;
