//! Core data structures for Dock.
//!
//! This module contains the manifest model used throughout Dock:
//! - The manifest itself and its metadata
//! - Parts, sources and build attributes
//! - Apps (exposed entry points)
//! - Stage/prime path rules and build ordering

pub mod app;
pub mod grammar;
pub mod manifest;
pub mod order;
pub mod part;
pub mod prime;
pub mod source_map;

pub use app::App;
pub use manifest::{Confinement, Grade, Manifest, ManifestError, Metadata, ParseOptions};
pub use order::{OrderError, PartGraph};
pub use part::{BuildAttribute, Checksum, GitRef, Part, PluginId, SourceSpec, SourceType};
pub use prime::{PrimeRule, PrimeRules};
