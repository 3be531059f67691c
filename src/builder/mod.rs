//! Part build execution.
//!
//! Fetches each part's source, runs its plugin (or `override-build`) in the
//! merged build environment, and tracks every part's lifecycle state.

pub mod environment;
pub mod errors;
pub mod events;
pub mod executor;
pub mod plugins;
pub mod state;

pub use environment::BuildEnvironment;
pub use errors::BuildError;
pub use events::BuildEvent;
pub use executor::{check_history, BuildExecutor, BuildOptions, BuildOutcome};
pub use plugins::{BuildStep, Plugin, PluginContext, PluginRegistry};
pub use state::{PartState, PartStates};
