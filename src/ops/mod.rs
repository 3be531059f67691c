//! High-level operations.
//!
//! This module contains the implementation of Dock commands.

pub mod dock_build;
pub mod dock_clean;
pub mod dock_init;
pub mod dock_pack;
pub mod dock_plan;
pub mod validate;

pub use dock_build::{
    build, install_plan, load_project, BuildReport, LifecycleError, LifecycleFailure,
    LifecycleOptions, Project, Stage,
};
pub use dock_clean::clean;
pub use dock_init::{init_project, InitOptions};
pub use dock_pack::{pack, PackOptions, PackReport};
pub use dock_plan::{plan, PlanReport};
pub use validate::{validate, ValidateReport};
