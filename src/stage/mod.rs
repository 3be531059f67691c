//! Stage and prime assembly.
//!
//! Merges part install trees and stage-package trees into `stage/`, filters
//! them into `prime/`, then runs the post-processing steps selected by each
//! part's build attributes.

pub mod assembler;
pub mod errors;
pub mod postprocess;

pub use assembler::{Assembler, Assembly};
pub use errors::AssemblyError;
pub use postprocess::{is_elf, PostStep};
