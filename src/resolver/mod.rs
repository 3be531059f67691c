//! Host package resolution.
//!
//! Expands the build-packages, build-snaps and stage-packages of every part
//! into a deduplicated [`InstallPlan`], checks each name against the host
//! package manager, and installs or unpacks what the build needs. Unknown
//! names are fatal; nothing is guessed or substituted.

pub mod errors;
pub mod host;
pub mod plan;
pub mod resolve;

pub use errors::ResolveError;
pub use host::{HostManagers, PackageInfo, PackageManager};
pub use plan::{InstallPlan, Namespace, PlannedPackage, Purpose};
pub use resolve::{Resolution, ResolvedPackage, Resolver};
