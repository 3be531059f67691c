//! Package emission: bind apps to the primed tree, write the descriptor and
//! optionally pack the tree into an archive.

pub mod archive;
pub mod descriptor;
pub mod errors;

pub use archive::{archive_name, list_entries, pack, PackedArchive};
pub use descriptor::{emit, resolve_apps, Descriptor, DescriptorApp, DESCRIPTOR_PATH};
pub use errors::EntryPointError;
