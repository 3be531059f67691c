use crate::builder::plugins::{BuildStep, Plugin, PluginContext};
use crate::core::{Part, PluginId};

/// `cargo install` of the crate at the source root.
///
/// Binaries land in `<install>/bin`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RustPlugin;

impl Plugin for RustPlugin {
    fn id(&self) -> PluginId {
        PluginId::Rust
    }

    fn build_packages(&self) -> Vec<String> {
        vec!["cargo".to_string()]
    }

    fn steps(&self, _part: &Part, ctx: &PluginContext<'_>) -> Vec<BuildStep> {
        vec![BuildStep::run(
            "cargo",
            [
                "install".to_string(),
                "--locked".to_string(),
                "--path".to_string(),
                ".".to_string(),
                "--root".to_string(),
                ctx.install.display().to_string(),
                "--jobs".to_string(),
                ctx.jobs.to_string(),
            ],
            ctx.build,
        )]
    }
}
