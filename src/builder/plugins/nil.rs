use crate::builder::plugins::{BuildStep, Plugin, PluginContext};
use crate::core::{Part, PluginId};

/// Builds nothing; the part exists for its stage-packages.
#[derive(Debug, Clone, Copy, Default)]
pub struct NilPlugin;

impl Plugin for NilPlugin {
    fn id(&self) -> PluginId {
        PluginId::Nil
    }

    fn steps(&self, _part: &Part, _ctx: &PluginContext<'_>) -> Vec<BuildStep> {
        Vec::new()
    }
}
