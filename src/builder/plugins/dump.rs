use crate::builder::plugins::{BuildStep, Plugin, PluginContext};
use crate::core::{Part, PluginId};

/// Installs the source tree as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct DumpPlugin;

impl Plugin for DumpPlugin {
    fn id(&self) -> PluginId {
        PluginId::Dump
    }

    fn steps(&self, _part: &Part, ctx: &PluginContext<'_>) -> Vec<BuildStep> {
        vec![BuildStep::CopyTree {
            from: ctx.build.to_path_buf(),
            to: ctx.install.to_path_buf(),
        }]
    }
}
