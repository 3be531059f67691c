use crate::builder::plugins::{BuildStep, Plugin, PluginContext};
use crate::core::{Part, PluginId};

/// `make` then `make install DESTDIR=<install>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakePlugin;

impl Plugin for MakePlugin {
    fn id(&self) -> PluginId {
        PluginId::Make
    }

    fn build_packages(&self) -> Vec<String> {
        vec!["make".to_string()]
    }

    fn steps(&self, _part: &Part, ctx: &PluginContext<'_>) -> Vec<BuildStep> {
        vec![
            BuildStep::run("make", [format!("-j{}", ctx.jobs)], ctx.build),
            BuildStep::run(
                "make",
                [
                    "install".to_string(),
                    format!("DESTDIR={}", ctx.install.display()),
                ],
                ctx.build,
            ),
        ]
    }
}
