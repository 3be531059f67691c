use crate::builder::plugins::{BuildStep, Plugin, PluginContext};
use crate::core::{Part, PluginId};

/// Out-of-tree CMake build installed straight into the part's install tree.
#[derive(Debug, Clone, Copy, Default)]
pub struct CmakePlugin;

const CMAKE_BUILD_DIR: &str = "cmake-build";

impl Plugin for CmakePlugin {
    fn id(&self) -> PluginId {
        PluginId::Cmake
    }

    fn build_packages(&self) -> Vec<String> {
        vec!["cmake".to_string()]
    }

    fn steps(&self, _part: &Part, ctx: &PluginContext<'_>) -> Vec<BuildStep> {
        let out = ctx.build.join(CMAKE_BUILD_DIR);
        let out = out.display().to_string();
        vec![
            BuildStep::run(
                "cmake",
                [
                    "-S".to_string(),
                    ctx.build.display().to_string(),
                    "-B".to_string(),
                    out.clone(),
                    "-DCMAKE_BUILD_TYPE=Release".to_string(),
                    format!("-DCMAKE_INSTALL_PREFIX={}", ctx.install.display()),
                ],
                ctx.build,
            ),
            BuildStep::run(
                "cmake",
                [
                    "--build".to_string(),
                    out.clone(),
                    "--parallel".to_string(),
                    ctx.jobs.to_string(),
                ],
                ctx.build,
            ),
            BuildStep::run("cmake", ["--install".to_string(), out], ctx.build),
        ]
    }
}
