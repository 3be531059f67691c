//! Merge part outputs into `stage/`, then filter them into `prime/`.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use crate::core::{Manifest, Part};
use crate::resolver::InstallPlan;
use crate::stage::errors::AssemblyError;
use crate::stage::postprocess::PostStep;
use crate::util::config::ToolsConfig;
use crate::util::context::ProjectLayout;
use crate::util::fs::{copy_entry, ensure_dir, list_tree, remove_dir_all_if_exists};

/// Files each part placed in a tree, keyed by part in declaration order.
pub type Contributions = IndexMap<String, BTreeSet<PathBuf>>;

/// Result of a full assembly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assembly {
    /// Paths each part contributed to `stage/`
    pub staged: Contributions,
    /// Paths each part kept in `prime/`
    pub primed: Contributions,
}

impl Assembly {
    /// Every primed path, across all parts.
    pub fn primed_paths(&self) -> BTreeSet<&PathBuf> {
        self.primed.values().flatten().collect()
    }
}

pub struct Assembler<'a> {
    manifest: &'a Manifest,
    layout: &'a ProjectLayout,
    plan: &'a InstallPlan,
    /// Unpacked stage-package trees by package name
    packages: &'a IndexMap<String, PathBuf>,
}

impl<'a> Assembler<'a> {
    pub fn new(
        manifest: &'a Manifest,
        layout: &'a ProjectLayout,
        plan: &'a InstallPlan,
        packages: &'a IndexMap<String, PathBuf>,
    ) -> Self {
        Assembler {
            manifest,
            layout,
            plan,
            packages,
        }
    }

    /// Stage, prime, then post-process the primed tree.
    pub fn run(&self, tools: &ToolsConfig) -> Result<Assembly, AssemblyError> {
        let staged = self.stage()?;
        let primed = self.prime(&staged)?;
        self.post_process(&primed, tools)?;
        Ok(Assembly { staged, primed })
    }

    /// Build `stage/` from scratch.
    pub fn stage(&self) -> Result<Contributions, AssemblyError> {
        let stage = self.layout.stage_dir();
        reset_dir(&stage)?;

        let mut owners: HashMap<PathBuf, String> = HashMap::new();
        let mut contributions = Contributions::new();

        for part in self.manifest.parts.values() {
            let mut contributed = BTreeSet::new();

            // The install tree first, then the part's stage-packages laid
            // over it. Stage rules filter all of them.
            let install = self.layout.part_install(&part.name);
            let mut sources = vec![(
                install.clone(),
                format!("part `{}`", part.name),
                tree(&install)?,
            )];
            for package in self.plan.stage_packages_of(&part.name) {
                let Some(root) = self.packages.get(&package) else {
                    tracing::debug!("stage package {} has no unpacked tree", package);
                    continue;
                };
                sources.push((
                    root.clone(),
                    format!("stage package `{}`", package),
                    tree(root)?,
                ));
            }

            let all: BTreeSet<PathBuf> = sources
                .iter()
                .flat_map(|(_, _, files)| files.iter().cloned())
                .collect();
            check_literals(part, "stage", &part.stage, &all)?;

            for (root, owner, files) in &sources {
                for rel in part.stage.apply(files) {
                    place(root, &stage, &rel, owner.clone(), &mut owners)?;
                    contributed.insert(rel);
                }
            }

            tracing::debug!("part {} staged {} files", part.name, contributed.len());
            contributions.insert(part.name.clone(), contributed);
        }

        Ok(contributions)
    }

    /// Build `prime/` from `stage/` by applying each part's prime rules to
    /// the files it staged.
    ///
    /// Running it again over the same stage tree yields the same prime tree.
    pub fn prime(&self, staged: &Contributions) -> Result<Contributions, AssemblyError> {
        let stage = self.layout.stage_dir();
        let prime = self.layout.prime_dir();
        reset_dir(&prime)?;

        let mut primed = Contributions::new();
        for part in self.manifest.parts.values() {
            let files = staged.get(&part.name).cloned().unwrap_or_default();
            check_literals(part, "prime", &part.prime, &files)?;

            let kept = part.prime.apply(&files);
            for rel in &kept {
                let dst = prime.join(rel);
                if fs::symlink_metadata(&dst).is_ok() {
                    continue;
                }
                copy_entry(&stage.join(rel), &dst)
                    .map_err(|e| AssemblyError::io(dst.display(), e))?;
            }
            primed.insert(part.name.clone(), kept);
        }

        Ok(primed)
    }

    /// Run every part's post-processing steps over what it primed.
    pub fn post_process(
        &self,
        primed: &Contributions,
        tools: &ToolsConfig,
    ) -> Result<(), AssemblyError> {
        let prime = self.layout.prime_dir();
        for part in self.manifest.parts.values() {
            let Some(files) = primed.get(&part.name) else {
                continue;
            };
            for step in PostStep::for_part(part) {
                step.run(part, &prime, files, tools)?;
            }
        }
        Ok(())
    }
}

fn reset_dir(dir: &Path) -> Result<(), AssemblyError> {
    remove_dir_all_if_exists(dir).map_err(|e| AssemblyError::io(dir.display(), e))?;
    ensure_dir(dir).map_err(|e| AssemblyError::io(dir.display(), e))
}

fn tree(root: &Path) -> Result<BTreeSet<PathBuf>, AssemblyError> {
    let files = list_tree(root).map_err(|e| AssemblyError::io(root.display(), e))?;
    Ok(files.into_iter().collect())
}

fn check_literals(
    part: &Part,
    rules_kind: &'static str,
    rules: &crate::core::PrimeRules,
    files: &BTreeSet<PathBuf>,
) -> Result<(), AssemblyError> {
    match rules.unmatched_literals(files).first() {
        Some(rule) => Err(AssemblyError::MissingPath {
            part: part.name.clone(),
            rules: rules_kind,
            rule: rule.as_str().to_string(),
        }),
        None => Ok(()),
    }
}

/// Copy `root/rel` into `stage/rel`, refusing to overwrite different content.
fn place(
    root: &Path,
    stage: &Path,
    rel: &Path,
    owner: String,
    owners: &mut HashMap<PathBuf, String>,
) -> Result<(), AssemblyError> {
    let src = root.join(rel);
    let dst = stage.join(rel);

    if let Some(first) = owners.get(rel) {
        let same = same_content(&src, &dst).map_err(|e| AssemblyError::io(dst.display(), e))?;
        if !same {
            return Err(AssemblyError::Conflict {
                path: rel.to_path_buf(),
                first: first.clone(),
                second: owner,
            });
        }
        return Ok(());
    }

    copy_entry(&src, &dst).map_err(|e| AssemblyError::io(dst.display(), e))?;
    owners.insert(rel.to_path_buf(), owner);
    Ok(())
}

/// Files compare by bytes, symlinks by target.
fn same_content(a: &Path, b: &Path) -> std::io::Result<bool> {
    let (meta_a, meta_b) = (fs::symlink_metadata(a)?, fs::symlink_metadata(b)?);
    match (meta_a.file_type().is_symlink(), meta_b.file_type().is_symlink()) {
        (true, true) => Ok(fs::read_link(a)? == fs::read_link(b)?),
        (false, false) => Ok(meta_a.len() == meta_b.len() && fs::read(a)? == fs::read(b)?),
        _ => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Metadata, PluginId, PrimeRules};
    use crate::test_support::assertions::{assert_absent, assert_file};
    use tempfile::TempDir;

    struct Project {
        _tmp: TempDir,
        layout: ProjectLayout,
        packages: IndexMap<String, PathBuf>,
    }

    impl Project {
        fn new() -> Self {
            let tmp = TempDir::new().unwrap();
            let layout = ProjectLayout::at(tmp.path().join(".dock"));
            Project {
                _tmp: tmp,
                layout,
                packages: IndexMap::new(),
            }
        }

        fn install(&self, part: &str, rel: &str, content: &str) {
            let path = self.layout.part_install(part).join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }

        fn package(&mut self, name: &str, rel: &str, content: &str) {
            let root = self.layout.stage_packages_dir().join(name);
            let path = root.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
            self.packages.insert(name.to_string(), root);
        }
    }

    fn manifest(parts: Vec<Part>) -> Manifest {
        Manifest {
            metadata: Metadata {
                name: "zed".into(),
                version: "0.1.0".into(),
                ..Default::default()
            },
            parts: parts.into_iter().map(|p| (p.name.clone(), p)).collect(),
            apps: IndexMap::new(),
        }
    }

    fn rules(raw: &[&str]) -> PrimeRules {
        PrimeRules::parse(raw).unwrap()
    }

    fn plan_for(manifest: &Manifest) -> InstallPlan {
        InstallPlan::for_manifest(manifest, |_| Vec::new())
    }

    #[test]
    fn test_stage_merges_parts_and_packages() {
        let mut project = Project::new();
        project.install("zed", "bin/zed", "#!/bin/sh\n");
        project.package("libasound2", "usr/lib/libasound.so.2", "alsa");

        let manifest = manifest(vec![
            Part::new("zed", PluginId::Rust),
            Part::new("deps", PluginId::Nil).with_stage_package("libasound2"),
        ]);
        let plan = plan_for(&manifest);
        let assembler = Assembler::new(&manifest, &project.layout, &plan, &project.packages);
        let staged = assembler.stage().unwrap();

        assert_file(&project.layout.stage_dir(), "bin/zed");
        assert_file(&project.layout.stage_dir(), "usr/lib/libasound.so.2");
        assert!(staged["deps"].contains(Path::new("usr/lib/libasound.so.2")));
        assert!(staged["zed"].contains(Path::new("bin/zed")));
    }

    #[test]
    fn test_conflicting_content_is_an_error() {
        let project = Project::new();
        project.install("zed", "share/doc/README", "zed");
        project.install("zed-cli", "share/doc/README", "zed-cli");

        let manifest = manifest(vec![
            Part::new("zed", PluginId::Dump),
            Part::new("zed-cli", PluginId::Dump),
        ]);
        let plan = plan_for(&manifest);
        let err = Assembler::new(&manifest, &project.layout, &plan, &project.packages)
            .stage()
            .unwrap_err();

        match err {
            AssemblyError::Conflict {
                path,
                first,
                second,
            } => {
                assert_eq!(path, Path::new("share/doc/README"));
                assert_eq!(first, "part `zed`");
                assert_eq!(second, "part `zed-cli`");
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn test_identical_content_is_shared() {
        let mut project = Project::new();
        project.install("zed", "share/licenses/MIT", "MIT");
        project.install("zed-cli", "share/licenses/MIT", "MIT");
        project.package("libssl-dev", "usr/include/openssl/ssl.h", "/* ssl */");

        let mut zed = Part::new("zed", PluginId::Dump).with_stage_package("libssl-dev");
        zed.stage = rules(&["share", "usr"]);
        let manifest = manifest(vec![
            zed,
            Part::new("zed-cli", PluginId::Dump).with_stage_package("libssl-dev"),
        ]);
        let plan = plan_for(&manifest);
        let staged = Assembler::new(&manifest, &project.layout, &plan, &project.packages)
            .stage()
            .unwrap();

        assert!(staged["zed-cli"].contains(Path::new("usr/include/openssl/ssl.h")));
        assert!(staged["zed"].contains(Path::new("share/licenses/MIT")));
    }

    #[test]
    fn test_stage_rules_filter_stage_packages() {
        let mut project = Project::new();
        project.install("zed", "bin/zed", "zed");
        project.package("libasound2", "usr/lib/libasound.so.2", "alsa");
        project.package("libasound2", "usr/share/doc/libasound2/copyright", "GPL");

        let mut zed = Part::new("zed", PluginId::Dump).with_stage_package("libasound2");
        zed.stage = rules(&["bin/zed", "usr/lib", "-usr/share/doc"]);
        let manifest = manifest(vec![zed]);
        let plan = plan_for(&manifest);
        let staged = Assembler::new(&manifest, &project.layout, &plan, &project.packages)
            .stage()
            .unwrap();

        let stage = project.layout.stage_dir();
        assert_file(&stage, "bin/zed");
        assert_file(&stage, "usr/lib/libasound.so.2");
        assert_absent(&stage, "usr/share/doc/libasound2/copyright");
        assert_eq!(staged["zed"].len(), 2);
    }

    #[test]
    fn test_stage_rules_filter_install_tree() {
        let project = Project::new();
        project.install("zed", "bin/zed", "zed");
        project.install("zed", "include/zed.h", "header");

        let mut zed = Part::new("zed", PluginId::Dump);
        zed.stage = rules(&["-include"]);
        let manifest = manifest(vec![zed]);
        let plan = plan_for(&manifest);
        Assembler::new(&manifest, &project.layout, &plan, &project.packages)
            .stage()
            .unwrap();

        assert_file(&project.layout.stage_dir(), "bin/zed");
        assert_absent(&project.layout.stage_dir(), "include/zed.h");
    }

    #[test]
    fn test_prime_applies_rules_per_part() {
        let project = Project::new();
        project.install("zed", "bin/zed", "zed");
        project.install("zed", "lib/debug/zed.debug", "symbols");
        project.install("docs", "share/doc/zed/index.html", "<html>");

        let mut zed = Part::new("zed", PluginId::Dump);
        zed.prime = rules(&["-lib/debug"]);
        let mut docs = Part::new("docs", PluginId::Dump);
        docs.prime = rules(&["-share/doc"]);
        let manifest = manifest(vec![zed, docs]);
        let plan = plan_for(&manifest);
        let assembly = Assembler::new(&manifest, &project.layout, &plan, &project.packages)
            .run(&ToolsConfig::default())
            .unwrap();

        let prime = project.layout.prime_dir();
        assert_file(&prime, "bin/zed");
        assert_absent(&prime, "lib/debug/zed.debug");
        assert_absent(&prime, "share/doc/zed/index.html");
        assert_file(&project.layout.stage_dir(), "lib/debug/zed.debug");
        assert_eq!(assembly.primed_paths().len(), 1);
    }

    #[test]
    fn test_prime_is_idempotent() {
        let project = Project::new();
        project.install("zed", "bin/zed", "zed");
        project.install("zed", "share/zed/themes/one.json", "{}");

        let mut zed = Part::new("zed", PluginId::Dump);
        zed.prime = rules(&["bin", "share/zed/themes/*.json"]);
        let manifest = manifest(vec![zed]);
        let plan = plan_for(&manifest);
        let assembler = Assembler::new(&manifest, &project.layout, &plan, &project.packages);

        let staged = assembler.stage().unwrap();
        let first = assembler.prime(&staged).unwrap();
        let listing = list_tree(&project.layout.prime_dir()).unwrap();
        let second = assembler.prime(&staged).unwrap();

        assert_eq!(first, second);
        assert_eq!(listing, list_tree(&project.layout.prime_dir()).unwrap());
        assert_eq!(listing.len(), 2);
    }

    #[test]
    fn test_missing_literal_rule() {
        let project = Project::new();
        project.install("zed", "bin/zed", "zed");

        let mut zed = Part::new("zed", PluginId::Dump);
        zed.prime = rules(&["bin/zed", "bin/zed-cli", "share/*"]);
        let manifest = manifest(vec![zed]);
        let plan = plan_for(&manifest);
        let err = Assembler::new(&manifest, &project.layout, &plan, &project.packages)
            .run(&ToolsConfig::default())
            .unwrap_err();

        match err {
            AssemblyError::MissingPath { part, rules, rule } => {
                assert_eq!(part, "zed");
                assert_eq!(rules, "prime");
                assert_eq!(rule, "bin/zed-cli");
            }
            other => panic!("expected missing path, got {other:?}"),
        }
    }
}
