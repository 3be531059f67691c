//! Post-processing steps run over the primed tree.
//!
//! Steps are selected by a part's build attributes, one attribute per step.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::core::{BuildAttribute, Part};
use crate::stage::errors::AssemblyError;
use crate::util::config::ToolsConfig;
use crate::util::fs::{list_tree, relative_path};
use crate::util::process::ProcessBuilder;

const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PostStep {
    /// Point ELF RPATHs at the package's library directories.
    Patchelf,
}

impl PostStep {
    /// The step an attribute turns on, if any.
    pub fn for_attribute(attribute: BuildAttribute) -> Option<PostStep> {
        match attribute {
            BuildAttribute::EnablePatchelf => Some(PostStep::Patchelf),
            BuildAttribute::NoPatchelf => None,
        }
    }

    /// Steps for `part`, in attribute order.
    pub fn for_part(part: &Part) -> Vec<PostStep> {
        part.build_attributes
            .iter()
            .filter_map(|a| PostStep::for_attribute(*a))
            .filter(|step| !step.suppressed_by(part))
            .collect()
    }

    fn suppressed_by(&self, part: &Part) -> bool {
        match self {
            PostStep::Patchelf => part.has_attribute(BuildAttribute::NoPatchelf),
        }
    }

    pub fn run(
        &self,
        part: &Part,
        prime: &Path,
        files: &BTreeSet<PathBuf>,
        tools: &ToolsConfig,
    ) -> Result<(), AssemblyError> {
        match self {
            PostStep::Patchelf => patchelf(part, prime, files, tools),
        }
    }
}

/// Whether `path` is a regular file starting with the ELF magic.
pub fn is_elf(path: &Path) -> bool {
    let Ok(meta) = std::fs::symlink_metadata(path) else {
        return false;
    };
    if !meta.is_file() {
        return false;
    }
    let mut magic = [0u8; 4];
    File::open(path)
        .and_then(|mut f| f.read_exact(&mut magic))
        .map(|_| magic == ELF_MAGIC)
        .unwrap_or(false)
}

/// Directories (relative to `prime`) that hold shared libraries.
pub fn library_dirs<'a, I>(paths: I) -> BTreeSet<PathBuf>
where
    I: IntoIterator<Item = &'a PathBuf>,
{
    paths
        .into_iter()
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(".so") || n.contains(".so."))
        })
        .filter_map(|p| p.parent().map(Path::to_path_buf))
        .collect()
}

/// The `$ORIGIN`-relative RPATH for `file` given the package's library dirs.
pub fn rpath_for(file: &Path, lib_dirs: &BTreeSet<PathBuf>) -> String {
    let origin = file.parent().unwrap_or(Path::new(""));
    lib_dirs
        .iter()
        .map(|dir| {
            let rel = relative_path(origin, dir);
            if rel.as_os_str().is_empty() {
                "$ORIGIN".to_string()
            } else {
                format!("$ORIGIN/{}", rel.display())
            }
        })
        .collect::<Vec<_>>()
        .join(":")
}

fn patchelf(
    part: &Part,
    prime: &Path,
    files: &BTreeSet<PathBuf>,
    tools: &ToolsConfig,
) -> Result<(), AssemblyError> {
    let all = list_tree(prime).map_err(|e| AssemblyError::io(prime.display(), e))?;
    let lib_dirs = library_dirs(&all);
    if lib_dirs.is_empty() {
        tracing::debug!("part {}: no library directories, skipping patchelf", part.name);
        return Ok(());
    }

    let program = tools.patchelf();
    for rel in files.iter().filter(|rel| is_elf(&prime.join(rel))) {
        let rpath = rpath_for(rel, &lib_dirs);
        tracing::debug!("patchelf {} rpath={}", rel.display(), rpath);
        ProcessBuilder::new(&program)
            .args(["--force-rpath", "--set-rpath"])
            .arg(&rpath)
            .arg(prime.join(rel))
            .exec_and_check()
            .map_err(|e| AssemblyError::Patchelf {
                part: part.name.clone(),
                path: rel.clone(),
                message: format!("{:#}", e),
            })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PluginId;
    use crate::test_support::write_script;
    use tempfile::TempDir;

    fn elf(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, [0x7f, b'E', b'L', b'F', 2, 1, 1, 0]).unwrap();
    }

    fn part_with(attributes: &[BuildAttribute]) -> Part {
        let mut part = Part::new("zed", PluginId::Rust);
        part.build_attributes.extend(attributes.iter().copied());
        part
    }

    #[test]
    fn test_is_elf() {
        let tmp = TempDir::new().unwrap();
        elf(&tmp.path().join("bin/zed"));
        std::fs::write(tmp.path().join("zed.sh"), "#!/bin/sh\n").unwrap();
        std::fs::write(tmp.path().join("short"), [0x7f]).unwrap();

        assert!(is_elf(&tmp.path().join("bin/zed")));
        assert!(!is_elf(&tmp.path().join("zed.sh")));
        assert!(!is_elf(&tmp.path().join("short")));
        assert!(!is_elf(&tmp.path().join("bin")));
    }

    #[test]
    fn test_rpath_is_origin_relative() {
        let libs: BTreeSet<PathBuf> = ["lib", "usr/lib/x86_64-linux-gnu"]
            .into_iter()
            .map(PathBuf::from)
            .collect();
        assert_eq!(
            rpath_for(Path::new("bin/zed"), &libs),
            "$ORIGIN/../lib:$ORIGIN/../usr/lib/x86_64-linux-gnu"
        );
        assert_eq!(
            rpath_for(Path::new("lib/libzed.so"), &libs),
            "$ORIGIN:$ORIGIN/../usr/lib/x86_64-linux-gnu"
        );
    }

    #[test]
    fn test_library_dirs() {
        let paths: Vec<PathBuf> = [
            "bin/zed",
            "lib/libzed.so",
            "usr/lib/libasound.so.2",
            "share/x.sol",
        ]
        .into_iter()
        .map(PathBuf::from)
        .collect();
        let dirs: Vec<_> = library_dirs(&paths).into_iter().collect();
        assert_eq!(dirs, [PathBuf::from("lib"), PathBuf::from("usr/lib")]);
    }

    #[test]
    fn test_steps_keyed_by_attribute() {
        assert!(PostStep::for_part(&part_with(&[])).is_empty());
        assert_eq!(
            PostStep::for_part(&part_with(&[BuildAttribute::EnablePatchelf])),
            [PostStep::Patchelf]
        );
        assert!(PostStep::for_part(&part_with(&[BuildAttribute::NoPatchelf])).is_empty());
    }

    #[test]
    fn test_patchelf_runs_on_part_elves() {
        let tmp = TempDir::new().unwrap();
        let prime = tmp.path().join("prime");
        elf(&prime.join("bin/zed"));
        elf(&prime.join("lib/libzed.so"));
        std::fs::write(prime.join("bin/zed-wrapper"), "#!/bin/sh\n").unwrap();

        let log = tmp.path().join("patchelf.log");
        let script = write_script(
            &tmp.path().join("patchelf"),
            &format!("echo \"$@\" >> {}\n", log.display()),
        );
        let tools = ToolsConfig {
            patchelf: Some(script),
            ..Default::default()
        };

        let files: BTreeSet<PathBuf> = ["bin/zed", "bin/zed-wrapper"]
            .into_iter()
            .map(PathBuf::from)
            .collect();
        let part = part_with(&[BuildAttribute::EnablePatchelf]);
        PostStep::Patchelf.run(&part, &prime, &files, &tools).unwrap();

        let calls = std::fs::read_to_string(&log).unwrap();
        let lines: Vec<_> = calls.lines().collect();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("--force-rpath --set-rpath $ORIGIN/../lib "));
        assert!(lines[0].ends_with("bin/zed"));
    }

    #[test]
    fn test_patchelf_failure() {
        let tmp = TempDir::new().unwrap();
        let prime = tmp.path().join("prime");
        elf(&prime.join("bin/zed"));
        elf(&prime.join("lib/libzed.so"));

        let script = write_script(&tmp.path().join("patchelf"), "echo 'not an ELF' >&2\nexit 1\n");
        let tools = ToolsConfig {
            patchelf: Some(script),
            ..Default::default()
        };
        let files = BTreeSet::from([PathBuf::from("bin/zed")]);
        let part = part_with(&[BuildAttribute::EnablePatchelf]);

        match PostStep::Patchelf.run(&part, &prime, &files, &tools) {
            Err(AssemblyError::Patchelf { part, path, .. }) => {
                assert_eq!(part, "zed");
                assert_eq!(path, Path::new("bin/zed"));
            }
            other => panic!("expected patchelf error, got {other:?}"),
        }
    }
}
