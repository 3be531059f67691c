//! Pack the prime tree into `<name>_<version>_<arch>.dock`.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use tempfile::NamedTempFile;

use crate::emitter::descriptor::{Descriptor, DESCRIPTOR_PATH};
use crate::util::fs::{ensure_dir, list_tree};
use crate::util::hash::sha256_file;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedArchive {
    pub path: PathBuf,
    pub sha256: String,
    /// Number of entries written
    pub entries: usize,
}

pub fn archive_name(descriptor: &Descriptor) -> String {
    format!(
        "{}_{}_{}.dock",
        descriptor.name, descriptor.version, descriptor.architecture
    )
}

/// Write a gzip-compressed tar of `prime` into `out_dir`.
///
/// Entries are added in sorted order with symlinks stored as links. The
/// descriptor must already exist.
pub fn pack(prime: &Path, descriptor: &Descriptor, out_dir: &Path) -> Result<PackedArchive> {
    if !prime.join(DESCRIPTOR_PATH).is_file() {
        anyhow::bail!(
            "{} has no {}; run `dock build` first",
            prime.display(),
            DESCRIPTOR_PATH
        );
    }
    ensure_dir(out_dir)?;

    let path = out_dir.join(archive_name(descriptor));
    let tmp = NamedTempFile::new_in(out_dir)
        .with_context(|| format!("failed to create temp file in {}", out_dir.display()))?;

    let files = list_tree(prime)?;
    {
        let writer = BufWriter::new(tmp.as_file());
        let mut builder = tar::Builder::new(GzEncoder::new(writer, Compression::default()));
        builder.follow_symlinks(false);
        for rel in &files {
            builder
                .append_path_with_name(prime.join(rel), rel)
                .with_context(|| format!("failed to add {} to archive", rel.display()))?;
        }
        let mut encoder = builder.into_inner().context("failed to finish archive")?;
        encoder.flush().context("failed to flush archive")?;
        encoder
            .finish()
            .and_then(|mut w| w.flush())
            .context("failed to finish compression")?;
    }

    tmp.persist(&path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    let sha256 = sha256_file(&path)?;
    tracing::debug!("packed {} entries into {}", files.len(), path.display());

    Ok(PackedArchive {
        path,
        sha256,
        entries: files.len(),
    })
}

/// Entry paths of a packed archive, in archive order.
pub fn list_entries(archive: &Path) -> Result<Vec<PathBuf>> {
    let file = File::open(archive)
        .with_context(|| format!("failed to open {}", archive.display()))?;
    let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(file));
    let mut out = Vec::new();
    for entry in archive.entries().context("failed to read archive")? {
        let entry = entry.context("corrupt archive entry")?;
        out.push(entry.path().context("invalid entry path")?.into_owned());
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::write_script;
    use indexmap::IndexMap;
    use tempfile::TempDir;

    fn descriptor() -> Descriptor {
        Descriptor {
            name: "zed".into(),
            version: "0.152.3".into(),
            summary: None,
            description: None,
            confinement: "strict".into(),
            grade: "stable".into(),
            base: None,
            architecture: "x86_64".into(),
            apps: IndexMap::new(),
        }
    }

    fn primed(root: &Path) {
        write_script(&root.join("bin/zed"), "exit 0\n");
        crate::util::fs::write_string(&root.join(DESCRIPTOR_PATH), "{}\n").unwrap();
        #[cfg(unix)]
        std::os::unix::fs::symlink("zed", root.join("bin/zeditor")).unwrap();
    }

    #[test]
    fn test_archive_name() {
        assert_eq!(archive_name(&descriptor()), "zed_0.152.3_x86_64.dock");
    }

    #[test]
    fn test_pack_round_trip_listing() {
        let tmp = TempDir::new().unwrap();
        let prime = tmp.path().join("prime");
        primed(&prime);

        let packed = pack(&prime, &descriptor(), tmp.path()).unwrap();
        assert_eq!(packed.path, tmp.path().join("zed_0.152.3_x86_64.dock"));
        assert_eq!(packed.sha256.len(), 64);
        assert_eq!(packed.sha256, sha256_file(&packed.path).unwrap());

        let entries = list_entries(&packed.path).unwrap();
        assert_eq!(entries, list_tree(&prime).unwrap());
        assert_eq!(entries.len(), packed.entries);
    }

    #[test]
    fn test_pack_requires_descriptor() {
        let tmp = TempDir::new().unwrap();
        let prime = tmp.path().join("prime");
        write_script(&prime.join("bin/zed"), "exit 0\n");

        let err = pack(&prime, &descriptor(), tmp.path()).unwrap_err();
        assert!(err.to_string().contains("meta/package.json"));
    }
}
