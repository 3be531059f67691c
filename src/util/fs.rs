//! Filesystem utilities.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use walkdir::WalkDir;

/// Recursively copy a directory, preserving symlinks and permissions.
pub fn copy_dir_all(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst)
        .with_context(|| format!("failed to create directory: {}", dst.display()))?;

    for rel in list_tree(src)? {
        copy_entry(&src.join(&rel), &dst.join(&rel))?;
    }
    Ok(())
}

/// Copy one file or symlink, creating parent directories as needed.
///
/// Symlinks are recreated rather than followed so that library alias
/// chains (`libfoo.so -> libfoo.so.1`) survive staging.
pub fn copy_entry(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        ensure_dir(parent)?;
    }

    let meta = fs::symlink_metadata(src)
        .with_context(|| format!("failed to stat {}", src.display()))?;

    if meta.file_type().is_symlink() {
        let target = fs::read_link(src)
            .with_context(|| format!("failed to read link {}", src.display()))?;
        if fs::symlink_metadata(dst).is_ok() {
            fs::remove_file(dst)
                .with_context(|| format!("failed to replace {}", dst.display()))?;
        }
        symlink(&target, dst).with_context(|| {
            format!("failed to link {} -> {}", dst.display(), target.display())
        })?;
    } else if meta.is_dir() {
        ensure_dir(dst)?;
    } else {
        fs::copy(src, dst).with_context(|| {
            format!("failed to copy {} to {}", src.display(), dst.display())
        })?;
    }
    Ok(())
}

/// List every file and symlink under `root`, as sorted paths relative to `root`.
///
/// Directories are not listed; they are implied by their contents.
pub fn list_tree(root: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    if !root.exists() {
        return Ok(out);
    }

    for entry in WalkDir::new(root).follow_links(false) {
        let entry =
            entry.with_context(|| format!("failed to walk directory: {}", root.display()))?;
        if entry.file_type().is_dir() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .with_context(|| format!("{} escaped {}", entry.path().display(), root.display()))?;
        out.push(rel.to_path_buf());
    }

    out.sort();
    Ok(out)
}

/// Remove a directory and all its contents, if it exists.
pub fn remove_dir_all_if_exists(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_dir_all(path)
            .with_context(|| format!("failed to remove directory: {}", path.display()))?;
    }
    Ok(())
}

/// Ensure a directory exists, creating it if necessary.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("failed to create directory: {}", path.display()))?;
    }
    Ok(())
}

/// Read a file to string, with nice error messages.
pub fn read_to_string(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read file: {}", path.display()))
}

/// Write a string to a file, creating parent directories if needed.
pub fn write_string(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    fs::write(path, contents).with_context(|| format!("failed to write file: {}", path.display()))
}

/// Get the relative path from `base` to `path`.
pub fn relative_path(base: &Path, path: &Path) -> PathBuf {
    pathdiff::diff_paths(path, base).unwrap_or_else(|| path.to_path_buf())
}

/// Whether `path` is a regular file with any execute bit set.
#[cfg(unix)]
pub fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
pub fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Mark a file executable (0o755).
#[cfg(unix)]
pub fn set_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = fs::metadata(path)
        .with_context(|| format!("failed to stat {}", path.display()))?
        .permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms)
        .with_context(|| format!("failed to chmod {}", path.display()))
}

#[cfg(not(unix))]
pub fn set_executable(_path: &Path) -> Result<()> {
    Ok(())
}

/// Create a symlink (platform-aware).
#[cfg(unix)]
pub fn symlink(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(src, dst)
}

#[cfg(windows)]
pub fn symlink(src: &Path, dst: &Path) -> io::Result<()> {
    if src.is_dir() {
        std::os::windows::fs::symlink_dir(src, dst)
    } else {
        std::os::windows::fs::symlink_file(src, dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_copy_dir_all() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");

        fs::create_dir_all(src.join("lib")).unwrap();
        fs::write(src.join("lib/libfoo.so.1"), "elf").unwrap();
        fs::write(src.join("file.txt"), "content").unwrap();

        copy_dir_all(&src, &dst).unwrap();

        assert_eq!(fs::read_to_string(dst.join("file.txt")).unwrap(), "content");
        assert!(dst.join("lib/libfoo.so.1").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_preserves_symlinks() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("libfoo.so.1"), "elf").unwrap();
        symlink(Path::new("libfoo.so.1"), &src.join("libfoo.so")).unwrap();

        copy_dir_all(&src, &dst).unwrap();

        let link = fs::read_link(dst.join("libfoo.so")).unwrap();
        assert_eq!(link, PathBuf::from("libfoo.so.1"));
    }

    #[test]
    fn test_list_tree_relative_and_sorted() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("usr/bin")).unwrap();
        fs::write(tmp.path().join("usr/bin/zed"), "").unwrap();
        fs::write(tmp.path().join("a.txt"), "").unwrap();

        let files = list_tree(tmp.path()).unwrap();
        assert_eq!(
            files,
            vec![PathBuf::from("a.txt"), PathBuf::from("usr/bin/zed")]
        );
    }

    #[test]
    fn test_list_tree_missing_root() {
        let tmp = TempDir::new().unwrap();
        assert!(list_tree(&tmp.path().join("nope")).unwrap().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_set_executable() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("tool");
        fs::write(&file, "#!/bin/sh\n").unwrap();
        assert!(!is_executable(&file));
        set_executable(&file).unwrap();
        assert!(is_executable(&file));
    }
}
