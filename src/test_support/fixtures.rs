//! Test fixtures for common test scenarios.

use std::path::{Path, PathBuf};

use crate::util::context::MANIFEST_NAME;

/// Builds `dock.toml` text part by part.
#[derive(Debug, Clone)]
pub struct ManifestBuilder {
    name: String,
    version: String,
    raw: String,
    parts: Vec<(String, String)>,
    apps: Vec<(String, String)>,
}

impl ManifestBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        ManifestBuilder {
            name: name.into(),
            version: "0.1.0".to_string(),
            raw: String::new(),
            parts: Vec::new(),
            apps: Vec::new(),
        }
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Extra top-level keys, inserted verbatim after `version`.
    pub fn raw(mut self, text: impl Into<String>) -> Self {
        self.raw.push_str(&text.into());
        self
    }

    /// A `[parts.<name>]` table with `body` as its contents.
    pub fn part(mut self, name: impl Into<String>, body: impl Into<String>) -> Self {
        self.parts.push((name.into(), body.into()));
        self
    }

    /// An `[apps.<name>]` table running `command`.
    pub fn app(mut self, name: impl Into<String>, command: impl Into<String>) -> Self {
        self.apps
            .push((name.into(), format!("command = \"{}\"\n", command.into())));
        self
    }

    pub fn build(&self) -> String {
        let mut out = format!(
            "name = \"{}\"\nversion = \"{}\"\nsummary = \"Test package\"\n",
            self.name, self.version
        );
        out.push_str(&self.raw);
        for (name, body) in &self.parts {
            out.push_str(&format!("\n[parts.{}]\n{}", name, body));
        }
        for (name, body) in &self.apps {
            out.push_str(&format!("\n[apps.{}]\n{}", name, body));
        }
        out
    }
}

/// Write `manifest` as `<dir>/dock.toml` and return its path.
pub fn write_project(dir: &Path, manifest: &str) -> PathBuf {
    let path = dir.join(MANIFEST_NAME);
    std::fs::write(&path, manifest).expect("failed to write manifest");
    path
}

/// An on-disk package repository for the `directory` backend.
#[derive(Debug, Clone)]
pub struct PackageRepoFixture {
    root: PathBuf,
}

impl PackageRepoFixture {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        std::fs::create_dir_all(&root).expect("failed to create package repository");
        PackageRepoFixture { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Add a package with the given files (`path -> content`).
    pub fn package(self, name: &str, files: &[(&str, &str)]) -> Self {
        let dir = self.root.join(name);
        std::fs::create_dir_all(&dir).expect("failed to create package dir");
        for (rel, content) in files {
            let path = dir.join(rel);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).expect("failed to create package subdir");
            }
            std::fs::write(path, content).expect("failed to write package file");
        }
        self
    }

    /// Add a package that installs no files (build tools).
    pub fn tool(self, name: &str) -> Self {
        self.package(name, &[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_builder_layout() {
        let text = ManifestBuilder::new("zed")
            .part("zed", "plugin = \"nil\"\n")
            .app("zed-editor", "bin/zed")
            .build();
        assert!(text.starts_with("name = \"zed\"\nversion = \"0.1.0\"\n"));
        assert!(text.contains("\n[parts.zed]\nplugin = \"nil\"\n"));
        assert!(text.contains("\n[apps.zed-editor]\ncommand = \"bin/zed\"\n"));
    }

    #[test]
    fn test_package_repo() {
        let tmp = tempfile::TempDir::new().unwrap();
        let repo = PackageRepoFixture::new(tmp.path().join("repo"))
            .package("libssl3", &[("usr/lib/libssl.so.3", "elf")])
            .tool("cmake");
        assert!(repo.root().join("libssl3/usr/lib/libssl.so.3").is_file());
        assert!(repo.root().join("cmake").is_dir());
    }
}
