//! Parts: the named build units of a manifest.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::core::prime::PrimeRules;

/// Build plugin identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginId {
    /// Nothing to build; the part only contributes stage-packages.
    Nil,
    /// Copy the source tree into the install tree.
    Dump,
    Make,
    Cmake,
    Rust,
}

impl PluginId {
    pub const ALL: [PluginId; 5] = [
        PluginId::Nil,
        PluginId::Dump,
        PluginId::Make,
        PluginId::Cmake,
        PluginId::Rust,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PluginId::Nil => "nil",
            PluginId::Dump => "dump",
            PluginId::Make => "make",
            PluginId::Cmake => "cmake",
            PluginId::Rust => "rust",
        }
    }

    /// Whether parts using this plugin must declare a `source`.
    pub fn requires_source(&self) -> bool {
        !matches!(self, PluginId::Nil)
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PluginId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PluginId::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| {
                let known: Vec<_> = PluginId::ALL.iter().map(|p| p.as_str()).collect();
                format!("unknown plugin `{}`; expected one of: {}", s, known.join(", "))
            })
    }
}

/// How a part's source is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Git,
    Tar,
    Local,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Git => "git",
            SourceType::Tar => "tar",
            SourceType::Local => "local",
        }
    }

    /// Guess the source type from the location when `source-type` is absent.
    pub fn infer(location: &str) -> SourceType {
        let lower = location.to_ascii_lowercase();
        let is_remote = lower.contains("://") || lower.starts_with("git@");
        // Query strings and fragments don't count towards the extension.
        let path = url::Url::parse(&lower)
            .map(|u| u.path().to_string())
            .unwrap_or_else(|_| lower.clone());

        if path.ends_with(".git") || lower.starts_with("git://") || lower.starts_with("git@") {
            SourceType::Git
        } else if [".tar", ".tar.gz", ".tgz"].iter().any(|ext| path.ends_with(ext)) {
            SourceType::Tar
        } else if is_remote {
            SourceType::Git
        } else {
            SourceType::Local
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "git" => Ok(SourceType::Git),
            "tar" => Ok(SourceType::Tar),
            "local" => Ok(SourceType::Local),
            other => Err(format!(
                "unknown source type `{}`; expected `git`, `tar` or `local`",
                other
            )),
        }
    }
}

/// A git reference to check out.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GitRef {
    Tag(String),
    Branch(String),
    Commit(String),
}

impl GitRef {
    /// Manifest key this reference was declared with.
    pub fn key(&self) -> &'static str {
        match self {
            GitRef::Tag(_) => "source-tag",
            GitRef::Branch(_) => "source-branch",
            GitRef::Commit(_) => "source-commit",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            GitRef::Tag(s) | GitRef::Branch(s) | GitRef::Commit(s) => s,
        }
    }
}

impl fmt::Display for GitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GitRef::Tag(t) => write!(f, "tag {}", t),
            GitRef::Branch(b) => write!(f, "branch {}", b),
            GitRef::Commit(c) => write!(f, "commit {}", c),
        }
    }
}

/// An expected archive digest, written `sha256/<hex>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Checksum {
    hex: String,
}

impl Checksum {
    pub fn sha256(hex: impl Into<String>) -> Self {
        Checksum {
            hex: hex.into().to_ascii_lowercase(),
        }
    }

    pub fn hex(&self) -> &str {
        &self.hex
    }

    pub fn matches(&self, actual_hex: &str) -> bool {
        self.hex.eq_ignore_ascii_case(actual_hex)
    }
}

impl FromStr for Checksum {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (algorithm, hex) = s
            .split_once('/')
            .ok_or_else(|| format!("checksum `{}` must look like `sha256/<hex>`", s))?;
        if algorithm != "sha256" {
            return Err(format!("unsupported checksum algorithm `{}`", algorithm));
        }
        if hex.len() != 64 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err("sha256 checksums are 64 hexadecimal characters".to_string());
        }
        Ok(Checksum::sha256(hex))
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sha256/{}", self.hex)
    }
}

/// Where and how to fetch a part's source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceSpec {
    pub location: String,
    pub kind: SourceType,
    /// `None` means the remote's default branch.
    pub reference: Option<GitRef>,
    /// Shallow fetch depth; `None` fetches full history.
    pub depth: Option<u32>,
    pub checksum: Option<Checksum>,
}

impl SourceSpec {
    pub fn git(location: impl Into<String>) -> Self {
        SourceSpec {
            location: location.into(),
            kind: SourceType::Git,
            reference: None,
            depth: None,
            checksum: None,
        }
    }

    pub fn local(location: impl Into<String>) -> Self {
        SourceSpec {
            kind: SourceType::Local,
            ..SourceSpec::git(location)
        }
    }

    pub fn with_reference(mut self, reference: GitRef) -> Self {
        self.reference = Some(reference);
        self
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = Some(depth);
        self
    }

    pub fn is_shallow(&self) -> bool {
        self.depth.is_some()
    }
}

/// Tags identifying post-processing applied to a part's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildAttribute {
    /// Rewrite ELF RPATHs so libraries resolve inside the package.
    EnablePatchelf,
    /// Never touch the part's ELF files.
    NoPatchelf,
}

impl BuildAttribute {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildAttribute::EnablePatchelf => "enable-patchelf",
            BuildAttribute::NoPatchelf => "no-patchelf",
        }
    }

    /// Attributes that may not appear together with this one.
    pub fn conflicts_with(&self) -> &'static [BuildAttribute] {
        match self {
            BuildAttribute::EnablePatchelf => &[BuildAttribute::NoPatchelf],
            BuildAttribute::NoPatchelf => &[BuildAttribute::EnablePatchelf],
        }
    }
}

impl fmt::Display for BuildAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildAttribute {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enable-patchelf" => Ok(BuildAttribute::EnablePatchelf),
            "no-patchelf" => Ok(BuildAttribute::NoPatchelf),
            other => Err(format!("unknown build attribute `{}`", other)),
        }
    }
}

/// A named build unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    pub name: String,
    pub plugin: PluginId,
    pub source: Option<SourceSpec>,
    /// Ordered `(name, value)` pairs; values may reference earlier names.
    pub build_environment: Vec<(String, String)>,
    pub build_packages: IndexSet<String>,
    pub build_snaps: IndexSet<String>,
    pub stage_packages: IndexSet<String>,
    pub build_attributes: BTreeSet<BuildAttribute>,
    pub stage: PrimeRules,
    pub prime: PrimeRules,
    /// Parts that must be built before this one.
    pub after: Vec<String>,
    /// Shell script run instead of the plugin's build commands.
    pub override_build: Option<String>,
}

impl Part {
    pub fn new(name: impl Into<String>, plugin: PluginId) -> Self {
        Part {
            name: name.into(),
            plugin,
            source: None,
            build_environment: Vec::new(),
            build_packages: IndexSet::new(),
            build_snaps: IndexSet::new(),
            stage_packages: IndexSet::new(),
            build_attributes: BTreeSet::new(),
            stage: PrimeRules::default(),
            prime: PrimeRules::default(),
            after: Vec::new(),
            override_build: None,
        }
    }

    pub fn with_source(mut self, source: SourceSpec) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_build_package(mut self, name: impl Into<String>) -> Self {
        self.build_packages.insert(name.into());
        self
    }

    pub fn with_stage_package(mut self, name: impl Into<String>) -> Self {
        self.stage_packages.insert(name.into());
        self
    }

    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.build_environment.push((name.into(), value.into()));
        self
    }

    pub fn has_attribute(&self, attribute: BuildAttribute) -> bool {
        self.build_attributes.contains(&attribute)
    }
}
