//! dock.toml manifest parsing and schema.
//!
//! The manifest is a declarative description of how to fetch, build and
//! bundle an application. Parsing never touches the filesystem beyond
//! reading the document; the resulting [`Manifest`] is immutable.

use std::fmt;
use std::path::Path;

use indexmap::{IndexMap, IndexSet};
use miette::{NamedSource, SourceSpan};
use serde::{Deserialize, Serialize};

use crate::core::app::App;
use crate::core::grammar;
use crate::core::order::{OrderError, PartGraph};
use crate::core::part::{
    BuildAttribute, Checksum, GitRef, Part, PluginId, SourceSpec, SourceType,
};
use crate::core::prime::PrimeRules;
use crate::core::source_map::SourceMap;

/// `version` value requesting the version be adopted from git.
pub const GIT_VERSION: &str = "git";

const TOP_LEVEL_KEYS: &[&str] = &[
    "name",
    "title",
    "version",
    "summary",
    "description",
    "confinement",
    "grade",
    "base",
    "icon",
    "license",
    "website",
    "source-code",
    "issues",
    "contact",
    "adopt-info",
    "parts",
    "apps",
];

/// Confinement level requested for the package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confinement {
    #[default]
    Strict,
    Classic,
    Devmode,
}

impl Confinement {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confinement::Strict => "strict",
            Confinement::Classic => "classic",
            Confinement::Devmode => "devmode",
        }
    }
}

/// Release grade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Grade {
    #[default]
    Stable,
    Devel,
}

impl Grade {
    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::Stable => "stable",
            Grade::Devel => "devel",
        }
    }
}

/// Package-level metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Metadata {
    pub name: String,
    /// Human-readable title
    pub title: Option<String>,
    /// Version, or `git` together with `adopt_info`
    pub version: String,
    /// One-line summary (at most 78 chars)
    pub summary: Option<String>,
    pub description: Option<String>,
    pub confinement: Confinement,
    pub grade: Grade,
    pub base: Option<String>,
    /// Icon path relative to the project
    pub icon: Option<String>,
    pub license: Option<String>,
    pub website: Option<String>,
    pub source_code: Option<String>,
    pub issues: Option<String>,
    pub contact: Option<String>,
    /// Part whose checkout supplies the version
    pub adopt_info: Option<String>,
}

/// The parsed dock.toml manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub metadata: Metadata,

    /// Parts in declaration order
    pub parts: IndexMap<String, Part>,

    /// Apps in declaration order
    pub apps: IndexMap<String, App>,
}

/// Parser options.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseOptions {
    /// Reject unknown top-level keys instead of warning about them.
    pub strict: bool,
}

/// A manifest that failed to parse or validate.
///
/// Always names the offending key (`parts.zed.plugin`) and, where the key
/// exists in the document, its 1-based line.
#[derive(Debug, miette::Diagnostic)]
#[diagnostic(code(dock::manifest))]
pub struct ManifestError {
    /// Dotted key path of the offending field
    pub field: String,
    pub line: Option<usize>,
    pub message: String,
    file: String,
    #[source_code]
    src: NamedSource<String>,
    #[label("{message}")]
    span: Option<SourceSpan>,
}

impl ManifestError {
    /// The manifest file could not be read.
    pub fn unreadable(path: &Path, err: &std::io::Error) -> Self {
        let file = path.display().to_string();
        ManifestError {
            field: String::new(),
            line: None,
            message: format!("failed to read manifest: {}", err),
            src: NamedSource::new(&file, String::new()),
            file,
            span: None,
        }
    }
}

impl fmt::Display for ManifestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}:{}: ", self.file, line)?,
            None => write!(f, "{}: ", self.file)?,
        }
        if !self.field.is_empty() {
            write!(f, "`{}`: ", self.field)?;
        }
        f.write_str(&self.message)
    }
}

impl std::error::Error for ManifestError {}

/// Builds located errors for one document.
struct Reporter<'a> {
    file: String,
    content: &'a str,
    map: SourceMap,
}

impl<'a> Reporter<'a> {
    fn new(path: &Path, content: &'a str) -> Result<Self, ManifestError> {
        let file = path.display().to_string();
        match SourceMap::parse(content) {
            Ok(map) => Ok(Reporter { file, content, map }),
            Err((message, span)) => {
                let reporter = Reporter {
                    file,
                    content,
                    map: SourceMap::lines_only(content),
                };
                let field = String::new();
                Err(reporter.at_span(field, message, span))
            }
        }
    }

    fn at_span(
        &self,
        field: String,
        message: impl Into<String>,
        span: Option<std::ops::Range<usize>>,
    ) -> ManifestError {
        ManifestError {
            field,
            line: span.as_ref().map(|s| self.map.line_of(s.start)),
            message: message.into(),
            file: self.file.clone(),
            src: NamedSource::new(&self.file, self.content.to_string()),
            span: span.map(SourceSpan::from),
        }
    }

    /// An error attached to the key at `field`.
    fn error(&self, field: impl Into<String>, message: impl Into<String>) -> ManifestError {
        let field = field.into();
        let span = self.map.span_of(&field);
        self.at_span(field, message, span)
    }

    fn from_toml(&self, err: toml::de::Error) -> ManifestError {
        let message = err.message().trim().to_string();
        let mut span = err.span();
        let mut field = span
            .as_ref()
            .and_then(|s| self.map.path_at(s.start))
            .unwrap_or_default()
            .to_string();

        // Point unknown-field errors at the key itself.
        if let Some(unknown) = quoted_after(&message, "unknown field ") {
            if let Some((path, key_span)) = self.map.find_leaf(&field, unknown) {
                field = path;
                span = Some(key_span);
            }
        }

        self.at_span(field, message, span)
    }
}

/// The backticked word following `prefix` in a serde message.
fn quoted_after<'m>(message: &'m str, prefix: &str) -> Option<&'m str> {
    let rest = &message[message.find(prefix)? + prefix.len()..];
    let rest = rest.strip_prefix('`')?;
    rest.split('`').next()
}

/// Raw manifest as deserialized from TOML.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
struct RawManifest {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default)]
    confinement: Confinement,
    #[serde(default)]
    grade: Grade,
    #[serde(skip_serializing_if = "Option::is_none")]
    base: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    license: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    website: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    issues: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    contact: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    adopt_info: Option<String>,

    #[serde(default)]
    parts: IndexMap<String, RawPart>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    apps: IndexMap<String, RawApp>,
}

/// Raw part from TOML (before validation).
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    plugin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_commit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_depth: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_checksum: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    build_packages: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    build_snaps: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    stage_packages: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    build_attributes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    stage: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    prime: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    after: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    override_build: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    build_environment: Vec<IndexMap<String, String>>,
}

/// Raw app from TOML.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawApp {
    #[serde(skip_serializing_if = "Option::is_none")]
    command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    desktop: Option<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    environment: IndexMap<String, String>,
}

impl Manifest {
    /// Load a manifest from a file path.
    pub fn load(path: &Path, options: ParseOptions) -> Result<Self, ManifestError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ManifestError::unreadable(path, &e))?;

        Self::parse(&content, path, options)
    }

    /// Parse manifest content. `path` is only used in error messages.
    pub fn parse(content: &str, path: &Path, options: ParseOptions) -> Result<Self, ManifestError> {
        let reporter = Reporter::new(path, content)?;

        for (key, _) in reporter.map.top_level_keys() {
            if TOP_LEVEL_KEYS.contains(&key) {
                continue;
            }
            if options.strict {
                return Err(reporter.error(key, "unknown top-level key"));
            }
            tracing::warn!(
                "{}: ignoring unknown top-level key `{}`",
                reporter.file,
                key
            );
        }

        let raw: RawManifest = toml::from_str(content).map_err(|e| reporter.from_toml(e))?;
        Self::from_raw(raw, &reporter)
    }

    fn from_raw(raw: RawManifest, r: &Reporter<'_>) -> Result<Self, ManifestError> {
        let name = raw
            .name
            .ok_or_else(|| r.error("name", "missing required key"))?;
        grammar::check_package_name(&name).map_err(|e| r.error("name", e))?;

        let version = raw
            .version
            .ok_or_else(|| r.error("version", "missing required key"))?;
        if version == GIT_VERSION {
            if raw.adopt_info.is_none() {
                return Err(r.error(
                    "version",
                    "`version = \"git\"` requires `adopt-info` naming the part to describe",
                ));
            }
        } else {
            grammar::check_version(&version).map_err(|e| r.error("version", e))?;
        }

        if let Some(summary) = &raw.summary {
            if summary.chars().count() > grammar::MAX_SUMMARY_LEN {
                return Err(r.error(
                    "summary",
                    format!("must be at most {} characters", grammar::MAX_SUMMARY_LEN),
                ));
            }
        }

        if raw.parts.is_empty() {
            return Err(r.error("parts", "at least one part is required"));
        }

        let mut parts = IndexMap::new();
        for (part_name, raw_part) in raw.parts {
            let part = convert_part(part_name.clone(), raw_part, r)?;
            parts.insert(part_name, part);
        }

        PartGraph::new(parts.values()).map_err(|e| {
            let part = match &e {
                OrderError::UnknownPart { part, .. }
                | OrderError::SelfReference { part }
                | OrderError::Cycle { part } => part.clone(),
            };
            r.error(format!("parts.{}.after", part), e.to_string())
        })?;

        if let Some(adopt) = &raw.adopt_info {
            match parts.get(adopt) {
                None => {
                    return Err(r.error("adopt-info", format!("unknown part `{}`", adopt)));
                }
                Some(part) => {
                    let is_git = part
                        .source
                        .as_ref()
                        .is_some_and(|s| s.kind == SourceType::Git);
                    if version == GIT_VERSION && !is_git {
                        return Err(r.error(
                            "adopt-info",
                            format!("part `{}` must have a git source to adopt its version", adopt),
                        ));
                    }
                }
            }
        }

        let mut apps = IndexMap::new();
        for (app_name, raw_app) in raw.apps {
            let app = convert_app(app_name.clone(), raw_app, r)?;
            apps.insert(app_name, app);
        }

        Ok(Manifest {
            metadata: Metadata {
                name,
                title: raw.title,
                version,
                summary: raw.summary,
                description: raw.description,
                confinement: raw.confinement,
                grade: raw.grade,
                base: raw.base,
                icon: raw.icon,
                license: raw.license,
                website: raw.website,
                source_code: raw.source_code,
                issues: raw.issues,
                contact: raw.contact,
                adopt_info: raw.adopt_info,
            },
            parts,
            apps,
        })
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// The declared version (`git` when it is adopted from a checkout).
    pub fn version(&self) -> &str {
        &self.metadata.version
    }

    /// Whether the version must be adopted from `adopt-info`'s checkout.
    pub fn adopts_git_version(&self) -> bool {
        self.metadata.version == GIT_VERSION && self.metadata.adopt_info.is_some()
    }

    pub fn part(&self, name: &str) -> Option<&Part> {
        self.parts.get(name)
    }

    /// Build-order graph over the parts.
    pub fn part_graph(&self) -> Result<PartGraph, OrderError> {
        PartGraph::new(self.parts.values())
    }

    /// Serialize back to TOML. Parsing the output yields an equal manifest.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string(&self.to_raw())
    }

    fn to_raw(&self) -> RawManifest {
        let m = &self.metadata;
        RawManifest {
            name: Some(m.name.clone()),
            title: m.title.clone(),
            version: Some(m.version.clone()),
            summary: m.summary.clone(),
            description: m.description.clone(),
            confinement: m.confinement,
            grade: m.grade,
            base: m.base.clone(),
            icon: m.icon.clone(),
            license: m.license.clone(),
            website: m.website.clone(),
            source_code: m.source_code.clone(),
            issues: m.issues.clone(),
            contact: m.contact.clone(),
            adopt_info: m.adopt_info.clone(),
            parts: self
                .parts
                .iter()
                .map(|(name, part)| (name.clone(), raw_part(part)))
                .collect(),
            apps: self
                .apps
                .iter()
                .map(|(name, app)| {
                    let raw = RawApp {
                        command: Some(app.command.clone()),
                        desktop: app.desktop.clone(),
                        environment: app.environment.clone(),
                    };
                    (name.clone(), raw)
                })
                .collect(),
        }
    }
}

fn convert_part(name: String, raw: RawPart, r: &Reporter<'_>) -> Result<Part, ManifestError> {
    let key = |field: &str| format!("parts.{}.{}", name, field);

    grammar::check_part_name(&name).map_err(|e| r.error(format!("parts.{}", name), e))?;

    let plugin: PluginId = raw
        .plugin
        .as_deref()
        .ok_or_else(|| r.error(key("plugin"), "missing required key"))?
        .parse()
        .map_err(|e: String| r.error(key("plugin"), e))?;

    let source = convert_source(&name, &raw, r)?;
    if plugin.requires_source() && source.is_none() {
        return Err(r.error(
            format!("parts.{}", name),
            format!("the `{}` plugin requires a `source`", plugin),
        ));
    }

    let mut build_environment = Vec::with_capacity(raw.build_environment.len());
    for (idx, entry) in raw.build_environment.into_iter().enumerate() {
        let field = format!("parts.{}.build-environment[{}]", name, idx);
        if entry.len() != 1 {
            return Err(r.error(
                field,
                "each build-environment entry must set exactly one variable",
            ));
        }
        for (var, value) in entry {
            grammar::check_env_name(&var).map_err(|e| r.error(field.clone(), e))?;
            build_environment.push((var, value));
        }
    }

    let build_packages = package_set(raw.build_packages, &key("build-packages"), r)?;
    let build_snaps = package_set(raw.build_snaps, &key("build-snaps"), r)?;
    let stage_packages = package_set(raw.stage_packages, &key("stage-packages"), r)?;

    let mut build_attributes = std::collections::BTreeSet::new();
    for attr in &raw.build_attributes {
        let attr: BuildAttribute = attr
            .parse()
            .map_err(|e: String| r.error(key("build-attributes"), e))?;
        build_attributes.insert(attr);
    }
    for attr in &build_attributes {
        if let Some(other) = attr
            .conflicts_with()
            .iter()
            .find(|c| build_attributes.contains(*c))
        {
            return Err(r.error(
                key("build-attributes"),
                format!("`{}` and `{}` cannot be combined", attr, other),
            ));
        }
    }

    let stage = PrimeRules::parse(&raw.stage).map_err(|e| r.error(key("stage"), e))?;
    let prime = PrimeRules::parse(&raw.prime).map_err(|e| r.error(key("prime"), e))?;

    Ok(Part {
        name,
        plugin,
        source,
        build_environment,
        build_packages,
        build_snaps,
        stage_packages,
        build_attributes,
        stage,
        prime,
        after: raw.after,
        override_build: raw.override_build,
    })
}

fn convert_source(
    name: &str,
    raw: &RawPart,
    r: &Reporter<'_>,
) -> Result<Option<SourceSpec>, ManifestError> {
    let key = |field: &str| format!("parts.{}.{}", name, field);

    let refs: Vec<(&str, GitRef)> = [
        ("source-tag", raw.source_tag.clone().map(GitRef::Tag)),
        ("source-branch", raw.source_branch.clone().map(GitRef::Branch)),
        ("source-commit", raw.source_commit.clone().map(GitRef::Commit)),
    ]
    .into_iter()
    .filter_map(|(k, v)| v.map(|v| (k, v)))
    .collect();

    let Some(location) = raw.source.clone() else {
        let dangling = refs
            .first()
            .map(|(k, _)| *k)
            .or(raw.source_type.as_ref().map(|_| "source-type"))
            .or(raw.source_depth.map(|_| "source-depth"))
            .or(raw.source_checksum.as_ref().map(|_| "source-checksum"));
        if let Some(k) = dangling {
            return Err(r.error(key(k), "requires `source` to be set"));
        }
        return Ok(None);
    };

    if location.trim().is_empty() {
        return Err(r.error(key("source"), "must not be empty"));
    }

    let kind = match &raw.source_type {
        Some(t) => t
            .parse::<SourceType>()
            .map_err(|e| r.error(key("source-type"), e))?,
        None => SourceType::infer(&location),
    };

    if refs.len() > 1 {
        let names: Vec<_> = refs.iter().map(|(k, _)| format!("`{}`", k)).collect();
        return Err(r.error(
            key(refs[1].0),
            format!("{} are mutually exclusive", names.join(" and ")),
        ));
    }
    let reference = refs.into_iter().next().map(|(_, v)| v);

    if let Some(reference) = &reference {
        if kind != SourceType::Git {
            return Err(r.error(
                key(reference.key()),
                format!("only valid for git sources, not `{}`", kind),
            ));
        }
        if reference.value().trim().is_empty() {
            return Err(r.error(key(reference.key()), "must not be empty"));
        }
    }

    if let Some(depth) = raw.source_depth {
        if kind != SourceType::Git {
            return Err(r.error(key("source-depth"), "only valid for git sources"));
        }
        if depth == 0 {
            return Err(r.error(key("source-depth"), "must be at least 1"));
        }
    }

    let checksum = match &raw.source_checksum {
        None => None,
        Some(_) if kind != SourceType::Tar => {
            return Err(r.error(key("source-checksum"), "only valid for tar sources"));
        }
        Some(sum) => Some(
            sum.parse::<Checksum>()
                .map_err(|e| r.error(key("source-checksum"), e))?,
        ),
    };

    Ok(Some(SourceSpec {
        location,
        kind,
        reference,
        depth: raw.source_depth,
        checksum,
    }))
}

fn package_set(
    names: Vec<String>,
    field: &str,
    r: &Reporter<'_>,
) -> Result<IndexSet<String>, ManifestError> {
    let mut set = IndexSet::with_capacity(names.len());
    for name in names {
        let trimmed = name.trim();
        if trimmed.is_empty() || trimmed.contains(char::is_whitespace) {
            return Err(r.error(field, format!("invalid package name `{}`", name)));
        }
        set.insert(trimmed.to_string());
    }
    Ok(set)
}

fn convert_app(name: String, raw: RawApp, r: &Reporter<'_>) -> Result<App, ManifestError> {
    let key = |field: &str| format!("apps.{}.{}", name, field);

    grammar::check_app_name(&name).map_err(|e| r.error(format!("apps.{}", name), e))?;

    let command = raw
        .command
        .ok_or_else(|| r.error(key("command"), "missing required key"))?;
    let executable = command.split_whitespace().next().unwrap_or("");
    if executable.is_empty() {
        return Err(r.error(key("command"), "must not be empty"));
    }
    if Path::new(executable).is_absolute() {
        return Err(r.error(
            key("command"),
            "the executable must be relative to the package root",
        ));
    }

    for var in raw.environment.keys() {
        grammar::check_env_name(var).map_err(|e| r.error(key("environment"), e))?;
    }

    Ok(App {
        name,
        command,
        environment: raw.environment,
        desktop: raw.desktop,
    })
}

fn raw_part(part: &Part) -> RawPart {
    let mut raw = RawPart {
        plugin: Some(part.plugin.to_string()),
        build_packages: part.build_packages.iter().cloned().collect(),
        build_snaps: part.build_snaps.iter().cloned().collect(),
        stage_packages: part.stage_packages.iter().cloned().collect(),
        build_attributes: part
            .build_attributes
            .iter()
            .map(|a| a.to_string())
            .collect(),
        stage: part.stage.to_strings(),
        prime: part.prime.to_strings(),
        after: part.after.clone(),
        override_build: part.override_build.clone(),
        build_environment: part
            .build_environment
            .iter()
            .map(|(k, v)| IndexMap::from([(k.clone(), v.clone())]))
            .collect(),
        ..RawPart::default()
    };

    if let Some(source) = &part.source {
        raw.source = Some(source.location.clone());
        raw.source_type = Some(source.kind.to_string());
        raw.source_depth = source.depth;
        raw.source_checksum = source.checksum.as_ref().map(|c| c.to_string());
        match &source.reference {
            Some(GitRef::Tag(t)) => raw.source_tag = Some(t.clone()),
            Some(GitRef::Branch(b)) => raw.source_branch = Some(b.clone()),
            Some(GitRef::Commit(c)) => raw.source_commit = Some(c.clone()),
            None => {}
        }
    }

    raw
}

/// Generate a starter dock.toml for `dock init`.
pub fn generate_manifest(name: &str) -> String {
    format!(
        r#"name = "{name}"
version = "0.1.0"
summary = "A short summary of {name}"
description = """
A longer description of what {name} does.
"""
confinement = "strict"
grade = "devel"

[parts.{name}]
plugin = "dump"
source = "."
prime = ["-.dock", "-dock.toml"]

[apps.{name}]
command = "bin/{name}"
"#
    )
}
