//! Build environment assembly.
//!
//! Layers, lowest to highest precedence:
//! 1. the ambient process environment
//! 2. injected `DOCK_*` variables
//! 3. the global overlay (`[build.environment]`, then `--env`)
//! 4. the part's `build-environment`, in declaration order
//!
//! Values in layers 3 and 4 may reference variables already set with
//! `$VAR` or `${VAR}`; unknown references expand to the empty string.

use std::path::Path;

use indexmap::IndexMap;

use crate::core::Part;

/// An ordered set of environment variables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildEnvironment {
    vars: IndexMap<String, String>,
}

/// Paths and values injected as `DOCK_*` variables.
#[derive(Debug, Clone)]
pub struct InjectedVars<'a> {
    pub project_name: &'a str,
    pub project_version: &'a str,
    pub part_name: &'a str,
    pub part_src: &'a Path,
    pub part_build: &'a Path,
    pub part_install: &'a Path,
    pub stage: &'a Path,
    pub jobs: usize,
}

impl BuildEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from the current process environment.
    pub fn ambient() -> Self {
        BuildEnvironment {
            vars: std::env::vars().collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Set a variable verbatim.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    /// Set a variable after expanding references against the current state.
    pub fn set_expanded(&mut self, key: impl Into<String>, value: &str) {
        let value = self.expand(value);
        self.set(key, value);
    }

    pub fn inject(&mut self, vars: &InjectedVars<'_>) {
        self.set("DOCK_PROJECT_NAME", vars.project_name);
        self.set("DOCK_PROJECT_VERSION", vars.project_version);
        self.set("DOCK_PART_NAME", vars.part_name);
        self.set("DOCK_PART_SRC", vars.part_src.display().to_string());
        self.set("DOCK_PART_BUILD", vars.part_build.display().to_string());
        self.set("DOCK_PART_INSTALL", vars.part_install.display().to_string());
        self.set("DOCK_STAGE", vars.stage.display().to_string());
        self.set("DOCK_PARALLEL_BUILD_COUNT", vars.jobs.to_string());
    }

    /// Apply an overlay in order.
    pub fn overlay<'a, I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        for (key, value) in vars {
            self.set_expanded(key.clone(), value);
        }
    }

    /// Apply a part's `build-environment`.
    pub fn apply_part(&mut self, part: &Part) {
        for (key, value) in &part.build_environment {
            self.set_expanded(key.clone(), value);
        }
    }

    /// Expand `$VAR` and `${VAR}`; `$$` is a literal `$`.
    pub fn expand(&self, value: &str) -> String {
        let mut out = String::with_capacity(value.len());
        let mut chars = value.char_indices().peekable();

        while let Some((_, c)) = chars.next() {
            if c != '$' {
                out.push(c);
                continue;
            }
            match chars.peek().copied() {
                Some((_, '$')) => {
                    chars.next();
                    out.push('$');
                }
                Some((start, '{')) => {
                    chars.next();
                    let rest = &value[start + 1..];
                    match rest.find('}') {
                        Some(end) => {
                            out.push_str(self.get(&rest[..end]).unwrap_or_default());
                            for _ in 0..=rest[..end].chars().count() {
                                chars.next();
                            }
                        }
                        None => {
                            out.push_str("${");
                        }
                    }
                }
                Some((start, n)) if n == '_' || n.is_ascii_alphabetic() => {
                    let len = value[start..]
                        .find(|ch: char| ch != '_' && !ch.is_ascii_alphanumeric())
                        .unwrap_or(value.len() - start);
                    out.push_str(self.get(&value[start..start + len]).unwrap_or_default());
                    for _ in 0..len {
                        chars.next();
                    }
                }
                _ => out.push('$'),
            }
        }
        out
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PluginId;
    use std::path::PathBuf;

    fn env(pairs: &[(&str, &str)]) -> BuildEnvironment {
        let mut env = BuildEnvironment::new();
        for (k, v) in pairs {
            env.set(*k, *v);
        }
        env
    }

    #[test]
    fn test_expand() {
        let env = env(&[("HOME", "/home/zed"), ("CC", "gcc")]);
        assert_eq!(env.expand("$HOME/bin"), "/home/zed/bin");
        assert_eq!(env.expand("${CC}-12"), "gcc-12");
        assert_eq!(env.expand("$MISSING:x"), ":x");
        assert_eq!(env.expand("cost $$5"), "cost $5");
        assert_eq!(env.expand("trailing $"), "trailing $");
        assert_eq!(env.expand("${HOME"), "${HOME");
        assert_eq!(env.expand("$1"), "$1");
    }

    #[test]
    fn test_precedence() {
        let mut env = env(&[("PATH", "/usr/bin"), ("DOCK_PART_NAME", "ambient")]);
        let paths = PathBuf::from("/p");
        env.inject(&InjectedVars {
            project_name: "zed",
            project_version: "0.1",
            part_name: "zed",
            part_src: &paths,
            part_build: &paths,
            part_install: &paths,
            stage: &paths,
            jobs: 4,
        });
        assert_eq!(env.get("DOCK_PART_NAME"), Some("zed"));

        let mut global = IndexMap::new();
        global.insert("RUSTFLAGS".to_string(), "-C opt-level=2".to_string());
        global.insert("PATH".to_string(), "/opt/rust/bin:$PATH".to_string());
        env.overlay(&global);
        assert_eq!(env.get("PATH"), Some("/opt/rust/bin:/usr/bin"));

        let part = crate::core::Part::new("zed", PluginId::Rust)
            .with_env("RUSTFLAGS", "$RUSTFLAGS -C strip=symbols")
            .with_env("ZED_UPDATE_EXPLANATION", "updates are managed by the package")
            .with_env("MSG", "$ZED_UPDATE_EXPLANATION");
        env.apply_part(&part);
        assert_eq!(env.get("RUSTFLAGS"), Some("-C opt-level=2 -C strip=symbols"));
        assert_eq!(env.get("MSG"), Some("updates are managed by the package"));
        assert_eq!(env.get("DOCK_PARALLEL_BUILD_COUNT"), Some("4"));
    }
}
