//! Path filter rules for the `stage` and `prime` part keys.
//!
//! A rule is a glob relative to the package root. A leading `-` turns it
//! into an exclusion. Rules fold left to right and the last rule matching a
//! path decides whether it is kept. When a list has no inclusion rule at
//! all, every path starts out included, so `["-usr/share/doc"]` means
//! "everything except the docs".
//!
//! A rule matching a directory matches everything below it.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use glob::{MatchOptions, Pattern};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// A single filter rule.
#[derive(Debug, Clone)]
pub struct PrimeRule {
    raw: String,
    pattern: Pattern,
    exclude: bool,
}

impl PrimeRule {
    /// Parse a rule such as `usr/bin/*` or `-usr/share/doc`.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let (exclude, body) = match raw.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        let body = body.trim_end_matches('/');

        if body.is_empty() {
            return Err(format!("rule `{}` has an empty path", raw));
        }
        let path = Path::new(body);
        if path.is_absolute() {
            return Err(format!("rule `{}` must be relative to the package root", raw));
        }
        if path.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(format!("rule `{}` may not contain `..`", raw));
        }

        let pattern =
            Pattern::new(body).map_err(|e| format!("rule `{}` is not a valid glob: {}", raw, e))?;

        Ok(PrimeRule {
            raw: raw.to_string(),
            pattern,
            exclude,
        })
    }

    pub fn is_exclusion(&self) -> bool {
        self.exclude
    }

    /// The rule as written in the manifest.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether the rule's path contains no glob metacharacters.
    pub fn is_literal(&self) -> bool {
        !self.pattern.as_str().contains(['*', '?', '['])
    }

    /// Whether the rule matches `path` or one of its parent directories.
    pub fn matches(&self, path: &Path) -> bool {
        path.ancestors()
            .filter(|p| !p.as_os_str().is_empty())
            .any(|p| self.pattern.matches_path_with(p, MATCH_OPTIONS))
    }
}

impl PartialEq for PrimeRule {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for PrimeRule {}

impl fmt::Display for PrimeRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// An ordered rule list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrimeRules {
    rules: Vec<PrimeRule>,
}

impl PrimeRules {
    pub fn parse<S: AsRef<str>>(raw: &[S]) -> Result<Self, String> {
        let rules = raw
            .iter()
            .map(|r| PrimeRule::parse(r.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(PrimeRules { rules })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules(&self) -> &[PrimeRule] {
        &self.rules
    }

    /// The rules as written.
    pub fn to_strings(&self) -> Vec<String> {
        self.rules.iter().map(|r| r.raw.clone()).collect()
    }

    /// Decide whether a single path is kept.
    pub fn includes(&self, path: &Path) -> bool {
        let initial = !self.rules.iter().any(|r| !r.exclude);
        self.rules.iter().fold(initial, |kept, rule| {
            if rule.matches(path) {
                !rule.exclude
            } else {
                kept
            }
        })
    }

    /// Filter a set of package-relative paths.
    pub fn apply<'a, I>(&self, paths: I) -> BTreeSet<PathBuf>
    where
        I: IntoIterator<Item = &'a PathBuf>,
    {
        paths
            .into_iter()
            .filter(|p| self.includes(p))
            .cloned()
            .collect()
    }

    /// Literal inclusion rules that match none of `paths`.
    pub fn unmatched_literals(&self, paths: &BTreeSet<PathBuf>) -> Vec<&PrimeRule> {
        self.rules
            .iter()
            .filter(|r| !r.exclude && r.is_literal())
            .filter(|r| !paths.iter().any(|p| r.matches(p)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(items: &[&str]) -> BTreeSet<PathBuf> {
        items.iter().map(PathBuf::from).collect()
    }

    fn tree() -> BTreeSet<PathBuf> {
        paths(&[
            "bin/zed",
            "lib/libzed.so",
            "usr/lib/x86_64-linux-gnu/libssl.so.3",
            "usr/share/doc/libssl3/copyright",
            "usr/share/man/man1/zed.1",
        ])
    }

    #[test]
    fn test_empty_rules_keep_everything() {
        let rules = PrimeRules::default();
        assert_eq!(rules.apply(&tree()), tree());
    }

    #[test]
    fn test_exclusions_only_start_from_everything() {
        let rules = PrimeRules::parse(&["-usr/share/doc", "-usr/share/man"]).unwrap();
        assert_eq!(
            rules.apply(&tree()),
            paths(&[
                "bin/zed",
                "lib/libzed.so",
                "usr/lib/x86_64-linux-gnu/libssl.so.3"
            ])
        );
    }

    #[test]
    fn test_inclusion_starts_from_nothing() {
        let rules = PrimeRules::parse(&["bin/*"]).unwrap();
        assert_eq!(rules.apply(&tree()), paths(&["bin/zed"]));
    }

    #[test]
    fn test_last_match_wins() {
        let rules = PrimeRules::parse(&["usr", "-usr/share", "usr/share/doc"]).unwrap();
        assert_eq!(
            rules.apply(&tree()),
            paths(&[
                "usr/lib/x86_64-linux-gnu/libssl.so.3",
                "usr/share/doc/libssl3/copyright"
            ])
        );

        let reversed = PrimeRules::parse(&["usr", "usr/share/doc", "-usr/share"]).unwrap();
        assert_eq!(
            reversed.apply(&tree()),
            paths(&["usr/lib/x86_64-linux-gnu/libssl.so.3"])
        );
    }

    #[test]
    fn test_apply_is_idempotent() {
        for raw in [
            vec!["-usr/share/doc"],
            vec!["usr/lib/**", "bin/zed"],
            vec!["*", "-lib", "lib/libzed.so"],
        ] {
            let rules = PrimeRules::parse(&raw).unwrap();
            let once = rules.apply(&tree());
            let twice = rules.apply(&once);
            assert_eq!(once, twice, "rules {:?}", raw);
        }
    }

    #[test]
    fn test_star_does_not_cross_separators() {
        let rules = PrimeRules::parse(&["usr/*.so.3"]).unwrap();
        assert!(rules.apply(&tree()).is_empty());

        let deep = PrimeRules::parse(&["usr/**/*.so.3"]).unwrap();
        assert_eq!(
            deep.apply(&tree()),
            paths(&["usr/lib/x86_64-linux-gnu/libssl.so.3"])
        );
    }

    #[test]
    fn test_unmatched_literals() {
        let rules = PrimeRules::parse(&["bin/zed", "bin/missing", "opt/*", "-nowhere"]).unwrap();
        let unmatched: Vec<_> = rules
            .unmatched_literals(&tree())
            .into_iter()
            .map(|r| r.as_str())
            .collect();
        assert_eq!(unmatched, vec!["bin/missing"]);
    }

    #[test]
    fn test_invalid_rules() {
        assert!(PrimeRule::parse("/usr/bin").is_err());
        assert!(PrimeRule::parse("../etc").is_err());
        assert!(PrimeRule::parse("-").is_err());
        assert!(PrimeRule::parse("usr/[bin").is_err());
    }

    #[test]
    fn test_trailing_slash_matches_directory() {
        let rule = PrimeRule::parse("usr/share/").unwrap();
        assert!(rule.matches(Path::new("usr/share/doc/libssl3/copyright")));
        assert!(!rule.matches(Path::new("usr/lib/libssl.so.3")));
        assert_eq!(rule.as_str(), "usr/share/");
    }
}
