//! User-friendly diagnostic messages.
//!
//! Every fatal error is reported with its root cause, the context needed to
//! act on it (which part, which file, which rule) and suggested fixes.

use std::fmt;
use std::path::PathBuf;

/// Common suggestion messages.
pub mod suggestions {
    pub const NO_MANIFEST: &str = "Run `dock init` to create a dock.toml";

    pub const BUILD_FAILED: &str = "Inspect the part's build log, or rerun with `--verbose`";

    pub const FETCH_FAILED: &str = "Check the source URL and your network connection";

    pub const SHALLOW_HISTORY: &str =
        "Remove `source-depth` or raise it so the required history is fetched";

    pub const UNKNOWN_PACKAGE: &str =
        "Check the package name against the host package manager (`apt-cache search`)";

    pub const ENTRY_POINT: &str =
        "Make sure a part installs the command, and that prime rules keep it";

    pub const PATCHELF: &str = "Install patchelf or set `tools.patchelf` in .dock/config.toml";
}

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Note => write!(f, "note"),
        }
    }
}

/// A diagnostic message with optional suggestions.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub message: String,
    pub severity: Severity,
    /// Additional context lines
    pub context: Vec<String>,
    pub suggestions: Vec<String>,
    /// Related file
    pub location: Option<PathBuf>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Diagnostic {
            message: message.into(),
            severity: Severity::Error,
            context: Vec::new(),
            suggestions: Vec::new(),
            location: None,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Warning,
            ..Diagnostic::error(message)
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context.push(context.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_location(mut self, path: impl Into<PathBuf>) -> Self {
        self.location = Some(path.into());
        self
    }

    /// Format the diagnostic for terminal output.
    pub fn format(&self, color: bool) -> String {
        let severity = if color {
            match self.severity {
                Severity::Error => "\x1b[1;31merror\x1b[0m",
                Severity::Warning => "\x1b[1;33mwarning\x1b[0m",
                Severity::Note => "\x1b[1;36mnote\x1b[0m",
            }
            .to_string()
        } else {
            self.severity.to_string()
        };

        let mut output = format!("{}: {}\n", severity, self.message);

        if let Some(ref path) = self.location {
            output.push_str(&format!("  --> {}\n", path.display()));
        }

        for ctx in &self.context {
            output.push_str(&format!("  = {}\n", ctx));
        }

        if !self.suggestions.is_empty() {
            let help = if color { "\x1b[1;32mhelp\x1b[0m" } else { "help" };
            for suggestion in &self.suggestions {
                output.push_str(&format!("{}: {}\n", help, suggestion));
            }
        }

        output
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_plain() {
        let diag = Diagnostic::error("part `zed` failed to build")
            .with_location("/proj/.dock/parts/zed/build.log")
            .with_context("exit code 101")
            .with_suggestion(suggestions::BUILD_FAILED);

        let text = diag.format(false);
        assert!(text.starts_with("error: part `zed` failed to build\n"));
        assert!(text.contains("  --> /proj/.dock/parts/zed/build.log"));
        assert!(text.contains("  = exit code 101"));
        assert!(text.contains("help: Inspect the part's build log"));
    }

    #[test]
    fn test_warning_severity() {
        let diag = Diagnostic::warning("ignoring unknown key `grade2`");
        assert_eq!(diag.severity, Severity::Warning);
        assert!(diag.to_string().starts_with("warning:"));
    }
}
