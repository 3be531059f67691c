//! Apps: the entry points a package exposes.

use indexmap::IndexMap;

/// An exposed entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct App {
    pub name: String,
    /// Command line; the first word is the executable relative to the
    /// package root.
    pub command: String,
    pub environment: IndexMap<String, String>,
    /// Desktop file path relative to the package root.
    pub desktop: Option<String>,
}

impl App {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        App {
            name: name.into(),
            command: command.into(),
            environment: IndexMap::new(),
            desktop: None,
        }
    }

    /// The executable part of the command.
    pub fn executable(&self) -> &str {
        self.command.split_whitespace().next().unwrap_or("")
    }

    /// Arguments following the executable.
    pub fn args(&self) -> Vec<&str> {
        self.command.split_whitespace().skip(1).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_split() {
        let app = App::new("zed-editor", "bin/zed --foreground  --new");
        assert_eq!(app.executable(), "bin/zed");
        assert_eq!(app.args(), vec!["--foreground", "--new"]);

        let bare = App::new("zed", "zed");
        assert_eq!(bare.executable(), "zed");
        assert!(bare.args().is_empty());
    }
}
