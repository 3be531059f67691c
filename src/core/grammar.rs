//! Name and version grammars for manifests.

use std::sync::LazyLock;

use regex::Regex;

/// Maximum length of a package name.
pub const MAX_NAME_LEN: usize = 40;

/// Maximum length of a package version.
pub const MAX_VERSION_LEN: usize = 32;

/// Maximum length of the one-line summary.
pub const MAX_SUMMARY_LEN: usize = 78;

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").expect("static regex"));

static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9](?:[a-zA-Z0-9:.+~-]{0,30}[a-zA-Z0-9+~])?$").expect("static regex")
});

static PART_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9+-]*$").expect("static regex"));

static APP_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9](?:-?[a-zA-Z0-9])*$").expect("static regex"));

static ENV_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static regex"));

/// Check a package name: lowercase letters, digits and single hyphens,
/// at least one letter, at most 40 characters.
pub fn check_package_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("must not be empty".to_string());
    }
    if name.len() > MAX_NAME_LEN {
        return Err(format!("must be at most {} characters", MAX_NAME_LEN));
    }
    if !NAME_RE.is_match(name) {
        return Err(
            "may only contain lowercase letters, digits and hyphens, \
             and may not start or end with a hyphen or contain `--`"
                .to_string(),
        );
    }
    if !name.chars().any(|c| c.is_ascii_lowercase()) {
        return Err("must contain at least one letter".to_string());
    }
    Ok(())
}

/// Check a package version string.
pub fn check_version(version: &str) -> Result<(), String> {
    if version.is_empty() {
        return Err("must not be empty".to_string());
    }
    if version.len() > MAX_VERSION_LEN {
        return Err(format!("must be at most {} characters", MAX_VERSION_LEN));
    }
    if !VERSION_RE.is_match(version) {
        return Err(
            "must start with a letter or digit, end with a letter, digit, `+` or `~`, \
             and contain only letters, digits and `:.+~-`"
                .to_string(),
        );
    }
    Ok(())
}

pub fn check_part_name(name: &str) -> Result<(), String> {
    if PART_NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err("part names may contain lowercase letters, digits, `+` and `-`".to_string())
    }
}

pub fn check_app_name(name: &str) -> Result<(), String> {
    if APP_NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err("app names may contain letters, digits and single hyphens".to_string())
    }
}

pub fn check_env_name(name: &str) -> Result<(), String> {
    if ENV_NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(format!("`{}` is not a valid environment variable name", name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_names() {
        assert!(check_package_name("zed").is_ok());
        assert!(check_package_name("zed-editor2").is_ok());
        assert!(check_package_name("").is_err());
        assert!(check_package_name("Zed").is_err());
        assert!(check_package_name("-zed").is_err());
        assert!(check_package_name("zed--editor").is_err());
        assert!(check_package_name("1234").is_err());
        assert!(check_package_name(&"a".repeat(41)).is_err());
    }

    #[test]
    fn test_versions() {
        assert!(check_version("0.150.4").is_ok());
        assert!(check_version("1.0+git20240101").is_ok());
        assert!(check_version("2~beta").is_ok());
        assert!(check_version("v1").is_ok());
        assert!(check_version("").is_err());
        assert!(check_version("1.0-").is_err());
        assert!(check_version(".1").is_err());
        assert!(check_version("1 0").is_err());
        assert!(check_version(&"1".repeat(33)).is_err());
    }

    #[test]
    fn test_part_and_app_names() {
        assert!(check_part_name("zed").is_ok());
        assert!(check_part_name("libfoo+bar").is_ok());
        assert!(check_part_name("Zed").is_err());
        assert!(check_app_name("zed-editor").is_ok());
        assert!(check_app_name("zed_editor").is_err());
    }

    #[test]
    fn test_env_names() {
        assert!(check_env_name("ZED_RELEASE_CHANNEL").is_ok());
        assert!(check_env_name("_x1").is_ok());
        assert!(check_env_name("1X").is_err());
        assert!(check_env_name("A-B").is_err());
    }
}
