//! Hashing utilities for checksums and cache keys.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

/// Compute SHA256 hash of a byte slice.
pub fn sha256_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Compute SHA256 hash of a string.
pub fn sha256_str(s: &str) -> String {
    sha256_bytes(s.as_bytes())
}

/// Compute SHA256 hash of a file.
pub fn sha256_file(path: &Path) -> Result<String> {
    let file = File::open(path)
        .with_context(|| format!("failed to open file for hashing: {}", path.display()))?;

    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Builds a cache key from several components.
///
/// Components are separated so that `("ab", "c")` and `("a", "bc")`
/// produce different keys.
#[derive(Default)]
pub struct CacheKey {
    hasher: Sha256,
}

impl CacheKey {
    pub fn new() -> Self {
        CacheKey {
            hasher: Sha256::new(),
        }
    }

    /// Add a string component.
    pub fn update_str(&mut self, s: &str) -> &mut Self {
        self.hasher.update(s.as_bytes());
        self.hasher.update(b"\0");
        self
    }

    /// Add an optional string component.
    pub fn update_opt(&mut self, opt: Option<&str>) -> &mut Self {
        match opt {
            Some(s) => {
                self.hasher.update(b"\x01");
                self.update_str(s);
            }
            None => {
                self.hasher.update(b"\x00");
            }
        }
        self
    }

    /// Finalize and return a short key (first 16 hex chars).
    pub fn finish_short(self) -> String {
        hex::encode(self.hasher.finalize())[..16].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sha256_str() {
        assert_eq!(
            sha256_str("hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_sha256_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("test.txt");
        std::fs::write(&path, "hello").unwrap();
        assert_eq!(sha256_file(&path).unwrap(), sha256_str("hello"));
    }

    #[test]
    fn test_cache_key_separates_components() {
        let a = {
            let mut k = CacheKey::new();
            k.update_str("ab").update_str("c");
            k.finish_short()
        };
        let b = {
            let mut k = CacheKey::new();
            k.update_str("a").update_str("bc");
            k.finish_short()
        };
        assert_ne!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn test_cache_key_optional() {
        let some = {
            let mut k = CacheKey::new();
            k.update_opt(Some(""));
            k.finish_short()
        };
        let none = {
            let mut k = CacheKey::new();
            k.update_opt(None);
            k.finish_short()
        };
        assert_ne!(some, none);
    }
}
