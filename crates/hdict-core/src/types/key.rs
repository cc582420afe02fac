//! Hierarchical key paths.
//!
//! Keys are slash-joined segments: `"run/settings/gain"`. The empty path
//! names the root group.

use crate::error::{HdictError, Result};

pub const SEPARATOR: char = '/';

/// Validate a single path segment.
pub fn validate_segment(segment: &str) -> Result<()> {
    if segment.is_empty() {
        return Err(HdictError::InvalidKey("empty key segment".into()));
    }
    if segment.contains(SEPARATOR) {
        return Err(HdictError::InvalidKey(format!(
            "'{segment}' must not contain '{SEPARATOR}'"
        )));
    }
    if segment == "." || segment == ".." {
        return Err(HdictError::InvalidKey(format!("'{segment}' is reserved")));
    }
    Ok(())
}

/// Split and validate a full key path. Leading and trailing separators are
/// ignored; empty inner segments are rejected.
pub fn split(path: &str) -> Result<Vec<&str>> {
    let trimmed = path.trim_matches(SEPARATOR);
    if trimmed.is_empty() {
        return Err(HdictError::InvalidKey("empty key".into()));
    }
    let segments: Vec<&str> = trimmed.split(SEPARATOR).collect();
    for segment in &segments {
        validate_segment(segment)?;
    }
    Ok(segments)
}

/// Normalized form of a path (no leading/trailing separator).
pub fn normalize(path: &str) -> Result<String> {
    Ok(split(path)?.join("/"))
}

pub fn join(parent: &str, child: &str) -> String {
    if parent.is_empty() {
        child.to_string()
    } else {
        format!("{parent}{SEPARATOR}{child}")
    }
}

/// True if `path` equals `ancestor` or lies below it.
pub fn is_within(path: &str, ancestor: &str) -> bool {
    path == ancestor
        || (path.len() > ancestor.len()
            && path.starts_with(ancestor)
            && path.as_bytes()[ancestor.len()] == SEPARATOR as u8)
}

/// Top-level segment of a path.
pub fn root_of(path: &str) -> &str {
    path.split(SEPARATOR).next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_and_normalize() {
        assert_eq!(split("a/b/c").unwrap(), vec!["a", "b", "c"]);
        assert_eq!(normalize("/a/b/").unwrap(), "a/b");
        assert!(split("").is_err());
        assert!(split("a//b").is_err());
        assert!(split("a/../b").is_err());
    }

    #[test]
    fn test_is_within() {
        assert!(is_within("a/b", "a"));
        assert!(is_within("a", "a"));
        assert!(!is_within("ab", "a"));
        assert!(!is_within("a", "a/b"));
    }

    #[test]
    fn test_join_and_root() {
        assert_eq!(join("", "x"), "x");
        assert_eq!(join("a/b", "x"), "a/b/x");
        assert_eq!(root_of("a/b/c"), "a");
        assert_eq!(root_of("solo"), "solo");
    }
}
