//! Helpers for slash-separated destination strings
//!
//! Hierarchy is never stored: parents and children are derived from the
//! address strings themselves.

use crate::error::{MapError, Result};

/// Address of the root node
pub const ROOT: &str = "/";

/// Normalise a destination string
///
/// Requires a leading `/`, collapses repeated separators and strips a
/// trailing separator (root stays `/`).
///
/// ```rust
/// use param_map::address::normalize;
///
/// assert_eq!(normalize("//synth//osc1/").unwrap(), "/synth/osc1");
/// assert_eq!(normalize("/").unwrap(), "/");
/// assert!(normalize("synth").is_err());
/// ```
pub fn normalize(address: &str) -> Result<String> {
    if !address.starts_with('/') {
        return Err(MapError::InvalidAddress(address.to_string()));
    }

    let segments: Vec<&str> = address.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return Ok(ROOT.to_string());
    }

    Ok(format!("/{}", segments.join("/")))
}

/// Whether `address` is the root node
pub fn is_root(address: &str) -> bool {
    address == ROOT
}

/// Whether `candidate` equals `ancestor` or lies beneath it
///
/// Segment-aware: `/ab` is not beneath `/a`.
pub fn is_descendant(candidate: &str, ancestor: &str) -> bool {
    if is_root(ancestor) {
        return candidate.starts_with('/');
    }
    match candidate.strip_prefix(ancestor) {
        Some("") => true,
        Some(rest) => rest.starts_with('/'),
        None => false,
    }
}

/// Path relative to `ancestor`, without a leading separator
///
/// Returns `None` when `candidate` is not beneath `ancestor`.
pub fn relative<'a>(candidate: &'a str, ancestor: &str) -> Option<&'a str> {
    if !is_descendant(candidate, ancestor) {
        return None;
    }
    if is_root(ancestor) {
        return Some(&candidate[1..]);
    }
    let rest = &candidate[ancestor.len()..];
    Some(rest.strip_prefix('/').unwrap_or(rest))
}

/// Parent address, `None` for root
pub fn parent(address: &str) -> Option<&str> {
    if is_root(address) {
        return None;
    }
    match address.rfind('/') {
        Some(0) => Some(ROOT),
        Some(idx) => Some(&address[..idx]),
        None => None,
    }
}

/// Non-empty path segments
pub fn segments(address: &str) -> impl Iterator<Item = &str> {
    address.split('/').filter(|s| !s.is_empty())
}

/// Append one segment to a parent address
pub fn join(parent: &str, segment: &str) -> String {
    if is_root(parent) {
        format!("/{segment}")
    } else {
        format!("{parent}/{segment}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("/", "/")]
    #[case("//", "/")]
    #[case("/a", "/a")]
    #[case("/a/", "/a")]
    #[case("/a//b", "/a/b")]
    #[case("///a/b/c//", "/a/b/c")]
    fn test_normalize(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize(input).unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("a/b")]
    #[case("synth")]
    fn test_normalize_rejects(#[case] input: &str) {
        assert!(matches!(normalize(input), Err(MapError::InvalidAddress(_))));
    }

    #[test]
    fn test_is_descendant() {
        assert!(is_descendant("/a/b", "/a"));
        assert!(is_descendant("/a", "/a"));
        assert!(is_descendant("/a", "/"));
        assert!(!is_descendant("/ab", "/a"));
        assert!(!is_descendant("/a", "/a/b"));
    }

    #[test]
    fn test_relative() {
        assert_eq!(relative("/a/b/c", "/a"), Some("b/c"));
        assert_eq!(relative("/a/b/c", "/"), Some("a/b/c"));
        assert_eq!(relative("/a", "/a"), Some(""));
        assert_eq!(relative("/ab", "/a"), None);
    }

    #[test]
    fn test_parent_and_join() {
        assert_eq!(parent("/a/b"), Some("/a"));
        assert_eq!(parent("/a"), Some("/"));
        assert_eq!(parent("/"), None);
        assert_eq!(join("/", "a"), "/a");
        assert_eq!(join("/a", "b"), "/a/b");
        assert_eq!(segments("/a/b/c").collect::<Vec<_>>(), vec!["a", "b", "c"]);
    }
}
