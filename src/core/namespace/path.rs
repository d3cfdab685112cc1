//! Absolute path helpers

use crate::error::{DeedsError, Result};

pub const ROOT: &str = "/";

/// Validate an absolute path and strip a trailing `/`
pub fn normalize(path: &str) -> Result<String> {
    if !path.starts_with('/') {
        return Err(DeedsError::InvalidPath(format!("{} is not absolute", path)));
    }

    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return Ok(ROOT.to_string());
    }

    for component in trimmed[1..].split('/') {
        if component.is_empty() || component == "." || component == ".." {
            return Err(DeedsError::InvalidPath(format!(
                "{} contains an empty, '.' or '..' component",
                path
            )));
        }
    }

    Ok(trimmed.to_string())
}

/// Parent directory; `None` for root
pub fn parent(path: &str) -> Option<&str> {
    if path == ROOT {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some(ROOT),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// Last component of a path
pub fn file_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Ancestors from the parent up to and including root
pub fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    std::iter::successors(parent(path), |p| parent(p))
}

pub fn join(dir: &str, name: &str) -> String {
    if dir == ROOT {
        format!("/{}", name)
    } else {
        format!("{}/{}", dir, name)
    }
}

/// True if `path` is `dir` or lies beneath it
pub fn is_within(path: &str, dir: &str) -> bool {
    if dir == ROOT {
        return true;
    }
    path == dir
        || (path.len() > dir.len() && path.starts_with(dir) && path.as_bytes()[dir.len()] == b'/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("/").unwrap(), "/");
        assert_eq!(normalize("/docs/").unwrap(), "/docs");
        assert_eq!(normalize("/a/b").unwrap(), "/a/b");
        assert!(normalize("docs").is_err());
        assert!(normalize("/a//b").is_err());
        assert!(normalize("/a/../b").is_err());
    }

    #[test]
    fn test_parent_and_name() {
        assert_eq!(parent("/"), None);
        assert_eq!(parent("/a"), Some("/"));
        assert_eq!(parent("/a/b/c"), Some("/a/b"));
        assert_eq!(file_name("/a/b/c"), "c");
        assert_eq!(file_name("/a"), "a");
    }

    #[test]
    fn test_ancestors_reach_root() {
        let chain: Vec<_> = ancestors("/a/b/c").collect();
        assert_eq!(chain, vec!["/a/b", "/a", "/"]);
        assert_eq!(ancestors("/").count(), 0);
    }

    #[test]
    fn test_is_within() {
        assert!(is_within("/a/b", "/a"));
        assert!(is_within("/a", "/a"));
        assert!(!is_within("/ab", "/a"));
        assert!(is_within("/anything", "/"));
    }

    #[test]
    fn test_join() {
        assert_eq!(join("/", "a"), "/a");
        assert_eq!(join("/a", "b"), "/a/b");
    }
}
