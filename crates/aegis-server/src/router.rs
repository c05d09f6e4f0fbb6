//! Path dispatch table.
//!
//! Patterns follow the familiar serve-mux rules:
//!
//! - a pattern without a trailing slash matches that exact path only;
//! - a pattern ending in `/` names a subtree and matches every path that
//!   starts with it;
//! - when several patterns match, the longest one wins, and an exact match
//!   always beats a subtree.
//!
//! ```rust
//! use aegis_server::PathRouter;
//!
//! let mut router = PathRouter::new();
//! router.insert("/", "root");
//! router.insert("/images/", "images");
//! router.insert("/images/thumbnails/", "thumbs");
//! router.insert("/health", "health");
//!
//! assert_eq!(router.lookup("/health").map(|m| *m.value()), Some("health"));
//! assert_eq!(router.lookup("/images/a.png").map(|m| *m.value()), Some("images"));
//! assert_eq!(router.lookup("/images/thumbnails/a.png").map(|m| m.pattern()), Some("/images/thumbnails/"));
//! assert_eq!(router.lookup("/health/deep").map(|m| *m.value()), Some("root"));
//! ```

use std::collections::HashMap;

/// A matched entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathMatch<'a, T> {
    pattern: &'a str,
    value: &'a T,
}

impl<'a, T> PathMatch<'a, T> {
    /// Returns the pattern that matched.
    #[must_use]
    pub fn pattern(&self) -> &'a str {
        self.pattern
    }

    /// Returns the value registered for the pattern.
    #[must_use]
    pub fn value(&self) -> &'a T {
        self.value
    }
}

/// Maps path patterns to values.
#[derive(Debug, Clone)]
pub struct PathRouter<T> {
    exact: HashMap<String, T>,
    // Sorted longest first so the first prefix hit is the best one.
    subtrees: Vec<(String, T)>,
}

impl<T> PathRouter<T> {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self {
            exact: HashMap::new(),
            subtrees: Vec::new(),
        }
    }

    /// Registers `value` under `pattern`.
    ///
    /// Returns the value previously registered for the same pattern.
    pub fn insert(&mut self, pattern: impl Into<String>, value: T) -> Option<T> {
        let pattern = pattern.into();
        if !pattern.ends_with('/') {
            return self.exact.insert(pattern, value);
        }

        if let Some(slot) = self.subtrees.iter_mut().find(|(p, _)| *p == pattern) {
            return Some(std::mem::replace(&mut slot.1, value));
        }
        let at = self
            .subtrees
            .iter()
            .position(|(p, _)| p.len() < pattern.len())
            .unwrap_or(self.subtrees.len());
        self.subtrees.insert(at, (pattern, value));
        None
    }

    /// Finds the best match for `path`.
    #[must_use]
    pub fn lookup(&self, path: &str) -> Option<PathMatch<'_, T>> {
        if let Some((pattern, value)) = self.exact.get_key_value(path) {
            return Some(PathMatch {
                pattern: pattern.as_str(),
                value,
            });
        }
        self.subtrees
            .iter()
            .find(|(pattern, _)| path.starts_with(pattern.as_str()))
            .map(|(pattern, value)| PathMatch {
                pattern: pattern.as_str(),
                value,
            })
    }

    /// Returns the value registered for exactly `pattern`.
    #[must_use]
    pub fn get(&self, pattern: &str) -> Option<&T> {
        self.exact.get(pattern).or_else(|| {
            self.subtrees
                .iter()
                .find(|(p, _)| p == pattern)
                .map(|(_, value)| value)
        })
    }

    /// Returns every registered pattern.
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.exact
            .keys()
            .map(String::as_str)
            .chain(self.subtrees.iter().map(|(p, _)| p.as_str()))
    }

    /// Returns the number of registered patterns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.exact.len() + self.subtrees.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for PathRouter<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_does_not_match_subpaths() {
        let mut router = PathRouter::new();
        router.insert("/ping", 1);
        assert!(router.lookup("/ping").is_some());
        assert!(router.lookup("/ping/").is_none());
        assert!(router.lookup("/pingx").is_none());
    }

    #[test]
    fn test_longest_subtree_wins_regardless_of_order() {
        let mut router = PathRouter::new();
        router.insert("/a/b/", "deep");
        router.insert("/", "root");
        router.insert("/a/", "shallow");

        assert_eq!(router.lookup("/a/b/c").map(|m| *m.value()), Some("deep"));
        assert_eq!(router.lookup("/a/x").map(|m| *m.value()), Some("shallow"));
        assert_eq!(router.lookup("/zzz").map(|m| *m.value()), Some("root"));
    }

    #[test]
    fn test_exact_beats_subtree() {
        let mut router = PathRouter::new();
        router.insert("/a/", "tree");
        router.insert("/a/index", "exact");
        assert_eq!(router.lookup("/a/index").map(|m| m.pattern()), Some("/a/index"));
    }

    #[test]
    fn test_reinsert_replaces() {
        let mut router = PathRouter::new();
        assert_eq!(router.insert("/x/", 1), None);
        assert_eq!(router.insert("/x/", 2), Some(1));
        assert_eq!(router.insert("/y", 3), None);
        assert_eq!(router.insert("/y", 4), Some(3));
        assert_eq!(router.len(), 2);
        assert_eq!(router.get("/x/"), Some(&2));
    }

    #[test]
    fn test_no_match() {
        let mut router: PathRouter<()> = PathRouter::new();
        assert!(router.is_empty());
        assert!(router.lookup("/").is_none());
        router.insert("/only", ());
        assert!(router.lookup("/").is_none());
        assert_eq!(router.patterns().collect::<Vec<_>>(), vec!["/only"]);
    }
}
