//! Canonical path sets and glob patterns
//!
//! Every path stored in a [`PathSet`] is lexically cleaned first, so
//! `./src/../lib//a.rs` and `lib/a.rs` are the same member. Patterns use
//! fnmatch semantics without path awareness: `*` and `?` also match `/`, so
//! `*` covers every path in a set.

use globset::{GlobBuilder, GlobMatcher};
use std::collections::BTreeSet;

/// Lexically clean a slash-separated path.
///
/// Removes `.` segments and duplicate separators, resolves `..` against the
/// preceding segment, and drops any trailing separator. `..` at the start of
/// a relative path is kept; at the root it is dropped. The empty path cleans
/// to `.`. The filesystem is never consulted.
#[must_use]
pub fn clean_path(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }
    let rooted = path.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => match segments.last() {
                Some(&last) if last != ".." => {
                    segments.pop();
                }
                _ if rooted => {}
                _ => segments.push(".."),
            },
            other => segments.push(other),
        }
    }

    let joined = segments.join("/");
    match (rooted, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

/// A compiled glob pattern.
///
/// The empty pattern compiles but matches nothing.
#[derive(Debug, Clone)]
pub struct Pattern {
    raw: String,
    matcher: Option<GlobMatcher>,
}

impl Pattern {
    /// Compile a pattern exactly as written.
    ///
    /// # Errors
    ///
    /// Returns the glob compiler's error for malformed patterns such as an
    /// unclosed character class.
    pub fn new(pattern: &str) -> std::result::Result<Self, globset::Error> {
        let matcher = if pattern.is_empty() {
            None
        } else {
            Some(
                GlobBuilder::new(pattern)
                    .literal_separator(false)
                    .backslash_escape(true)
                    .build()?
                    .compile_matcher(),
            )
        };
        Ok(Self {
            raw: pattern.to_string(),
            matcher,
        })
    }

    /// Compile the cleaned form of a pattern.
    ///
    /// # Errors
    ///
    /// Same as [`Pattern::new`].
    pub fn canonical(pattern: &str) -> std::result::Result<Self, globset::Error> {
        Self::new(&clean_path(pattern))
    }

    /// Whether `path` matches this pattern.
    #[must_use]
    pub fn is_match(&self, path: &str) -> bool {
        self.matcher.as_ref().is_some_and(|m| m.is_match(path))
    }

    /// The pattern text this matcher was compiled from.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

/// A set of canonical artifact paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathSet {
    paths: BTreeSet<String>,
}

impl PathSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert the cleaned form of `path`.
    pub fn add(&mut self, path: &str) {
        self.paths.insert(clean_path(path));
    }

    /// Exact membership test. `path` must already be canonical.
    #[must_use]
    pub fn has(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    /// Members of `self` not in `other`.
    #[must_use]
    pub fn difference(&self, other: &Self) -> Self {
        Self {
            paths: self.paths.difference(&other.paths).cloned().collect(),
        }
    }

    /// Members of both sets.
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Self {
        Self {
            paths: self.paths.intersection(&other.paths).cloned().collect(),
        }
    }

    /// Members of either set.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            paths: self.paths.union(&other.paths).cloned().collect(),
        }
    }

    /// Members matching `pattern`.
    #[must_use]
    pub fn filter(&self, pattern: &Pattern) -> Self {
        Self {
            paths: self
                .paths
                .iter()
                .filter(|p| pattern.is_match(p))
                .cloned()
                .collect(),
        }
    }

    /// Members in sorted order.
    #[must_use]
    pub fn to_vec(&self) -> Vec<String> {
        self.paths.iter().cloned().collect()
    }

    /// Iterate members in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Whether the set has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<S> for PathSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = Self::new();
        for path in iter {
            set.add(path.as_ref());
        }
        set
    }
}
