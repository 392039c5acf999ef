//! Hierarchical cache keys.
//!
//! A key is an ordered tuple of segments such as `["posts", {page, limit}]`
//! or `["projects", "detail", id]`. Invalidation and cancellation address
//! every key that starts with a given prefix.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeySegment {
    Name(String),
    Page { page: u32, limit: u32 },
}

impl From<&str> for KeySegment {
    fn from(name: &str) -> Self {
        KeySegment::Name(name.to_string())
    }
}

impl From<String> for KeySegment {
    fn from(name: String) -> Self {
        KeySegment::Name(name)
    }
}

impl fmt::Display for KeySegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySegment::Name(name) => write!(f, "{name:?}"),
            KeySegment::Page { page, limit } => write!(f, "{{page:{page},limit:{limit}}}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey(Vec<KeySegment>);

impl QueryKey {
    pub fn new(root: impl Into<KeySegment>) -> Self {
        Self(vec![root.into()])
    }

    /// Append a segment.
    pub fn with(mut self, segment: impl Into<KeySegment>) -> Self {
        self.0.push(segment.into());
        self
    }

    /// Append a `{page, limit}` segment.
    pub fn page(self, page: u32, limit: u32) -> Self {
        self.with(KeySegment::Page { page, limit })
    }

    /// Whether `prefix` matches this key segment by segment. A key is its
    /// own prefix.
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{segment}")?;
        }
        f.write_str("]")
    }
}
