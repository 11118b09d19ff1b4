use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use crate::error::CyreError;

/// A validated, immutable full path: the sole key under which a channel
/// record and its subscriber are stored (spec §3 invariant I1/I2).
///
/// # Contract (What)
/// - Grammar: an ordered, non-empty sequence of segments separated by `/`;
///   each segment matches `^[A-Za-z0-9_-]+$`; no leading, trailing, or
///   doubled slashes.
/// - Two channels are equal iff their full paths are equal — `Path`
///   therefore derives `PartialEq`/`Eq`/`Hash` from its canonical string
///   so it can key a [`dashmap::DashMap`] directly.
///
/// Backed by `Arc<str>` rather than `String` since paths are cloned into
/// every metric event, compiled-plan cache entry, and scheduler entry for
/// a channel; an `Arc` clone is a refcount bump instead of an allocation.
#[derive(Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Path(Arc<str>);

impl Path {
    /// Parses and validates a full path, failing with
    /// [`CyreError::InvalidId`] if the grammar in spec §3 is violated.
    pub fn parse(raw: &str) -> Result<Self, CyreError> {
        if raw.is_empty() {
            return Err(CyreError::InvalidId("path must not be empty".into()));
        }
        if raw.starts_with('/') || raw.ends_with('/') {
            return Err(CyreError::InvalidId(format!(
                "path {raw:?} must not have a leading or trailing slash"
            )));
        }
        for segment in raw.split('/') {
            if segment.is_empty() {
                return Err(CyreError::InvalidId(format!(
                    "path {raw:?} contains an empty (doubled-slash) segment"
                )));
            }
            if !segment
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
            {
                return Err(CyreError::InvalidId(format!(
                    "path segment {segment:?} must match ^[A-Za-z0-9_-]+$"
                )));
            }
        }
        Ok(Self(Arc::from(raw)))
    }

    /// Joins a branch prefix (possibly empty) with a local id, producing
    /// the channel's full path. Both inputs are assumed already validated.
    pub fn join(prefix: &str, local: &str) -> Result<Self, CyreError> {
        if prefix.is_empty() {
            Self::parse(local)
        } else {
            Self::parse(&format!("{prefix}/{local}"))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    pub fn depth(&self) -> usize {
        self.segments().count()
    }
}

impl Deref for Path {
    type Target = str;
    fn deref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Path({:?})", self.0)
    }
}

impl TryFrom<&str> for Path {
    type Error = CyreError;
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl TryFrom<String> for Path {
    type Error = CyreError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_simple_and_nested_paths() {
        assert!(Path::parse("a").is_ok());
        assert!(Path::parse("a/b/c-1_2").is_ok());
    }

    #[test]
    fn rejects_malformed_paths() {
        assert!(Path::parse("").is_err());
        assert!(Path::parse("/a").is_err());
        assert!(Path::parse("a/").is_err());
        assert!(Path::parse("a//b").is_err());
        assert!(Path::parse("a/b c").is_err());
        assert!(Path::parse("a/b!").is_err());
    }

    #[test]
    fn join_prefixes_local_id() {
        let joined = Path::join("b1", "k").unwrap();
        assert_eq!(joined.as_str(), "b1/k");
        let root = Path::join("", "k").unwrap();
        assert_eq!(root.as_str(), "k");
    }
}
