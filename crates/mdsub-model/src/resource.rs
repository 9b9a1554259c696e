//! Authorization resource paths
//!
//! Provides [`ResourcePath`], the hierarchical `/programs/{p}/projects/{q}/...`
//! scope string checked by the policy engine. Resource paths are derived on
//! demand and never stored on graph nodes.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Slash-delimited authorization scope
///
/// # Examples
/// - `["programs", "CGCI"]` → `/programs/CGCI`
/// - `["programs", "CGCI", "projects", "BLGSP", "subjects", "S1"]`
///   → `/programs/CGCI/projects/BLGSP/subjects/S1`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourcePath(Vec<String>);

impl ResourcePath {
    /// Create path from segments
    #[inline]
    #[must_use]
    pub fn new(segments: Vec<String>) -> Self {
        Self(segments)
    }

    /// Root path `/`
    #[inline]
    #[must_use]
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// `/programs/{program}`
    #[must_use]
    pub fn program(program: &str) -> Self {
        Self(vec!["programs".into(), program.into()])
    }

    /// `/programs/{program}/projects/{project}`
    #[must_use]
    pub fn project(program: &str, project: &str) -> Self {
        Self::program(program).child("projects").child(project)
    }

    /// Get path segments
    #[inline]
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Append a segment, returning new path
    #[inline]
    #[must_use]
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut new = self.clone();
        new.0.push(segment.into());
        new
    }

    /// Append a `{collection}/{id}` pair
    #[inline]
    #[must_use]
    pub fn entity(&self, collection: impl Into<String>, id: impl Into<String>) -> Self {
        self.child(collection).child(id)
    }

    /// Get parent path (if not root)
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            None
        } else {
            Some(Self(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    /// Check if this path is a prefix of another
    #[must_use]
    pub fn is_prefix_of(&self, other: &Self) -> bool {
        if self.0.len() > other.0.len() {
            return false;
        }
        self.0 == other.0[..self.0.len()]
    }
}

impl Display for ResourcePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.0.join("/"))
    }
}

impl FromStr for ResourcePath {
    type Err = ResourcePathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix('/')
            .ok_or_else(|| ResourcePathError::NotAbsolute(s.to_string()))?;
        if rest.is_empty() {
            return Ok(Self::root());
        }
        let segments = rest
            .split('/')
            .map(|seg| {
                if seg.is_empty() {
                    Err(ResourcePathError::EmptySegment(s.to_string()))
                } else {
                    Ok(seg.to_string())
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self(segments))
    }
}

/// Resource path parse errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResourcePathError {
    #[error("resource path must start with '/': '{0}'")]
    NotAbsolute(String),

    #[error("empty segment in resource path '{0}'")]
    EmptySegment(String),
}
