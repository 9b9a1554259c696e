//! External policy engine seam

use crate::error::PolicyError;
use crate::identity::Identity;
use async_trait::async_trait;
use mdsub_model::ResourcePath;
use std::collections::BTreeSet;
use std::fmt;

/// Outcome of an access check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

impl From<bool> for Decision {
    fn from(allowed: bool) -> Self {
        if allowed {
            Self::Allow
        } else {
            Self::Deny
        }
    }
}

/// Outcome of a resource creation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceCreation {
    Created,
    AlreadyExists,
}

/// Ordered, de-duplicated set of role names
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoleSet(BTreeSet<String>);

impl RoleSet {
    /// Create from role names
    pub fn new<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(roles.into_iter().map(Into::into).collect())
    }

    /// Any role (`*`)
    #[must_use]
    pub fn any() -> Self {
        Self::new(["*"])
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    #[must_use]
    pub fn contains(&self, role: &str) -> bool {
        self.0.contains(role)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for RoleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<_> = self.iter().collect();
        f.write_str(&joined.join(","))
    }
}

/// External authorization service
///
/// The engine receives the caller's identity so it can forward the token;
/// it never caches. Caching is the gate's job.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PolicyEngine: Send + Sync {
    /// Check whether the caller holds `roles` on every path in `paths`
    async fn check_access(
        &self,
        identity: &Identity,
        roles: &RoleSet,
        paths: &[ResourcePath],
    ) -> Result<Decision, PolicyError>;

    /// Create a resource path; existing paths are not an error
    async fn create_resource(&self, path: &ResourcePath) -> Result<ResourceCreation, PolicyError>;
}
