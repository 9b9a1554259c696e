//! Authorization gate
//!
//! `authorize` is all-or-nothing per call: every distinct path must be
//! allowed or the whole call fails, since the caller goes on to mutate all
//! listed resources together.

use crate::cache::AuthzCache;
use crate::clock::Clock;
use crate::error::{AuthzError, AuthzResult};
use crate::identity::Identity;
use crate::policy::{Decision, PolicyEngine, ResourceCreation, RoleSet};
use mdsub_model::ResourcePath;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Gate configuration
#[derive(Debug, Clone, Copy)]
pub struct GateConfig {
    /// Cache window; tokens expiring within it always bypass the cache
    pub cache_window: Duration,
    pub cache_capacity: u64,
    /// Deadline for each policy-engine call
    pub policy_timeout: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            cache_window: Duration::from_secs(1),
            cache_capacity: 10_000,
            policy_timeout: Duration::from_secs(5),
        }
    }
}

/// Result of an idempotent resource creation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceOutcome {
    Created,
    AlreadyExists,
    /// Creation failed; logged, never propagated
    Failed,
}

/// Checks required roles on resource paths against the policy engine
#[derive(Clone)]
pub struct AuthorizationGate {
    policy: Arc<dyn PolicyEngine>,
    cache: AuthzCache,
    clock: Arc<dyn Clock>,
    config: GateConfig,
}

impl std::fmt::Debug for AuthorizationGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationGate")
            .field("cache", &self.cache.stats())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AuthorizationGate {
    /// Create gate
    #[must_use]
    pub fn new(policy: Arc<dyn PolicyEngine>, clock: Arc<dyn Clock>, config: GateConfig) -> Self {
        let cache = AuthzCache::new(config.cache_capacity, config.cache_window, Arc::clone(&clock));
        Self {
            policy,
            cache,
            clock,
            config,
        }
    }

    #[inline]
    #[must_use]
    pub fn cache(&self) -> &AuthzCache {
        &self.cache
    }

    /// Require `roles` on every path
    ///
    /// One policy call per distinct uncached path. Any deny fails the whole
    /// call immediately.
    pub async fn authorize(
        &self,
        identity: &Identity,
        roles: &RoleSet,
        paths: &[ResourcePath],
    ) -> AuthzResult<()> {
        let fingerprint = identity.fingerprint();
        let near_expiry = identity.is_near_expiry(self.clock.now(), self.config.cache_window);
        let mut seen = HashSet::new();

        for path in paths.iter().filter(|p| seen.insert(*p)) {
            if !near_expiry && self.cache.is_allowed(fingerprint, roles, path).await {
                tracing::trace!(%path, "authorization cache hit");
                continue;
            }

            let decision = tokio::time::timeout(
                self.config.policy_timeout,
                self.policy
                    .check_access(identity, roles, std::slice::from_ref(path)),
            )
            .await
            .map_err(|_| AuthzError::Timeout(self.config.policy_timeout))??;

            match decision {
                Decision::Allow => {
                    if !near_expiry {
                        self.cache
                            .insert_allow(fingerprint, roles, path, identity.expires_at())
                            .await;
                    }
                }
                Decision::Deny => {
                    tracing::debug!(
                        %path,
                        %roles,
                        token = %fingerprint.short(),
                        "authorization denied"
                    );
                    return Err(AuthzError::Denied {
                        path: path.clone(),
                        roles: roles.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Create a resource path if missing
    ///
    /// Already existing is a no-op. Failures are logged and swallowed.
    pub async fn ensure_resource(&self, path: &ResourcePath) -> ResourceOutcome {
        tracing::info!(%path, "creating policy resource");
        let created = tokio::time::timeout(
            self.config.policy_timeout,
            self.policy.create_resource(path),
        )
        .await;
        match created {
            Ok(Ok(ResourceCreation::Created)) => ResourceOutcome::Created,
            Ok(Ok(ResourceCreation::AlreadyExists)) => {
                tracing::debug!(%path, "policy resource already exists");
                ResourceOutcome::AlreadyExists
            }
            Ok(Err(err)) => {
                tracing::warn!(%path, error = %err, "unable to create policy resource");
                ResourceOutcome::Failed
            }
            Err(_) => {
                tracing::warn!(%path, "policy resource creation timed out");
                ResourceOutcome::Failed
            }
        }
    }
}
