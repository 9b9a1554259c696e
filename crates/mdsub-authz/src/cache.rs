//! Authorization decision cache
//!
//! Keyed by `(token fingerprint, role set, resource path)`. Only allow
//! decisions are cached, each for `min(window, remaining token lifetime)`
//! as measured by the injected [`Clock`]. The moka TTL is only a coarse
//! eviction bound; entry expiry is what decides hits.

use crate::clock::{add_duration, Clock};
use crate::policy::RoleSet;
use chrono::{DateTime, Utc};
use mdsub_model::{ResourcePath, TokenFingerprint};
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

/// Minimum coarse eviction bound
const MIN_EVICTION_TTL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    fingerprint: TokenFingerprint,
    roles: RoleSet,
    path: ResourcePath,
}

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    expires_at: DateTime<Utc>,
}

/// Statistics for cache monitoring
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    /// Number of entries in cache
    pub entry_count: u64,
}

/// Process-wide cache of allow decisions
#[derive(Debug, Clone)]
pub struct AuthzCache {
    inner: Cache<CacheKey, CacheEntry>,
    clock: Arc<dyn Clock>,
    window: Duration,
}

impl AuthzCache {
    /// Create cache holding at most `max_capacity` decisions for `window` each
    #[must_use]
    pub fn new(max_capacity: u64, window: Duration, clock: Arc<dyn Clock>) -> Self {
        let ttl = window.saturating_mul(10).max(MIN_EVICTION_TTL);
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
            clock,
            window,
        }
    }

    #[inline]
    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// True if an unexpired allow is cached
    pub async fn is_allowed(
        &self,
        fingerprint: TokenFingerprint,
        roles: &RoleSet,
        path: &ResourcePath,
    ) -> bool {
        let key = CacheKey {
            fingerprint,
            roles: roles.clone(),
            path: path.clone(),
        };
        match self.inner.get(&key).await {
            Some(entry) if entry.expires_at > self.clock.now() => true,
            Some(_) => {
                self.inner.invalidate(&key).await;
                false
            }
            None => false,
        }
    }

    /// Cache an allow, never past `token_expires_at`
    pub async fn insert_allow(
        &self,
        fingerprint: TokenFingerprint,
        roles: &RoleSet,
        path: &ResourcePath,
        token_expires_at: Option<DateTime<Utc>>,
    ) {
        let now = self.clock.now();
        let mut expires_at = add_duration(now, self.window);
        if let Some(token_exp) = token_expires_at {
            expires_at = expires_at.min(token_exp);
        }
        if expires_at <= now {
            return;
        }
        let key = CacheKey {
            fingerprint,
            roles: roles.clone(),
            path: path.clone(),
        };
        self.inner.insert(key, CacheEntry { expires_at }).await;
    }

    /// Drop every cached decision
    pub fn clear(&self) {
        self.inner.invalidate_all();
    }

    /// Get cache statistics
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entry_count: self.inner.entry_count(),
        }
    }
}
