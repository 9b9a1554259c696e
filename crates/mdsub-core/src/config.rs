//! Engine configuration

use crate::error::{SubmissionError, SubmissionResult};
use mdsub_authz::GateConfig;
use mdsub_graph::{DEFAULT_ID_NAMESPACE, DEFAULT_MAX_DEPTH};
use mdsub_model::ResourcePath;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// What happens to the valid part of a batch when some documents are invalid
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitPolicy {
    /// Invalid documents are skipped, the rest commit
    #[default]
    SkipInvalid,
    /// One invalid document skips the whole batch
    AllOrNothing,
}

/// Submission engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Concurrent pipeline invocations in the worker pool
    pub worker_pool_size: usize,
    /// Jobs waiting for a worker before submissions are refused
    pub worker_queue_capacity: usize,
    /// Authorization cache window in milliseconds
    pub authz_cache_window_ms: u64,
    pub authz_cache_capacity: u64,
    /// Per policy-engine call deadline in milliseconds
    pub policy_timeout_ms: u64,
    /// Unit-of-work deadline in milliseconds
    pub storage_timeout_ms: u64,
    /// Parent-hop cap of the resolver
    pub max_traversal_depth: usize,
    pub commit_policy: CommitPolicy,
    /// Seed for deterministic node ids
    pub id_namespace: Uuid,
    /// Resource guarding program registration
    pub program_admin_resource: String,
    /// Resource guarding project registration
    pub project_admin_resource: String,
}

impl EngineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse TOML; missing keys keep their defaults
    pub fn from_toml_str(source: &str) -> SubmissionResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| SubmissionError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> SubmissionResult<()> {
        if self.worker_pool_size == 0 {
            return Err(SubmissionError::Configuration(
                "worker_pool_size must be at least 1".into(),
            ));
        }
        if self.max_traversal_depth == 0 {
            return Err(SubmissionError::Configuration(
                "max_traversal_depth must be at least 1".into(),
            ));
        }
        self.program_admin_path()?;
        self.project_admin_path()?;
        Ok(())
    }

    /// With worker pool size
    #[inline]
    #[must_use]
    pub fn with_worker_pool_size(mut self, size: usize) -> Self {
        self.worker_pool_size = size;
        self
    }

    /// With queue capacity
    #[inline]
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.worker_queue_capacity = capacity;
        self
    }

    /// With authorization cache window
    #[inline]
    #[must_use]
    pub fn with_cache_window(mut self, window: Duration) -> Self {
        self.authz_cache_window_ms = duration_ms(window);
        self
    }

    /// With policy-engine call deadline
    #[inline]
    #[must_use]
    pub fn with_policy_timeout(mut self, timeout: Duration) -> Self {
        self.policy_timeout_ms = duration_ms(timeout);
        self
    }

    /// With unit-of-work deadline
    #[inline]
    #[must_use]
    pub fn with_storage_timeout(mut self, timeout: Duration) -> Self {
        self.storage_timeout_ms = duration_ms(timeout);
        self
    }

    /// With resolver depth cap
    #[inline]
    #[must_use]
    pub fn with_max_traversal_depth(mut self, depth: usize) -> Self {
        self.max_traversal_depth = depth;
        self
    }

    /// With commit policy
    #[inline]
    #[must_use]
    pub fn with_commit_policy(mut self, policy: CommitPolicy) -> Self {
        self.commit_policy = policy;
        self
    }

    /// With id namespace
    #[inline]
    #[must_use]
    pub fn with_id_namespace(mut self, namespace: Uuid) -> Self {
        self.id_namespace = namespace;
        self
    }

    #[inline]
    #[must_use]
    pub fn cache_window(&self) -> Duration {
        Duration::from_millis(self.authz_cache_window_ms)
    }

    #[inline]
    #[must_use]
    pub fn policy_timeout(&self) -> Duration {
        Duration::from_millis(self.policy_timeout_ms)
    }

    #[inline]
    #[must_use]
    pub fn storage_timeout(&self) -> Duration {
        Duration::from_millis(self.storage_timeout_ms)
    }

    /// Authorization gate settings
    #[must_use]
    pub fn gate_config(&self) -> GateConfig {
        GateConfig {
            cache_window: self.cache_window(),
            cache_capacity: self.authz_cache_capacity,
            policy_timeout: self.policy_timeout(),
        }
    }

    pub fn program_admin_path(&self) -> SubmissionResult<ResourcePath> {
        parse_resource(&self.program_admin_resource)
    }

    pub fn project_admin_path(&self) -> SubmissionResult<ResourcePath> {
        parse_resource(&self.project_admin_resource)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: 4,
            worker_queue_capacity: 64,
            authz_cache_window_ms: 1_000,
            authz_cache_capacity: 10_000,
            policy_timeout_ms: 5_000,
            storage_timeout_ms: 30_000,
            max_traversal_depth: DEFAULT_MAX_DEPTH,
            commit_policy: CommitPolicy::default(),
            id_namespace: DEFAULT_ID_NAMESPACE,
            program_admin_resource: "/services/submission/program".into(),
            project_admin_resource: "/services/submission/project".into(),
        }
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

fn parse_resource(raw: &str) -> SubmissionResult<ResourcePath> {
    raw.parse()
        .map_err(|e| SubmissionError::Configuration(format!("resource '{raw}': {e}")))
}
