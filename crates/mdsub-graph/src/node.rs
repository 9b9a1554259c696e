//! Persisted graph nodes

use chrono::{DateTime, Utc};
use mdsub_model::NodeId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Default seed for deterministic node ids
pub const DEFAULT_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6d64_7375_622d_4e53_8000_0000_0000_0001);

/// Deterministic id of the node `label:key` under an optional storage scope
///
/// Re-submitting the same logical entity always yields the same id.
#[must_use]
pub fn derive_node_id(namespace: &Uuid, scope: Option<&str>, label: &str, key: &str) -> NodeId {
    let name = match scope {
        Some(scope) => format!("{scope}:{label}:{key}"),
        None => format!("{label}:{key}"),
    };
    NodeId::deterministic(namespace, &name)
}

/// Entity persisted in the graph store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: NodeId,
    /// Entity type
    pub label: String,
    /// Storage scope (`None` for programs, program name for projects,
    /// `{program}-{project}` for everything else)
    pub scope: Option<String>,
    /// Identifying key (`submitter_id`, or `name`/`code` for roots)
    pub key: String,
    pub props: Map<String, Value>,
    /// Outgoing parent links by edge name
    pub links: BTreeMap<String, Vec<NodeId>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GraphNode {
    /// Create node with no properties or links
    #[must_use]
    pub fn new(id: NodeId, label: impl Into<String>, scope: Option<String>, key: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            label: label.into(),
            scope,
            key: key.into(),
            props: Map::new(),
            links: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Set a property
    #[must_use]
    pub fn with_prop(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.insert(name.into(), value.into());
        self
    }

    /// Set the targets of one edge
    #[must_use]
    pub fn with_link(mut self, edge: impl Into<String>, targets: Vec<NodeId>) -> Self {
        self.links.insert(edge.into(), targets);
        self
    }

    /// Targets of one edge (empty when absent)
    #[must_use]
    pub fn link(&self, edge: &str) -> &[NodeId] {
        self.links.get(edge).map(Vec::as_slice).unwrap_or_default()
    }

    /// True if any edge points at `target`
    #[must_use]
    pub fn links_to(&self, target: NodeId) -> bool {
        self.links.values().any(|targets| targets.contains(&target))
    }

    /// True if this node is `label` keyed by `key` in `scope`
    #[must_use]
    pub fn matches(&self, label: &str, scope: Option<&str>, key: &str) -> bool {
        self.label == label && self.scope.as_deref() == scope && self.key == key
    }
}
