//! Canonical entity documents
//!
//! The format-agnostic representation every request body is normalized into.

use crate::id::NodeId;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Name of the caller-assigned identifier field
pub const SUBMITTER_ID: &str = "submitter_id";

/// Reference from a document to a parent entity
///
/// Either an internal node id, a caller-assigned submitter id, or both.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkRef {
    /// Internal node identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<NodeId>,
    /// Caller-assigned identifier of the target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitter_id: Option<String>,
}

impl LinkRef {
    /// Reference a target by internal id
    #[inline]
    #[must_use]
    pub fn by_id(id: NodeId) -> Self {
        Self {
            id: Some(id),
            submitter_id: None,
        }
    }

    /// Reference a target by submitter id
    #[inline]
    #[must_use]
    pub fn by_submitter_id(submitter_id: impl Into<String>) -> Self {
        Self {
            id: None,
            submitter_id: Some(submitter_id.into()),
        }
    }

    /// True when neither identifier is set
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.submitter_id.is_none()
    }
}

impl std::fmt::Display for LinkRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.id, &self.submitter_id) {
            (Some(id), _) => write!(f, "id={id}"),
            (None, Some(sid)) => write!(f, "submitter_id={sid}"),
            (None, None) => write!(f, "<empty>"),
        }
    }
}

/// One logical entity of a submission
///
/// Built by the normalizer and immutable afterwards: all mutators consume
/// `self` and there is no `&mut` access once the document is constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalDocument {
    #[serde(rename = "type")]
    entity_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    submitter_id: Option<String>,
    #[serde(default)]
    fields: IndexMap<String, Value>,
    #[serde(default)]
    links: IndexMap<String, Vec<LinkRef>>,
}

impl CanonicalDocument {
    /// Create empty document of the given entity type
    #[inline]
    #[must_use]
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            submitter_id: None,
            fields: IndexMap::new(),
            links: IndexMap::new(),
        }
    }

    /// Set the caller-assigned identifier
    #[inline]
    #[must_use]
    pub fn with_submitter_id(mut self, submitter_id: impl Into<String>) -> Self {
        self.submitter_id = Some(submitter_id.into());
        self
    }

    /// Add or replace a field
    #[inline]
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Append a reference under the named relationship
    #[inline]
    #[must_use]
    pub fn with_link(mut self, edge: impl Into<String>, target: LinkRef) -> Self {
        self.links.entry(edge.into()).or_default().push(target);
        self
    }

    /// Declare a relationship with an explicit (possibly empty) target list
    #[inline]
    #[must_use]
    pub fn with_links(mut self, edge: impl Into<String>, targets: Vec<LinkRef>) -> Self {
        self.links.insert(edge.into(), targets);
        self
    }

    /// Declared entity type
    #[inline]
    #[must_use]
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    /// Caller-assigned identifier, if any
    #[inline]
    #[must_use]
    pub fn submitter_id(&self) -> Option<&str> {
        self.submitter_id.as_deref()
    }

    /// Non-link fields in input order
    #[inline]
    #[must_use]
    pub fn fields(&self) -> &IndexMap<String, Value> {
        &self.fields
    }

    /// Field value by name
    #[inline]
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Link references in input order
    #[inline]
    #[must_use]
    pub fn links(&self) -> &IndexMap<String, Vec<LinkRef>> {
        &self.links
    }

    /// References declared under one relationship
    #[inline]
    #[must_use]
    pub fn link(&self, edge: &str) -> Option<&[LinkRef]> {
        self.links.get(edge).map(Vec::as_slice)
    }

    /// Identifying key of the document
    ///
    /// `submitter_id` for ordinary entities; root entities such as programs
    /// are keyed by another string field (e.g. `name`).
    #[must_use]
    pub fn key(&self, key_field: &str) -> Option<&str> {
        if key_field == SUBMITTER_ID {
            return self.submitter_id();
        }
        self.fields.get(key_field).and_then(Value::as_str)
    }

    /// Render back into a flat JSON object
    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut map = serde_json::Map::new();
        map.insert("type".into(), Value::String(self.entity_type.clone()));
        if let Some(sid) = &self.submitter_id {
            map.insert(SUBMITTER_ID.into(), Value::String(sid.clone()));
        }
        for (k, v) in &self.fields {
            map.insert(k.clone(), v.clone());
        }
        for (edge, targets) in &self.links {
            let refs = targets
                .iter()
                .map(|t| serde_json::to_value(t).unwrap_or(Value::Null))
                .collect();
            map.insert(edge.clone(), Value::Array(refs));
        }
        Value::Object(map)
    }
}
