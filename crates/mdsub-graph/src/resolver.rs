//! Authorization path resolution
//!
//! Walks the first declared parent edge of each type, hop by hop, until the
//! boundary entity or a root (program/project) is reached:
//!
//! - boundary entity → `/programs/{p}/projects/{q}/{boundary}s/{key}`
//! - root → `/programs/{p}/projects/{q}`
//! - absent parent, several parents on the edge, or a reference that exists
//!   nowhere → [`Unresolvable`], which callers must treat as a denial
//!
//! Documents of the current batch are resolved through their own link
//! references first; the store is consulted only for pre-existing nodes.

use crate::error::{ResolveError, Unresolvable};
use crate::node::GraphNode;
use crate::store::GraphStore;
use mdsub_dictionary::{Dictionary, ParentEdge};
use mdsub_model::{CanonicalDocument, LinkRef, ProjectScope, ResourcePath};
use std::collections::HashMap;

/// Default cap on parent hops
pub const DEFAULT_MAX_DEPTH: usize = 16;

/// In-batch documents addressable by `(type, key)`
#[derive(Debug, Default)]
pub struct BatchIndex<'d> {
    by_key: HashMap<(&'d str, &'d str), &'d CanonicalDocument>,
}

impl<'d> BatchIndex<'d> {
    /// Index documents by their dictionary key; the first occurrence wins
    pub fn new(dictionary: &Dictionary, docs: impl IntoIterator<Item = &'d CanonicalDocument>) -> Self {
        let mut by_key = HashMap::new();
        for doc in docs {
            let Some(def) = dictionary.entity(doc.entity_type()) else {
                continue;
            };
            if let Some(key) = doc.key(&def.key_field) {
                by_key.entry((doc.entity_type(), key)).or_insert(doc);
            }
        }
        Self { by_key }
    }

    #[must_use]
    pub fn get(&self, entity_type: &str, key: &str) -> Option<&'d CanonicalDocument> {
        self.by_key.get(&(entity_type, key)).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

/// Starting point of a resolution
#[derive(Debug, Clone)]
pub enum Target<'d> {
    /// Not-yet-persisted document of the current batch
    Document(&'d CanonicalDocument),
    /// Persisted node
    Node(GraphNode),
}

impl Target<'_> {
    fn label(&self) -> &str {
        match self {
            Self::Document(doc) => doc.entity_type(),
            Self::Node(node) => &node.label,
        }
    }

    fn key(&self, key_field: &str) -> Option<&str> {
        match self {
            Self::Document(doc) => doc.key(key_field),
            Self::Node(node) => Some(&node.key),
        }
    }
}

/// A derived resource path plus the edges walked to reach it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    pub path: ResourcePath,
    /// Edge names in traversal order, for diagnostics
    pub trail: Vec<String>,
}

/// Derives authorization resource paths inside one project scope
#[derive(Clone, Copy)]
pub struct GraphResolver<'a> {
    dictionary: &'a Dictionary,
    store: &'a dyn GraphStore,
    scope: &'a ProjectScope,
    max_depth: usize,
}

impl std::fmt::Debug for GraphResolver<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphResolver")
            .field("dictionary", &self.dictionary.version())
            .field("scope", self.scope)
            .field("max_depth", &self.max_depth)
            .finish()
    }
}

impl<'a> GraphResolver<'a> {
    /// Create resolver
    #[must_use]
    pub fn new(dictionary: &'a Dictionary, store: &'a dyn GraphStore, scope: &'a ProjectScope) -> Self {
        Self {
            dictionary,
            store,
            scope,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Set the parent-hop cap
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Resolve an in-batch document
    pub async fn resolve_document<'d>(
        &self,
        doc: &'d CanonicalDocument,
        batch: &BatchIndex<'d>,
    ) -> Result<ResolvedPath, ResolveError> {
        self.resolve(Target::Document(doc), batch).await
    }

    /// Resolve a persisted node by id
    pub async fn resolve_node(&self, id: mdsub_model::NodeId) -> Result<ResolvedPath, ResolveError> {
        let node = self
            .store
            .get_node(id)
            .await?
            .ok_or_else(|| Unresolvable::DanglingReference {
                edge: "id".into(),
                reference: id.to_string(),
            })?;
        self.resolve(Target::Node(node), &BatchIndex::default()).await
    }

    /// Walk first parent edges from `target`
    pub async fn resolve<'d>(
        &self,
        target: Target<'d>,
        batch: &BatchIndex<'d>,
    ) -> Result<ResolvedPath, ResolveError> {
        let mut cursor = target;
        let mut trail = Vec::new();

        for _ in 0..=self.max_depth {
            let label = cursor.label().to_string();
            let def = self
                .dictionary
                .entity(&label)
                .ok_or_else(|| Unresolvable::UnknownType(label.clone()))?;

            if label == self.dictionary.boundary_entity() {
                let key = cursor
                    .key(&def.key_field)
                    .ok_or_else(|| Unresolvable::MissingKey(label.clone()))?;
                let path = self
                    .scope
                    .resource_path()
                    .entity(format!("{label}s"), key);
                tracing::trace!(%path, hops = trail.len(), "resolved to boundary");
                return Ok(ResolvedPath { path, trail });
            }

            if self.dictionary.is_root(&label) {
                if let Some(expected) = self.scope.root_key(&label) {
                    if cursor.key(&def.key_field) != Some(expected) {
                        return Err(Unresolvable::OutOfScope {
                            edge: trail.last().cloned().unwrap_or(label),
                        }
                        .into());
                    }
                }
                return Ok(ResolvedPath {
                    path: self.scope.resource_path(),
                    trail,
                });
            }

            let edge = def
                .first_parent_edge()
                .ok_or_else(|| Unresolvable::NoParentEdge(label.clone()))?;
            cursor = self.step(&cursor, edge, batch).await?;
            trail.push(edge.name.clone());
        }

        Err(ResolveError::DepthExceeded(self.max_depth))
    }

    async fn step<'d>(
        &self,
        cursor: &Target<'d>,
        edge: &ParentEdge,
        batch: &BatchIndex<'d>,
    ) -> Result<Target<'d>, ResolveError> {
        let label = cursor.label();
        let missing = || Unresolvable::MissingParent {
            entity_type: label.to_string(),
            edge: edge.name.clone(),
        };
        let multiple = |count| Unresolvable::MultipleParents {
            entity_type: label.to_string(),
            edge: edge.name.clone(),
            count,
        };
        let dangling = |reference: String| Unresolvable::DanglingReference {
            edge: edge.name.clone(),
            reference,
        };

        match cursor {
            Target::Document(doc) => {
                let reference: &LinkRef = match doc.link(&edge.name).unwrap_or_default() {
                    [] => return Err(missing().into()),
                    [one] => one,
                    many => return Err(multiple(many.len()).into()),
                };
                if let Some(id) = reference.id {
                    return match self.store.get_node(id).await? {
                        Some(node) => Ok(Target::Node(node)),
                        None => Err(dangling(id.to_string()).into()),
                    };
                }
                let Some(key) = reference.submitter_id.as_deref() else {
                    return Err(missing().into());
                };
                if let Some(parent) = batch.get(&edge.target, key) {
                    return Ok(Target::Document(parent));
                }
                let scope = self.scope.node_scope(&edge.target);
                match self.store.find_node(&edge.target, scope.as_deref(), key).await? {
                    Some(node) => Ok(Target::Node(node)),
                    None => Err(dangling(key.to_string()).into()),
                }
            }
            Target::Node(node) => {
                let id = match node.link(&edge.name) {
                    [] => return Err(missing().into()),
                    [id] => *id,
                    many => return Err(multiple(many.len()).into()),
                };
                match self.store.get_node(id).await? {
                    Some(parent) => Ok(Target::Node(parent)),
                    None => Err(dangling(id.to_string()).into()),
                }
            }
        }
    }
}
