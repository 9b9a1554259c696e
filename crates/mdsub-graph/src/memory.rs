//! In-memory transactional graph store
//!
//! Units of work stage their writes privately and apply them under a single
//! write lock on commit. Commit checks that every link target exists and
//! that no deleted node is still linked to, so a committed graph never holds
//! dangling links. One unit of work per scope runs at a time.

use crate::error::{StorageError, StorageResult};
use crate::node::GraphNode;
use crate::store::{GraphStore, UnitOfWork};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use mdsub_model::NodeId;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;

#[derive(Debug, Default)]
struct StoreInner {
    nodes: RwLock<HashMap<NodeId, GraphNode>>,
    scope_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    injected_failure: Mutex<Option<StorageError>>,
    commit_delay: Mutex<Option<Duration>>,
    commits: AtomicU64,
}

/// Process-local [`GraphStore`]
#[derive(Debug, Clone, Default)]
pub struct InMemoryGraphStore {
    inner: Arc<StoreInner>,
}

impl InMemoryGraphStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node directly, bypassing units of work
    pub fn insert(&self, node: GraphNode) {
        self.inner.nodes.write().insert(node.id, node);
    }

    /// Number of committed nodes
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.nodes.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.nodes.read().is_empty()
    }

    /// Committed nodes with the given label
    #[must_use]
    pub fn nodes_with_label(&self, label: &str) -> Vec<GraphNode> {
        self.inner
            .nodes
            .read()
            .values()
            .filter(|n| n.label == label)
            .cloned()
            .collect()
    }

    /// Make the next commit fail with `error`
    pub fn fail_next_commit(&self, error: StorageError) {
        *self.inner.injected_failure.lock() = Some(error);
    }

    /// Delay every commit, for exercising timeouts
    pub fn set_commit_delay(&self, delay: Duration) {
        *self.inner.commit_delay.lock() = Some(delay);
    }

    /// Number of successful commits
    #[must_use]
    pub fn commit_count(&self) -> u64 {
        self.inner.commits.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn begin(&self, scope: &str) -> StorageResult<Box<dyn UnitOfWork>> {
        let lock = self
            .inner
            .scope_locks
            .entry(scope.to_string())
            .or_default()
            .clone();
        let guard = lock.lock_owned().await;
        tracing::trace!(scope, "unit of work started");
        Ok(Box::new(MemoryUnitOfWork {
            inner: Arc::clone(&self.inner),
            scope: scope.to_string(),
            staged: HashMap::new(),
            _guard: guard,
        }))
    }

    async fn get_node(&self, id: NodeId) -> StorageResult<Option<GraphNode>> {
        Ok(self.inner.nodes.read().get(&id).cloned())
    }

    async fn find_node(
        &self,
        label: &str,
        scope: Option<&str>,
        key: &str,
    ) -> StorageResult<Option<GraphNode>> {
        Ok(self
            .inner
            .nodes
            .read()
            .values()
            .find(|n| n.matches(label, scope, key))
            .cloned())
    }

    async fn children(&self, id: NodeId) -> StorageResult<Vec<NodeId>> {
        Ok(self
            .inner
            .nodes
            .read()
            .values()
            .filter(|n| n.links_to(id))
            .map(|n| n.id)
            .collect())
    }

    async fn probe(&self) -> StorageResult<()> {
        let _ = self.inner.nodes.read().len();
        Ok(())
    }
}

/// Staged writes of one unit of work; `None` marks a deletion
struct MemoryUnitOfWork {
    inner: Arc<StoreInner>,
    scope: String,
    staged: HashMap<NodeId, Option<GraphNode>>,
    _guard: OwnedMutexGuard<()>,
}

impl MemoryUnitOfWork {
    fn lookup(&self, id: NodeId) -> Option<GraphNode> {
        match self.staged.get(&id) {
            Some(staged) => staged.clone(),
            None => self.inner.nodes.read().get(&id).cloned(),
        }
    }

    fn visible(&self, mut f: impl FnMut(&GraphNode)) {
        let nodes = self.inner.nodes.read();
        nodes
            .values()
            .filter(|n| !self.staged.contains_key(&n.id))
            .for_each(&mut f);
        self.staged.values().flatten().for_each(f);
    }

    fn check_constraints(&self, committed: &HashMap<NodeId, GraphNode>) -> StorageResult<()> {
        let exists = |id: &NodeId| match self.staged.get(id) {
            Some(staged) => staged.is_some(),
            None => committed.contains_key(id),
        };

        for node in self.staged.values().flatten() {
            for (edge, targets) in &node.links {
                if let Some(missing) = targets.iter().find(|&t| !exists(t)) {
                    return Err(StorageError::ConstraintViolation(format!(
                        "{} {} links via '{edge}' to missing node {missing}",
                        node.label, node.id
                    )));
                }
            }
        }

        for deleted in self.staged.iter().filter(|(_, n)| n.is_none()).map(|(id, _)| *id) {
            let still_linked = committed
                .values()
                .filter(|n| !self.staged.contains_key(&n.id))
                .chain(self.staged.values().flatten())
                .any(|n| n.links_to(deleted));
            if still_linked {
                return Err(StorageError::ConstraintViolation(format!(
                    "deleted node {deleted} is still linked to"
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn get_node(&self, id: NodeId) -> StorageResult<Option<GraphNode>> {
        Ok(self.lookup(id))
    }

    async fn find_node(
        &self,
        label: &str,
        scope: Option<&str>,
        key: &str,
    ) -> StorageResult<Option<GraphNode>> {
        let mut found = None;
        self.visible(|n| {
            if found.is_none() && n.matches(label, scope, key) {
                found = Some(n.clone());
            }
        });
        Ok(found)
    }

    async fn children(&self, id: NodeId) -> StorageResult<Vec<NodeId>> {
        let mut children = Vec::new();
        self.visible(|n| {
            if n.links_to(id) {
                children.push(n.id);
            }
        });
        Ok(children)
    }

    async fn upsert_node(&mut self, mut node: GraphNode) -> StorageResult<()> {
        if let Some(existing) = self.lookup(node.id) {
            node.created_at = existing.created_at;
            node.updated_at = Utc::now();
        }
        self.staged.insert(node.id, Some(node));
        Ok(())
    }

    async fn set_links(&mut self, id: NodeId, edge: &str, targets: Vec<NodeId>) -> StorageResult<()> {
        let mut node = self.lookup(id).ok_or(StorageError::NodeNotFound(id))?;
        node.links.insert(edge.to_string(), targets);
        node.updated_at = Utc::now();
        self.staged.insert(id, Some(node));
        Ok(())
    }

    async fn delete_node(&mut self, id: NodeId) -> StorageResult<()> {
        if self.lookup(id).is_none() {
            return Err(StorageError::NodeNotFound(id));
        }
        self.staged.insert(id, None);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StorageResult<()> {
        let delay = *self.inner.commit_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let injected = self.inner.injected_failure.lock().take();
        if let Some(err) = injected {
            tracing::debug!(scope = %self.scope, error = %err, "injected commit failure");
            return Err(err);
        }

        let mut this = *self;
        let inner = Arc::clone(&this.inner);
        let mut nodes = inner.nodes.write();
        this.check_constraints(&nodes)?;

        let changes = this.staged.len();
        for (id, staged) in this.staged.drain() {
            match staged {
                Some(node) => {
                    nodes.insert(id, node);
                }
                None => {
                    nodes.remove(&id);
                }
            }
        }
        drop(nodes);
        inner.commits.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(scope = %this.scope, changes, "unit of work committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StorageResult<()> {
        tracing::debug!(
            scope = %self.scope,
            discarded = self.staged.len(),
            "unit of work rolled back"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(label: &str, key: &str) -> GraphNode {
        GraphNode::new(NodeId::random(), label, Some("P-Q".into()), key)
    }

    #[tokio::test]
    async fn staged_writes_invisible_until_commit() {
        let store = InMemoryGraphStore::new();
        let subject = node("subject", "S1");
        let id = subject.id;

        let mut uow = store.begin("P-Q").await.unwrap();
        uow.upsert_node(subject).await.unwrap();
        assert!(uow.get_node(id).await.unwrap().is_some());
        assert!(store.get_node(id).await.unwrap().is_none());

        uow.commit().await.unwrap();
        assert!(store.get_node(id).await.unwrap().is_some());
        assert_eq!(store.commit_count(), 1);
    }

    #[tokio::test]
    async fn rollback_discards() {
        let store = InMemoryGraphStore::new();
        let mut uow = store.begin("P-Q").await.unwrap();
        uow.upsert_node(node("subject", "S1")).await.unwrap();
        uow.rollback().await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn dangling_link_violates_constraint() {
        let store = InMemoryGraphStore::new();
        let orphan = node("sample", "X").with_link("subjects", vec![NodeId::random()]);

        let mut uow = store.begin("P-Q").await.unwrap();
        uow.upsert_node(orphan).await.unwrap();
        let err = uow.commit().await.unwrap_err();
        assert!(matches!(err, StorageError::ConstraintViolation(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn delete_with_children_violates_constraint() {
        let store = InMemoryGraphStore::new();
        let parent = node("subject", "S1");
        let child = node("sample", "X").with_link("subjects", vec![parent.id]);
        let parent_id = parent.id;
        store.insert(parent);
        store.insert(child);

        let mut uow = store.begin("P-Q").await.unwrap();
        uow.delete_node(parent_id).await.unwrap();
        assert!(matches!(
            uow.commit().await,
            Err(StorageError::ConstraintViolation(_))
        ));
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn set_links_and_children_see_staged_state() {
        let store = InMemoryGraphStore::new();
        let parent = node("subject", "S1");
        let child = node("sample", "X");
        let (parent_id, child_id) = (parent.id, child.id);
        store.insert(parent);
        store.insert(child);

        let mut uow = store.begin("P-Q").await.unwrap();
        uow.set_links(child_id, "subjects", vec![parent_id]).await.unwrap();
        assert_eq!(uow.children(parent_id).await.unwrap(), vec![child_id]);
        assert!(store.children(parent_id).await.unwrap().is_empty());
        uow.commit().await.unwrap();
        assert_eq!(store.children(parent_id).await.unwrap(), vec![child_id]);
    }

    #[tokio::test]
    async fn injected_failure_applies_once() {
        let store = InMemoryGraphStore::new();
        store.fail_next_commit(StorageError::Connectivity("reset".into()));

        let mut uow = store.begin("P-Q").await.unwrap();
        uow.upsert_node(node("subject", "S1")).await.unwrap();
        assert!(matches!(uow.commit().await, Err(StorageError::Connectivity(_))));
        assert!(store.is_empty());

        let mut uow = store.begin("P-Q").await.unwrap();
        uow.upsert_node(node("subject", "S1")).await.unwrap();
        uow.commit().await.unwrap();
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn missing_node_mutations_fail() {
        let store = InMemoryGraphStore::new();
        let mut uow = store.begin("P-Q").await.unwrap();
        let id = NodeId::random();
        assert_eq!(uow.delete_node(id).await, Err(StorageError::NodeNotFound(id)));
        assert_eq!(
            uow.set_links(id, "subjects", Vec::new()).await,
            Err(StorageError::NodeNotFound(id))
        );
    }

    #[tokio::test]
    async fn one_unit_of_work_per_scope() {
        let store = InMemoryGraphStore::new();
        let first = store.begin("P-Q").await.unwrap();

        let other_scope = tokio::time::timeout(Duration::from_millis(50), store.begin("P-R")).await;
        assert!(other_scope.is_ok());

        let same_scope = tokio::time::timeout(Duration::from_millis(50), store.begin("P-Q")).await;
        assert!(same_scope.is_err());

        first.rollback().await.unwrap();
        assert!(store.begin("P-Q").await.is_ok());
    }

    #[tokio::test]
    async fn upsert_preserves_creation_time() {
        let store = InMemoryGraphStore::new();
        let original = node("subject", "S1");
        let created = original.created_at;
        let id = original.id;
        store.insert(original);

        let mut uow = store.begin("P-Q").await.unwrap();
        let mut replacement = node("subject", "S1").with_prop("age", 40);
        replacement.id = id;
        uow.upsert_node(replacement).await.unwrap();
        uow.commit().await.unwrap();

        let stored = store.get_node(id).await.unwrap().unwrap();
        assert_eq!(stored.created_at, created);
        assert_eq!(stored.props.get("age"), Some(&serde_json::json!(40)));
    }
}
