//! Graph store contract
//!
//! The engine never owns nodes. It reads through [`GraphStore`] and mutates
//! only inside a [`UnitOfWork`], which either commits every staged change or
//! none of them.

use crate::error::StorageResult;
use crate::node::GraphNode;
use async_trait::async_trait;
use mdsub_model::NodeId;

/// Transactional property-graph store
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Open a unit of work over one authorization scope
    ///
    /// Only one unit of work per scope is active at a time; a second caller
    /// waits until the first commits or rolls back.
    async fn begin(&self, scope: &str) -> StorageResult<Box<dyn UnitOfWork>>;

    /// Committed node by id
    async fn get_node(&self, id: NodeId) -> StorageResult<Option<GraphNode>>;

    /// Committed node by label, storage scope and key
    async fn find_node(
        &self,
        label: &str,
        scope: Option<&str>,
        key: &str,
    ) -> StorageResult<Option<GraphNode>>;

    /// Ids of committed nodes linking to `id`
    async fn children(&self, id: NodeId) -> StorageResult<Vec<NodeId>>;

    /// Cheap read used for health checks
    async fn probe(&self) -> StorageResult<()>;
}

/// One atomic set of mutations
///
/// Reads see the unit's own staged writes on top of committed state.
#[async_trait]
pub trait UnitOfWork: Send {
    async fn get_node(&self, id: NodeId) -> StorageResult<Option<GraphNode>>;

    async fn find_node(
        &self,
        label: &str,
        scope: Option<&str>,
        key: &str,
    ) -> StorageResult<Option<GraphNode>>;

    async fn children(&self, id: NodeId) -> StorageResult<Vec<NodeId>>;

    /// Stage insert or replace
    async fn upsert_node(&mut self, node: GraphNode) -> StorageResult<()>;

    /// Stage replacement of one edge's targets on a staged or committed node
    async fn set_links(&mut self, id: NodeId, edge: &str, targets: Vec<NodeId>) -> StorageResult<()>;

    /// Stage deletion
    async fn delete_node(&mut self, id: NodeId) -> StorageResult<()>;

    /// Apply every staged change atomically
    async fn commit(self: Box<Self>) -> StorageResult<()>;

    /// Discard every staged change
    async fn rollback(self: Box<Self>) -> StorageResult<()>;
}
