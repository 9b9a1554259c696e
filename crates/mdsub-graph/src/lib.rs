//! mdsub Graph
//!
//! Property-graph side of the submission engine.
//!
//! # Components
//!
//! - [`GraphStore`] / [`UnitOfWork`]: transactional store contract
//! - [`InMemoryGraphStore`]: staged, constraint-checked, per-scope locked store
//! - [`GraphResolver`]: derives authorization resource paths by walking
//!   first parent edges
//! - [`derive_node_id`]: deterministic node identifiers
//!
//! # Example
//!
//! ```rust
//! use mdsub_graph::{derive_node_id, GraphStore, InMemoryGraphStore, DEFAULT_ID_NAMESPACE};
//!
//! # tokio_test_block(async {
//! let store = InMemoryGraphStore::new();
//! let id = derive_node_id(&DEFAULT_ID_NAMESPACE, None, "program", "CGCI");
//! assert!(store.get_node(id).await.unwrap().is_none());
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod error;
mod memory;
mod node;
mod resolver;
mod store;

pub use error::{ResolveError, StorageError, StorageResult, Unresolvable};
pub use memory::InMemoryGraphStore;
pub use node::{derive_node_id, GraphNode, DEFAULT_ID_NAMESPACE};
pub use resolver::{BatchIndex, GraphResolver, ResolvedPath, Target, DEFAULT_MAX_DEPTH};
pub use store::{GraphStore, UnitOfWork};
