//! Storage and resolution errors

use mdsub_model::NodeId;
use std::time::Duration;

/// Storage-level failures
///
/// Any of these aborts the in-flight unit of work.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// Commit would leave the graph structurally inconsistent
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// Store unreachable
    #[error("storage connectivity lost: {0}")]
    Connectivity(String),

    /// Unit of work did not finish in time
    #[error("storage operation timed out after {0:?}")]
    Timeout(Duration),

    /// Mutation of a node that does not exist
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    /// Unit of work used after commit or rollback
    #[error("unit of work already finished")]
    Finished,
}

impl StorageError {
    /// Check if a new attempt may succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connectivity(_) | Self::Timeout(_))
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Why no resource path could be derived for a node
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Unresolvable {
    /// Type not declared by the dictionary
    #[error("entity type '{0}' is not in the dictionary")]
    UnknownType(String),

    /// Boundary node without an identifying key
    #[error("'{0}' node has no key")]
    MissingKey(String),

    /// Type declares no parent edge and is not a root
    #[error("'{0}' declares no parent edge")]
    NoParentEdge(String),

    /// Parent edge declared but not populated
    #[error("'{entity_type}' has no parent on edge '{edge}'")]
    MissingParent { entity_type: String, edge: String },

    /// More than one parent on the traversal edge
    #[error("'{entity_type}' has {count} parents on edge '{edge}'")]
    MultipleParents {
        entity_type: String,
        edge: String,
        count: usize,
    },

    /// Reference matches neither the batch nor the store
    #[error("edge '{edge}' references '{reference}', which does not exist")]
    DanglingReference { edge: String, reference: String },

    /// Chain reaches a program/project outside the transaction scope
    #[error("edge '{edge}' leaves the transaction scope")]
    OutOfScope { edge: String },
}

/// Resolver failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    /// Node is not authorizable; caller must deny it
    #[error("unresolvable authorization path: {0}")]
    Unresolvable(#[from] Unresolvable),

    /// Parent chain longer than the configured cap; the dictionary is broken
    #[error("parent traversal exceeded depth {0}")]
    DepthExceeded(usize),

    /// Store read failed
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_storage_errors() {
        assert!(StorageError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(StorageError::Connectivity("reset".into()).is_retryable());
        assert!(!StorageError::ConstraintViolation("x".into()).is_retryable());
    }

    #[test]
    fn unresolvable_converts() {
        let err: ResolveError = Unresolvable::NoParentEdge("orphan".into()).into();
        assert!(matches!(err, ResolveError::Unresolvable(_)));
        assert_eq!(
            err.to_string(),
            "unresolvable authorization path: 'orphan' declares no parent edge"
        );
    }
}
