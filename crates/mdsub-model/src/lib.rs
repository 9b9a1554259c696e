//! mdsub Model
//!
//! Shared vocabulary of the submission engine.
//!
//! # Core Concepts
//!
//! - [`CanonicalDocument`]: one logical entity parsed from a request body
//! - [`Issue`]: a recoverable ERROR/WARNING attached to a document
//! - [`ValidationResult`]: all issues for one document
//! - [`NodeId`]: deterministic (UUIDv5) graph node identifier
//! - [`ResourcePath`]: slash-delimited authorization scope
//! - [`ProjectScope`]: the program/project a transaction writes into
//! - [`TokenFingerprint`]: Blake3 digest of a bearer token, used as a cache key
//!
//! # Example
//!
//! ```rust
//! use mdsub_model::{CanonicalDocument, LinkRef, ResourcePath};
//!
//! let doc = CanonicalDocument::new("sample")
//!     .with_submitter_id("S1")
//!     .with_link("subjects", LinkRef::by_submitter_id("SUBJ-1"));
//! assert_eq!(doc.entity_type(), "sample");
//!
//! let path = ResourcePath::project("CGCI", "BLGSP");
//! assert_eq!(path.to_string(), "/programs/CGCI/projects/BLGSP");
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod document;
mod fingerprint;
mod id;
mod issue;
mod resource;
mod scope;

pub use document::{CanonicalDocument, LinkRef, SUBMITTER_ID};
pub use fingerprint::{FingerprintError, TokenFingerprint};
pub use id::{IdError, NodeId};
pub use issue::{Issue, IssueCode, Severity, ValidationResult};
pub use resource::{ResourcePath, ResourcePathError};
pub use scope::{ProjectScope, PROGRAM, PROJECT};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod integration_tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn document_key_and_node_id_are_stable() {
        let doc = CanonicalDocument::new("subject").with_submitter_id("SUBJ-1");
        let ns = Uuid::NAMESPACE_OID;

        let key = doc.key(SUBMITTER_ID).unwrap();
        let a = NodeId::deterministic(&ns, &format!("CGCI-BLGSP:subject:{key}"));
        let b = NodeId::deterministic(&ns, &format!("CGCI-BLGSP:subject:{key}"));
        assert_eq!(a, b);
    }

    #[test]
    fn issues_attach_to_results() {
        let mut result = ValidationResult::new(0);
        result.push(Issue::warning(IssueCode::UnknownField, "extra", "fields.extra"));
        assert!(result.is_valid());

        result.push(Issue::error(IssueCode::TypeMismatch, "bad", "fields.age"));
        assert!(!result.is_valid());
    }
}
