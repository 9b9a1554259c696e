//! Error types for the submission engine
//!
//! Only request-level failures live here. Anything that concerns a single
//! document is an [`Issue`](mdsub_model::Issue) in the transaction report.

use crate::pool::JobId;
use mdsub_authz::{AuthzError, PolicyError};
use mdsub_graph::StorageError;
use mdsub_ingest::IngestError;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::time::Duration;

/// Top-level submission failure
///
/// A request either yields a full transaction report or exactly one of
/// these.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SubmissionError {
    /// Body unreadable as its declared content type
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// Body readable but not in the shape the endpoint accepts
    #[error("{0}")]
    InvalidShape(String),

    /// Single-document endpoint received a document it does not accept
    #[error("{0}")]
    InvalidDocument(String),

    /// Program or project the request addresses does not exist
    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Authorization(#[from] AuthzError),

    /// Request scope itself has no authorization path
    #[error("unresolvable authorization path: {0}")]
    UnresolvableAuthzPath(String),

    /// Dictionary or engine configuration is broken
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Whole transaction rolled back
    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),

    /// Unit of work did not finish in time; nothing was applied
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Queued job cancelled before it started
    #[error("operation cancelled")]
    Cancelled,

    #[error("worker pool error: {0}")]
    Pool(#[from] PoolError),
}

impl SubmissionError {
    /// Stable machine-readable code
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::MalformedInput(_) => "MALFORMED_INPUT",
            Self::InvalidShape(_) => "INVALID_SHAPE",
            Self::InvalidDocument(_) => "INVALID_DOCUMENT",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Authorization(AuthzError::InvalidToken(_)) => "AUTHENTICATION_FAILED",
            Self::Authorization(AuthzError::Denied { .. }) => "AUTHORIZATION_DENIED",
            Self::Authorization(_) => "POLICY_UNAVAILABLE",
            Self::UnresolvableAuthzPath(_) => "UNAUTHORIZABLE",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Storage(_) => "STORAGE_FAILURE",
            Self::Timeout(_) => "TIMEOUT",
            Self::Cancelled => "CANCELLED",
            Self::Pool(_) => "POOL_ERROR",
        }
    }

    /// HTTP-style status
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            Self::MalformedInput(_) | Self::InvalidShape(_) | Self::InvalidDocument(_) => 400,
            Self::Authorization(AuthzError::InvalidToken(_)) => 401,
            Self::Authorization(AuthzError::Denied { .. }) | Self::UnresolvableAuthzPath(_) => 403,
            Self::NotFound(_) => 404,
            Self::Authorization(AuthzError::Timeout(_)) | Self::Timeout(_) => 504,
            Self::Authorization(_) | Self::Pool(PoolError::QueueFull(_)) => 503,
            Self::Storage(e) if e.is_retryable() => 503,
            Self::Configuration(_) | Self::Storage(_) | Self::Cancelled | Self::Pool(_) => 500,
        }
    }

    /// Check if a new attempt may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Pool(PoolError::QueueFull(_)) => true,
            Self::Authorization(e) => e.is_retryable(),
            Self::Storage(e) => e.is_retryable(),
            _ => false,
        }
    }
}

impl From<IngestError> for SubmissionError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::MalformedInput { .. } => Self::MalformedInput(err.to_string()),
            IngestError::UnsupportedContentType(_) => Self::MalformedInput(err.to_string()),
            IngestError::InvalidShape(message) => Self::InvalidShape(message),
        }
    }
}

impl From<PolicyError> for SubmissionError {
    fn from(err: PolicyError) -> Self {
        Self::Authorization(err.into())
    }
}

impl Serialize for SubmissionError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("SubmissionError", 4)?;
        s.serialize_field("code", self.code())?;
        s.serialize_field("status", &self.status())?;
        s.serialize_field("message", &self.to_string())?;
        s.serialize_field("retryable", &self.is_retryable())?;
        s.end()
    }
}

/// Worker pool errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// Queue at capacity
    #[error("submission queue full (max: {0})")]
    QueueFull(usize),

    #[error("job not found: {0}")]
    JobNotFound(JobId),

    /// Job already started or finished
    #[error("job {0} is no longer queued")]
    NotCancellable(JobId),

    /// Worker task died without a result
    #[error("worker failed: {0}")]
    Panicked(String),
}

/// Result type for engine operations
pub type SubmissionResult<T> = Result<T, SubmissionError>;

#[cfg(test)]
mod tests {
    use super::*;
    use mdsub_model::ResourcePath;
    use pretty_assertions::assert_eq;

    #[test]
    fn codes_and_statuses() {
        let denied = SubmissionError::from(AuthzError::Denied {
            path: ResourcePath::project("CGCI", "BLGSP"),
            roles: "create".into(),
        });
        assert_eq!(denied.code(), "AUTHORIZATION_DENIED");
        assert_eq!(denied.status(), 403);
        assert!(!denied.is_retryable());

        let token = SubmissionError::from(AuthzError::InvalidToken("bad".into()));
        assert_eq!(token.status(), 401);

        let lost = SubmissionError::from(StorageError::Connectivity("reset".into()));
        assert_eq!(lost.code(), "STORAGE_FAILURE");
        assert_eq!(lost.status(), 503);
        assert!(lost.is_retryable());

        let constraint = SubmissionError::from(StorageError::ConstraintViolation("x".into()));
        assert_eq!(constraint.status(), 500);
        assert!(!constraint.is_retryable());
    }

    #[test]
    fn retryable_failures() {
        assert!(SubmissionError::Timeout(Duration::from_secs(30)).is_retryable());
        assert!(SubmissionError::from(PoolError::QueueFull(64)).is_retryable());
        assert!(SubmissionError::from(PolicyError::Unavailable("down".into())).is_retryable());
        assert!(!SubmissionError::MalformedInput("x".into()).is_retryable());
        assert!(!SubmissionError::Cancelled.is_retryable());
    }

    #[test]
    fn ingest_errors_map_to_request_errors() {
        let shape = SubmissionError::from(IngestError::InvalidShape("only single documents".into()));
        assert_eq!(shape, SubmissionError::InvalidShape("only single documents".into()));
        assert_eq!(shape.code(), "INVALID_SHAPE");

        let unsupported = SubmissionError::from(IngestError::UnsupportedContentType("text/xml".into()));
        assert_eq!(unsupported.code(), "MALFORMED_INPUT");
        assert_eq!(unsupported.status(), 400);
    }

    #[test]
    fn serializes_as_one_error_object() {
        let err = SubmissionError::NotFound("Project CGCI-BLGSP not found".into());
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "code": "NOT_FOUND",
                "status": 404,
                "message": "Project CGCI-BLGSP not found",
                "retryable": false,
            })
        );
    }
}
