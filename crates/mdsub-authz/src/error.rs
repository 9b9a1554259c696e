//! Authorization errors

use mdsub_model::ResourcePath;
use std::time::Duration;

/// Errors raised by a policy engine
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    /// Engine unreachable or overloaded
    #[error("policy engine unavailable: {0}")]
    Unavailable(String),

    /// Engine refused the request itself
    #[error("policy engine rejected request: {0}")]
    Rejected(String),
}

/// Authorization failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthzError {
    /// Credential missing or undecodable
    #[error("authentication failed: {0}")]
    InvalidToken(String),

    /// Policy engine denied one of the requested paths
    #[error("user is unauthorized: {roles} on {path}")]
    Denied { path: ResourcePath, roles: String },

    /// Policy engine did not answer in time
    #[error("policy check timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Policy(#[from] PolicyError),
}

impl AuthzError {
    /// Check if a new attempt may succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::Policy(PolicyError::Unavailable(_))
        )
    }
}

/// Result type for authorization operations
pub type AuthzResult<T> = Result<T, AuthzError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable() {
        assert!(AuthzError::Timeout(Duration::from_secs(5)).is_retryable());
        assert!(AuthzError::from(PolicyError::Unavailable("down".into())).is_retryable());
        assert!(!AuthzError::InvalidToken("bad".into()).is_retryable());
    }

    #[test]
    fn denied_display() {
        let err = AuthzError::Denied {
            path: ResourcePath::project("P", "Q"),
            roles: "create,update".into(),
        };
        assert_eq!(
            err.to_string(),
            "user is unauthorized: create,update on /programs/P/projects/Q"
        );
    }
}
