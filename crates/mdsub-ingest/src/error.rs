//! Ingest errors
//!
//! Only whole-request failures live here. A bad row or element is an
//! [`mdsub_model::Issue`], never an error.

/// Fatal normalization failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IngestError {
    /// Body cannot be read as the declared content type at all
    #[error("malformed {content_type} body: {message}")]
    MalformedInput {
        content_type: String,
        message: String,
    },

    /// No parser handles the content type
    #[error("unsupported content type: '{0}'")]
    UnsupportedContentType(String),

    /// Body parsed but does not have the shape the caller requires
    #[error("{0}")]
    InvalidShape(String),
}

impl IngestError {
    /// Create malformed-input error
    pub fn malformed(content_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedInput {
            content_type: content_type.into(),
            message: message.into(),
        }
    }
}

/// Result type for normalization
pub type IngestResult<T> = Result<T, IngestError>;
