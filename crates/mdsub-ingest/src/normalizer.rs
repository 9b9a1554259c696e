//! Document normalizer

use crate::error::{IngestError, IngestResult};
use crate::parsers::{default_parsers, media_type, Normalized, ParserRegistry};
use mdsub_dictionary::Dictionary;
use mdsub_model::CanonicalDocument;
use std::sync::Arc;

/// Turns raw request bodies into canonical documents
#[derive(Debug, Default)]
pub struct Normalizer {
    registry: ParserRegistry,
    dictionary: Option<Arc<Dictionary>>,
}

impl Normalizer {
    /// Create normalizer with the built-in parsers and no coercion hints
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: default_parsers(),
            dictionary: None,
        }
    }

    /// Use a dictionary snapshot for cell coercion and link detection
    #[must_use]
    pub fn with_dictionary(mut self, dictionary: Arc<Dictionary>) -> Self {
        self.dictionary = Some(dictionary);
        self
    }

    /// Replace the parser registry
    #[must_use]
    pub fn with_registry(mut self, registry: ParserRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Normalize a body declared as `content_type`
    ///
    /// Fails only when the body as a whole is unreadable; bad rows come back
    /// as issues.
    pub fn normalize(&self, raw: &[u8], content_type: &str) -> IngestResult<Normalized> {
        let media = media_type(content_type);
        let parser = self
            .registry
            .find(&media)
            .ok_or_else(|| IngestError::UnsupportedContentType(media.clone()))?;
        let body = std::str::from_utf8(raw)
            .map_err(|e| IngestError::malformed(media.as_str(), format!("body is not UTF-8: {e}")))?;

        let normalized = parser.parse(body, self.dictionary.as_deref())?;
        tracing::debug!(
            content_type = %media,
            documents = normalized.documents.len(),
            issues = normalized.issues.len(),
            "body normalized"
        );
        Ok(normalized)
    }

    /// Normalize a body that must hold exactly one document
    ///
    /// Delimited bodies always parse to a list; a one-element list is
    /// unwrapped. Row issues are fatal here.
    pub fn normalize_single(&self, raw: &[u8], content_type: &str) -> IngestResult<CanonicalDocument> {
        let Normalized {
            mut documents,
            issues,
        } = self.normalize(raw, content_type)?;

        if !issues.is_empty() {
            let reasons: Vec<String> = issues.iter().map(ToString::to_string).collect();
            return Err(IngestError::InvalidShape(format!(
                "unable to parse document: {}",
                reasons.join("; ")
            )));
        }
        match documents.len() {
            1 => documents.pop().ok_or_else(|| IngestError::InvalidShape("empty body".into())),
            n => Err(IngestError::InvalidShape(format!(
                "only single documents are supported; received a list of {n} documents"
            ))),
        }
    }
}
