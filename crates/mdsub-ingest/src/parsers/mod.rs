//! Body parsers for different content types
//!
//! Each parser turns one request body into canonical documents:
//! - `application/json` via serde_json
//! - `text/csv` and `text/tab-separated-values` via the csv crate
//!
//! Parsers are selected by media type through a [`ParserRegistry`].

use crate::error::IngestResult;
use mdsub_dictionary::Dictionary;
use mdsub_model::{CanonicalDocument, Issue, LinkRef, NodeId, SUBMITTER_ID};
use serde_json::{Map, Value};

mod delimited;
mod json;

pub use delimited::DelimitedParser;
pub use json::JsonParser;

/// Media type assumed when a request declares none
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// Documents plus the recoverable issues met while producing them
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Normalized {
    /// Documents in input order
    pub documents: Vec<CanonicalDocument>,
    /// Row/element-level problems; the offending rows are not in `documents`
    pub issues: Vec<Issue>,
}

impl Normalized {
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Parser trait for turning a request body into canonical documents
///
/// Implement this trait to accept a new content type.
pub trait BodyParser: Send + Sync + 'static {
    /// Parse a body. `dictionary`, when given, supplies coercion hints and
    /// tells link columns from plain fields.
    fn parse(&self, body: &str, dictionary: Option<&Dictionary>) -> IngestResult<Normalized>;

    /// Media types handled, lowercase, without parameters
    fn content_types(&self) -> &[&str];

    /// Check if this parser handles `media_type`
    fn can_parse(&self, media_type: &str) -> bool {
        self.content_types().contains(&media_type)
    }

    /// Parser priority (higher = tried first when several match)
    fn priority(&self) -> i32 {
        0
    }
}

/// Content-type keyed parser lookup
pub struct ParserRegistry {
    parsers: Vec<Box<dyn BodyParser>>,
}

impl Default for ParserRegistry {
    fn default() -> Self {
        default_parsers()
    }
}

impl std::fmt::Debug for ParserRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParserRegistry")
            .field("content_types", &self.all_content_types())
            .finish()
    }
}

impl ParserRegistry {
    /// Create empty registry
    #[inline]
    #[must_use]
    pub fn empty() -> Self {
        Self {
            parsers: Vec::new(),
        }
    }

    /// Register a parser
    pub fn register<P: BodyParser>(&mut self, parser: P) {
        self.parsers.push(Box::new(parser));
        self.parsers
            .sort_by_key(|p| std::cmp::Reverse(p.priority()));
    }

    /// Find parser for a `Content-Type` header value
    #[must_use]
    pub fn find(&self, content_type: &str) -> Option<&dyn BodyParser> {
        let media = media_type(content_type);
        self.parsers.iter().find(|p| p.can_parse(&media)).map(|p| &**p)
    }

    /// Get all registered media types
    #[must_use]
    pub fn all_content_types(&self) -> Vec<&str> {
        self.parsers
            .iter()
            .flat_map(|p| p.content_types())
            .copied()
            .collect()
    }
}

/// Create registry with the JSON, CSV and TSV parsers
#[must_use]
pub fn default_parsers() -> ParserRegistry {
    let mut registry = ParserRegistry::empty();
    registry.register(JsonParser);
    registry.register(DelimitedParser::csv());
    registry.register(DelimitedParser::tsv());
    registry
}

/// Lowercase media type without parameters; empty means JSON
#[must_use]
pub fn media_type(content_type: &str) -> String {
    let media = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if media.is_empty() {
        DEFAULT_CONTENT_TYPE.to_string()
    } else {
        media
    }
}

/// Read a link reference from a JSON object
///
/// `id` is the internal node id; `submitter_id`, or failing that `code` or
/// `name`, is the caller-assigned key.
pub(crate) fn link_from_object(object: &Map<String, Value>) -> Result<LinkRef, String> {
    let id = match object.get("id") {
        None | Some(Value::Null) => None,
        Some(Value::String(raw)) => Some(
            raw.parse::<NodeId>()
                .map_err(|_| format!("'{raw}' is not a node id"))?,
        ),
        Some(other) => return Err(format!("link id must be a string, got {other}")),
    };
    let submitter_id = [SUBMITTER_ID, "code", "name"]
        .iter()
        .find_map(|k| object.get(*k).and_then(Value::as_str))
        .map(str::to_string);
    Ok(LinkRef { id, submitter_id })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn media_type_strips_parameters() {
        assert_eq!(media_type("Text/CSV; charset=utf-8"), "text/csv");
        assert_eq!(media_type(""), DEFAULT_CONTENT_TYPE);
    }

    #[test]
    fn registry_finds_by_content_type() {
        let registry = default_parsers();
        assert!(registry.find("application/json").is_some());
        assert!(registry.find("text/tab-separated-values").is_some());
        assert!(registry.find("text/tsv").is_some());
        assert!(registry.find("application/xml").is_none());
        assert_eq!(registry.all_content_types().len(), 4);
    }

    #[test]
    fn link_keys() {
        let id = NodeId::random();
        let by_id = json!({"id": id.to_string()});
        let link = link_from_object(by_id.as_object().unwrap()).unwrap();
        assert_eq!(link, LinkRef::by_id(id));

        let by_code = json!({"code": "BLGSP"});
        let link = link_from_object(by_code.as_object().unwrap()).unwrap();
        assert_eq!(link, LinkRef::by_submitter_id("BLGSP"));

        let bad = json!({"id": "nope"});
        assert!(link_from_object(bad.as_object().unwrap()).is_err());
    }
}
