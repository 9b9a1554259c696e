//! Schema validation of canonical documents
//!
//! Validation is pure: it reads a dictionary snapshot and the document and
//! produces a [`ValidationResult`]. Recoverable problems are issues, never
//! errors, and one bad document never stops the rest of the batch.

use crate::error::DictionaryResult;
use crate::registry::DictionaryProvider;
use crate::schema::{Dictionary, EntityDefinition};
use mdsub_model::{CanonicalDocument, Issue, IssueCode, ValidationResult, SUBMITTER_ID};
use rayon::prelude::*;
use std::sync::Arc;

/// Validates documents against one dictionary version
#[derive(Debug, Clone)]
pub struct SchemaValidator {
    dictionary: Arc<Dictionary>,
}

impl SchemaValidator {
    /// Create validator over a dictionary snapshot
    #[inline]
    #[must_use]
    pub fn new(dictionary: Arc<Dictionary>) -> Self {
        Self { dictionary }
    }

    /// Create validator for an installed version of a provider
    pub fn for_version(provider: &dyn DictionaryProvider, version: &str) -> DictionaryResult<Self> {
        provider.version(version).map(Self::new)
    }

    #[inline]
    #[must_use]
    pub fn dictionary(&self) -> &Arc<Dictionary> {
        &self.dictionary
    }

    /// Validate one document at batch position `index`
    #[must_use]
    pub fn validate(&self, index: usize, doc: &CanonicalDocument) -> ValidationResult {
        let mut result = ValidationResult::new(index);

        let Some(def) = self.dictionary.entity(doc.entity_type()) else {
            result.push(Issue::error(
                IssueCode::UnknownType,
                format!("'{}' is not a dictionary entity", doc.entity_type()),
                "type",
            ));
            return result;
        };

        Self::check_key(def, doc, &mut result);
        self.check_fields(def, doc, &mut result);
        Self::check_links(def, doc, &mut result);
        result
    }

    /// Validate a batch in parallel; results keep batch order
    #[must_use]
    pub fn validate_batch(&self, docs: &[CanonicalDocument]) -> Vec<ValidationResult> {
        docs.par_iter()
            .enumerate()
            .map(|(index, doc)| self.validate(index, doc))
            .collect()
    }

    fn check_key(def: &EntityDefinition, doc: &CanonicalDocument, result: &mut ValidationResult) {
        if def.key_field == SUBMITTER_ID && doc.submitter_id().map_or(true, str::is_empty) {
            result.push(Issue::error(
                IssueCode::MissingRequiredField,
                format!("'{}' requires a submitter_id", def.name()),
                SUBMITTER_ID,
            ));
        }
    }

    fn check_fields(&self, def: &EntityDefinition, doc: &CanonicalDocument, result: &mut ValidationResult) {
        for name in def.required_fields() {
            if doc.field(name).map_or(true, serde_json::Value::is_null) {
                result.push(Issue::error(
                    IssueCode::MissingRequiredField,
                    format!("required field '{name}' is missing"),
                    format!("fields.{name}"),
                ));
            }
        }

        for (name, value) in doc.fields() {
            if value.is_null() || self.dictionary.is_system_field(name) {
                continue;
            }
            match def.field(name) {
                Some(field) => {
                    if let Err(reason) = field.check(value) {
                        result.push(Issue::error(
                            IssueCode::TypeMismatch,
                            reason,
                            format!("fields.{name}"),
                        ));
                    }
                }
                None => result.push(Issue::warning(
                    IssueCode::UnknownField,
                    format!("'{name}' is not a field of '{}'", def.name()),
                    format!("fields.{name}"),
                )),
            }
        }
    }

    fn check_links(def: &EntityDefinition, doc: &CanonicalDocument, result: &mut ValidationResult) {
        for edge in def.parent_edges().iter().filter(|e| e.required) {
            if doc.link(&edge.name).map_or(true, <[_]>::is_empty) {
                result.push(Issue::error(
                    IssueCode::MissingRequiredLink,
                    format!("'{}' must link to a '{}'", def.name(), edge.target),
                    format!("links.{}", edge.name),
                ));
            }
        }

        for (edge, targets) in doc.links() {
            if def.parent_edge(edge).is_none() {
                result.push(Issue::warning(
                    IssueCode::UnknownField,
                    format!("'{edge}' is not a relationship of '{}'", def.name()),
                    format!("links.{edge}"),
                ));
                continue;
            }
            for (i, target) in targets.iter().enumerate() {
                if target.is_empty() {
                    result.push(Issue::error(
                        IssueCode::InvalidLink,
                        "link reference carries neither id nor submitter_id",
                        format!("links.{edge}[{i}]"),
                    ));
                }
            }
        }
    }
}
