//! JSON body parser
//!
//! A single object is one document, an array is one document per element.
//! Object-valued (or array-of-object-valued) keys become links; with a
//! dictionary, a string under a declared parent edge is a link by
//! submitter id as well.

use super::{link_from_object, BodyParser, Normalized};
use crate::error::{IngestError, IngestResult};
use mdsub_dictionary::{Dictionary, EntityDefinition};
use mdsub_model::{CanonicalDocument, Issue, IssueCode, LinkRef, SUBMITTER_ID};
use serde_json::{Map, Value};

const CONTENT_TYPE: &str = "application/json";

/// `application/json` parser
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonParser;

enum Slot {
    Field(Value),
    Links(Vec<LinkRef>),
}

impl BodyParser for JsonParser {
    fn parse(&self, body: &str, dictionary: Option<&Dictionary>) -> IngestResult<Normalized> {
        let value: Value = serde_json::from_str(body)
            .map_err(|e| IngestError::malformed(CONTENT_TYPE, e.to_string()))?;

        let elements = match value {
            Value::Array(items) => items,
            object @ Value::Object(_) => vec![object],
            other => {
                return Err(IngestError::InvalidShape(format!(
                    "expected an object or an array of objects, received {}",
                    shape(&other)
                )))
            }
        };

        let mut out = Normalized::default();
        for (index, element) in elements.into_iter().enumerate() {
            let Value::Object(object) = element else {
                return Err(IngestError::InvalidShape(format!(
                    "element {index} is {}, expected an object",
                    shape(&element)
                )));
            };
            let doc = document_from_object(index, &object, dictionary, &mut out.issues);
            out.documents.push(doc);
        }
        Ok(out)
    }

    fn content_types(&self) -> &[&str] {
        &[CONTENT_TYPE]
    }
}

fn shape(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn document_from_object(
    index: usize,
    object: &Map<String, Value>,
    dictionary: Option<&Dictionary>,
    issues: &mut Vec<Issue>,
) -> CanonicalDocument {
    // Missing or non-string type is left for the validator to flag
    let entity_type = object
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let def = dictionary.and_then(|d| d.entity(entity_type));
    let mut doc = CanonicalDocument::new(entity_type);

    for (key, value) in object {
        match key.as_str() {
            "type" => continue,
            SUBMITTER_ID => {
                match value {
                    Value::Null => {}
                    Value::String(s) => doc = doc.with_submitter_id(s.as_str()),
                    other => doc = doc.with_submitter_id(other.to_string()),
                }
                continue;
            }
            _ => {}
        }

        match classify(key, value, def) {
            Ok(Slot::Field(v)) => doc = doc.with_field(key.as_str(), v),
            Ok(Slot::Links(refs)) => doc = doc.with_links(key.as_str(), refs),
            Err(message) => {
                issues.push(Issue::error(
                    IssueCode::MalformedRow,
                    message,
                    format!("[{index}].{key}"),
                ));
                doc = doc.with_link(key.as_str(), LinkRef { id: None, submitter_id: None });
            }
        }
    }
    doc
}

fn classify(key: &str, value: &Value, def: Option<&EntityDefinition>) -> Result<Slot, String> {
    let is_edge = def.is_some_and(|d| d.parent_edge(key).is_some());
    match value {
        Value::Object(object) => Ok(Slot::Links(vec![link_from_object(object)?])),
        Value::Array(items) if !items.is_empty() && items.iter().all(Value::is_object) => items
            .iter()
            .filter_map(Value::as_object)
            .map(link_from_object)
            .collect::<Result<Vec<_>, _>>()
            .map(Slot::Links),
        Value::Array(items) if items.is_empty() && is_edge => Ok(Slot::Links(Vec::new())),
        Value::String(s) if is_edge => Ok(Slot::Links(vec![LinkRef::by_submitter_id(s.as_str())])),
        Value::Null if is_edge => Ok(Slot::Links(Vec::new())),
        other => Ok(Slot::Field(other.clone())),
    }
}
