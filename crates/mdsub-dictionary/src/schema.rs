//! Dictionary schema model
//!
//! A [`Dictionary`] describes every submittable entity type: its fields with
//! their declared kinds, and the ordered table of parent edges. The first
//! parent edge of each type is the one the authorization resolver follows.
//!
//! Dictionaries are loaded from JSON or YAML and checked for integrity before
//! they are handed out:
//! - every parent edge targets a declared entity
//! - the boundary entity and every root type are declared
//! - key fields are declared (or are `submitter_id`)
//! - field patterns compile
//! - first-parent edges form no cycle

use crate::error::{DictionaryError, DictionaryResult};
use indexmap::IndexMap;
use mdsub_model::SUBMITTER_ID;
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

/// Declared value kind of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Integer,
    Number,
    Boolean,
    Enum,
    Array,
}

impl FieldKind {
    /// Name as written in dictionaries and messages
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Enum => "enum",
            Self::Array => "array",
        }
    }
}

/// Field declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
    #[serde(rename = "type")]
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
    /// Regex applied to string values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Permitted values of an enum field
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
    /// Element kind of an array field
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<FieldKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip)]
    compiled: Option<Regex>,
}

impl FieldDef {
    /// Create field of the given kind
    #[must_use]
    pub fn new(kind: FieldKind) -> Self {
        Self {
            kind,
            required: false,
            pattern: None,
            values: Vec::new(),
            items: None,
            minimum: None,
            maximum: None,
            description: None,
            compiled: None,
        }
    }

    /// Check a present, non-null value against this declaration
    ///
    /// Returns a human-readable mismatch description on failure.
    pub fn check(&self, value: &Value) -> Result<(), String> {
        match self.kind {
            FieldKind::Array => {
                let items = value
                    .as_array()
                    .ok_or_else(|| format!("expected array, got {}", value_kind(value)))?;
                let item_kind = self.items.unwrap_or(FieldKind::String);
                for (i, item) in items.iter().enumerate() {
                    check_scalar(item_kind, item)
                        .map_err(|e| format!("item {i}: {e}"))?;
                }
                Ok(())
            }
            FieldKind::Enum => {
                let s = value
                    .as_str()
                    .ok_or_else(|| format!("expected enum string, got {}", value_kind(value)))?;
                if self.values.iter().any(|v| v == s) {
                    Ok(())
                } else {
                    Err(format!("'{s}' is not one of [{}]", self.values.join(", ")))
                }
            }
            kind => {
                check_scalar(kind, value)?;
                self.check_constraints(value)
            }
        }
    }

    fn check_constraints(&self, value: &Value) -> Result<(), String> {
        if let (Some(re), Some(s)) = (&self.compiled, value.as_str()) {
            if !re.is_match(s) {
                return Err(format!("'{s}' does not match pattern '{}'", re.as_str()));
            }
        }
        if let Some(n) = value.as_f64() {
            if let Some(min) = self.minimum {
                if n < min {
                    return Err(format!("{n} is below minimum {min}"));
                }
            }
            if let Some(max) = self.maximum {
                if n > max {
                    return Err(format!("{n} is above maximum {max}"));
                }
            }
        }
        Ok(())
    }

    /// Coerce a delimited-text cell into a typed value
    ///
    /// Array cells are split on `,`. Fails with a description when the cell
    /// cannot be read as the declared kind.
    pub fn coerce(&self, raw: &str) -> Result<Value, String> {
        match self.kind {
            FieldKind::Array => {
                let item_kind = self.items.unwrap_or(FieldKind::String);
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| coerce_scalar(item_kind, s))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array)
            }
            kind => coerce_scalar(kind, raw),
        }
    }

    fn compile(&mut self, entity: &str, field: &str) -> DictionaryResult<()> {
        let invalid = |message: &str| DictionaryError::InvalidField {
            entity: entity.to_string(),
            field: field.to_string(),
            message: message.to_string(),
        };
        if self.kind == FieldKind::Enum && self.values.is_empty() {
            return Err(invalid("enum field declares no values"));
        }
        if matches!(self.items, Some(FieldKind::Array)) {
            return Err(invalid("nested arrays are not supported"));
        }
        if let Some(pattern) = &self.pattern {
            let re = Regex::new(pattern).map_err(|e| DictionaryError::InvalidPattern {
                entity: entity.to_string(),
                field: field.to_string(),
                message: e.to_string(),
            })?;
            self.compiled = Some(re);
        }
        Ok(())
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn check_scalar(kind: FieldKind, value: &Value) -> Result<(), String> {
    let ok = match kind {
        FieldKind::String | FieldKind::Enum => value.is_string(),
        FieldKind::Integer => value.is_i64() || value.is_u64(),
        FieldKind::Number => value.is_number(),
        FieldKind::Boolean => value.is_boolean(),
        FieldKind::Array => value.is_array(),
    };
    if ok {
        Ok(())
    } else {
        Err(format!("expected {}, got {}", kind.as_str(), value_kind(value)))
    }
}

fn coerce_scalar(kind: FieldKind, raw: &str) -> Result<Value, String> {
    let raw = raw.trim();
    match kind {
        FieldKind::String | FieldKind::Enum | FieldKind::Array => Ok(Value::String(raw.to_string())),
        FieldKind::Integer => raw
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| format!("'{raw}' is not an integer")),
        FieldKind::Number => raw
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| format!("'{raw}' is not a number")),
        FieldKind::Boolean => match raw.to_ascii_lowercase().as_str() {
            "true" | "yes" => Ok(Value::Bool(true)),
            "false" | "no" => Ok(Value::Bool(false)),
            _ => Err(format!("'{raw}' is not a boolean")),
        },
    }
}

/// Named, typed relationship to a parent entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentEdge {
    /// Relationship name as used in documents (e.g. `subjects`)
    pub name: String,
    /// Target entity type
    pub target: String,
    /// Whether a document must reference at least one target
    #[serde(default)]
    pub required: bool,
}

impl ParentEdge {
    /// Create an optional edge
    #[must_use]
    pub fn new(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            required: false,
        }
    }

    /// Mark as mandatory
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

fn default_key_field() -> String {
    SUBMITTER_ID.to_string()
}

/// Definition of one entity type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityDefinition {
    #[serde(skip)]
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Field holding the identifying key
    #[serde(default = "default_key_field")]
    pub key_field: String,
    #[serde(default)]
    pub fields: IndexMap<String, FieldDef>,
    /// Ordered parent edges, the first is traversal-significant
    #[serde(default)]
    pub parents: Vec<ParentEdge>,
}

impl EntityDefinition {
    /// Entity type name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.get(name)
    }

    /// Names of fields that must be present, including a declared key field
    pub fn required_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|(name, def)| def.required || **name == self.key_field)
            .map(|(name, _)| name.as_str())
    }

    #[inline]
    #[must_use]
    pub fn parent_edges(&self) -> &[ParentEdge] {
        &self.parents
    }

    #[must_use]
    pub fn parent_edge(&self, name: &str) -> Option<&ParentEdge> {
        self.parents.iter().find(|e| e.name == name)
    }

    /// The edge the authorization resolver follows
    #[inline]
    #[must_use]
    pub fn first_parent_edge(&self) -> Option<&ParentEdge> {
        self.parents.first()
    }
}

fn default_root_types() -> Vec<String> {
    vec!["program".into(), "project".into()]
}

fn default_system_fields() -> Vec<String> {
    vec!["project_id".into()]
}

/// Versioned schema of all entity types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dictionary {
    version: String,
    /// Entity type whose key terminates path resolution
    boundary_entity: String,
    #[serde(default = "default_root_types")]
    root_types: Vec<String>,
    /// Fields the engine manages itself; never reported as unknown
    #[serde(default = "default_system_fields")]
    system_fields: Vec<String>,
    entities: IndexMap<String, EntityDefinition>,
}

impl Dictionary {
    /// Load from JSON text
    pub fn from_json_str(source: &str) -> DictionaryResult<Self> {
        let dict: Self =
            serde_json::from_str(source).map_err(|e| DictionaryError::Syntax(e.to_string()))?;
        dict.prepare()
    }

    /// Load from YAML text
    pub fn from_yaml_str(source: &str) -> DictionaryResult<Self> {
        let dict: Self =
            serde_yaml::from_str(source).map_err(|e| DictionaryError::Syntax(e.to_string()))?;
        dict.prepare()
    }

    /// Load from a `.json`, `.yaml` or `.yml` file
    pub fn from_path(path: impl AsRef<Path>) -> DictionaryResult<Self> {
        let path = path.as_ref();
        let source =
            std::fs::read_to_string(path).map_err(|e| DictionaryError::io_error(path, e))?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&source),
            Some("yaml" | "yml") => Self::from_yaml_str(&source),
            other => Err(DictionaryError::UnsupportedFormat(
                other.unwrap_or_default().to_string(),
            )),
        }
    }

    fn prepare(mut self) -> DictionaryResult<Self> {
        for (name, def) in &mut self.entities {
            def.name.clone_from(name);
            for (field_name, field) in &mut def.fields {
                field.compile(name, field_name)?;
            }
        }
        self.check_integrity()?;
        tracing::debug!(
            version = %self.version,
            entities = self.entities.len(),
            "dictionary loaded"
        );
        Ok(self)
    }

    fn check_integrity(&self) -> DictionaryResult<()> {
        let declared = std::iter::once(&self.boundary_entity).chain(&self.root_types);
        for required in declared {
            if !self.entities.contains_key(required) {
                return Err(DictionaryError::MissingEntity(required.clone()));
            }
        }

        for (name, def) in &self.entities {
            if def.key_field != SUBMITTER_ID && !def.fields.contains_key(&def.key_field) {
                return Err(DictionaryError::UnknownKeyField {
                    entity: name.clone(),
                    field: def.key_field.clone(),
                });
            }
            for edge in &def.parents {
                if !self.entities.contains_key(&edge.target) {
                    return Err(DictionaryError::UnknownEdgeTarget {
                        entity: name.clone(),
                        edge: edge.name.clone(),
                        target: edge.target.clone(),
                    });
                }
            }
        }

        let mut graph = DiGraph::<&str, ()>::new();
        let indices: HashMap<&str, _> = self
            .entities
            .keys()
            .map(|name| (name.as_str(), graph.add_node(name.as_str())))
            .collect();
        for (name, def) in &self.entities {
            if let Some(edge) = def.first_parent_edge() {
                graph.add_edge(indices[name.as_str()], indices[edge.target.as_str()], ());
            }
        }
        toposort(&graph, None)
            .map(|_| ())
            .map_err(|cycle| DictionaryError::CyclicParents(graph[cycle.node_id()].to_string()))
    }

    #[inline]
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    #[inline]
    #[must_use]
    pub fn boundary_entity(&self) -> &str {
        &self.boundary_entity
    }

    /// True for program/project style scope types
    #[must_use]
    pub fn is_root(&self, entity_type: &str) -> bool {
        self.root_types.iter().any(|t| t == entity_type)
    }

    #[must_use]
    pub fn is_system_field(&self, field: &str) -> bool {
        self.system_fields.iter().any(|f| f == field)
    }

    #[inline]
    #[must_use]
    pub fn entity(&self, entity_type: &str) -> Option<&EntityDefinition> {
        self.entities.get(entity_type)
    }

    /// Definition lookup that fails for undeclared types
    pub fn entity_definition(&self, entity_type: &str) -> DictionaryResult<&EntityDefinition> {
        self.entity(entity_type)
            .ok_or_else(|| DictionaryError::EntityNotFound(entity_type.to_string()))
    }

    /// Declared entity types in dictionary order
    pub fn entity_types(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    /// Ordered parent edges of a type (empty for unknown types)
    #[must_use]
    pub fn parent_edges(&self, entity_type: &str) -> &[ParentEdge] {
        self.entity(entity_type)
            .map(EntityDefinition::parent_edges)
            .unwrap_or_default()
    }

    /// Traversal-significant edge of a type
    #[must_use]
    pub fn first_parent_edge(&self, entity_type: &str) -> Option<&ParentEdge> {
        self.entity(entity_type)
            .and_then(EntityDefinition::first_parent_edge)
    }

    /// Types that declare a parent edge targeting `entity_type`
    pub fn child_types<'a>(&'a self, entity_type: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entities
            .iter()
            .filter(move |(_, def)| def.parents.iter().any(|e| e.target == entity_type))
            .map(|(name, _)| name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const MINIMAL: &str = r#"
version: "1.0"
boundary_entity: subject
entities:
  program:
    key_field: name
    fields:
      name: { type: string }
  project:
    key_field: code
    fields:
      code: { type: string }
    parents:
      - { name: programs, target: program, required: true }
  subject:
    fields:
      age: { type: integer, minimum: 0 }
      vital_status: { type: enum, values: [Alive, Dead] }
    parents:
      - { name: projects, target: project, required: true }
"#;

    #[test]
    fn loads_yaml_and_names_entities() {
        let dict = Dictionary::from_yaml_str(MINIMAL).unwrap();
        assert_eq!(dict.version(), "1.0");
        assert_eq!(dict.boundary_entity(), "subject");
        assert_eq!(dict.entity("subject").unwrap().name(), "subject");
        assert!(dict.is_root("program"));
        assert!(dict.is_system_field("project_id"));
        assert_eq!(
            dict.first_parent_edge("subject").map(|e| e.target.as_str()),
            Some("project")
        );
        assert_eq!(dict.child_types("project").collect::<Vec<_>>(), vec!["subject"]);
    }

    #[test]
    fn key_field_counts_as_required() {
        let dict = Dictionary::from_yaml_str(MINIMAL).unwrap();
        let program = dict.entity("program").unwrap();
        assert_eq!(program.required_fields().collect::<Vec<_>>(), vec!["name"]);
    }

    #[test]
    fn unknown_edge_target_rejected() {
        let src = MINIMAL.replace("target: project", "target: projekt");
        assert!(matches!(
            Dictionary::from_yaml_str(&src),
            Err(DictionaryError::UnknownEdgeTarget { .. })
        ));
    }

    #[test]
    fn missing_boundary_rejected() {
        let src = MINIMAL.replace("boundary_entity: subject", "boundary_entity: case");
        assert!(matches!(
            Dictionary::from_yaml_str(&src),
            Err(DictionaryError::MissingEntity(name)) if name == "case"
        ));
    }

    #[test]
    fn cyclic_first_parents_rejected() {
        let src = MINIMAL.replace(
            "key_field: name\n    fields:",
            "key_field: name\n    parents:\n      - { name: subjects, target: subject }\n    fields:",
        );
        assert!(matches!(
            Dictionary::from_yaml_str(&src),
            Err(DictionaryError::CyclicParents(_))
        ));
    }

    #[test]
    fn enum_without_values_rejected() {
        let src = MINIMAL.replace("values: [Alive, Dead]", "values: []");
        assert!(matches!(
            Dictionary::from_yaml_str(&src),
            Err(DictionaryError::InvalidField { .. })
        ));
    }

    #[test]
    fn bad_pattern_rejected() {
        let src = MINIMAL.replace("code: { type: string }", "code: { type: string, pattern: '[' }");
        assert!(matches!(
            Dictionary::from_yaml_str(&src),
            Err(DictionaryError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn field_checks() {
        let mut age = FieldDef::new(FieldKind::Integer);
        age.minimum = Some(0.0);
        assert!(age.check(&json!(42)).is_ok());
        assert!(age.check(&json!("42")).is_err());
        assert!(age.check(&json!(-1)).is_err());

        let mut status = FieldDef::new(FieldKind::Enum);
        status.values = vec!["Alive".into(), "Dead".into()];
        assert!(status.check(&json!("Alive")).is_ok());
        assert!(status.check(&json!("Zombie")).is_err());

        let mut tags = FieldDef::new(FieldKind::Array);
        tags.items = Some(FieldKind::Integer);
        assert!(tags.check(&json!([1, 2])).is_ok());
        assert!(tags.check(&json!([1, "x"])).is_err());
    }

    #[test]
    fn coercion_from_cells() {
        assert_eq!(FieldDef::new(FieldKind::Integer).coerce(" 7 ").unwrap(), json!(7));
        assert_eq!(FieldDef::new(FieldKind::Boolean).coerce("Yes").unwrap(), json!(true));
        assert_eq!(FieldDef::new(FieldKind::Number).coerce("1.5").unwrap(), json!(1.5));
        assert!(FieldDef::new(FieldKind::Integer).coerce("seven").is_err());

        let mut tags = FieldDef::new(FieldKind::Array);
        tags.items = Some(FieldKind::Integer);
        assert_eq!(tags.coerce("1, 2,3").unwrap(), json!([1, 2, 3]));
    }

    #[test]
    fn json_source_loads() {
        let src = json!({
            "version": "2",
            "boundary_entity": "program",
            "root_types": ["program"],
            "entities": {"program": {"key_field": "name", "fields": {"name": {"type": "string"}}}}
        });
        let dict = Dictionary::from_json_str(&src.to_string()).unwrap();
        assert_eq!(dict.entity_types().collect::<Vec<_>>(), vec!["program"]);
    }
}
