//! Bulk-submission template manifests
//!
//! For each entity type the dictionary yields an ordered column manifest:
//! `type`, the key field, link columns (`edge.submitter_id`), required
//! fields, then optional fields. Required columns are rendered with a leading
//! `*`, which the normalizer strips again when a filled-in template comes back.

use crate::error::{DictionaryError, DictionaryResult};
use crate::schema::{Dictionary, EntityDefinition};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;

/// Marker prefixed to required column headers
pub const REQUIRED_MARKER: char = '*';

/// What a template column carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Type,
    Key,
    Link,
    Field,
}

/// One column of a template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateColumn {
    pub name: String,
    pub required: bool,
    pub kind: ColumnKind,
}

impl TemplateColumn {
    /// Header text, `*`-marked when required
    #[must_use]
    pub fn header(&self) -> String {
        if self.required {
            format!("{REQUIRED_MARKER}{}", self.name)
        } else {
            self.name.clone()
        }
    }
}

/// Ordered columns for one entity type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateManifest {
    pub entity_type: String,
    pub columns: Vec<TemplateColumn>,
}

/// Template output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateFormat {
    Tsv,
    Csv,
    Json,
}

impl FromStr for TemplateFormat {
    type Err = DictionaryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tsv" => Ok(Self::Tsv),
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            other => Err(DictionaryError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl EntityDefinition {
    /// Column manifest for this entity type
    #[must_use]
    pub fn template_manifest(&self) -> TemplateManifest {
        let mut columns = vec![
            TemplateColumn {
                name: "type".into(),
                required: true,
                kind: ColumnKind::Type,
            },
            TemplateColumn {
                name: self.key_field.clone(),
                required: true,
                kind: ColumnKind::Key,
            },
        ];

        columns.extend(self.parent_edges().iter().map(|edge| TemplateColumn {
            name: format!("{}.{}", edge.name, mdsub_model::SUBMITTER_ID),
            required: edge.required,
            kind: ColumnKind::Link,
        }));

        let fields = self
            .fields
            .iter()
            .filter(|(name, _)| **name != self.key_field);
        let (required, optional): (Vec<_>, Vec<_>) = fields.partition(|(_, def)| def.required);
        columns.extend(required.into_iter().chain(optional).map(|(name, def)| TemplateColumn {
            name: name.clone(),
            required: def.required,
            kind: ColumnKind::Field,
        }));

        TemplateManifest {
            entity_type: self.name().to_string(),
            columns,
        }
    }
}

impl TemplateManifest {
    /// Render as a submission template
    ///
    /// Delimited formats carry a header row and one example row with the
    /// `type` column filled in; JSON is an object keyed by column header.
    pub fn render(&self, format: TemplateFormat) -> DictionaryResult<String> {
        match format {
            TemplateFormat::Tsv => self.render_delimited(b'\t'),
            TemplateFormat::Csv => self.render_delimited(b','),
            TemplateFormat::Json => serde_json::to_string_pretty(&self.to_json())
                .map_err(|e| DictionaryError::Template(e.to_string())),
        }
    }

    fn render_delimited(&self, delimiter: u8) -> DictionaryResult<String> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .from_writer(Vec::new());
        let template_err = |e: csv::Error| DictionaryError::Template(e.to_string());

        writer
            .write_record(self.columns.iter().map(TemplateColumn::header))
            .map_err(template_err)?;
        let example = self.columns.iter().map(|c| match c.kind {
            ColumnKind::Type => self.entity_type.as_str(),
            _ => "",
        });
        writer.write_record(example).map_err(template_err)?;

        let bytes = writer
            .into_inner()
            .map_err(|e| DictionaryError::Template(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| DictionaryError::Template(e.to_string()))
    }

    fn to_json(&self) -> Value {
        let mut map = Map::new();
        for column in &self.columns {
            match column.kind {
                ColumnKind::Type => {
                    map.insert(column.header(), Value::String(self.entity_type.clone()));
                }
                ColumnKind::Link => {
                    let (edge, key) = column
                        .name
                        .split_once('.')
                        .unwrap_or((column.name.as_str(), mdsub_model::SUBMITTER_ID));
                    let marked = if column.required {
                        format!("{REQUIRED_MARKER}{edge}")
                    } else {
                        edge.to_string()
                    };
                    let mut target = Map::new();
                    target.insert(key.to_string(), Value::Null);
                    map.insert(marked, Value::Object(target));
                }
                ColumnKind::Key | ColumnKind::Field => {
                    map.insert(column.header(), Value::Null);
                }
            }
        }
        Value::Object(map)
    }
}

impl Dictionary {
    /// Render the template of one entity type
    pub fn template(&self, entity_type: &str, format: TemplateFormat) -> DictionaryResult<String> {
        self.entity_definition(entity_type)?
            .template_manifest()
            .render(format)
    }
}
