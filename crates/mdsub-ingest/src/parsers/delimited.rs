//! CSV/TSV body parser
//!
//! The first row is the header; every later row is one document. Header
//! cells may carry the template's leading `*` required marker. Columns are
//! read as:
//! - `type`, `submitter_id`: the document's own slots
//! - `edge.submitter_id` / `edge.code` / `edge.name` / `edge.id`: a link;
//!   `edge#N.key` addresses the N-th reference of a multi-valued edge
//! - anything else: a field, coerced to its declared kind when a dictionary
//!   is available
//!
//! Empty cells are omitted. A row that cannot be read is reported as a
//! `MALFORMED_ROW` issue and skipped; parsing continues with the next row.

use super::{BodyParser, Normalized};
use crate::error::{IngestError, IngestResult};
use indexmap::IndexMap;
use mdsub_dictionary::{Dictionary, REQUIRED_MARKER};
use mdsub_model::{CanonicalDocument, Issue, IssueCode, LinkRef, NodeId, SUBMITTER_ID};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
enum LinkKey {
    Id,
    SubmitterId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Column {
    Type,
    SubmitterId,
    Link {
        edge: String,
        index: usize,
        key: LinkKey,
    },
    Field(String),
    Ignored,
}

impl Column {
    fn parse(header: &str) -> Self {
        let name = header.trim().trim_start_matches(REQUIRED_MARKER).trim();
        match name {
            "" => return Self::Ignored,
            "type" => return Self::Type,
            SUBMITTER_ID => return Self::SubmitterId,
            _ => {}
        }
        let Some((edge_part, key)) = name.split_once('.') else {
            return Self::Field(name.to_string());
        };
        let key = match key {
            "id" => LinkKey::Id,
            SUBMITTER_ID | "code" | "name" => LinkKey::SubmitterId,
            _ => return Self::Field(name.to_string()),
        };
        let (edge, index) = match edge_part.split_once('#') {
            Some((edge, n)) => match n.parse::<usize>() {
                Ok(index) => (edge, index),
                Err(_) => return Self::Field(name.to_string()),
            },
            None => (edge_part, 0),
        };
        Self::Link {
            edge: edge.to_string(),
            index,
            key,
        }
    }
}

/// Delimited-text parser
#[derive(Debug, Clone, Copy)]
pub struct DelimitedParser {
    delimiter: u8,
    content_types: &'static [&'static str],
}

impl DelimitedParser {
    /// `text/csv`
    #[must_use]
    pub const fn csv() -> Self {
        Self {
            delimiter: b',',
            content_types: &["text/csv"],
        }
    }

    /// `text/tab-separated-values` (also accepted as `text/tsv`)
    #[must_use]
    pub const fn tsv() -> Self {
        Self {
            delimiter: b'\t',
            content_types: &["text/tab-separated-values", "text/tsv"],
        }
    }

    fn content_type(&self) -> &'static str {
        self.content_types.first().copied().unwrap_or("text/csv")
    }

    fn row_to_document(
        &self,
        columns: &[Column],
        record: &csv::StringRecord,
        dictionary: Option<&Dictionary>,
    ) -> Result<CanonicalDocument, String> {
        let mut entity_type = None;
        let mut submitter_id = None;
        let mut fields = Vec::new();
        let mut links: IndexMap<(&str, usize), LinkRef> = IndexMap::new();

        for (column, cell) in columns.iter().zip(record.iter()) {
            if cell.is_empty() {
                continue;
            }
            match column {
                Column::Type => entity_type = Some(cell),
                Column::SubmitterId => submitter_id = Some(cell),
                Column::Field(name) => fields.push((name.as_str(), cell)),
                Column::Link { edge, index, key } => {
                    let link = links
                        .entry((edge.as_str(), *index))
                        .or_insert(LinkRef { id: None, submitter_id: None });
                    match key {
                        LinkKey::Id => {
                            let id = cell
                                .parse::<NodeId>()
                                .map_err(|_| format!("column '{edge}.id': '{cell}' is not a node id"))?;
                            link.id = Some(id);
                        }
                        LinkKey::SubmitterId => link.submitter_id = Some(cell.to_string()),
                    }
                }
                Column::Ignored => {}
            }
        }

        let entity_type = entity_type.ok_or_else(|| "row has no 'type'".to_string())?;
        let def = dictionary.and_then(|d| d.entity(entity_type));
        let mut doc = CanonicalDocument::new(entity_type);
        if let Some(sid) = submitter_id {
            doc = doc.with_submitter_id(sid);
        }
        for (name, cell) in fields {
            let value = match def.and_then(|d| d.field(name)) {
                Some(field) => field
                    .coerce(cell)
                    .map_err(|e| format!("column '{name}': {e}"))?,
                None => Value::String(cell.to_string()),
            };
            doc = doc.with_field(name, value);
        }
        links.sort_by(|(_, a), _, (_, b), _| a.cmp(b));
        for ((edge, _), link) in links {
            doc = doc.with_link(edge, link);
        }
        Ok(doc)
    }
}

impl BodyParser for DelimitedParser {
    fn parse(&self, body: &str, dictionary: Option<&Dictionary>) -> IngestResult<Normalized> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .trim(csv::Trim::All)
            .from_reader(body.as_bytes());

        let columns: Vec<Column> = reader
            .headers()
            .map_err(|e| IngestError::malformed(self.content_type(), e.to_string()))?
            .iter()
            .map(Column::parse)
            .collect();
        if !columns.contains(&Column::Type) {
            return Err(IngestError::malformed(
                self.content_type(),
                "header row has no 'type' column",
            ));
        }

        let mut out = Normalized::default();
        for (i, record) in reader.records().enumerate() {
            let row = i + 1;
            let parsed = record
                .map_err(|e| e.to_string())
                .and_then(|record| self.row_to_document(&columns, &record, dictionary));
            match parsed {
                Ok(doc) => out.documents.push(doc),
                Err(message) => {
                    tracing::debug!(row, %message, "skipping unreadable row");
                    out.issues
                        .push(Issue::error(IssueCode::MalformedRow, message, format!("row {row}")));
                }
            }
        }
        Ok(out)
    }

    fn content_types(&self) -> &[&str] {
        self.content_types
    }
}
