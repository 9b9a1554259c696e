//! mdsub Dictionary
//!
//! Versioned, runtime-swappable schema of submittable entity types.
//!
//! # Components
//!
//! - [`Dictionary`]: entity definitions, fields and the ordered parent-edge table
//! - [`DictionaryRegistry`]: [`DictionaryProvider`] whose active version can be swapped live
//! - [`SchemaValidator`]: pure per-document validation producing issues
//! - [`TemplateManifest`]: column manifests for CSV/TSV/JSON templates
//! - [`validate_upload_manifest`]: JSON Schema check of file-upload manifests
//!
//! # Example
//!
//! ```rust
//! use mdsub_dictionary::{Dictionary, SchemaValidator};
//! use mdsub_model::CanonicalDocument;
//! use std::sync::Arc;
//!
//! let dict = Dictionary::from_yaml_str(r#"
//! version: "1"
//! boundary_entity: program
//! root_types: [program]
//! entities:
//!   program:
//!     key_field: name
//!     fields:
//!       name: { type: string }
//! "#).unwrap();
//!
//! let validator = SchemaValidator::new(Arc::new(dict));
//! let doc = CanonicalDocument::new("program").with_field("name", "CGCI");
//! assert!(validator.validate(0, &doc).is_valid());
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod error;
mod manifest;
mod registry;
mod schema;
mod template;
mod validator;

pub use error::{DictionaryError, DictionaryResult};
pub use manifest::{parse_manifest, validate_upload_manifest};
pub use registry::{DictionaryProvider, DictionaryRegistry};
pub use schema::{Dictionary, EntityDefinition, FieldDef, FieldKind, ParentEdge};
pub use template::{ColumnKind, TemplateColumn, TemplateFormat, TemplateManifest, REQUIRED_MARKER};
pub use validator::SchemaValidator;
