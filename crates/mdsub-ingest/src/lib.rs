//! mdsub Ingest
//!
//! Format-agnostic entry point of the submission pipeline.
//!
//! # Components
//!
//! - [`Normalizer`]: raw body + content type → ordered [`CanonicalDocument`]s
//!   plus row-level [`Issue`]s
//! - [`ParserRegistry`]: content-type keyed [`BodyParser`]s
//! - [`JsonParser`], [`DelimitedParser`]: built-in JSON and CSV/TSV parsers
//!
//! # Example
//!
//! ```rust
//! use mdsub_ingest::Normalizer;
//!
//! let body = b"type,submitter_id,projects.code\nsubject,SUBJ-1,BLGSP\n";
//! let out = Normalizer::new().normalize(body, "text/csv").unwrap();
//! assert_eq!(out.documents[0].submitter_id(), Some("SUBJ-1"));
//! ```
//!
//! [`CanonicalDocument`]: mdsub_model::CanonicalDocument
//! [`Issue`]: mdsub_model::Issue

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod error;
mod normalizer;
pub mod parsers;

pub use error::{IngestError, IngestResult};
pub use normalizer::Normalizer;
pub use parsers::{
    default_parsers, media_type, BodyParser, DelimitedParser, JsonParser, Normalized, ParserRegistry,
    DEFAULT_CONTENT_TYPE,
};
