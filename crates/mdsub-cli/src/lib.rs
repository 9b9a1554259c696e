//! mdsub CLI - offline tooling over the submission engine
//!
//! - `validate`: normalize a file and run schema validation
//! - `template`: print a bulk submission template for an entity type
//! - `check-manifest`: validate a file-upload manifest
//! - `submit`: run the full pipeline against an in-memory graph as a dry run

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod commands;
