//! mdsub Core - submission transaction engine
//!
//! Ties the pipeline together:
//! - Normalizes request bodies into canonical documents
//! - Validates them against a dictionary snapshot
//! - Resolves and authorizes their resource paths
//! - Commits the valid part of the batch in one unit of work
//! - Registers programs and projects
//! - Offloads whole submissions onto a bounded worker pool
//!
//! # Example
//!
//! ```rust,ignore
//! use mdsub_core::{EngineConfig, SubmissionEngine, SubmissionRequest};
//!
//! # async fn example(engine: SubmissionEngine, identity: mdsub_authz::Identity) -> Result<(), mdsub_core::SubmissionError> {
//! let scope = mdsub_model::ProjectScope::new("CGCI", "BLGSP");
//! let body = "type,submitter_id,projects.code,species\nsubject,SUBJ-1,BLGSP,Homo sapiens\n";
//! let report = engine
//!     .submit(SubmissionRequest::new(scope, identity, body, "text/csv"))
//!     .await?;
//!
//! println!("{}", report.message);
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod committer;
pub mod config;
pub mod engine;
pub mod error;
pub mod pool;
pub mod registration;
pub mod transaction;

pub use committer::{TransactionCommitter, PROJECT_ID_PROP};
pub use config::{CommitPolicy, EngineConfig};
pub use engine::{SubmissionEngine, SubmissionRequest};
pub use error::{PoolError, SubmissionError, SubmissionResult};
pub use pool::{JobHandle, JobId, JobState, PoolStats, SubmissionPool};
pub use registration::RegistrationResponse;
pub use transaction::{
    CommitMode, EntityOutcome, EntityStatus, ReportCounts, Transaction, TransactionId,
    TransactionReport,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
