//! Recoverable per-document issues
//!
//! Issues are data, not errors: they are accumulated during normalization,
//! validation, resolution and commit, and reported back to the submitter.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Issue severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    /// Never blocks commit
    Warning,
    /// Excludes the document from the commit
    Error,
}

/// Stable machine-readable issue codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueCode {
    /// A CSV/TSV row could not be turned into a document
    MalformedRow,
    /// `type` is not an entity of the dictionary
    UnknownType,
    /// A required field is absent
    MissingRequiredField,
    /// A field value does not match its declared type or format
    TypeMismatch,
    /// A field is not declared by the dictionary
    UnknownField,
    /// A mandatory relationship is absent
    MissingRequiredLink,
    /// A link reference points nowhere
    InvalidLink,
    /// The same entity appears twice in one batch
    DuplicateEntity,
    /// The document claims a different project
    InvalidProject,
    /// No authorization resource path could be derived
    Unauthorizable,
    /// Create mode hit an existing node
    AlreadyExists,
    /// Delete mode found no node
    NotFound,
    /// Delete refused because children still link to the node
    HasChildren,
    /// Upload manifest failed schema validation
    ManifestInvalid,
}

impl IssueCode {
    /// Code as written in reports
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MalformedRow => "MALFORMED_ROW",
            Self::UnknownType => "UNKNOWN_TYPE",
            Self::MissingRequiredField => "MISSING_REQUIRED_FIELD",
            Self::TypeMismatch => "TYPE_MISMATCH",
            Self::UnknownField => "UNKNOWN_FIELD",
            Self::MissingRequiredLink => "MISSING_REQUIRED_LINK",
            Self::InvalidLink => "INVALID_LINK",
            Self::DuplicateEntity => "DUPLICATE_ENTITY",
            Self::InvalidProject => "INVALID_PROJECT",
            Self::Unauthorizable => "UNAUTHORIZABLE",
            Self::AlreadyExists => "ALREADY_EXISTS",
            Self::NotFound => "NOT_FOUND",
            Self::HasChildren => "HAS_CHILDREN",
            Self::ManifestInvalid => "MANIFEST_INVALID",
        }
    }
}

impl fmt::Display for IssueCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single recoverable issue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub severity: Severity,
    pub code: IssueCode,
    pub message: String,
    /// Location inside the document (`fields.age`, `links.subjects`, `row 3`)
    pub path: String,
}

impl Issue {
    /// Blocking issue
    #[must_use]
    pub fn error(code: IssueCode, message: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code,
            message: message.into(),
            path: path.into(),
        }
    }

    /// Non-blocking issue
    #[must_use]
    pub fn warning(code: IssueCode, message: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            code,
            message: message.into(),
            path: path.into(),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sev = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        if self.path.is_empty() {
            write!(f, "{sev} [{}]: {}", self.code, self.message)
        } else {
            write!(f, "{sev} [{}] at {}: {}", self.code, self.path, self.message)
        }
    }
}

/// Issues collected for one document of a batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Position of the document in the submission
    pub index: usize,
    pub issues: Vec<Issue>,
}

impl ValidationResult {
    /// Empty result for the document at `index`
    #[inline]
    #[must_use]
    pub fn new(index: usize) -> Self {
        Self {
            index,
            issues: Vec::new(),
        }
    }

    #[inline]
    pub fn push(&mut self, issue: Issue) {
        self.issues.push(issue);
    }

    pub fn extend(&mut self, issues: impl IntoIterator<Item = Issue>) {
        self.issues.extend(issues);
    }

    /// A document is valid when it carries no ERROR issue
    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.issues.iter().any(Issue::is_error)
    }

    /// ERROR issues only
    pub fn errors(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(|i| i.is_error())
    }

    /// WARNING issues only
    pub fn warnings(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(|i| !i.is_error())
    }

    /// True if any issue has the given code
    #[must_use]
    pub fn has_code(&self, code: IssueCode) -> bool {
        self.issues.iter().any(|i| i.code == code)
    }
}
