//! Transactions and their reports
//!
//! A [`Transaction`] is the ordered batch of one request together with the
//! per-document outcomes collected while it moves through the pipeline. Only
//! the engine and the committer mutate it; callers see the finished
//! [`TransactionReport`].

use mdsub_authz::RoleSet;
use mdsub_ingest::Normalized;
use mdsub_model::{CanonicalDocument, Issue, NodeId, ProjectScope};
use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// How documents of a transaction are applied
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitMode {
    /// Insert only; existing nodes are skipped
    Create,
    /// Insert or update
    #[default]
    Upsert,
    /// Remove nodes without children
    Delete,
}

impl CommitMode {
    /// Roles the caller needs on every affected resource path
    #[must_use]
    pub fn required_roles(&self) -> RoleSet {
        match self {
            Self::Create => RoleSet::new(["create"]),
            Self::Upsert => RoleSet::new(["create", "update"]),
            Self::Delete => RoleSet::new(["delete"]),
        }
    }
}

impl fmt::Display for CommitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Upsert => "upsert",
            Self::Delete => "delete",
        })
    }
}

/// Transaction identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(Ulid);

impl TransactionId {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What happened to one document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityStatus {
    Created,
    Updated,
    Deleted,
    /// Excluded from the commit; the outcome's issues say why
    Skipped,
}

/// Per-document outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityOutcome {
    /// Position in the submitted batch
    pub index: usize,
    #[serde(rename = "type")]
    pub entity_type: String,
    /// Identifying key (`submitter_id`, or `code`/`name` for roots)
    pub key: Option<String>,
    pub id: Option<NodeId>,
    pub status: EntityStatus,
    pub issues: Vec<Issue>,
}

impl EntityOutcome {
    /// True if any issue blocks the document
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        self.issues.iter().any(Issue::is_error)
    }
}

/// Summary counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportCounts {
    pub submitted: usize,
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub skipped: usize,
}

/// Result of one transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionReport {
    pub transaction_id: TransactionId,
    pub success: bool,
    pub dry_run: bool,
    pub mode: CommitMode,
    pub message: String,
    pub counts: ReportCounts,
    pub entities: Vec<EntityOutcome>,
    /// Rows that never became documents
    pub parse_issues: Vec<Issue>,
}

impl TransactionReport {
    /// Number of documents that were (or in a dry run would have been) applied
    #[must_use]
    pub fn applied_count(&self) -> usize {
        self.counts.created + self.counts.updated + self.counts.deleted
    }

    /// Entities carrying at least one blocking issue
    pub fn failed_entities(&self) -> impl Iterator<Item = &EntityOutcome> {
        self.entities.iter().filter(|e| e.is_blocked())
    }
}

/// One in-flight batch
#[derive(Debug)]
pub struct Transaction {
    id: TransactionId,
    scope: ProjectScope,
    mode: CommitMode,
    dry_run: bool,
    documents: Vec<CanonicalDocument>,
    outcomes: Vec<EntityOutcome>,
    parse_issues: Vec<Issue>,
}

impl Transaction {
    /// Open a transaction over a normalized body
    #[must_use]
    pub fn new(scope: ProjectScope, mode: CommitMode, dry_run: bool, normalized: Normalized) -> Self {
        let Normalized { documents, issues } = normalized;
        let outcomes = documents
            .iter()
            .enumerate()
            .map(|(index, doc)| EntityOutcome {
                index,
                entity_type: doc.entity_type().to_string(),
                key: None,
                id: None,
                status: EntityStatus::Skipped,
                issues: Vec::new(),
            })
            .collect();
        Self {
            id: TransactionId::new(),
            scope,
            mode,
            dry_run,
            documents,
            outcomes,
            parse_issues: issues,
        }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn scope(&self) -> &ProjectScope {
        &self.scope
    }

    #[inline]
    #[must_use]
    pub fn mode(&self) -> CommitMode {
        self.mode
    }

    #[inline]
    #[must_use]
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    #[must_use]
    pub fn documents(&self) -> &[CanonicalDocument] {
        &self.documents
    }

    #[must_use]
    pub fn outcome(&self, index: usize) -> Option<&EntityOutcome> {
        self.outcomes.get(index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// True if a row failed to parse
    #[must_use]
    pub fn has_parse_errors(&self) -> bool {
        self.parse_issues.iter().any(Issue::is_error)
    }

    /// Indices of documents with no blocking issue, in submission order
    #[must_use]
    pub fn candidates(&self) -> Vec<usize> {
        self.outcomes
            .iter()
            .filter(|o| !o.is_blocked())
            .map(|o| o.index)
            .collect()
    }

    /// True if any document is blocked
    #[must_use]
    pub fn any_blocked(&self) -> bool {
        self.outcomes.iter().any(EntityOutcome::is_blocked)
    }

    pub(crate) fn set_key(&mut self, index: usize, key: Option<&str>) {
        if let Some(outcome) = self.outcomes.get_mut(index) {
            outcome.key = key.map(str::to_string);
        }
    }

    pub(crate) fn push_issue(&mut self, index: usize, issue: Issue) {
        if let Some(outcome) = self.outcomes.get_mut(index) {
            outcome.issues.push(issue);
        }
    }

    pub(crate) fn extend_issues(&mut self, index: usize, issues: impl IntoIterator<Item = Issue>) {
        if let Some(outcome) = self.outcomes.get_mut(index) {
            outcome.issues.extend(issues);
        }
    }

    /// Record an applied document
    pub(crate) fn mark(&mut self, index: usize, status: EntityStatus, id: NodeId) {
        if let Some(outcome) = self.outcomes.get_mut(index) {
            outcome.status = status;
            outcome.id = Some(id);
        }
    }

    /// Undo every `mark`; used when the batch as a whole is dropped
    pub(crate) fn skip_all(&mut self) {
        for outcome in &mut self.outcomes {
            outcome.status = EntityStatus::Skipped;
        }
    }

    /// Finish the transaction
    #[must_use]
    pub fn into_report(self) -> TransactionReport {
        let mut counts = ReportCounts {
            submitted: self.outcomes.len(),
            ..ReportCounts::default()
        };
        for outcome in &self.outcomes {
            match outcome.status {
                EntityStatus::Created => counts.created += 1,
                EntityStatus::Updated => counts.updated += 1,
                EntityStatus::Deleted => counts.deleted += 1,
                EntityStatus::Skipped => counts.skipped += 1,
            }
        }
        let parse_failed = self.parse_issues.iter().any(Issue::is_error);
        let applied = counts.created + counts.updated + counts.deleted;
        let success = counts.skipped == 0 && !parse_failed && counts.submitted > 0;
        let message = report_message(success, self.dry_run, applied, &counts);

        TransactionReport {
            transaction_id: self.id,
            success,
            dry_run: self.dry_run,
            mode: self.mode,
            message,
            counts,
            entities: self.outcomes,
            parse_issues: self.parse_issues,
        }
    }
}

fn report_message(success: bool, dry_run: bool, applied: usize, counts: &ReportCounts) -> String {
    match (success, dry_run) {
        (true, false) => format!("Successfully submitted {applied} entities."),
        (true, true) => format!("Dry run successful. Would have submitted {applied} entities."),
        (false, _) if applied == 0 => "Submit transaction failed.".to_string(),
        (false, false) => format!(
            "Submitted {applied} of {} entities; {} skipped.",
            counts.submitted, counts.skipped
        ),
        (false, true) => format!(
            "Dry run: would have submitted {applied} of {} entities; {} skipped.",
            counts.submitted, counts.skipped
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdsub_model::IssueCode;
    use pretty_assertions::assert_eq;

    fn transaction(n: usize, dry_run: bool) -> Transaction {
        let documents = (0..n)
            .map(|i| CanonicalDocument::new("subject").with_submitter_id(format!("SUBJ-{i}")))
            .collect();
        Transaction::new(
            ProjectScope::new("CGCI", "BLGSP"),
            CommitMode::Upsert,
            dry_run,
            Normalized {
                documents,
                issues: Vec::new(),
            },
        )
    }

    #[test]
    fn roles_per_mode() {
        assert_eq!(CommitMode::Create.required_roles().to_string(), "create");
        assert_eq!(CommitMode::Upsert.required_roles().to_string(), "create,update");
        assert_eq!(CommitMode::Delete.required_roles().to_string(), "delete");
    }

    #[test]
    fn full_success_message() {
        let mut tx = transaction(2, false);
        tx.mark(0, EntityStatus::Created, NodeId::random());
        tx.mark(1, EntityStatus::Updated, NodeId::random());
        let report = tx.into_report();
        assert!(report.success);
        assert_eq!(report.message, "Successfully submitted 2 entities.");
        assert_eq!(report.counts.created, 1);
        assert_eq!(report.counts.updated, 1);
        assert_eq!(report.applied_count(), 2);
    }

    #[test]
    fn dry_run_message() {
        let mut tx = transaction(1, true);
        tx.mark(0, EntityStatus::Created, NodeId::random());
        let report = tx.into_report();
        assert!(report.dry_run);
        assert_eq!(report.message, "Dry run successful. Would have submitted 1 entities.");
    }

    #[test]
    fn partial_commit_is_not_success() {
        let mut tx = transaction(3, false);
        tx.mark(0, EntityStatus::Created, NodeId::random());
        tx.push_issue(1, Issue::error(IssueCode::MissingRequiredField, "x", "species"));
        tx.mark(2, EntityStatus::Created, NodeId::random());
        assert_eq!(tx.candidates(), vec![0, 2]);

        let report = tx.into_report();
        assert!(!report.success);
        assert_eq!(report.counts.skipped, 1);
        assert_eq!(report.message, "Submitted 2 of 3 entities; 1 skipped.");
        assert_eq!(report.failed_entities().count(), 1);
    }

    #[test]
    fn nothing_applied_is_failure() {
        let mut tx = transaction(1, false);
        tx.mark(0, EntityStatus::Created, NodeId::random());
        tx.skip_all();
        let report = tx.into_report();
        assert!(!report.success);
        assert_eq!(report.message, "Submit transaction failed.");
        assert!(!transaction(0, false).into_report().success);
    }

    #[test]
    fn warnings_do_not_block() {
        let mut tx = transaction(1, false);
        tx.push_issue(0, Issue::warning(IssueCode::UnknownField, "x", "color"));
        assert_eq!(tx.candidates(), vec![0]);
        assert!(!tx.any_blocked());
    }

    #[test]
    fn report_serializes_snake_case() {
        let mut tx = transaction(1, false);
        tx.mark(0, EntityStatus::Created, NodeId::random());
        let value = serde_json::to_value(tx.into_report()).unwrap();
        assert_eq!(value["mode"], "upsert");
        assert_eq!(value["entities"][0]["status"], "created");
        assert_eq!(value["entities"][0]["type"], "subject");
    }
}
