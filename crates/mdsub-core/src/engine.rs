//! Submission engine
//!
//! Runs one request through normalize → validate → resolve → authorize →
//! commit against a single dictionary snapshot.

use crate::committer::TransactionCommitter;
use crate::config::{CommitPolicy, EngineConfig};
use crate::error::{SubmissionError, SubmissionResult};
use crate::transaction::{CommitMode, EntityStatus, Transaction, TransactionReport};
use futures::future::join_all;
use mdsub_authz::{AuthorizationGate, Clock, Identity, PolicyEngine, SystemClock};
use mdsub_dictionary::{Dictionary, DictionaryProvider, SchemaValidator};
use mdsub_graph::{BatchIndex, GraphResolver, GraphStore, ResolveError, ResolvedPath, Target};
use mdsub_ingest::Normalizer;
use mdsub_model::{
    CanonicalDocument, Issue, IssueCode, ProjectScope, ResourcePath, ValidationResult, PROJECT,
};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::Instrument;

/// Field a document may carry to name its project explicitly
const PROJECT_ID_FIELD: &str = "project_id";

/// One entity submission
#[derive(Debug, Clone)]
pub struct SubmissionRequest {
    pub scope: ProjectScope,
    pub identity: Identity,
    pub body: Vec<u8>,
    pub content_type: String,
    pub mode: CommitMode,
    pub dry_run: bool,
}

impl SubmissionRequest {
    /// Upsert request, not a dry run
    #[must_use]
    pub fn new(
        scope: ProjectScope,
        identity: Identity,
        body: impl Into<Vec<u8>>,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            scope,
            identity,
            body: body.into(),
            content_type: content_type.into(),
            mode: CommitMode::default(),
            dry_run: false,
        }
    }

    /// With commit mode
    #[inline]
    #[must_use]
    pub fn with_mode(mut self, mode: CommitMode) -> Self {
        self.mode = mode;
        self
    }

    /// Run everything, then roll back
    #[inline]
    #[must_use]
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// The submission pipeline
///
/// Holds no per-request state; share it behind an `Arc`.
pub struct SubmissionEngine {
    pub(crate) config: EngineConfig,
    pub(crate) dictionaries: Arc<dyn DictionaryProvider>,
    pub(crate) store: Arc<dyn GraphStore>,
    pub(crate) gate: AuthorizationGate,
}

impl std::fmt::Debug for SubmissionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmissionEngine")
            .field("config", &self.config)
            .field("dictionary", &self.dictionaries.current().version())
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}

impl SubmissionEngine {
    /// Create engine on the system clock
    pub fn new(
        config: EngineConfig,
        dictionaries: Arc<dyn DictionaryProvider>,
        store: Arc<dyn GraphStore>,
        policy: Arc<dyn PolicyEngine>,
    ) -> SubmissionResult<Self> {
        Self::with_clock(config, dictionaries, store, policy, Arc::new(SystemClock))
    }

    /// Create engine with an injected clock for the authorization cache
    pub fn with_clock(
        config: EngineConfig,
        dictionaries: Arc<dyn DictionaryProvider>,
        store: Arc<dyn GraphStore>,
        policy: Arc<dyn PolicyEngine>,
        clock: Arc<dyn Clock>,
    ) -> SubmissionResult<Self> {
        config.validate()?;
        let gate = AuthorizationGate::new(policy, clock, config.gate_config());
        Ok(Self {
            config,
            dictionaries,
            store,
            gate,
        })
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[inline]
    #[must_use]
    pub fn gate(&self) -> &AuthorizationGate {
        &self.gate
    }

    /// Storage read probe
    pub async fn health(&self) -> SubmissionResult<()> {
        self.store.probe().await.map_err(Into::into)
    }

    /// Submit a batch of entities into a project
    ///
    /// # Workflow
    /// 1. Authorize the mode's roles on the project resource
    /// 2. Check that the project exists
    /// 3. Normalize the body against the active dictionary
    /// 4. Validate every document and run in-batch consistency checks
    /// 5. Resolve each document's authorization path
    /// 6. Authorize all resolved paths
    /// 7. Commit inside one unit of work
    /// 8. Create policy resources for new boundary entities
    ///
    /// Per-document problems are reported in the returned report; only
    /// request-level failures are errors. A caller without project access
    /// learns nothing about the project or its nodes.
    pub async fn submit(&self, request: SubmissionRequest) -> SubmissionResult<TransactionReport> {
        let SubmissionRequest {
            scope,
            identity,
            body,
            content_type,
            mode,
            dry_run,
        } = request;
        let dictionary = self.dictionaries.current();

        // 1. Project-wide access
        self.gate
            .authorize(&identity, &mode.required_roles(), &[scope.resource_path()])
            .await?;

        // 2. Project must exist
        self.ensure_project(&scope).await?;

        // 3. Normalize
        let normalized = Normalizer::new()
            .with_dictionary(Arc::clone(&dictionary))
            .normalize(&body, &content_type)?;
        let tx = Transaction::new(scope, mode, dry_run, normalized);

        let span = tracing::info_span!(
            "submission",
            transaction_id = %tx.id(),
            program = %tx.scope().program,
            project = %tx.scope().project,
            mode = %mode,
        );
        self.run(&identity, &dictionary, tx).instrument(span).await
    }

    async fn run(
        &self,
        identity: &Identity,
        dictionary: &Arc<Dictionary>,
        mut tx: Transaction,
    ) -> SubmissionResult<TransactionReport> {
        tracing::info!(
            documents = tx.len(),
            dictionary = dictionary.version(),
            dry_run = tx.is_dry_run(),
            "transaction opened"
        );

        // 4. Validate
        self.validate(dictionary, &mut tx);

        // 5. Resolve
        let paths = self.resolve_paths(dictionary, &mut tx).await?;

        // 6. Authorize
        if !paths.is_empty() {
            tracing::debug!(paths = paths.len(), "authorizing resource paths");
            self.gate
                .authorize(identity, &tx.mode().required_roles(), &paths)
                .await?;
        }

        // 7. Commit
        self.commit(dictionary, &mut tx).await?;

        // 8. Policy resources
        if !tx.is_dry_run() {
            self.create_boundary_resources(dictionary, &tx).await;
        }

        let report = tx.into_report();
        tracing::info!(
            success = report.success,
            created = report.counts.created,
            updated = report.counts.updated,
            deleted = report.counts.deleted,
            skipped = report.counts.skipped,
            "transaction finished"
        );
        Ok(report)
    }

    pub(crate) async fn ensure_project(&self, scope: &ProjectScope) -> SubmissionResult<()> {
        let project = self
            .store
            .find_node(PROJECT, Some(scope.program.as_str()), &scope.project)
            .await?;
        if project.is_none() {
            return Err(SubmissionError::NotFound(format!(
                "Project {} not found",
                scope.project_id()
            )));
        }
        Ok(())
    }

    fn validate(&self, dictionary: &Arc<Dictionary>, tx: &mut Transaction) {
        let results = match tx.mode() {
            CommitMode::Delete => tx
                .documents()
                .iter()
                .enumerate()
                .map(|(index, doc)| validate_delete_target(dictionary, index, doc))
                .collect(),
            CommitMode::Create | CommitMode::Upsert => {
                SchemaValidator::new(Arc::clone(dictionary)).validate_batch(tx.documents())
            }
        };

        let project_id = tx.scope().project_id();
        let mut seen = HashSet::new();
        let mut keys = Vec::with_capacity(tx.len());
        let mut extra = Vec::new();
        for (index, doc) in tx.documents().iter().enumerate() {
            let key = dictionary
                .entity(doc.entity_type())
                .and_then(|def| doc.key(&def.key_field))
                .filter(|k| !k.is_empty());
            if let Some(key) = key {
                if !seen.insert((doc.entity_type(), key)) {
                    extra.push((
                        index,
                        Issue::error(
                            IssueCode::DuplicateEntity,
                            format!("'{}' '{key}' appears more than once in this transaction", doc.entity_type()),
                            "",
                        ),
                    ));
                }
            }
            if let Some(value) = doc.field(PROJECT_ID_FIELD) {
                if value.as_str() != Some(project_id.as_str()) {
                    extra.push((
                        index,
                        Issue::error(
                            IssueCode::InvalidProject,
                            format!("document belongs to {value}, not to project {project_id}"),
                            format!("fields.{PROJECT_ID_FIELD}"),
                        ),
                    ));
                }
            }
            keys.push(key.map(str::to_string));
        }

        for (index, key) in keys.into_iter().enumerate() {
            tx.set_key(index, key.as_deref());
        }
        for result in results {
            tx.extend_issues(result.index, result.issues);
        }
        for (index, issue) in extra {
            tx.push_issue(index, issue);
        }
        tracing::debug!(
            candidates = tx.candidates().len(),
            blocked = tx.len() - tx.candidates().len(),
            "validation finished"
        );
    }

    /// Resource paths of every unblocked document
    ///
    /// Unresolvable documents are excluded with an `UNAUTHORIZABLE` issue.
    /// A runaway parent chain means the dictionary is broken and fails the
    /// whole request.
    async fn resolve_paths(
        &self,
        dictionary: &Dictionary,
        tx: &mut Transaction,
    ) -> SubmissionResult<Vec<ResourcePath>> {
        let resolved = {
            let candidates = tx.candidates();
            let docs = tx.documents();
            let scope = tx.scope();
            let mode = tx.mode();
            let resolver = GraphResolver::new(dictionary, self.store.as_ref(), scope)
                .with_max_depth(self.config.max_traversal_depth);
            let committer = TransactionCommitter::new(dictionary, self.config.id_namespace);
            let batch = BatchIndex::new(dictionary, candidates.iter().map(|&i| &docs[i]));

            let lookups = candidates.iter().map(|&index| {
                let resolver = &resolver;
                let batch = &batch;
                let doc = &docs[index];
                async move {
                    let path = match mode {
                        CommitMode::Delete => {
                            self.resolve_existing(resolver, &committer, scope, doc).await
                        }
                        CommitMode::Create | CommitMode::Upsert => {
                            resolver.resolve_document(doc, batch).await.map(Some)
                        }
                    };
                    (index, path)
                }
            });
            join_all(lookups).await
        };

        let mut paths = BTreeSet::new();
        for (index, result) in resolved {
            match result {
                Ok(Some(ResolvedPath { path, trail })) => {
                    tracing::trace!(index, %path, trail = ?trail, "path resolved");
                    paths.insert(path);
                }
                Ok(None) => {}
                Err(ResolveError::Unresolvable(reason)) => {
                    let entity_type = tx
                        .outcome(index)
                        .map(|o| o.entity_type.clone())
                        .unwrap_or_default();
                    tracing::warn!(index, %entity_type, %reason, "document is not authorizable");
                    tx.push_issue(
                        index,
                        Issue::error(IssueCode::Unauthorizable, reason.to_string(), "links"),
                    );
                }
                Err(ResolveError::DepthExceeded(depth)) => {
                    return Err(SubmissionError::Configuration(format!(
                        "parent traversal exceeded depth {depth}; check the dictionary's parent edges"
                    )));
                }
                Err(ResolveError::Storage(e)) => return Err(e.into()),
            }
        }
        Ok(paths.into_iter().collect())
    }

    /// Path of the persisted node a delete document names, if it exists
    async fn resolve_existing(
        &self,
        resolver: &GraphResolver<'_>,
        committer: &TransactionCommitter<'_>,
        scope: &ProjectScope,
        doc: &CanonicalDocument,
    ) -> Result<Option<ResolvedPath>, ResolveError> {
        let Some(key) = committer.key_of(doc) else {
            return Ok(None);
        };
        let id = committer.node_id(scope, doc.entity_type(), key);
        match self.store.get_node(id).await? {
            Some(node) => resolver
                .resolve(Target::Node(node), &BatchIndex::default())
                .await
                .map(Some),
            None => Ok(None),
        }
    }

    async fn commit(&self, dictionary: &Dictionary, tx: &mut Transaction) -> SubmissionResult<()> {
        let all_or_nothing = self.config.commit_policy == CommitPolicy::AllOrNothing;
        if all_or_nothing && (tx.any_blocked() || tx.has_parse_errors()) {
            tracing::info!("batch has invalid documents; nothing committed");
            return Ok(());
        }
        if tx.candidates().is_empty() {
            tracing::info!("no committable documents");
            return Ok(());
        }

        let committer = TransactionCommitter::new(dictionary, self.config.id_namespace);
        let scope_key = tx.scope().resource_path().to_string();
        let timeout = self.config.storage_timeout();

        let outcome = tokio::time::timeout(timeout, async {
            let mut uow = self.store.begin(&scope_key).await?;
            if let Err(e) = committer.apply(uow.as_mut(), tx).await {
                if let Err(rollback) = uow.rollback().await {
                    tracing::warn!(error = %rollback, "rollback after staging failure failed");
                }
                return Err(e);
            }
            if tx.is_dry_run() || (all_or_nothing && tx.any_blocked()) {
                uow.rollback().await
            } else {
                uow.commit().await
            }
        })
        .await;

        match outcome {
            Ok(Ok(())) => {
                if all_or_nothing && tx.any_blocked() {
                    tracing::info!("batch has uncommittable documents; rolled back");
                    tx.skip_all();
                }
                Ok(())
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "storage failure; transaction rolled back");
                Err(e.into())
            }
            Err(_) => {
                tracing::error!(timeout = ?timeout, "unit of work timed out; nothing applied");
                Err(SubmissionError::Timeout(timeout))
            }
        }
    }

    async fn create_boundary_resources(&self, dictionary: &Dictionary, tx: &Transaction) {
        let boundary = dictionary.boundary_entity();
        let base = tx.scope().resource_path();
        let paths: Vec<ResourcePath> = (0..tx.len())
            .filter_map(|index| tx.outcome(index))
            .filter(|o| o.status == EntityStatus::Created && o.entity_type == boundary)
            .filter_map(|o| o.key.as_deref())
            .map(|key| base.entity(format!("{boundary}s"), key))
            .collect();
        if paths.is_empty() {
            return;
        }
        join_all(paths.iter().map(|path| self.gate.ensure_resource(path))).await;
    }
}

fn validate_delete_target(dictionary: &Dictionary, index: usize, doc: &CanonicalDocument) -> ValidationResult {
    let mut result = ValidationResult::new(index);
    match dictionary.entity(doc.entity_type()) {
        None => result.push(Issue::error(
            IssueCode::UnknownType,
            format!("'{}' is not a dictionary entity", doc.entity_type()),
            "type",
        )),
        Some(def) if doc.key(&def.key_field).map_or(true, str::is_empty) => {
            result.push(Issue::error(
                IssueCode::MissingRequiredField,
                format!("deleting '{}' requires its '{}'", def.name(), def.key_field),
                def.key_field.clone(),
            ));
        }
        Some(_) => {}
    }
    result
}
