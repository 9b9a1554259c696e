//! Transaction committer
//!
//! Stages the committable part of a transaction into one unit of work. The
//! caller owns the unit and decides whether to commit or roll it back.
//!
//! Staging happens in two passes. The first settles which documents will be
//! written: link references must point at a document that is itself being
//! written or at an existing node of the project, and a document whose links
//! fail drops out, which may in turn drop documents linking to it. The
//! second pass writes the survivors in submission order. Nothing is staged
//! for a document that is skipped.

use crate::transaction::{CommitMode, EntityStatus, Transaction};
use mdsub_dictionary::Dictionary;
use mdsub_graph::{derive_node_id, GraphNode, StorageResult, UnitOfWork};
use mdsub_model::{CanonicalDocument, Issue, IssueCode, LinkRef, NodeId, ProjectScope, SUBMITTER_ID};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Property every non-root node carries
pub const PROJECT_ID_PROP: &str = "project_id";

#[derive(Debug)]
struct Planned {
    index: usize,
    id: NodeId,
    existing: Option<GraphNode>,
}

/// Nodes that will exist once the unit of work commits
#[derive(Debug, Default)]
struct Live {
    ids: HashSet<NodeId>,
    keys: HashMap<(String, String), NodeId>,
}

type EdgeTargets = Vec<(String, Vec<NodeId>)>;

/// Applies transactions to a unit of work
#[derive(Debug, Clone, Copy)]
pub struct TransactionCommitter<'a> {
    dictionary: &'a Dictionary,
    namespace: Uuid,
}

impl<'a> TransactionCommitter<'a> {
    /// Create committer over a dictionary snapshot
    #[must_use]
    pub fn new(dictionary: &'a Dictionary, namespace: Uuid) -> Self {
        Self {
            dictionary,
            namespace,
        }
    }

    /// Deterministic id of `label:key` inside `scope`
    #[must_use]
    pub fn node_id(&self, scope: &ProjectScope, label: &str, key: &str) -> NodeId {
        derive_node_id(&self.namespace, scope.node_scope(label).as_deref(), label, key)
    }

    /// Identifying key of a document
    #[must_use]
    pub fn key_of<'d>(&self, doc: &'d CanonicalDocument) -> Option<&'d str> {
        let def = self.dictionary.entity(doc.entity_type())?;
        doc.key(&def.key_field).filter(|k| !k.is_empty())
    }

    /// Stage every unblocked document of `tx`
    ///
    /// Recoverable problems become issues on the transaction. Any storage
    /// error is returned as is; the unit of work must then be rolled back.
    pub async fn apply(&self, uow: &mut dyn UnitOfWork, tx: &mut Transaction) -> StorageResult<()> {
        match tx.mode() {
            CommitMode::Create | CommitMode::Upsert => self.apply_writes(uow, tx).await,
            CommitMode::Delete => self.apply_deletes(uow, tx).await,
        }
    }

    async fn apply_writes(&self, uow: &mut dyn UnitOfWork, tx: &mut Transaction) -> StorageResult<()> {
        let scope = tx.scope().clone();
        let mut skipped = Vec::new();
        let mut planned = Vec::new();

        for index in tx.candidates() {
            let doc = &tx.documents()[index];
            let Some(key) = self.key_of(doc) else {
                continue;
            };
            let id = self.node_id(&scope, doc.entity_type(), key);
            let existing = uow.get_node(id).await?;
            if tx.mode() == CommitMode::Create && existing.is_some() {
                skipped.push((
                    index,
                    Issue::error(
                        IssueCode::AlreadyExists,
                        format!("'{}' '{key}' already exists", doc.entity_type()),
                        "",
                    ),
                ));
                continue;
            }
            planned.push(Planned { index, id, existing });
        }

        let mut links: HashMap<usize, EdgeTargets> = HashMap::new();
        loop {
            let live = self.live_set(&scope, tx.documents(), &planned);
            let mut failed = Vec::new();
            links.clear();
            for p in &planned {
                match self.resolve_links(uow, &scope, &tx.documents()[p.index], &live).await? {
                    Ok(targets) => {
                        links.insert(p.index, targets);
                    }
                    Err(issue) => failed.push((p.index, issue)),
                }
            }
            if failed.is_empty() {
                break;
            }
            tracing::debug!(dropped = failed.len(), "documents dropped for invalid links");
            planned.retain(|p| !failed.iter().any(|(i, _)| *i == p.index));
            skipped.extend(failed);
        }

        let mut applied = Vec::with_capacity(planned.len());
        for p in planned {
            let doc = &tx.documents()[p.index];
            let status = if p.existing.is_some() {
                EntityStatus::Updated
            } else {
                EntityStatus::Created
            };
            let node = self.build_node(&scope, doc, p.id, p.existing, links.remove(&p.index));
            uow.upsert_node(node).await?;
            applied.push((p.index, status, p.id));
        }

        for (index, issue) in skipped {
            tx.push_issue(index, issue);
        }
        for (index, status, id) in applied {
            tx.mark(index, status, id);
        }
        Ok(())
    }

    async fn apply_deletes(&self, uow: &mut dyn UnitOfWork, tx: &mut Transaction) -> StorageResult<()> {
        let scope = tx.scope().clone();
        let mut skipped = Vec::new();
        let mut planned: Vec<(usize, NodeId)> = Vec::new();

        for index in tx.candidates() {
            let doc = &tx.documents()[index];
            let Some(key) = self.key_of(doc) else {
                continue;
            };
            let id = self.node_id(&scope, doc.entity_type(), key);
            if uow.get_node(id).await?.is_none() {
                skipped.push((
                    index,
                    Issue::error(
                        IssueCode::NotFound,
                        format!("'{}' '{key}' does not exist", doc.entity_type()),
                        "",
                    ),
                ));
                continue;
            }
            planned.push((index, id));
        }

        loop {
            let deleting: HashSet<NodeId> = planned.iter().map(|(_, id)| *id).collect();
            let mut failed = Vec::new();
            for (index, id) in &planned {
                let remaining = uow
                    .children(*id)
                    .await?
                    .into_iter()
                    .filter(|child| !deleting.contains(child))
                    .count();
                if remaining > 0 {
                    let doc = &tx.documents()[*index];
                    failed.push((
                        *index,
                        Issue::error(
                            IssueCode::HasChildren,
                            format!(
                                "'{}' '{}' still has {remaining} child node(s)",
                                doc.entity_type(),
                                self.key_of(doc).unwrap_or_default()
                            ),
                            "",
                        ),
                    ));
                }
            }
            if failed.is_empty() {
                break;
            }
            planned.retain(|(i, _)| !failed.iter().any(|(f, _)| f == i));
            skipped.extend(failed);
        }

        for (_, id) in &planned {
            uow.delete_node(*id).await?;
        }
        for (index, issue) in skipped {
            tx.push_issue(index, issue);
        }
        for (index, id) in planned {
            tx.mark(index, EntityStatus::Deleted, id);
        }
        Ok(())
    }

    fn live_set(&self, scope: &ProjectScope, docs: &[CanonicalDocument], planned: &[Planned]) -> Live {
        let mut live = Live::default();
        for p in planned {
            let doc = &docs[p.index];
            live.ids.insert(p.id);
            if let Some(key) = self.key_of(doc) {
                live.keys
                    .insert((doc.entity_type().to_string(), key.to_string()), p.id);
            }
        }
        tracing::trace!(scope = %scope, live = live.ids.len(), "live set rebuilt");
        live
    }

    /// Targets of every declared edge the document populates
    async fn resolve_links(
        &self,
        uow: &mut dyn UnitOfWork,
        scope: &ProjectScope,
        doc: &CanonicalDocument,
        live: &Live,
    ) -> StorageResult<Result<EdgeTargets, Issue>> {
        let Some(def) = self.dictionary.entity(doc.entity_type()) else {
            return Ok(Ok(Vec::new()));
        };
        let mut out = Vec::new();
        for (edge_name, refs) in doc.links() {
            let Some(edge) = def.parent_edge(edge_name) else {
                continue;
            };
            let mut targets = Vec::with_capacity(refs.len());
            for link in refs {
                match self.resolve_link(uow, scope, &edge.target, link, live).await? {
                    Some(id) => targets.push(id),
                    None => {
                        return Ok(Err(Issue::error(
                            IssueCode::InvalidLink,
                            format!(
                                "edge '{edge_name}' references {} {link}, which is neither in this \
                                 transaction nor in project {scope}",
                                edge.target
                            ),
                            format!("links.{edge_name}"),
                        )))
                    }
                }
            }
            out.push((edge_name.clone(), targets));
        }
        Ok(Ok(out))
    }

    async fn resolve_link(
        &self,
        uow: &mut dyn UnitOfWork,
        scope: &ProjectScope,
        target: &str,
        link: &LinkRef,
        live: &Live,
    ) -> StorageResult<Option<NodeId>> {
        if let Some(id) = link.id {
            if live.ids.contains(&id) {
                return Ok(Some(id));
            }
            let node = uow.get_node(id).await?;
            return Ok(node
                .filter(|n| n.label == target && in_scope(scope, n))
                .map(|n| n.id));
        }

        let Some(key) = link.submitter_id.as_deref() else {
            return Ok(None);
        };
        if scope.root_key(target).is_some_and(|expected| expected != key) {
            return Ok(None);
        }
        if let Some(id) = live.keys.get(&(target.to_string(), key.to_string())) {
            return Ok(Some(*id));
        }
        let node = uow
            .find_node(target, scope.node_scope(target).as_deref(), key)
            .await?;
        Ok(node.map(|n| n.id))
    }

    fn build_node(
        &self,
        scope: &ProjectScope,
        doc: &CanonicalDocument,
        id: NodeId,
        existing: Option<GraphNode>,
        links: Option<EdgeTargets>,
    ) -> GraphNode {
        let label = doc.entity_type();
        let mut node = existing.unwrap_or_else(|| {
            GraphNode::new(
                id,
                label,
                scope.node_scope(label),
                self.key_of(doc).unwrap_or_default(),
            )
        });
        for (name, value) in doc.fields() {
            node.props.insert(name.clone(), value.clone());
        }
        if let Some(sid) = doc.submitter_id() {
            node.props.insert(SUBMITTER_ID.into(), sid.into());
        }
        if !self.dictionary.is_root(label) {
            node.props
                .insert(PROJECT_ID_PROP.into(), scope.project_id().into());
        }
        for (edge, targets) in links.unwrap_or_default() {
            node.links.insert(edge, targets);
        }
        node
    }
}

fn in_scope(scope: &ProjectScope, node: &GraphNode) -> bool {
    node.scope == scope.node_scope(&node.label)
        && scope
            .root_key(&node.label)
            .map_or(true, |expected| expected == node.key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdsub_graph::{GraphStore, InMemoryGraphStore, DEFAULT_ID_NAMESPACE};
    use mdsub_ingest::Normalized;
    use mdsub_model::{PROGRAM, PROJECT};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const DICT: &str = r#"{
        "version": "t",
        "boundary_entity": "subject",
        "entities": {
            "program": {"key_field": "name", "fields": {"name": {"type": "string", "required": true}}},
            "project": {"key_field": "code", "fields": {"code": {"type": "string", "required": true}},
                        "parents": [{"name": "programs", "target": "program", "required": true}]},
            "subject": {"fields": {"species": {"type": "string"}},
                        "parents": [{"name": "projects", "target": "project", "required": true}]},
            "sample": {"fields": {},
                       "parents": [{"name": "subjects", "target": "subject", "required": true}]}
        }
    }"#;

    fn dictionary() -> Dictionary {
        Dictionary::from_json_str(DICT).unwrap()
    }

    fn scope() -> ProjectScope {
        ProjectScope::new("P", "Q")
    }

    async fn store(committer: &TransactionCommitter<'_>) -> InMemoryGraphStore {
        let store = InMemoryGraphStore::new();
        let program = committer.node_id(&scope(), PROGRAM, "P");
        store.insert(GraphNode::new(program, PROGRAM, None, "P"));
        store.insert(
            GraphNode::new(committer.node_id(&scope(), PROJECT, "Q"), PROJECT, Some("P".into()), "Q")
                .with_link("programs", vec![program]),
        );
        store
    }

    fn tx(mode: CommitMode, documents: Vec<CanonicalDocument>) -> Transaction {
        Transaction::new(
            scope(),
            mode,
            false,
            Normalized {
                documents,
                issues: Vec::new(),
            },
        )
    }

    fn subject(id: &str) -> CanonicalDocument {
        CanonicalDocument::new("subject")
            .with_submitter_id(id)
            .with_link("projects", LinkRef::by_submitter_id("Q"))
    }

    fn sample(id: &str, parent: &str) -> CanonicalDocument {
        CanonicalDocument::new("sample")
            .with_submitter_id(id)
            .with_link("subjects", LinkRef::by_submitter_id(parent))
    }

    async fn run(store: &InMemoryGraphStore, committer: &TransactionCommitter<'_>, tx: &mut Transaction) {
        let mut uow = store.begin("P-Q").await.unwrap();
        committer.apply(uow.as_mut(), tx).await.unwrap();
        uow.commit().await.unwrap();
    }

    #[tokio::test]
    async fn child_before_parent_commits() {
        let dict = dictionary();
        let committer = TransactionCommitter::new(&dict, DEFAULT_ID_NAMESPACE);
        let store = store(&committer).await;
        let mut tx = tx(CommitMode::Upsert, vec![sample("S1", "SUBJ-1"), subject("SUBJ-1")]);
        run(&store, &committer, &mut tx).await;

        let report = tx.into_report();
        assert!(report.success, "{report:?}");
        let sample = store
            .get_node(committer.node_id(&scope(), "sample", "S1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sample.link("subjects"), &[committer.node_id(&scope(), "subject", "SUBJ-1")]);
        assert_eq!(sample.props[PROJECT_ID_PROP], json!("P-Q"));
    }

    #[tokio::test]
    async fn invalid_link_cascades_to_children() {
        let dict = dictionary();
        let committer = TransactionCommitter::new(&dict, DEFAULT_ID_NAMESPACE);
        let store = store(&committer).await;
        let orphan = CanonicalDocument::new("subject")
            .with_submitter_id("SUBJ-9")
            .with_link("projects", LinkRef::by_submitter_id("OTHER"));
        let mut tx = tx(
            CommitMode::Upsert,
            vec![orphan, sample("S9", "SUBJ-9"), subject("SUBJ-1")],
        );
        run(&store, &committer, &mut tx).await;

        let report = tx.into_report();
        let statuses: Vec<_> = report.entities.iter().map(|e| e.status).collect();
        assert_eq!(
            statuses,
            vec![EntityStatus::Skipped, EntityStatus::Skipped, EntityStatus::Created]
        );
        assert_eq!(report.entities[0].issues[0].code, IssueCode::InvalidLink);
        assert_eq!(report.entities[1].issues[0].path, "links.subjects");
        assert_eq!(store.nodes_with_label("sample").len(), 0);
    }

    #[tokio::test]
    async fn create_skips_existing_and_upsert_updates() {
        let dict = dictionary();
        let committer = TransactionCommitter::new(&dict, DEFAULT_ID_NAMESPACE);
        let store = store(&committer).await;
        run(&store, &committer, &mut tx(CommitMode::Create, vec![subject("SUBJ-1")])).await;

        let mut again = tx(CommitMode::Create, vec![subject("SUBJ-1")]);
        run(&store, &committer, &mut again).await;
        assert_eq!(again.outcome(0).unwrap().issues[0].code, IssueCode::AlreadyExists);

        let mut update = tx(
            CommitMode::Upsert,
            vec![subject("SUBJ-1").with_field("species", "Homo sapiens")],
        );
        run(&store, &committer, &mut update).await;
        assert_eq!(update.outcome(0).unwrap().status, EntityStatus::Updated);
        let node = store
            .find_node("subject", Some("P-Q"), "SUBJ-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(node.props["species"], json!("Homo sapiens"));
    }

    #[tokio::test]
    async fn delete_respects_children_in_and_out_of_batch() {
        let dict = dictionary();
        let committer = TransactionCommitter::new(&dict, DEFAULT_ID_NAMESPACE);
        let store = store(&committer).await;
        run(
            &store,
            &committer,
            &mut tx(
                CommitMode::Upsert,
                vec![subject("SUBJ-1"), sample("S1", "SUBJ-1"), subject("SUBJ-2"), sample("S2", "SUBJ-2")],
            ),
        )
        .await;

        let key_only = |ty: &str, id: &str| CanonicalDocument::new(ty).with_submitter_id(id);
        let mut delete = tx(
            CommitMode::Delete,
            vec![
                key_only("subject", "SUBJ-1"),
                key_only("sample", "S1"),
                key_only("subject", "SUBJ-2"),
                key_only("subject", "SUBJ-3"),
            ],
        );
        run(&store, &committer, &mut delete).await;

        let codes: Vec<_> = (0..4)
            .map(|i| delete.outcome(i).unwrap().issues.first().map(|issue| issue.code))
            .collect();
        assert_eq!(
            codes,
            vec![None, None, Some(IssueCode::HasChildren), Some(IssueCode::NotFound)]
        );
        assert_eq!(store.nodes_with_label("subject").len(), 1);
        assert_eq!(store.nodes_with_label("sample").len(), 1);
    }

    #[test]
    fn ids_follow_scope_rules() {
        let dict = dictionary();
        let committer = TransactionCommitter::new(&dict, DEFAULT_ID_NAMESPACE);
        assert_eq!(
            committer.node_id(&scope(), PROGRAM, "P"),
            derive_node_id(&DEFAULT_ID_NAMESPACE, None, PROGRAM, "P")
        );
        assert_ne!(
            committer.node_id(&scope(), "subject", "SUBJ-1"),
            committer.node_id(&ProjectScope::new("P", "R"), "subject", "SUBJ-1")
        );
    }
}
