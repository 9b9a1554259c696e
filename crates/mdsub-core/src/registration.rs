//! Program and project registration
//!
//! Both endpoints take exactly one document, upsert one root node and then
//! make sure the matching policy resource exists.

use crate::engine::SubmissionEngine;
use crate::error::{SubmissionError, SubmissionResult};
use mdsub_authz::{Identity, RoleSet};
use mdsub_dictionary::{Dictionary, SchemaValidator};
use mdsub_graph::{derive_node_id, GraphNode};
use mdsub_ingest::Normalizer;
use mdsub_model::{CanonicalDocument, IssueCode, NodeId, ResourcePath, PROGRAM, PROJECT};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Answer of a registration call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationResponse {
    pub id: NodeId,
    /// Program name or project code
    pub name: String,
    pub message: String,
}

struct RootNode<'a> {
    label: &'static str,
    scope: Option<&'a str>,
    key: &'a str,
    /// Lock scope of the unit of work
    resource: ResourcePath,
    links: Vec<(String, Vec<NodeId>)>,
}

impl SubmissionEngine {
    /// Create or update a program
    pub async fn register_program(
        &self,
        identity: &Identity,
        body: &[u8],
        content_type: &str,
    ) -> SubmissionResult<RegistrationResponse> {
        let admin = self.config.program_admin_path()?;
        self.gate.authorize(identity, &RoleSet::any(), &[admin]).await?;

        let dictionary = self.dictionaries.current();
        let doc = single_document(&dictionary, body, content_type, PROGRAM)?;
        let name = required_key(&doc, "name", "No program specified in key 'name'")?;
        check_fields(&dictionary, &doc)?;

        let resource = ResourcePath::program(&name);
        let (id, existed) = self
            .upsert_root(
                &doc,
                RootNode {
                    label: PROGRAM,
                    scope: None,
                    key: &name,
                    resource: resource.clone(),
                    links: Vec::new(),
                },
            )
            .await?;
        let message = if existed {
            "Program is updated!"
        } else {
            "Program registered."
        };
        tracing::info!(program = %name, %id, message, "program registration");

        self.gate.ensure_resource(&resource).await;
        Ok(RegistrationResponse {
            id,
            name,
            message: message.into(),
        })
    }

    /// Create or update a project under an existing program
    pub async fn register_project(
        &self,
        identity: &Identity,
        program: &str,
        body: &[u8],
        content_type: &str,
    ) -> SubmissionResult<RegistrationResponse> {
        let admin = self.config.project_admin_path()?;
        self.gate.authorize(identity, &RoleSet::any(), &[admin]).await?;

        let dictionary = self.dictionaries.current();
        let doc = single_document(&dictionary, body, content_type, PROJECT)?;
        let code = required_key(&doc, "code", "No project specified in key 'code'")?;
        check_fields(&dictionary, &doc)?;

        let program_node = self
            .store
            .find_node(PROGRAM, None, program)
            .await?
            .ok_or_else(|| SubmissionError::NotFound(format!("Program {program} not found")))?;
        let edge = dictionary
            .first_parent_edge(PROJECT)
            .filter(|e| e.target == PROGRAM)
            .ok_or_else(|| {
                SubmissionError::Configuration("project declares no edge to program".into())
            })?;

        let resource = ResourcePath::project(program, &code);
        let (id, existed) = self
            .upsert_root(
                &doc,
                RootNode {
                    label: PROJECT,
                    scope: Some(program),
                    key: &code,
                    resource: resource.clone(),
                    links: vec![(edge.name.clone(), vec![program_node.id])],
                },
            )
            .await?;
        let message = if existed {
            "Project is updated!"
        } else {
            "Project registered."
        };
        tracing::info!(%program, project = %code, %id, message, "project registration");

        self.gate.ensure_resource(&resource).await;
        Ok(RegistrationResponse {
            id,
            name: code,
            message: message.into(),
        })
    }

    /// Upsert a root node; returns its id and whether it existed before
    async fn upsert_root(
        &self,
        doc: &CanonicalDocument,
        root: RootNode<'_>,
    ) -> SubmissionResult<(NodeId, bool)> {
        let RootNode {
            label,
            scope,
            key,
            resource,
            links,
        } = root;
        let id = derive_node_id(&self.config.id_namespace, scope, label, key);
        let timeout = self.config.storage_timeout();
        let scope_key = resource.to_string();

        let outcome = tokio::time::timeout(timeout, async {
            let mut uow = self.store.begin(&scope_key).await?;
            let existing = uow.get_node(id).await?;
            let existed = existing.is_some();
            let mut node = existing.unwrap_or_else(|| {
                GraphNode::new(id, label, scope.map(str::to_string), key)
            });
            for (name, value) in doc.fields() {
                node.props.insert(name.clone(), value.clone());
            }
            for (edge, targets) in links {
                node.links.insert(edge, targets);
            }
            if let Err(e) = uow.upsert_node(node).await {
                if let Err(rollback) = uow.rollback().await {
                    tracing::warn!(error = %rollback, "rollback failed");
                }
                return Err(e);
            }
            uow.commit().await.map(|()| existed)
        })
        .await;

        match outcome {
            Ok(Ok(existed)) => Ok((id, existed)),
            Ok(Err(e)) => {
                tracing::error!(error = %e, label, "registration rolled back");
                Err(e.into())
            }
            Err(_) => Err(SubmissionError::Timeout(timeout)),
        }
    }
}

fn single_document(
    dictionary: &Arc<Dictionary>,
    body: &[u8],
    content_type: &str,
    expected: &str,
) -> SubmissionResult<CanonicalDocument> {
    let doc = Normalizer::new()
        .with_dictionary(Arc::clone(dictionary))
        .normalize_single(body, content_type)?;
    if doc.entity_type() != expected {
        return Err(SubmissionError::InvalidDocument(format!(
            "Invalid type in key type='{}'",
            doc.entity_type()
        )));
    }
    Ok(doc)
}

fn required_key(doc: &CanonicalDocument, field: &str, missing: &str) -> SubmissionResult<String> {
    doc.field(field)
        .and_then(serde_json::Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| SubmissionError::InvalidDocument(missing.to_string()))
}

/// Field-level validation; the parent link comes from the URL, not the body
fn check_fields(dictionary: &Arc<Dictionary>, doc: &CanonicalDocument) -> SubmissionResult<()> {
    let result = SchemaValidator::new(Arc::clone(dictionary)).validate(0, doc);
    let errors: Vec<String> = result
        .errors()
        .filter(|i| i.code != IssueCode::MissingRequiredLink)
        .map(ToString::to_string)
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(SubmissionError::InvalidDocument(errors.join("; ")))
    }
}
