//! Testing utilities for mdsub workspace
//!
//! Shared fixtures: a sample dictionary, a store seeded with one program and
//! project, and a policy engine that records every call.

#![allow(missing_docs)]

use async_trait::async_trait;
use chrono::Utc;
use mdsub_authz::{add_duration, Decision, Identity, PolicyEngine, PolicyError, ResourceCreation, RoleSet};
use mdsub_dictionary::{Dictionary, DictionaryRegistry};
use mdsub_graph::{derive_node_id, GraphNode, InMemoryGraphStore, DEFAULT_ID_NAMESPACE};
use mdsub_model::{NodeId, ProjectScope, ResourcePath, PROGRAM, PROJECT};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

pub const TEST_PROGRAM: &str = "CGCI";
pub const TEST_PROJECT: &str = "BLGSP";

/// program → project → {person, subject}; subject → sample → aliquot;
/// read_group links to aliquots first and samples second
pub const SAMPLE_DICTIONARY: &str = r#"
version: "1.0.0"
boundary_entity: subject
root_types: [program, project]
system_fields: [project_id]
entities:
  program:
    category: administrative
    key_field: name
    fields:
      name: { type: string, required: true }
      dbgap_accession_number: { type: string }
  project:
    category: administrative
    key_field: code
    fields:
      code: { type: string, required: true }
      name: { type: string }
      dbgap_accession_number: { type: string }
      state: { type: enum, values: [open, review, submitted, closed] }
    parents:
      - { name: programs, target: program, required: true }
  person:
    category: clinical
    fields:
      consent_codes: { type: array, items: string }
    parents:
      - { name: projects, target: project, required: true }
  subject:
    category: clinical
    fields:
      species: { type: string, required: true }
      age_at_enrollment: { type: integer, minimum: 0 }
      vital_status: { type: enum, values: [Alive, Dead, Unknown] }
    parents:
      - { name: projects, target: project, required: true }
      - { name: persons, target: person }
  sample:
    category: biospecimen
    fields:
      sample_type: { type: enum, values: [Blood, Tissue, Saliva], required: true }
      composition: { type: string }
      is_ffpe: { type: boolean }
    parents:
      - { name: subjects, target: subject, required: true }
  aliquot:
    category: biospecimen
    fields:
      concentration: { type: number, minimum: 0 }
    parents:
      - { name: samples, target: sample, required: true }
  read_group:
    category: data
    fields:
      library_name: { type: string }
      read_length: { type: integer }
      is_paired_end: { type: boolean }
    parents:
      - { name: aliquots, target: aliquot }
      - { name: samples, target: sample }
"#;

pub fn sample_dictionary() -> Dictionary {
    Dictionary::from_yaml_str(SAMPLE_DICTIONARY).unwrap()
}

pub fn sample_registry() -> Arc<DictionaryRegistry> {
    Arc::new(DictionaryRegistry::new(sample_dictionary()))
}

pub fn test_scope() -> ProjectScope {
    ProjectScope::new(TEST_PROGRAM, TEST_PROJECT)
}

pub fn program_id(name: &str) -> NodeId {
    derive_node_id(&DEFAULT_ID_NAMESPACE, None, PROGRAM, name)
}

pub fn project_id(program: &str, code: &str) -> NodeId {
    derive_node_id(&DEFAULT_ID_NAMESPACE, Some(program), PROJECT, code)
}

/// Store holding program `CGCI` and its project `BLGSP`
pub fn seeded_store() -> InMemoryGraphStore {
    let store = InMemoryGraphStore::new();
    let program = GraphNode::new(program_id(TEST_PROGRAM), PROGRAM, None, TEST_PROGRAM)
        .with_prop("name", TEST_PROGRAM);
    let project = GraphNode::new(
        project_id(TEST_PROGRAM, TEST_PROJECT),
        PROJECT,
        Some(TEST_PROGRAM.to_string()),
        TEST_PROJECT,
    )
    .with_prop("code", TEST_PROJECT)
    .with_link("programs", vec![program.id]);
    store.insert(program);
    store.insert(project);
    store
}

/// Insert a persisted entity of the test project, returning its id
pub fn seed_node(store: &InMemoryGraphStore, label: &str, key: &str, links: &[(&str, NodeId)]) -> NodeId {
    let scope = test_scope();
    let node_scope = scope.node_scope(label);
    let id = derive_node_id(&DEFAULT_ID_NAMESPACE, node_scope.as_deref(), label, key);
    let mut node = GraphNode::new(id, label, node_scope, key);
    for (edge, target) in links {
        node.links.entry((*edge).to_string()).or_default().push(*target);
    }
    store.insert(node);
    id
}

/// Identity whose token expires in an hour
pub fn test_identity() -> Identity {
    Identity::new("tester", "test-token").with_expiry(add_duration(Utc::now(), Duration::from_secs(3600)))
}

/// Policy engine that allows everything except explicitly denied paths
#[derive(Debug, Default)]
pub struct RecordingPolicyEngine {
    denied: Mutex<HashSet<ResourcePath>>,
    deny_all: Mutex<bool>,
    fail_creation: Mutex<bool>,
    checks: Mutex<Vec<(RoleSet, Vec<ResourcePath>)>>,
    resources: Mutex<BTreeSet<ResourcePath>>,
}

impl RecordingPolicyEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deny(&self, path: ResourcePath) {
        self.denied.lock().insert(path);
    }

    pub fn deny_all(&self) {
        *self.deny_all.lock() = true;
    }

    pub fn fail_resource_creation(&self) {
        *self.fail_creation.lock() = true;
    }

    /// Every `check_access` call as `(roles, paths)`
    pub fn checks(&self) -> Vec<(RoleSet, Vec<ResourcePath>)> {
        self.checks.lock().clone()
    }

    pub fn check_count(&self) -> usize {
        self.checks.lock().len()
    }

    /// All paths checked, in call order
    pub fn checked_paths(&self) -> Vec<ResourcePath> {
        self.checks.lock().iter().flat_map(|(_, p)| p.clone()).collect()
    }

    pub fn created_resources(&self) -> Vec<ResourcePath> {
        self.resources.lock().iter().cloned().collect()
    }
}

#[async_trait]
impl PolicyEngine for RecordingPolicyEngine {
    async fn check_access(
        &self,
        _identity: &Identity,
        roles: &RoleSet,
        paths: &[ResourcePath],
    ) -> Result<Decision, PolicyError> {
        self.checks.lock().push((roles.clone(), paths.to_vec()));
        if *self.deny_all.lock() {
            return Ok(Decision::Deny);
        }
        let denied = self.denied.lock();
        Ok(Decision::from(!paths.iter().any(|p| denied.contains(p))))
    }

    async fn create_resource(&self, path: &ResourcePath) -> Result<ResourceCreation, PolicyError> {
        if *self.fail_creation.lock() {
            return Err(PolicyError::Unavailable("resource service down".into()));
        }
        if self.resources.lock().insert(path.clone()) {
            Ok(ResourceCreation::Created)
        } else {
            Ok(ResourceCreation::AlreadyExists)
        }
    }
}
