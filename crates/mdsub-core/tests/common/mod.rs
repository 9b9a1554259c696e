#![allow(dead_code)]

use mdsub_core::{EngineConfig, SubmissionEngine, SubmissionRequest};
use mdsub_graph::InMemoryGraphStore;
use mdsub_model::ResourcePath;
use mdsub_test_utils::{
    sample_registry, seeded_store, test_identity, test_scope, RecordingPolicyEngine, TEST_PROGRAM, TEST_PROJECT,
};
use std::sync::Arc;

pub struct Harness {
    pub engine: Arc<SubmissionEngine>,
    pub store: Arc<InMemoryGraphStore>,
    pub policy: Arc<RecordingPolicyEngine>,
}

pub fn harness() -> Harness {
    harness_with(EngineConfig::default())
}

pub fn harness_with(config: EngineConfig) -> Harness {
    let store = Arc::new(seeded_store());
    let policy = Arc::new(RecordingPolicyEngine::new());
    let engine = SubmissionEngine::new(config, sample_registry(), store.clone(), policy.clone()).unwrap();
    Harness {
        engine: Arc::new(engine),
        store,
        policy,
    }
}

pub fn csv(body: &str) -> SubmissionRequest {
    SubmissionRequest::new(test_scope(), test_identity(), body, "text/csv")
}

pub fn json(body: serde_json::Value) -> SubmissionRequest {
    SubmissionRequest::new(test_scope(), test_identity(), body.to_string(), "application/json")
}

pub fn project_path() -> ResourcePath {
    ResourcePath::project(TEST_PROGRAM, TEST_PROJECT)
}

pub fn subject_path(key: &str) -> ResourcePath {
    ResourcePath::project(TEST_PROGRAM, TEST_PROJECT).entity("subjects", key)
}
