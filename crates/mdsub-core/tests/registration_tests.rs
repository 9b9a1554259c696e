mod common;

use common::harness;
use mdsub_authz::AuthzError;
use mdsub_core::SubmissionError;
use mdsub_model::{ResourcePath, PROGRAM, PROJECT};
use mdsub_test_utils::{program_id, project_id, test_identity, TEST_PROGRAM};
use pretty_assertions::assert_eq;
use serde_json::json;

#[tokio::test]
async fn second_program_registration_updates_fields() {
    let h = harness();
    let first_body = json!({"type": "program", "name": "TCGA", "dbgap_accession_number": "phs000178"}).to_string();
    let second_body = json!({"type": "program", "name": "TCGA", "dbgap_accession_number": "phs000999"}).to_string();

    let first = h
        .engine
        .register_program(&test_identity(), first_body.as_bytes(), "application/json")
        .await
        .unwrap();
    let second = h
        .engine
        .register_program(&test_identity(), second_body.as_bytes(), "application/json")
        .await
        .unwrap();

    assert_eq!(first.message, "Program registered.");
    assert_eq!(second.message, "Program is updated!");
    assert_eq!(first.id, second.id);
    assert_eq!(first.id, program_id("TCGA"));

    let stored: Vec<_> = h
        .store
        .nodes_with_label(PROGRAM)
        .into_iter()
        .filter(|n| n.key == "TCGA")
        .collect();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].props.get("dbgap_accession_number"), Some(&json!("phs000999")));
    assert_eq!(h.policy.created_resources(), vec![ResourcePath::program("TCGA")]);
}

#[tokio::test]
async fn program_registration_needs_admin_access() {
    let h = harness();
    h.policy.deny_all();
    let err = h
        .engine
        .register_program(&test_identity(), b"type,name\nprogram,TCGA\n", "text/csv")
        .await
        .unwrap_err();

    assert!(matches!(err, SubmissionError::Authorization(AuthzError::Denied { .. })));
    assert_eq!(
        h.policy.checked_paths(),
        vec!["/services/submission/program".parse::<ResourcePath>().unwrap()]
    );
}

#[tokio::test]
async fn wrong_type_or_missing_key_is_rejected() {
    let h = harness();
    let err = h
        .engine
        .register_program(&test_identity(), b"type,name\ncase,C1\n", "text/csv")
        .await
        .unwrap_err();
    assert_eq!(err, SubmissionError::InvalidDocument("Invalid type in key type='case'".into()));

    let err = h
        .engine
        .register_program(&test_identity(), br#"{"type": "program"}"#, "application/json")
        .await
        .unwrap_err();
    assert_eq!(err, SubmissionError::InvalidDocument("No program specified in key 'name'".into()));
    assert_eq!(err.status(), 400);
}

#[tokio::test]
async fn lists_are_refused() {
    let h = harness();
    let err = h
        .engine
        .register_program(
            &test_identity(),
            b"type,name\nprogram,A\nprogram,B\n",
            "text/csv",
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SubmissionError::InvalidShape(_)));
}

#[tokio::test]
async fn project_links_to_its_program() {
    let h = harness();
    let body = json!({"type": "project", "code": "NEW", "name": "New project", "state": "open"}).to_string();
    let response = h
        .engine
        .register_project(&test_identity(), TEST_PROGRAM, body.as_bytes(), "application/json")
        .await
        .unwrap();

    assert_eq!(response.message, "Project registered.");
    assert_eq!(response.id, project_id(TEST_PROGRAM, "NEW"));
    let node = h
        .store
        .nodes_with_label(PROJECT)
        .into_iter()
        .find(|n| n.key == "NEW")
        .unwrap();
    assert_eq!(node.link("programs"), &[program_id(TEST_PROGRAM)][..]);
    assert_eq!(node.props.get("state"), Some(&json!("open")));
    assert!(h
        .policy
        .created_resources()
        .contains(&ResourcePath::project(TEST_PROGRAM, "NEW")));
}

#[tokio::test]
async fn project_under_unknown_program_is_not_found() {
    let h = harness();
    let err = h
        .engine
        .register_project(&test_identity(), "GHOST", b"type,code\nproject,NEW\n", "text/csv")
        .await
        .unwrap_err();
    assert_eq!(err, SubmissionError::NotFound("Program GHOST not found".into()));
}

#[tokio::test]
async fn project_fields_are_validated() {
    let h = harness();
    let err = h
        .engine
        .register_project(
            &test_identity(),
            TEST_PROGRAM,
            br#"{"type": "project", "code": "NEW", "state": "archived"}"#,
            "application/json",
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SubmissionError::InvalidDocument(_)));

    let err = h
        .engine
        .register_project(&test_identity(), TEST_PROGRAM, br#"{"type": "project"}"#, "application/json")
        .await
        .unwrap_err();
    assert_eq!(err, SubmissionError::InvalidDocument("No project specified in key 'code'".into()));
}
