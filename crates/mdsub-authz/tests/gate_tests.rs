use chrono::Utc;
use mdsub_authz::{AuthorizationGate, AuthzError, GateConfig, ManualClock, ResourceOutcome, RoleSet};
use mdsub_model::ResourcePath;
use mdsub_test_utils::{test_identity, RecordingPolicyEngine, TEST_PROGRAM, TEST_PROJECT};
use std::sync::Arc;
use std::time::Duration;

fn setup() -> (Arc<RecordingPolicyEngine>, Arc<ManualClock>, AuthorizationGate) {
    let policy = Arc::new(RecordingPolicyEngine::new());
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let gate = AuthorizationGate::new(policy.clone(), clock.clone(), GateConfig::default());
    (policy, clock, gate)
}

fn subject_path(key: &str) -> ResourcePath {
    ResourcePath::project(TEST_PROGRAM, TEST_PROJECT).entity("subjects", key)
}

#[tokio::test]
async fn cache_expires_with_window() {
    let (policy, clock, gate) = setup();
    let identity = test_identity();
    let roles = RoleSet::new(["create", "update"]);
    let paths = [subject_path("SUBJ-1")];

    gate.authorize(&identity, &roles, &paths).await.unwrap();
    gate.authorize(&identity, &roles, &paths).await.unwrap();
    assert_eq!(policy.check_count(), 1);

    clock.advance(Duration::from_millis(1500));
    gate.authorize(&identity, &roles, &paths).await.unwrap();
    assert_eq!(policy.check_count(), 2);
}

#[tokio::test]
async fn different_roles_are_checked_separately() {
    let (policy, _clock, gate) = setup();
    let identity = test_identity();
    let paths = [subject_path("SUBJ-1")];

    gate.authorize(&identity, &RoleSet::new(["create"]), &paths).await.unwrap();
    gate.authorize(&identity, &RoleSet::new(["delete"]), &paths).await.unwrap();
    assert_eq!(policy.check_count(), 2);
    let roles: Vec<String> = policy.checks().iter().map(|(r, _)| r.to_string()).collect();
    assert_eq!(roles, vec!["create", "delete"]);
}

#[tokio::test]
async fn denial_names_the_path() {
    let (policy, _clock, gate) = setup();
    policy.deny(subject_path("SUBJ-2"));
    let identity = test_identity();

    let err = gate
        .authorize(
            &identity,
            &RoleSet::new(["create"]),
            &[subject_path("SUBJ-1"), subject_path("SUBJ-2")],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AuthzError::Denied { ref path, .. } if *path == subject_path("SUBJ-2")));
    assert_eq!(
        err.to_string(),
        "user is unauthorized: create on /programs/CGCI/projects/BLGSP/subjects/SUBJ-2"
    );
}

#[tokio::test]
async fn denials_are_not_cached() {
    let (policy, _clock, gate) = setup();
    policy.deny_all();
    let identity = test_identity();
    let roles = RoleSet::new(["create"]);
    let paths = [subject_path("SUBJ-1")];

    assert!(gate.authorize(&identity, &roles, &paths).await.is_err());
    assert!(gate.authorize(&identity, &roles, &paths).await.is_err());
    assert_eq!(policy.check_count(), 2);
    assert_eq!(gate.cache().stats().entry_count, 0);
}

#[tokio::test]
async fn resource_creation_through_gate() {
    let (policy, _clock, gate) = setup();
    let path = subject_path("SUBJ-1");

    assert_eq!(gate.ensure_resource(&path).await, ResourceOutcome::Created);
    assert_eq!(gate.ensure_resource(&path).await, ResourceOutcome::AlreadyExists);
    assert_eq!(policy.created_resources(), vec![path]);

    policy.fail_resource_creation();
    assert_eq!(
        gate.ensure_resource(&subject_path("SUBJ-2")).await,
        ResourceOutcome::Failed
    );
}
