//! Architectural Contract Test: Record Isolation
//!
//! This test verifies that a failing record never takes the run down.
//!
//! Constraints verified:
//! - Hook failure → that record errors, the next one proceeds
//! - Failed directory write → `post_*` hooks never run for it
//! - Failing `post_create` → the record errors, its password stays in the
//!   credentials
//! - Directory timeout → that record errors, the run continues
//! - More errors than `tolerate_errors` → run stops, no deletion phase
//!
//! If this test fails, someone has:
//! - Propagated a record error to the run
//! - Run post hooks after a failed write
//! - Dropped the password of a user that was created

mod common;

use common::*;
use school_import_core::traits::{DirectoryBackend, ImportHook};
use school_import_core::writer::StopReason;
use school_import_core::{ActionKind, RunOutcome};
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

const THREE: &str = "\
ID;Vorname;Nachname;Rolle
1;Anna;Schmidt;student
2;Bernd;Meyer;teacher
3;Carla;Wolf;staff
";

#[tokio::test]
async fn hook_failure_fails_only_its_record() {
    let config = config(json!({}));
    let (directory, backend, store) = memory_collaborators();
    let calls = Arc::new(Mutex::new(Vec::new()));
    let hooks: Vec<Box<dyn ImportHook>> =
        vec![Box::new(RecordingHook::new("picky", 1, &calls).failing_for("bmeyer"))];

    let report = engine(config.clone(), &backend, &store, hooks)
        .run(records(&config, THREE))
        .await
        .unwrap();

    assert_eq!(report.count(ActionKind::Create), 2);
    assert_eq!(report.error_count(), 1);
    assert_eq!(report.outcome(), RunOutcome::RecordErrors);

    let failed = &report.outcomes()[1];
    assert!(failed.is_error());
    assert_eq!(failed.line, 2);
    assert_eq!(failed.username.as_deref(), Some("bmeyer"));
    assert!(failed.error.as_deref().unwrap().contains("picky"));

    assert!(directory.get("bmeyer").await.is_none());
    assert!(directory.get("cwolf").await.is_some());
}

#[tokio::test]
async fn post_hooks_run_only_after_successful_write() {
    let config = config(json!({}));
    let (directory, _backend, store) = memory_collaborators();
    let faulty = FaultyDirectory::new(directory.clone()).failing_create("aschmidt");
    let create_calls = faulty.create_calls();
    let backend: Arc<dyn DirectoryBackend> = Arc::new(faulty);
    let calls = Arc::new(Mutex::new(Vec::new()));
    let hooks: Vec<Box<dyn ImportHook>> = vec![Box::new(RecordingHook::new("audit", 1, &calls))];

    let report = engine(config.clone(), &backend, &store, hooks)
        .run(records(&config, "ID;Vorname;Nachname;Rolle\n1;Anna;Schmidt;student\n2;Bernd;Meyer;teacher\n"))
        .await
        .unwrap();

    assert_eq!(create_calls.load(Ordering::SeqCst), 2);
    assert_eq!(report.error_count(), 1);
    let calls = calls.lock().unwrap().clone();
    assert_eq!(
        calls,
        vec![
            "audit:pre_create:aschmidt".to_string(),
            "audit:pre_create:bmeyer".to_string(),
            "audit:post_create:bmeyer".to_string(),
        ]
    );
    assert!(directory.get("aschmidt").await.is_none());
}

#[tokio::test]
async fn post_create_failure_keeps_credentials() {
    let config = config(json!({}));
    let (directory, backend, store) = memory_collaborators();
    let calls = Arc::new(Mutex::new(Vec::new()));
    let hooks: Vec<Box<dyn ImportHook>> = vec![Box::new(
        RecordingHook::new("audit", 1, &calls).failing_after_write_for("aschmidt"),
    )];

    let report = engine(config.clone(), &backend, &store, hooks)
        .run(records(&config, "ID;Vorname;Nachname;Rolle\n1;Anna;Schmidt;student\n"))
        .await
        .unwrap();

    assert!(directory.get("aschmidt").await.is_some());
    assert_eq!(report.error_count(), 1);
    let failed = &report.outcomes()[0];
    assert!(failed.is_error());
    assert!(failed.error.as_deref().unwrap().contains("lost track"));

    let credentials: Vec<_> = report.credentials().collect();
    assert_eq!(credentials.len(), 1);
    assert_eq!(credentials[0].username.as_deref(), Some("aschmidt"));
    assert!(credentials[0].password.as_deref().is_some_and(|p| !p.is_empty()));
    assert_eq!(credentials[0].attribute("lastname"), "Schmidt");
}

#[tokio::test]
async fn directory_timeout_fails_only_its_record() {
    let config = config(json!({"directory": {"timeout_secs": 1}}));
    let (directory, _backend, store) = memory_collaborators();
    let backend: Arc<dyn DirectoryBackend> =
        Arc::new(FaultyDirectory::new(directory.clone()).stalling_lookup("2"));

    let report = engine(config.clone(), &backend, &store, Vec::new())
        .run(records(&config, THREE))
        .await
        .unwrap();

    assert_eq!(report.count(ActionKind::Create), 2);
    assert_eq!(report.error_count(), 1);
    let failed = &report.outcomes()[1];
    assert_eq!(failed.record_uid.as_deref(), Some("2"));
    assert!(failed.error.as_deref().unwrap().contains("timed out"));
    assert!(directory.get("cwolf").await.is_some());
}

#[tokio::test]
async fn too_many_errors_stop_the_run() {
    let config = config(json!({"tolerate_errors": 1}));
    let (directory, backend, store) = memory_collaborators();
    directory.insert(existing_user("gone", "99", "gym1")).await;

    let input = "\
ID;Vorname;Nachname;Rolle
1;Anna;;student
2;Bernd;;teacher
3;Carla;Wolf;staff
";
    let report = engine(config.clone(), &backend, &store, Vec::new())
        .run(records(&config, input))
        .await
        .unwrap();

    assert_eq!(report.records_read, 2);
    assert_eq!(report.error_count(), 2);
    assert_eq!(
        report.stopped,
        Some(StopReason::TooManyErrors {
            count: 2,
            tolerated: 1
        })
    );
    assert_eq!(report.outcome(), RunOutcome::RecordErrors);
    assert!(directory.get("cwolf").await.is_none());
    // deletion phase skipped
    assert!(directory.get("gone").await.is_some());
}

#[tokio::test]
async fn duplicate_identifiers_fail_the_later_record() {
    let config = config(json!({}));
    let (_directory, backend, store) = memory_collaborators();
    let input = "\
ID;Vorname;Nachname;Rolle;Mail
1;Anna;Schmidt;student;anna@school.example
1;Bernd;Meyer;teacher;
3;Carla;Wolf;staff;ANNA@school.example
";
    let report = engine(config.clone(), &backend, &store, Vec::new())
        .run(records(&config, input))
        .await
        .unwrap();

    let errors: Vec<&str> = report
        .outcomes()
        .iter()
        .filter_map(|o| o.error.as_deref())
        .collect();
    assert_eq!(report.count(ActionKind::Create), 1);
    assert_eq!(errors.len(), 2);
    assert!(errors[0].contains("record_uid"));
    assert!(errors[1].contains("e-mail"));
}
