//! Architectural Contract Test: Dry-Run Purity
//!
//! This test verifies that a dry-run decides exactly what a real run would,
//! without leaving a trace.
//!
//! Constraints verified:
//! - Dry-run summary == summary of the following real run
//! - Zero directory writes, zero persisted reservations
//! - Hooks without dry-run support are never invoked
//! - No credentials file is written
//! - A pipeline built for a real run is refused for a dry-run
//!
//! If this test fails, someone has:
//! - Let a write path bypass the dry-run switch
//! - Persisted state from a dry-run

mod common;

use common::*;
use school_import_core::config::OutputConfig;
use school_import_core::identity::PasswordGenerator;
use school_import_core::traits::ImportHook;
use school_import_core::writer::{summary_csv, write_outputs};
use school_import_core::{Error, HookPipeline, ImportEngine, StateStore};
use serde_json::json;
use std::sync::{Arc, Mutex};

#[tokio::test]
async fn dry_run_reports_what_a_real_run_does() {
    let dry = config(json!({"dry_run": true}));
    let real = config(json!({}));
    let (directory, backend, store) = memory_collaborators();
    directory.insert(existing_user("gone", "99", "gym1")).await;

    let dry_report = engine(dry.clone(), &backend, &store, Vec::new())
        .with_passwords(PasswordGenerator::with_seed(dry.settings(), 7).unwrap())
        .run(records(&dry, FOUR_ROLES))
        .await
        .unwrap();

    assert!(dry_report.dry_run);
    assert_eq!(directory.write_count(), 0);
    assert!(store.list_reservations().await.unwrap().is_empty());
    assert!(directory.get("gone").await.is_some());

    let real_report = engine(real.clone(), &backend, &store, Vec::new())
        .with_passwords(PasswordGenerator::with_seed(real.settings(), 7).unwrap())
        .run(records(&real, FOUR_ROLES))
        .await
        .unwrap();

    assert_eq!(
        summary_csv(&dry_report, false).unwrap(),
        summary_csv(&real_report, false).unwrap()
    );
    assert!(directory.write_count() > 0);
    assert!(directory.get("gone").await.is_none());
}

#[tokio::test]
async fn hooks_without_dry_run_support_are_skipped() {
    let dry = config(json!({"dry_run": true}));
    let (_directory, backend, store) = memory_collaborators();
    let calls = Arc::new(Mutex::new(Vec::new()));
    let hooks: Vec<Box<dyn ImportHook>> = vec![
        Box::new(RecordingHook::new("unaware", 10, &calls)),
        Box::new(RecordingHook::new("aware", 5, &calls).supporting_dry_run()),
    ];

    engine(dry.clone(), &backend, &store, hooks)
        .run(records(&dry, "ID;Vorname;Nachname;Rolle\n1;Anna;Schmidt;student\n"))
        .await
        .unwrap();

    let calls = calls.lock().unwrap().clone();
    assert_eq!(
        calls,
        vec![
            "aware:pre_create:aschmidt".to_string(),
            "aware:post_create:aschmidt".to_string()
        ]
    );
}

#[tokio::test]
async fn dry_run_writes_no_credentials_file() {
    let dry = config(json!({"dry_run": true}));
    let (_directory, backend, store) = memory_collaborators();
    let report = engine(dry.clone(), &backend, &store, Vec::new())
        .run(records(&dry, FOUR_ROLES))
        .await
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let summary = dir.path().join("summary.csv");
    let passwords = dir.path().join("passwords.csv");
    let output = OutputConfig {
        summary_file: Some(summary.display().to_string()),
        password_file: Some(passwords.display().to_string()),
        ..OutputConfig::default()
    };
    write_outputs(&report, &output).await.unwrap();

    assert!(summary.exists());
    assert!(!passwords.exists());
}

#[tokio::test]
async fn real_run_pipeline_is_refused_for_dry_run() {
    let dry = config(json!({"dry_run": true}));
    let (directory, backend, store) = memory_collaborators();
    let calls = Arc::new(Mutex::new(Vec::new()));
    let hooks: Vec<Box<dyn ImportHook>> = vec![Box::new(RecordingHook::new("writer", 1, &calls))];

    let result = ImportEngine::new(dry, backend, store, HookPipeline::new(hooks, false));

    match result {
        Err(Error::Initialisation(message)) => assert!(message.contains("writer")),
        Err(other) => panic!("unexpected error {}", other),
        Ok(_) => panic!("engine accepted hooks without dry-run support"),
    }
    assert_eq!(directory.write_count(), 0);
    assert!(calls.lock().unwrap().is_empty());
}
