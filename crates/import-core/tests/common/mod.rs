//! Test doubles and common utilities for import contract tests
//!
//! This module provides minimal test doubles that record what the engine
//! does to the directory and the hooks, without implementing real
//! functionality.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use school_import_core::config::{Configuration, merge};
use school_import_core::error::{Error, Result};
use school_import_core::models::{DirectoryUserState, ExistingUser, RawRecord};
use school_import_core::traits::{
    DirectoryBackend, HookPriorities, HookStage, ImportHook, StateStore,
};
use school_import_core::{CsvReader, HookPipeline, ImportEngine, MemoryDirectory, MemoryStateStore};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Fixed run date
pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 9, 1).unwrap()
}

pub fn days_later(days: u64) -> NaiveDate {
    today() + chrono::Days::new(days)
}

/// Layer shared by most tests: German column names, role column, one school
pub fn base_layer() -> Value {
    json!({
        "source_uid": "TEST",
        "school": "gym1",
        "scheme": {
            "username": {"default": "<:umlauts><:lower><firstname>[0]<lastname>[COUNTER2]"}
        },
        "csv": {
            "mapping": {
                "Vorname": "firstname",
                "Nachname": "lastname",
                "Rolle": "__role",
                "ID": "record_uid",
                "Schule": "school",
                "Mail": "email"
            },
            "allowed_missing_columns": ["Schule", "Mail"]
        }
    })
}

/// Base layer with `overrides` merged on top
pub fn config(overrides: Value) -> Configuration {
    let mut layer = base_layer();
    merge(&mut layer, overrides);
    Configuration::load(vec![layer]).expect("valid configuration")
}

/// Parse CSV text with the reader settings of `config`
pub fn records(config: &Configuration, csv: &str) -> Vec<Result<RawRecord>> {
    CsvReader::from_bytes(csv.as_bytes(), config.settings())
        .expect("readable input")
        .read()
        .collect()
}

/// One row per role, shared source, unique record ids
pub const FOUR_ROLES: &str = "\
ID;Vorname;Nachname;Rolle
1;Anna;Schmidt;student
2;Bernd;Meyer;teacher
3;Carla;Wolf;staff
4;Dieter;Krause;teacher,staff
";

/// Build an engine for `today()` with memory collaborators
pub fn engine(
    config: Configuration,
    directory: &Arc<dyn DirectoryBackend>,
    store: &Arc<dyn StateStore>,
    hooks: Vec<Box<dyn ImportHook>>,
) -> ImportEngine {
    let dry_run = config.settings().dry_run;
    let (engine, _events) = ImportEngine::new(
        config,
        Arc::clone(directory),
        Arc::clone(store),
        HookPipeline::new(hooks, dry_run),
    )
    .expect("engine construction succeeds");
    engine.with_today(today())
}

pub fn memory_collaborators() -> (MemoryDirectory, Arc<dyn DirectoryBackend>, Arc<dyn StateStore>) {
    let directory = MemoryDirectory::new();
    let backend: Arc<dyn DirectoryBackend> = Arc::new(directory.clone());
    let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
    (directory, backend, store)
}

pub fn existing_user(username: &str, record_uid: &str, school: &str) -> ExistingUser {
    ExistingUser {
        username: username.to_string(),
        record_uid: record_uid.to_string(),
        source_uid: "TEST".to_string(),
        role: school_import_core::Role::Student,
        school: school.to_string(),
        schools: vec![school.to_string()],
        attributes: [
            ("firstname".to_string(), "Old".to_string()),
            ("lastname".to_string(), "User".to_string()),
        ]
        .into_iter()
        .collect(),
        disabled: false,
        expiration: None,
    }
}

/// A hook that records every invocation as `name:stage:username`
pub struct RecordingHook {
    name: &'static str,
    priorities: HookPriorities,
    dry_run: bool,
    fail_for: Option<String>,
    fail_post_for: Option<String>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl RecordingHook {
    /// Handle all user stages with `priority`
    pub fn new(name: &'static str, priority: i32, calls: &Arc<Mutex<Vec<String>>>) -> Self {
        let priorities = HookStage::ALL
            .into_iter()
            .filter(|stage| *stage != HookStage::EntryRead)
            .fold(HookPriorities::new(), |p, stage| p.with(stage, priority));
        Self {
            name,
            priorities,
            dry_run: false,
            fail_for: None,
            fail_post_for: None,
            calls: Arc::clone(calls),
        }
    }

    /// A hook whose priorities are all unset
    pub fn inert(name: &'static str, calls: &Arc<Mutex<Vec<String>>>) -> Self {
        let priorities = HookStage::ALL
            .into_iter()
            .fold(HookPriorities::new(), |p, stage| p.without(stage));
        Self {
            name,
            priorities,
            dry_run: false,
            fail_for: None,
            fail_post_for: None,
            calls: Arc::clone(calls),
        }
    }

    pub fn supporting_dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    /// Fail the `pre_*` stages of `username`
    pub fn failing_for(mut self, username: &str) -> Self {
        self.fail_for = Some(username.to_string());
        self
    }

    /// Fail the `post_*` stages of `username`, after its write succeeded
    pub fn failing_after_write_for(mut self, username: &str) -> Self {
        self.fail_post_for = Some(username.to_string());
        self
    }

    fn record(&self, stage: HookStage, user: &DirectoryUserState) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{}:{}:{}", self.name, stage, user.username));
        let pre = matches!(
            stage,
            HookStage::PreCreate | HookStage::PreModify | HookStage::PreMove | HookStage::PreRemove
        );
        if pre && self.fail_for.as_deref() == Some(user.username.as_str()) {
            return Err(Error::Other(format!("{} refuses {}", self.name, user.username)));
        }
        if !pre && self.fail_post_for.as_deref() == Some(user.username.as_str()) {
            return Err(Error::Other(format!(
                "{} lost track of {}",
                self.name, user.username
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ImportHook for RecordingHook {
    fn name(&self) -> &str {
        self.name
    }

    fn priorities(&self) -> HookPriorities {
        self.priorities.clone()
    }

    fn supports_dry_run(&self) -> bool {
        self.dry_run
    }

    async fn pre_create(&self, user: &mut DirectoryUserState) -> Result<()> {
        self.record(HookStage::PreCreate, user)
    }

    async fn post_create(&self, user: &mut DirectoryUserState) -> Result<()> {
        self.record(HookStage::PostCreate, user)
    }

    async fn pre_modify(&self, user: &mut DirectoryUserState) -> Result<()> {
        self.record(HookStage::PreModify, user)
    }

    async fn post_modify(&self, user: &mut DirectoryUserState) -> Result<()> {
        self.record(HookStage::PostModify, user)
    }

    async fn pre_move(&self, user: &mut DirectoryUserState) -> Result<()> {
        self.record(HookStage::PreMove, user)
    }

    async fn post_move(&self, user: &mut DirectoryUserState) -> Result<()> {
        self.record(HookStage::PostMove, user)
    }

    async fn pre_remove(&self, user: &mut DirectoryUserState) -> Result<()> {
        self.record(HookStage::PreRemove, user)
    }

    async fn post_remove(&self, user: &mut DirectoryUserState) -> Result<()> {
        self.record(HookStage::PostRemove, user)
    }
}

/// A directory wrapping a MemoryDirectory that can fail or stall on demand
pub struct FaultyDirectory {
    inner: MemoryDirectory,
    /// Usernames whose creation fails
    fail_create: Vec<String>,
    /// Record ids whose lookup never finishes in time
    stall_lookup: Vec<String>,
    stall: Duration,
    create_calls: Arc<AtomicUsize>,
}

impl FaultyDirectory {
    pub fn new(inner: MemoryDirectory) -> Self {
        Self {
            inner,
            fail_create: Vec::new(),
            stall_lookup: Vec::new(),
            stall: Duration::from_secs(5),
            create_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing_create(mut self, username: &str) -> Self {
        self.fail_create.push(username.to_string());
        self
    }

    pub fn stalling_lookup(mut self, record_uid: &str) -> Self {
        self.stall_lookup.push(record_uid.to_string());
        self
    }

    pub fn create_calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.create_calls)
    }
}

#[async_trait]
impl DirectoryBackend for FaultyDirectory {
    async fn lookup(&self, source_uid: &str, record_uid: &str) -> Result<Option<ExistingUser>> {
        if self.stall_lookup.iter().any(|r| r == record_uid) {
            tokio::time::sleep(self.stall).await;
        }
        self.inner.lookup(source_uid, record_uid).await
    }

    async fn lookup_by_username(&self, username: &str) -> Result<Option<ExistingUser>> {
        self.inner.lookup_by_username(username).await
    }

    async fn create(&self, user: &DirectoryUserState) -> Result<()> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_create.contains(&user.username) {
            return Err(Error::directory(format!("cannot create {}", user.username)));
        }
        self.inner.create(user).await
    }

    async fn modify(&self, user: &DirectoryUserState) -> Result<()> {
        self.inner.modify(user).await
    }

    async fn move_user(&self, username: &str, new_school: &str) -> Result<()> {
        self.inner.move_user(username, new_school).await
    }

    async fn delete(&self, username: &str) -> Result<()> {
        self.inner.delete(username).await
    }

    async fn enumerate(&self, source_uid: &str, partition: Option<&str>) -> Result<Vec<ExistingUser>> {
        self.inner.enumerate(source_uid, partition).await
    }

    fn backend_name(&self) -> &'static str {
        "faulty"
    }
}
