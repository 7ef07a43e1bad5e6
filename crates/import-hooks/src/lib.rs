// # Built-in Import Hooks
//
// This crate provides the hooks shipped with the import engine.
//
// ## Hooks
//
// - `log_user_object`: logs every user right before and after it is written.
//   Runs first in `pre_*` and last in `post_*` so it shows what the
//   directory actually receives. Supports dry-run.
// - `trim_fields`: strips surrounding whitespace from every field of a record
//   before it is mapped.
//
// ## Registration
//
// Hooks are registered into the core `HookRegistry` at startup; the engine
// never references this crate directly.

use async_trait::async_trait;
use school_import_core::config::Configuration;
use school_import_core::models::{DirectoryUserState, RawRecord};
use school_import_core::traits::{EntryVerdict, HookFactory, HookPriorities, HookStage, ImportHook};
use school_import_core::{HookRegistry, Result};
use tracing::info;

/// Priority of `log_user_object` in `pre_*` stages
const LOG_PRE_PRIORITY: i32 = 1000;

/// Priority of `log_user_object` in `post_*` stages
const LOG_POST_PRIORITY: i32 = -1000;

/// Logs the user object around every directory write
pub struct LogUserObjectHook {
    dry_run: bool,
}

impl LogUserObjectHook {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    fn log(&self, stage: HookStage, user: &DirectoryUserState) {
        let prefix = if self.dry_run { "Dry-run: " } else { "" };
        info!(
            "{}{} {} ({}, {}): school={} schools={} disabled={} attributes={:?}",
            prefix,
            stage,
            user.username,
            user.role,
            user.identity(),
            user.school,
            user.schools.join(","),
            user.disabled,
            user.attributes
        );
    }
}

#[async_trait]
impl ImportHook for LogUserObjectHook {
    fn name(&self) -> &str {
        "log_user_object"
    }

    fn priorities(&self) -> HookPriorities {
        HookPriorities::new()
            .with(HookStage::PreCreate, LOG_PRE_PRIORITY)
            .with(HookStage::PostCreate, LOG_POST_PRIORITY)
            .with(HookStage::PreModify, LOG_PRE_PRIORITY)
            .with(HookStage::PostModify, LOG_POST_PRIORITY)
            .with(HookStage::PreMove, LOG_PRE_PRIORITY)
            .with(HookStage::PostMove, LOG_POST_PRIORITY)
            .with(HookStage::PreRemove, LOG_PRE_PRIORITY)
            .with(HookStage::PostRemove, LOG_POST_PRIORITY)
    }

    fn supports_dry_run(&self) -> bool {
        true
    }

    async fn pre_create(&self, user: &mut DirectoryUserState) -> Result<()> {
        self.log(HookStage::PreCreate, user);
        Ok(())
    }

    async fn post_create(&self, user: &mut DirectoryUserState) -> Result<()> {
        self.log(HookStage::PostCreate, user);
        Ok(())
    }

    async fn pre_modify(&self, user: &mut DirectoryUserState) -> Result<()> {
        self.log(HookStage::PreModify, user);
        Ok(())
    }

    async fn post_modify(&self, user: &mut DirectoryUserState) -> Result<()> {
        self.log(HookStage::PostModify, user);
        Ok(())
    }

    async fn pre_move(&self, user: &mut DirectoryUserState) -> Result<()> {
        self.log(HookStage::PreMove, user);
        Ok(())
    }

    async fn post_move(&self, user: &mut DirectoryUserState) -> Result<()> {
        self.log(HookStage::PostMove, user);
        Ok(())
    }

    async fn pre_remove(&self, user: &mut DirectoryUserState) -> Result<()> {
        self.log(HookStage::PreRemove, user);
        Ok(())
    }

    async fn post_remove(&self, user: &mut DirectoryUserState) -> Result<()> {
        self.log(HookStage::PostRemove, user);
        Ok(())
    }
}

/// Factory for creating `log_user_object` hooks
pub struct LogUserObjectFactory;

impl HookFactory for LogUserObjectFactory {
    fn create(&self, config: &Configuration) -> Result<Box<dyn ImportHook>> {
        Ok(Box::new(LogUserObjectHook::new(config.settings().dry_run)))
    }
}

/// Strips surrounding whitespace from every field
pub struct TrimFieldsHook;

#[async_trait]
impl ImportHook for TrimFieldsHook {
    fn name(&self) -> &str {
        "trim_fields"
    }

    fn priorities(&self) -> HookPriorities {
        HookPriorities::new().with(HookStage::EntryRead, 100)
    }

    fn supports_dry_run(&self) -> bool {
        true
    }

    async fn entry_read(&self, record: &mut RawRecord) -> Result<EntryVerdict> {
        for field in &mut record.fields {
            let trimmed = field.trim();
            if trimmed.len() != field.len() {
                *field = trimmed.to_string();
            }
        }
        Ok(EntryVerdict::Keep)
    }
}

/// Factory for creating `trim_fields` hooks
pub struct TrimFieldsFactory;

impl HookFactory for TrimFieldsFactory {
    fn create(&self, _config: &Configuration) -> Result<Box<dyn ImportHook>> {
        Ok(Box::new(TrimFieldsHook))
    }
}

/// Register the built-in hooks
///
/// This should be called during startup, before the pipeline is built.
///
/// # Example
///
/// ```rust,ignore
/// let mut registry = HookRegistry::new();
/// school_import_hooks::register(&mut registry)?;
/// let pipeline = registry.build_pipeline(&config)?;
/// ```
pub fn register(registry: &mut HookRegistry) -> Result<()> {
    registry.register("trim_fields", Box::new(TrimFieldsFactory))?;
    registry.register("log_user_object", Box::new(LogUserObjectFactory))?;
    Ok(())
}
