// # Import Hook Trait
//
// Extension points around every directory mutation.
//
// A hook declares a priority per stage. For each stage the pipeline invokes
// the handlers of all hooks with a priority, highest first; hooks with equal
// priority run in registration order. A stage without a priority is never
// invoked, so a hook whose priorities are all unset is loaded but inert.
//
// ## Stages
//
// ```text
// entry_read ─▶ map ─▶ pre_<action> ─▶ directory write ─▶ post_<action>
// ```
//
// `post_*` handlers run only if the write succeeded. Deactivation goes through
// the `*_remove` stages since it is the first step of a removal.
//
// ## Usage
//
// ```rust,ignore
// struct Greeter;
//
// #[async_trait]
// impl ImportHook for Greeter {
//     fn name(&self) -> &str { "greeter" }
//
//     fn priorities(&self) -> HookPriorities {
//         HookPriorities::new().with(HookStage::PostCreate, 10)
//     }
//
//     async fn post_create(&self, user: &mut DirectoryUserState) -> Result<(), Error> {
//         tracing::info!("Welcome {}", user.username);
//         Ok(())
//     }
// }
// ```

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;

use crate::config::Configuration;
use crate::models::{DirectoryUserState, RawRecord};

/// Pipeline stage a handler is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HookStage {
    EntryRead,
    PreCreate,
    PostCreate,
    PreModify,
    PostModify,
    PreMove,
    PostMove,
    PreRemove,
    PostRemove,
}

impl HookStage {
    pub const ALL: [HookStage; 9] = [
        HookStage::EntryRead,
        HookStage::PreCreate,
        HookStage::PostCreate,
        HookStage::PreModify,
        HookStage::PostModify,
        HookStage::PreMove,
        HookStage::PostMove,
        HookStage::PreRemove,
        HookStage::PostRemove,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HookStage::EntryRead => "entry_read",
            HookStage::PreCreate => "pre_create",
            HookStage::PostCreate => "post_create",
            HookStage::PreModify => "pre_modify",
            HookStage::PostModify => "post_modify",
            HookStage::PreMove => "pre_move",
            HookStage::PostMove => "post_move",
            HookStage::PreRemove => "pre_remove",
            HookStage::PostRemove => "post_remove",
        }
    }
}

impl fmt::Display for HookStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Priority per stage; `None` or absent means the stage is not handled
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HookPriorities {
    priorities: BTreeMap<HookStage, Option<i32>>,
}

impl HookPriorities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle `stage` with `priority`
    pub fn with(mut self, stage: HookStage, priority: i32) -> Self {
        self.priorities.insert(stage, Some(priority));
        self
    }

    /// Declare `stage` explicitly unhandled
    pub fn without(mut self, stage: HookStage) -> Self {
        self.priorities.insert(stage, None);
        self
    }

    pub fn get(&self, stage: HookStage) -> Option<i32> {
        self.priorities.get(&stage).copied().flatten()
    }

    /// Whether no stage has a priority
    pub fn is_inert(&self) -> bool {
        self.priorities.values().all(Option::is_none)
    }
}

/// Outcome of an `entry_read` handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryVerdict {
    Keep,
    /// Drop the record without processing it
    Skip,
}

/// Trait for import hooks
///
/// All stage handlers default to doing nothing; implement the ones the hook
/// declares a priority for.
///
/// # Trust Level: Untrusted
///
/// ## Allowed Capabilities
/// - ✅ Rewrite the record or user state it is handed
/// - ✅ Fail the current record by returning an error
///
/// ## Forbidden Capabilities
/// - ❌ Write to the directory in dry-run without declaring `supports_dry_run`
/// - ❌ Spawn tasks that outlive the handler call
///
/// A handler error aborts the current record only. Changes a handler makes
/// to the user state are seen by later handlers of the same stage, by the
/// directory write and by the paired `post_*` stage.
#[async_trait]
pub trait ImportHook: Send + Sync {
    /// Get the hook name (for logging/debugging)
    fn name(&self) -> &str;

    /// Stage priorities of this hook
    fn priorities(&self) -> HookPriorities;

    /// Whether the hook may run in dry-run mode
    ///
    /// Hooks that do not support dry-run are skipped entirely in dry-run.
    fn supports_dry_run(&self) -> bool {
        false
    }

    /// Inspect or rewrite a raw record before it is mapped
    async fn entry_read(&self, _record: &mut RawRecord) -> Result<EntryVerdict, crate::Error> {
        Ok(EntryVerdict::Keep)
    }

    async fn pre_create(&self, _user: &mut DirectoryUserState) -> Result<(), crate::Error> {
        Ok(())
    }

    async fn post_create(&self, _user: &mut DirectoryUserState) -> Result<(), crate::Error> {
        Ok(())
    }

    async fn pre_modify(&self, _user: &mut DirectoryUserState) -> Result<(), crate::Error> {
        Ok(())
    }

    async fn post_modify(&self, _user: &mut DirectoryUserState) -> Result<(), crate::Error> {
        Ok(())
    }

    async fn pre_move(&self, _user: &mut DirectoryUserState) -> Result<(), crate::Error> {
        Ok(())
    }

    async fn post_move(&self, _user: &mut DirectoryUserState) -> Result<(), crate::Error> {
        Ok(())
    }

    async fn pre_remove(&self, _user: &mut DirectoryUserState) -> Result<(), crate::Error> {
        Ok(())
    }

    async fn post_remove(&self, _user: &mut DirectoryUserState) -> Result<(), crate::Error> {
        Ok(())
    }
}

/// Helper trait for constructing hooks from configuration
pub trait HookFactory: Send + Sync {
    /// Create an ImportHook instance from the run configuration
    fn create(&self, config: &Configuration) -> Result<Box<dyn ImportHook>, crate::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priorities() {
        let priorities = HookPriorities::new()
            .with(HookStage::PreCreate, 10)
            .without(HookStage::PostCreate);
        assert_eq!(priorities.get(HookStage::PreCreate), Some(10));
        assert_eq!(priorities.get(HookStage::PostCreate), None);
        assert_eq!(priorities.get(HookStage::PreMove), None);
        assert!(!priorities.is_inert());
        assert!(HookPriorities::new().without(HookStage::PreMove).is_inert());
    }
}
