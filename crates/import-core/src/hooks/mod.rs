//! Hook pipeline
//!
//! Orders the loaded hooks per stage and runs them. For every stage the
//! handlers of all hooks declaring a priority run highest priority first;
//! ties keep registration order. The order is computed once per run.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::models::{DirectoryUserState, RawRecord};
use crate::traits::{EntryVerdict, HookStage, ImportHook};

/// Loaded hooks of one run
pub struct HookPipeline {
    hooks: Vec<Box<dyn ImportHook>>,
    order: BTreeMap<HookStage, Vec<usize>>,
    dry_run: bool,
    /// Hooks dropped because they do not support dry-run
    skipped: Vec<String>,
}

impl std::fmt::Debug for HookPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookPipeline")
            .field("hooks", &self.hooks.iter().map(|h| h.name()).collect::<Vec<_>>())
            .field("order", &self.order)
            .field("dry_run", &self.dry_run)
            .field("skipped", &self.skipped)
            .finish()
    }
}

impl HookPipeline {
    /// Order `hooks` per stage
    ///
    /// In dry-run, hooks that do not support it are dropped here and never
    /// invoked.
    pub fn new(hooks: Vec<Box<dyn ImportHook>>, dry_run: bool) -> Self {
        let mut skipped = Vec::new();
        let hooks: Vec<Box<dyn ImportHook>> = hooks
            .into_iter()
            .filter(|hook| {
                let keep = !dry_run || hook.supports_dry_run();
                if !keep {
                    info!("Skipping hook '{}' in dry-run", hook.name());
                    skipped.push(hook.name().to_string());
                }
                keep
            })
            .collect();

        let mut order = BTreeMap::new();
        for stage in HookStage::ALL {
            let mut ranked: Vec<(i32, usize)> = hooks
                .iter()
                .enumerate()
                .filter_map(|(i, hook)| hook.priorities().get(stage).map(|p| (p, i)))
                .collect();
            // stable: equal priorities keep registration order
            ranked.sort_by(|a, b| b.0.cmp(&a.0));
            if !ranked.is_empty() {
                order.insert(stage, ranked.into_iter().map(|(_, i)| i).collect());
            }
        }

        for hook in &hooks {
            if hook.priorities().is_inert() {
                debug!("Hook '{}' has no stage priorities", hook.name());
            }
        }

        Self {
            hooks,
            order,
            dry_run,
            skipped,
        }
    }

    /// An empty pipeline
    pub fn empty() -> Self {
        Self::new(Vec::new(), false)
    }

    /// Whether the pipeline was built for a dry-run
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Fail if the pipeline can't serve a run with the given `dry_run` flag
    ///
    /// A real-mode pipeline in a dry-run must not hold hooks without dry-run
    /// support; a dry-run pipeline in a real run must not have dropped any.
    pub fn check_mode(&self, dry_run: bool) -> Result<()> {
        if dry_run && !self.dry_run {
            let unsupported: Vec<&str> = self
                .hooks
                .iter()
                .filter(|h| !h.supports_dry_run())
                .map(|h| h.name())
                .collect();
            if !unsupported.is_empty() {
                return Err(Error::initialisation(format!(
                    "hooks without dry-run support loaded for a dry-run: {}",
                    unsupported.join(", ")
                )));
            }
        }
        if !dry_run && !self.skipped.is_empty() {
            return Err(Error::initialisation(format!(
                "pipeline was built for a dry-run and lacks hooks: {}",
                self.skipped.join(", ")
            )));
        }
        Ok(())
    }

    /// Names of the loaded hooks, in registration order
    pub fn hook_names(&self) -> Vec<&str> {
        self.hooks.iter().map(|h| h.name()).collect()
    }

    /// Names of the hooks invoked for `stage`, in invocation order
    pub fn stage_order(&self, stage: HookStage) -> Vec<&str> {
        self.handlers(stage).map(|h| h.name()).collect()
    }

    fn handlers(&self, stage: HookStage) -> impl Iterator<Item = &dyn ImportHook> {
        self.order
            .get(&stage)
            .into_iter()
            .flatten()
            .map(|&i| self.hooks[i].as_ref())
    }

    /// Run the `entry_read` handlers; the first `Skip` ends the stage
    pub async fn run_entry_read(&self, record: &mut RawRecord) -> Result<EntryVerdict> {
        for hook in self.handlers(HookStage::EntryRead) {
            let verdict = hook
                .entry_read(record)
                .await
                .map_err(|e| wrap(hook.name(), e))?;
            if verdict == EntryVerdict::Skip {
                debug!("Hook '{}' skipped entry {}", hook.name(), record.line);
                return Ok(EntryVerdict::Skip);
            }
        }
        Ok(EntryVerdict::Keep)
    }

    /// Run the handlers of a user stage
    ///
    /// Stops at the first failing handler.
    pub async fn run_stage(&self, stage: HookStage, user: &mut DirectoryUserState) -> Result<()> {
        for hook in self.handlers(stage) {
            debug!("Running {} of hook '{}' for {}", stage, hook.name(), user.username);
            let result = match stage {
                HookStage::EntryRead => Ok(()),
                HookStage::PreCreate => hook.pre_create(user).await,
                HookStage::PostCreate => hook.post_create(user).await,
                HookStage::PreModify => hook.pre_modify(user).await,
                HookStage::PostModify => hook.post_modify(user).await,
                HookStage::PreMove => hook.pre_move(user).await,
                HookStage::PostMove => hook.post_move(user).await,
                HookStage::PreRemove => hook.pre_remove(user).await,
                HookStage::PostRemove => hook.post_remove(user).await,
            };
            result.map_err(|e| wrap(hook.name(), e))?;
        }
        Ok(())
    }
}

fn wrap(hook: &str, error: Error) -> Error {
    match error {
        Error::Hook { .. } => error,
        other => Error::hook(hook, other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::HookPriorities;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    struct Recorder {
        name: &'static str,
        priority: Option<i32>,
        dry_run: bool,
        calls: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl ImportHook for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        fn priorities(&self) -> HookPriorities {
            match self.priority {
                Some(p) => HookPriorities::new().with(HookStage::PreCreate, p),
                None => HookPriorities::new().without(HookStage::PreCreate),
            }
        }

        fn supports_dry_run(&self) -> bool {
            self.dry_run
        }

        async fn pre_create(&self, user: &mut DirectoryUserState) -> Result<()> {
            self.calls.lock().unwrap().push(self.name);
            user.attributes.insert("seen".into(), self.name.into());
            if self.name == "fail" {
                return Err(Error::validation("nope"));
            }
            Ok(())
        }
    }

    fn recorder(
        name: &'static str,
        priority: Option<i32>,
        dry_run: bool,
        calls: &Arc<Mutex<Vec<&'static str>>>,
    ) -> Box<dyn ImportHook> {
        Box::new(Recorder {
            name,
            priority,
            dry_run,
            calls: Arc::clone(calls),
        })
    }

    fn user() -> DirectoryUserState {
        crate::models::ExistingUser {
            username: "jdoe".into(),
            record_uid: "r1".into(),
            source_uid: "src".into(),
            role: crate::models::Role::Student,
            school: "gym1".into(),
            schools: vec!["gym1".into()],
            attributes: BTreeMap::new(),
            disabled: false,
            expiration: None,
        }
        .to_state()
    }

    #[tokio::test]
    async fn test_priority_order_with_ties() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let pipeline = HookPipeline::new(
            vec![
                recorder("low", Some(1), false, &calls),
                recorder("high", Some(10), false, &calls),
                recorder("off", None, false, &calls),
                recorder("mid_a", Some(5), false, &calls),
                recorder("mid_b", Some(5), false, &calls),
            ],
            false,
        );
        assert_eq!(
            pipeline.stage_order(HookStage::PreCreate),
            vec!["high", "mid_a", "mid_b", "low"]
        );

        let mut user = user();
        pipeline.run_stage(HookStage::PreCreate, &mut user).await.unwrap();
        assert_eq!(*calls.lock().unwrap(), vec!["high", "mid_a", "mid_b", "low"]);
        // later handlers see earlier changes
        assert_eq!(user.attribute("seen"), "low");

        // no handler for this stage
        pipeline.run_stage(HookStage::PostCreate, &mut user).await.unwrap();
        assert_eq!(calls.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_failure_stops_stage() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let pipeline = HookPipeline::new(
            vec![
                recorder("fail", Some(10), false, &calls),
                recorder("after", Some(1), false, &calls),
            ],
            false,
        );
        let err = pipeline
            .run_stage(HookStage::PreCreate, &mut user())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Hook { ref hook, .. } if hook == "fail"));
        assert_eq!(*calls.lock().unwrap(), vec!["fail"]);
    }

    #[tokio::test]
    async fn test_dry_run_skips_unsupported_hooks() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let pipeline = HookPipeline::new(
            vec![
                recorder("writer", Some(10), false, &calls),
                recorder("logger", Some(1), true, &calls),
            ],
            true,
        );
        assert_eq!(pipeline.hook_names(), vec!["logger"]);
        pipeline.run_stage(HookStage::PreCreate, &mut user()).await.unwrap();
        assert_eq!(*calls.lock().unwrap(), vec!["logger"]);
    }

    #[test]
    fn test_mode_mismatch() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let real = HookPipeline::new(vec![recorder("writer", Some(10), false, &calls)], false);
        assert!(real.check_mode(false).is_ok());
        assert!(matches!(real.check_mode(true), Err(Error::Initialisation(_))));

        let dry = HookPipeline::new(vec![recorder("writer", Some(10), false, &calls)], true);
        assert!(dry.is_dry_run());
        assert!(dry.check_mode(true).is_ok());
        assert!(dry.check_mode(false).is_err());

        assert!(HookPipeline::empty().check_mode(true).is_ok());
    }
}
