//! Hook registry
//!
//! Hooks are registered by name with a factory and instantiated per run from
//! the run configuration, avoiding a hardcoded list of hooks in the engine.
//!
//! ## Registration
//!
//! Hook crates register themselves during initialization:
//!
//! ```rust,ignore
//! pub fn register(registry: &mut HookRegistry) -> Result<()> {
//!     registry.register("log_user_object", Box::new(LogUserObjectFactory))
//! }
//! ```
//!
//! Registration order matters: hooks with equal priority run in the order
//! they were registered.

use crate::config::Configuration;
use crate::error::{Error, Result};
use crate::hooks::HookPipeline;
use crate::traits::HookFactory;

/// Named hook factories in registration order
#[derive(Default)]
pub struct HookRegistry {
    factories: Vec<(String, Box<dyn HookFactory>)>,
}

impl HookRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook factory
    ///
    /// # Errors
    ///
    /// `Error::Config` if a hook with the same name is already registered.
    pub fn register(&mut self, name: impl Into<String>, factory: Box<dyn HookFactory>) -> Result<()> {
        let name = name.into();
        if self.has_hook(&name) {
            return Err(Error::config(format!("hook '{}' registered twice", name)));
        }
        self.factories.push((name, factory));
        Ok(())
    }

    /// Registered hook names, in registration order
    pub fn list(&self) -> Vec<String> {
        self.factories.iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn has_hook(&self, name: &str) -> bool {
        self.factories.iter().any(|(n, _)| n == name)
    }

    /// Instantiate every registered hook for one run
    pub fn build_pipeline(&self, config: &Configuration) -> Result<HookPipeline> {
        let mut hooks = Vec::with_capacity(self.factories.len());
        for (name, factory) in &self.factories {
            let hook = factory.create(config).map_err(|e| {
                Error::initialisation(format!("cannot load hook '{}': {}", name, e))
            })?;
            hooks.push(hook);
        }
        Ok(HookPipeline::new(hooks, config.settings().dry_run))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{HookPriorities, HookStage, ImportHook};

    struct Named(&'static str);

    #[async_trait::async_trait]
    impl ImportHook for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn priorities(&self) -> HookPriorities {
            HookPriorities::new().with(HookStage::PreCreate, 1)
        }
    }

    struct NamedFactory(&'static str);

    impl HookFactory for NamedFactory {
        fn create(&self, _config: &Configuration) -> Result<Box<dyn ImportHook>> {
            Ok(Box::new(Named(self.0)))
        }
    }

    struct BrokenFactory;

    impl HookFactory for BrokenFactory {
        fn create(&self, _config: &Configuration) -> Result<Box<dyn ImportHook>> {
            Err(Error::config("missing setting"))
        }
    }

    #[test]
    fn test_registry_registration() {
        let mut registry = HookRegistry::new();
        assert!(!registry.has_hook("b"));

        registry.register("b", Box::new(NamedFactory("b"))).unwrap();
        registry.register("a", Box::new(NamedFactory("a"))).unwrap();
        assert!(registry.register("a", Box::new(NamedFactory("a"))).is_err());

        assert_eq!(registry.list(), vec!["b".to_string(), "a".to_string()]);
        let config = Configuration::load(Vec::new()).unwrap();
        let pipeline = registry.build_pipeline(&config).unwrap();
        assert_eq!(pipeline.hook_names(), vec!["b", "a"]);
    }

    #[test]
    fn test_factory_failure_is_initialisation_error() {
        let mut registry = HookRegistry::new();
        registry.register("broken", Box::new(BrokenFactory)).unwrap();
        let config = Configuration::load(Vec::new()).unwrap();
        let err = registry.build_pipeline(&config).unwrap_err();
        assert!(matches!(err, Error::Initialisation(_)));
    }
}
