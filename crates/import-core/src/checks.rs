//! Startup configuration checks
//!
//! A [`ConfigurationCheck`] is a named bundle of tests. The configuration
//! requests checks by name (`configuration_checks`); a check may require
//! other checks to be requested as well. All dependencies are resolved before
//! the first test runs, so a missing dependency fails the run without
//! touching the input.
//!
//! Individual tests can be skipped by listing their names in
//! `disabled_checks`.

use tracing::{debug, warn};

use crate::config::Configuration;
use crate::identity::scheme::counter_tokens;
use crate::{Error, Result};

/// Signature of a single check test
pub type CheckFn = Box<dyn Fn(&Configuration) -> Result<()> + Send + Sync>;

/// One named test of a check
pub struct CheckTest {
    name: String,
    run: CheckFn,
}

impl CheckTest {
    pub fn new<F>(name: impl Into<String>, run: F) -> Self
    where
        F: Fn(&Configuration) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            run: Box::new(run),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A named bundle of tests with declared dependencies
pub struct ConfigurationCheck {
    name: String,
    requires: Vec<String>,
    tests: Vec<CheckTest>,
}

impl ConfigurationCheck {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            requires: Vec::new(),
            tests: Vec::new(),
        }
    }

    /// Declare that `check` must be requested together with this one
    pub fn requires(mut self, check: impl Into<String>) -> Self {
        self.requires.push(check.into());
        self
    }

    pub fn with_test(mut self, test: CheckTest) -> Self {
        self.tests.push(test);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Registry of all known checks, in registration order
#[derive(Default)]
pub struct CheckRegistry {
    checks: Vec<ConfigurationCheck>,
}

impl CheckRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `defaults` and `partition` checks
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(defaults_check());
        registry.register(partition_check());
        registry
    }

    /// Register a check; a later check with the same name replaces the earlier one
    pub fn register(&mut self, check: ConfigurationCheck) {
        if let Some(existing) = self.checks.iter_mut().find(|c| c.name == check.name) {
            *existing = check;
        } else {
            self.checks.push(check);
        }
    }

    /// Names of all registered checks
    pub fn list(&self) -> Vec<&str> {
        self.checks.iter().map(|c| c.name.as_str()).collect()
    }

    /// Run the checks requested by `config`
    ///
    /// # Errors
    ///
    /// `Error::Initialisation` for an unknown check name, a missing
    /// dependency, or the first failing test.
    pub fn run(&self, config: &Configuration) -> Result<()> {
        let requested = &config.settings().configuration_checks;
        let disabled = &config.settings().disabled_checks;

        for name in requested {
            let check = self
                .checks
                .iter()
                .find(|c| &c.name == name)
                .ok_or_else(|| {
                    Error::initialisation(format!("unknown configuration check '{}'", name))
                })?;
            for dependency in &check.requires {
                if !requested.contains(dependency) {
                    return Err(Error::initialisation(format!(
                        "configuration check '{}' requires check '{}', which is not requested",
                        check.name, dependency
                    )));
                }
            }
        }

        for check in self.checks.iter().filter(|c| requested.contains(&c.name)) {
            debug!("Running configuration check '{}'", check.name);
            for test in &check.tests {
                if disabled.contains(&test.name) {
                    debug!("Skipping disabled check test '{}'", test.name);
                    continue;
                }
                (test.run)(config).map_err(|e| {
                    Error::initialisation(format!(
                        "configuration check '{}' failed in '{}': {}",
                        check.name, test.name, e
                    ))
                })?;
            }
        }

        Ok(())
    }
}

fn defaults_check() -> ConfigurationCheck {
    ConfigurationCheck::new("defaults")
        .with_test(CheckTest::new("mandatory_attributes", |config| {
            let attributes = &config.settings().mandatory_attributes;
            if attributes.iter().any(|a| a.trim().is_empty()) {
                return Err(Error::config("mandatory_attributes contains an empty name"));
            }
            Ok(())
        }))
        .with_test(CheckTest::new("source_uid", |config| {
            if config.settings().source_uid.trim().is_empty() {
                return Err(Error::config("source_uid is not set"));
            }
            Ok(())
        }))
        .with_test(CheckTest::new("input_type", |config| {
            let input_type = &config.settings().input.input_type;
            if input_type != "csv" {
                return Err(Error::config(format!(
                    "unsupported input type '{}'",
                    input_type
                )));
            }
            Ok(())
        }))
        .with_test(CheckTest::new("deprecated_user_deletion", |config| {
            if config.contains("user_deletion") {
                return Err(Error::config(
                    "'user_deletion' is deprecated, use 'deletion_grace_period'",
                ));
            }
            Ok(())
        }))
        .with_test(CheckTest::new("username_max_length", |config| {
            for (role, length) in &config.settings().username.max_length {
                if !(4..=20).contains(length) {
                    return Err(Error::config(format!(
                        "username:max_length:{} must be between 4 and 20, got {}",
                        role, length
                    )));
                }
            }
            Ok(())
        }))
        .with_test(CheckTest::new("user_role_role_mapping_combination", |config| {
            let settings = config.settings();
            let role_mapped = settings.csv.mapping.values().any(|v| v == "__role");
            match (settings.user_role.is_some(), role_mapped) {
                (true, true) => Err(Error::config(
                    "'user_role' and a '__role' column mapping are mutually exclusive",
                )),
                (false, false) => Err(Error::config(
                    "neither 'user_role' nor a '__role' column mapping is configured",
                )),
                _ => Ok(()),
            }
        }))
        .with_test(CheckTest::new("password_length", |config| {
            if config.settings().password_length() == 0 {
                return Err(Error::config("password length must not be 0"));
            }
            Ok(())
        }))
        .with_test(CheckTest::new("username_scheme", |config| {
            let schemes = &config.settings().scheme.username;
            if schemes.is_empty() {
                return Err(Error::config("no username scheme configured"));
            }
            for (role, scheme) in schemes {
                if counter_tokens(scheme) > 1 {
                    return Err(Error::config(format!(
                        "username scheme for '{}' has more than one counter",
                        role
                    )));
                }
            }
            Ok(())
        }))
        .with_test(CheckTest::new("deletion_grace_period", |config| {
            let grace = &config.settings().deletion_grace_period;
            if grace.deletion < grace.deactivation {
                return Err(Error::config(format!(
                    "deletion grace period ({}) is shorter than deactivation grace period ({})",
                    grace.deletion, grace.deactivation
                )));
            }
            if grace.deactivation == 0 {
                warn!("Deactivation grace period is 0: missing users are deactivated immediately");
            }
            if grace.deletion == 0 {
                warn!("Deletion grace period is 0: missing users are removed immediately");
            }
            Ok(())
        }))
}

fn partition_check() -> ConfigurationCheck {
    ConfigurationCheck::new("partition")
        .requires("defaults")
        .with_test(CheckTest::new("deletion_partition", |config| {
            let settings = config.settings();
            let grace = &settings.deletion_grace_period;
            let immediate = grace.deactivation == 0 || grace.deletion == 0;
            if immediate && !settings.no_delete && settings.school.is_none() {
                return Err(Error::config(
                    "zero grace periods require 'school' to restrict removals",
                ));
            }
            Ok(())
        }))
}
