//! Column mapping
//!
//! Translates a [`RawRecord`] into a [`CandidateUser`]. The configured
//! mapping names, per input column, the target attribute or one of the
//! pseudo-columns:
//!
//! | target       | effect                                    |
//! |--------------|-------------------------------------------|
//! | `__role`     | comma-separated roles                     |
//! | `__ignore`   | column is dropped                         |
//! | `__action`   | forces `A`, `M` or `D` for the record      |
//! | `__disabled` | truthy value disables the user            |
//! | `__active`   | truthy value enables the user (inverted)  |
//!
//! How pseudo-columns and roles are interpreted is up to the
//! [`ColumnInterpreter`], which is where reader variants plug in.

use std::collections::BTreeMap;

use crate::config::{CsvConfig, ReaderVariant};
use crate::models::{CandidateUser, ForcedAction, RawRecord, Role};
use crate::{Error, Result};

pub const ROLE_COLUMN: &str = "__role";
pub const IGNORE_COLUMN: &str = "__ignore";
pub const ACTION_COLUMN: &str = "__action";
pub const DISABLED_COLUMN: &str = "__disabled";
pub const ACTIVE_COLUMN: &str = "__active";

/// Whether `value` reads as "yes"
pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "x" | "ja" | "j" | "on"
    )
}

/// Interpretation of roles and pseudo-columns
pub trait ColumnInterpreter: Send + Sync {
    /// Pseudo-columns this interpreter understands, besides the common ones
    fn pseudo_columns(&self) -> &[&'static str];

    /// Parse the value of the `__role` column
    fn roles(&self, value: &str) -> Result<Vec<Role>> {
        value
            .split(',')
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::parse::<Role>)
            .collect()
    }

    /// Apply a pseudo-column from [`Self::pseudo_columns`]
    fn apply(&self, target: &str, value: &str, user: &mut CandidateUser) -> Result<()>;
}

/// `__disabled`: a truthy value disables the user
#[derive(Debug, Default)]
pub struct DefaultInterpreter;

impl ColumnInterpreter for DefaultInterpreter {
    fn pseudo_columns(&self) -> &[&'static str] {
        &[DISABLED_COLUMN]
    }

    fn apply(&self, target: &str, value: &str, user: &mut CandidateUser) -> Result<()> {
        if target == DISABLED_COLUMN && !value.trim().is_empty() {
            user.disabled = Some(is_truthy(value));
        }
        Ok(())
    }
}

/// `__active`: a truthy value enables the user, anything else disables it
#[derive(Debug, Default)]
pub struct InvertedActiveInterpreter;

impl ColumnInterpreter for InvertedActiveInterpreter {
    fn pseudo_columns(&self) -> &[&'static str] {
        &[ACTIVE_COLUMN]
    }

    fn apply(&self, target: &str, value: &str, user: &mut CandidateUser) -> Result<()> {
        if target == ACTIVE_COLUMN {
            user.disabled = Some(!is_truthy(value));
        }
        Ok(())
    }
}

/// Interpreter for a configured variant
pub fn interpreter_for(variant: ReaderVariant) -> Box<dyn ColumnInterpreter> {
    match variant {
        ReaderVariant::Default => Box::new(DefaultInterpreter),
        ReaderVariant::InvertedActive => Box::new(InvertedActiveInterpreter),
    }
}

/// Column mapping bound to an interpreter
pub struct ColumnMapping {
    mapping: BTreeMap<String, String>,
    interpreter: Box<dyn ColumnInterpreter>,
}

impl ColumnMapping {
    /// Mapping from the `csv` configuration section
    ///
    /// # Errors
    ///
    /// `Error::Config` if a column maps to a pseudo-column the variant does
    /// not know.
    pub fn new(csv: &CsvConfig) -> Result<Self> {
        Self::with_interpreter(csv.mapping.clone(), interpreter_for(csv.variant))
    }

    pub fn with_interpreter(
        mapping: BTreeMap<String, String>,
        interpreter: Box<dyn ColumnInterpreter>,
    ) -> Result<Self> {
        for (column, target) in &mapping {
            let common = [ROLE_COLUMN, IGNORE_COLUMN, ACTION_COLUMN];
            if target.starts_with("__")
                && !common.contains(&target.as_str())
                && !interpreter.pseudo_columns().contains(&target.as_str())
            {
                return Err(Error::config(format!(
                    "column '{}' maps to unknown pseudo-column '{}'",
                    column, target
                )));
            }
        }
        Ok(Self {
            mapping,
            interpreter,
        })
    }

    /// Mapped input column names
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.mapping.keys().map(String::as_str)
    }

    /// Map one record
    ///
    /// Unmapped columns are ignored. An empty cell sets its attribute to
    /// `""`; a mapped column absent from the input leaves it unset.
    pub fn map(&self, record: &RawRecord) -> Result<CandidateUser> {
        let mut user = CandidateUser {
            line: record.line,
            ..CandidateUser::default()
        };

        for (column, target) in &self.mapping {
            let present = record.get(column);
            let value = present.unwrap_or("");
            match target.as_str() {
                IGNORE_COLUMN => {}
                ROLE_COLUMN => user.roles = self.interpreter.roles(value)?,
                ACTION_COLUMN => {
                    if !value.trim().is_empty() {
                        user.action = Some(value.parse::<ForcedAction>()?);
                    }
                }
                pseudo if pseudo.starts_with("__") => {
                    self.interpreter.apply(pseudo, value, &mut user)?
                }
                "school" | "username" | "record_uid" | "source_uid" | "password"
                    if value.is_empty() => {}
                "school" => user.school = Some(value.to_string()),
                "schools" => {
                    user.schools = value
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect();
                }
                "username" => user.username = Some(value.to_string()),
                "record_uid" => user.record_uid = Some(value.to_string()),
                "source_uid" => user.source_uid = Some(value.to_string()),
                "password" => user.password = Some(value.to_string()),
                attribute if present.is_some() => {
                    user.attributes
                        .insert(attribute.to_string(), value.to_string());
                }
                _ => {}
            }
        }

        if user.school.is_none() {
            user.school = user.schools.first().cloned();
        }
        if let Some(school) = &user.school {
            if !user.schools.contains(school) {
                user.schools.insert(0, school.clone());
            }
        }

        Ok(user)
    }
}
