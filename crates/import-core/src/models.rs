//! Data model of the import pipeline
//!
//! ```text
//! RawRecord ──map──▶ CandidateUser ──resolve──▶ DirectoryUserState
//!                                                      │
//!                           ExistingUser (directory) ──┤
//!                                                      ▼
//!                                                ImportAction
//! ```
//!
//! `RawRecord`, `CandidateUser` and `DirectoryUserState` are created and
//! discarded per record. `ExistingUser` is the directory's view of the same
//! identity.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::Error;

/// School role of a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Teacher,
    Staff,
    TeacherAndStaff,
}

impl Role {
    /// All roles, in configuration order
    pub const ALL: [Role; 4] = [
        Role::Student,
        Role::Teacher,
        Role::Staff,
        Role::TeacherAndStaff,
    ];

    /// Name used in configuration keys and output files
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
            Role::Staff => "staff",
            Role::TeacherAndStaff => "teacher_and_staff",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "student" | "pupil" => Ok(Role::Student),
            "teacher" => Ok(Role::Teacher),
            "staff" => Ok(Role::Staff),
            "teacher_and_staff" | "teacher and staff" => Ok(Role::TeacherAndStaff),
            other => Err(Error::UnknownRole(other.to_string())),
        }
    }
}

/// Cross-run identity of a record
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub source_uid: String,
    pub record_uid: String,
}

impl Identity {
    pub fn new(source_uid: impl Into<String>, record_uid: impl Into<String>) -> Self {
        Self {
            source_uid: source_uid.into(),
            record_uid: record_uid.into(),
        }
    }

    /// Flat key used by the persistent stores
    pub fn key(&self) -> String {
        format!("{}/{}", self.source_uid, self.record_uid)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "source_uid={} record_uid={}", self.source_uid, self.record_uid)
    }
}

/// Action forced by the `__action` pseudo-column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForcedAction {
    Add,
    Modify,
    Delete,
}

impl FromStr for ForcedAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "A" => Ok(ForcedAction::Add),
            "M" => Ok(ForcedAction::Modify),
            "D" => Ok(ForcedAction::Delete),
            other => Err(Error::validation(format!("unknown action '{}'", other))),
        }
    }
}

/// One input line as read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    /// Entry number, 1 for the first data line
    pub line: usize,
    /// Column names, shared by all records of one input
    pub columns: Arc<[String]>,
    /// Field values in column order
    pub fields: Vec<String>,
}

impl RawRecord {
    pub fn new(line: usize, columns: Arc<[String]>, fields: Vec<String>) -> Self {
        Self {
            line,
            columns,
            fields,
        }
    }

    fn index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Value of `column`; `None` if the column or the field is missing
    pub fn get(&self, column: &str) -> Option<&str> {
        self.index(column)
            .and_then(|i| self.fields.get(i))
            .map(String::as_str)
    }

    /// Overwrite the value of an existing column
    pub fn set(&mut self, column: &str, value: impl Into<String>) -> bool {
        match self.index(column) {
            Some(i) if i < self.fields.len() => {
                self.fields[i] = value.into();
                true
            }
            _ => false,
        }
    }

    /// Column/value pairs in column order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.columns
            .iter()
            .zip(self.fields.iter())
            .map(|(c, v)| (c.as_str(), v.as_str()))
    }
}

/// A mapped record before identity resolution
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateUser {
    /// Input line the record came from
    pub line: usize,
    pub roles: Vec<Role>,
    pub school: Option<String>,
    pub schools: Vec<String>,
    /// Explicit username from the input, if mapped
    pub username: Option<String>,
    pub record_uid: Option<String>,
    pub source_uid: Option<String>,
    /// Explicit password from the input, if mapped
    pub password: Option<String>,
    pub disabled: Option<bool>,
    pub action: Option<ForcedAction>,
    /// Remaining attributes (firstname, lastname, email, …)
    pub attributes: BTreeMap<String, String>,
}

impl CandidateUser {
    /// The single role string used for configuration lookups
    pub fn role(&self) -> Option<Role> {
        collapse_roles(&self.roles)
    }
}

/// Collapse a role list to the configuration role
///
/// Teacher and staff together become `teacher_and_staff`.
pub fn collapse_roles(roles: &[Role]) -> Option<Role> {
    if roles.contains(&Role::TeacherAndStaff)
        || (roles.contains(&Role::Teacher) && roles.contains(&Role::Staff))
    {
        Some(Role::TeacherAndStaff)
    } else if roles.contains(&Role::Student) {
        Some(Role::Student)
    } else if roles.contains(&Role::Teacher) {
        Some(Role::Teacher)
    } else if roles.contains(&Role::Staff) {
        Some(Role::Staff)
    } else {
        None
    }
}

/// Fully resolved desired state of one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryUserState {
    pub username: String,
    pub record_uid: String,
    pub source_uid: String,
    pub role: Role,
    pub school: String,
    pub schools: Vec<String>,
    pub attributes: BTreeMap<String, String>,
    /// Only set for users that are about to be created
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub password: Option<String>,
    pub disabled: bool,
    #[serde(default)]
    pub expiration: Option<NaiveDate>,
}

impl DirectoryUserState {
    pub fn identity(&self) -> Identity {
        Identity::new(&self.source_uid, &self.record_uid)
    }

    /// Value of an attribute, empty if unset
    pub fn attribute(&self, name: &str) -> &str {
        self.attributes.get(name).map(String::as_str).unwrap_or("")
    }

    /// Project the state an existing user would have after applying `self`
    pub fn to_existing(&self) -> ExistingUser {
        ExistingUser {
            username: self.username.clone(),
            record_uid: self.record_uid.clone(),
            source_uid: self.source_uid.clone(),
            role: self.role,
            school: self.school.clone(),
            schools: self.schools.clone(),
            attributes: self.attributes.clone(),
            disabled: self.disabled,
            expiration: self.expiration,
        }
    }
}

/// Current directory state of one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExistingUser {
    pub username: String,
    pub record_uid: String,
    pub source_uid: String,
    pub role: Role,
    pub school: String,
    pub schools: Vec<String>,
    pub attributes: BTreeMap<String, String>,
    pub disabled: bool,
    #[serde(default)]
    pub expiration: Option<NaiveDate>,
}

impl ExistingUser {
    pub fn identity(&self) -> Identity {
        Identity::new(&self.source_uid, &self.record_uid)
    }

    /// Desired state that keeps everything as it is
    pub fn to_state(&self) -> DirectoryUserState {
        DirectoryUserState {
            username: self.username.clone(),
            record_uid: self.record_uid.clone(),
            source_uid: self.source_uid.clone(),
            role: self.role,
            school: self.school.clone(),
            schools: self.schools.clone(),
            attributes: self.attributes.clone(),
            password: None,
            disabled: self.disabled,
            expiration: self.expiration,
        }
    }
}

/// One changed field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    pub before: String,
    pub after: String,
}

/// Difference between an existing user and its desired state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDiff {
    pub changes: Vec<FieldChange>,
}

impl AttributeDiff {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn push(&mut self, field: impl Into<String>, before: impl Into<String>, after: impl Into<String>) {
        self.changes.push(FieldChange {
            field: field.into(),
            before: before.into(),
            after: after.into(),
        });
    }
}

impl fmt::Display for AttributeDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .changes
            .iter()
            .map(|c| format!("{}: {} -> {}", c.field, c.before, c.after))
            .collect();
        f.write_str(&parts.join("; "))
    }
}

/// The one action decided for a record in a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportAction {
    Create,
    Modify(AttributeDiff),
    Move {
        from: String,
        to: String,
        diff: AttributeDiff,
    },
    Deactivate,
    Remove,
    NoOp,
    Error(String),
}

impl ImportAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            ImportAction::Create => ActionKind::Create,
            ImportAction::Modify(_) => ActionKind::Modify,
            ImportAction::Move { .. } => ActionKind::Move,
            ImportAction::Deactivate => ActionKind::Deactivate,
            ImportAction::Remove => ActionKind::Remove,
            ImportAction::NoOp => ActionKind::NoOp,
            ImportAction::Error(_) => ActionKind::Error,
        }
    }
}

/// Payload-free action discriminant, used for counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ActionKind {
    Create,
    Modify,
    Move,
    Deactivate,
    Remove,
    NoOp,
    Error,
}

impl ActionKind {
    /// Short code used in the summary file
    pub fn code(&self) -> &'static str {
        match self {
            ActionKind::Create => "A",
            ActionKind::Modify => "M",
            ActionKind::Move => "V",
            ActionKind::Deactivate => "X",
            ActionKind::Remove => "D",
            ActionKind::NoOp => "-",
            ActionKind::Error => "E",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ActionKind::Create => "Created",
            ActionKind::Modify => "Modified",
            ActionKind::Move => "Moved",
            ActionKind::Deactivate => "Deactivated",
            ActionKind::Remove => "Removed",
            ActionKind::NoOp => "Unchanged",
            ActionKind::Error => "Failed",
        }
    }
}
