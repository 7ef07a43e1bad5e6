//! Run result
//!
//! One [`RecordOutcome`] per processed record or deleted user, in processing
//! order, plus the run-wide counters derived from them.

use std::collections::BTreeMap;
use std::fmt;

use tracing::info;

use crate::config::OutputConfig;
use crate::error::{Error, RecordError};
use crate::models::{ActionKind, AttributeDiff, DirectoryUserState, ImportAction, Role};

/// Outcome of one record
#[derive(Debug, Clone, PartialEq)]
pub struct RecordOutcome {
    /// Entry number; 0 for users handled by the deletion phase
    pub line: usize,
    pub action: ActionKind,
    pub role: Option<Role>,
    pub username: Option<String>,
    pub source_uid: Option<String>,
    pub record_uid: Option<String>,
    pub schools: Vec<String>,
    /// Desired attributes after the action
    pub attributes: BTreeMap<String, String>,
    pub disabled: bool,
    pub changes: AttributeDiff,
    /// Generated or given password, only ever set for users created in this
    /// run, also when the record failed afterwards
    pub password: Option<String>,
    pub error: Option<String>,
}

impl RecordOutcome {
    /// Outcome of a successfully applied action
    pub fn applied(line: usize, action: &ImportAction, state: &DirectoryUserState) -> Self {
        let changes = match action {
            ImportAction::Modify(diff) => diff.clone(),
            ImportAction::Move { from, to, diff } => {
                let mut changes = AttributeDiff::default();
                changes.push("school", from.as_str(), to.as_str());
                changes.changes.extend(diff.changes.iter().cloned());
                changes
            }
            _ => AttributeDiff::default(),
        };
        let password = match action {
            ImportAction::Create => state.password.clone(),
            _ => None,
        };
        Self {
            line,
            action: action.kind(),
            role: Some(state.role),
            username: Some(state.username.clone()),
            source_uid: Some(state.source_uid.clone()),
            record_uid: Some(state.record_uid.clone()),
            schools: state.schools.clone(),
            attributes: state.attributes.clone(),
            disabled: state.disabled,
            changes,
            password,
            error: None,
        }
    }

    /// Outcome of a failed record
    pub fn failed(error: &RecordError, role: Option<Role>) -> Self {
        Self {
            line: error.line,
            action: ActionKind::Error,
            role,
            username: error.username.clone(),
            source_uid: error.source_uid.clone(),
            record_uid: error.record_uid.clone(),
            schools: Vec::new(),
            attributes: BTreeMap::new(),
            disabled: false,
            changes: AttributeDiff::default(),
            password: None,
            error: Some(error.error.to_string()),
        }
    }

    /// Turn the outcome of a write into an error, keeping what was written
    ///
    /// Used when a record fails after its user was created: the password
    /// stays so the credentials still list it.
    pub fn into_failed(mut self, error: &RecordError) -> Self {
        self.action = ActionKind::Error;
        self.changes = AttributeDiff::default();
        self.error = Some(error.error.to_string());
        self
    }

    pub fn is_error(&self) -> bool {
        self.action == ActionKind::Error
    }

    pub fn attribute(&self, name: &str) -> &str {
        self.attributes.get(name).map(String::as_str).unwrap_or("")
    }
}

/// Why a run ended before the input was exhausted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Operator cancellation between two records
    Cancelled,
    /// More record errors than `tolerate_errors`
    TooManyErrors { count: usize, tolerated: usize },
}

impl StopReason {
    /// The run-level error this stop corresponds to
    pub fn to_error(&self) -> Error {
        match self {
            StopReason::Cancelled => Error::RunAborted("cancelled by operator".to_string()),
            StopReason::TooManyErrors { count, tolerated } => Error::TooManyErrors {
                count: *count,
                tolerated: *tolerated,
            },
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_error())
    }
}

/// Overall classification of a finished run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Success,
    /// At least one record failed, or too many did
    RecordErrors,
    /// Cancelled by the operator
    Aborted,
}

/// Aggregated result of one run
#[derive(Debug, Clone, Default)]
pub struct ImportReport {
    pub dry_run: bool,
    /// Records read from the input, skipped ones included
    pub records_read: usize,
    /// Records dropped by an `entry_read` hook
    pub skipped: usize,
    /// Set if the run ended early
    pub stopped: Option<StopReason>,
    outcomes: Vec<RecordOutcome>,
}

impl ImportReport {
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            ..Self::default()
        }
    }

    pub fn push(&mut self, outcome: RecordOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn outcomes(&self) -> &[RecordOutcome] {
        &self.outcomes
    }

    pub fn count(&self, action: ActionKind) -> usize {
        self.outcomes.iter().filter(|o| o.action == action).count()
    }

    pub fn error_count(&self) -> usize {
        self.count(ActionKind::Error)
    }

    pub fn has_errors(&self) -> bool {
        self.outcomes.iter().any(RecordOutcome::is_error)
    }

    /// Reduce the run to one outcome; cancellation wins over record errors
    pub fn outcome(&self) -> RunOutcome {
        match &self.stopped {
            Some(StopReason::Cancelled) => RunOutcome::Aborted,
            Some(StopReason::TooManyErrors { .. }) => RunOutcome::RecordErrors,
            None if self.has_errors() => RunOutcome::RecordErrors,
            None => RunOutcome::Success,
        }
    }

    /// Outcomes of users created in this run that carry a password
    ///
    /// Includes records that failed after their user was created.
    pub fn credentials(&self) -> impl Iterator<Item = &RecordOutcome> {
        self.outcomes.iter().filter(|o| o.password.is_some())
    }

    /// Usernames per action and role
    pub fn by_action_and_role(&self) -> BTreeMap<(ActionKind, Option<Role>), Vec<&str>> {
        let mut table: BTreeMap<(ActionKind, Option<Role>), Vec<&str>> = BTreeMap::new();
        for outcome in &self.outcomes {
            table
                .entry((outcome.action, outcome.role))
                .or_default()
                .push(outcome.username.as_deref().unwrap_or("-"));
        }
        table
    }

    /// Statistics block, one string per log entry
    ///
    /// Usernames are listed `stats_columns` per line and `stats_lines` lines
    /// per entry. Unchanged users are only counted.
    pub fn statistics(&self, output: &OutputConfig) -> Vec<String> {
        let columns = output.stats_columns.max(1);
        let lines_per_entry = output.stats_lines.max(1);

        let mut entries = vec![
            "------ User import statistics ------".to_string(),
            format!("Read records: {}", self.records_read),
        ];
        if self.skipped > 0 {
            entries.push(format!("Skipped records: {}", self.skipped));
        }

        for ((action, role), usernames) in self.by_action_and_role() {
            let role = role.map_or("unknown role", |r| r.as_str());
            entries.push(format!("{} {}: {}", action.label(), role, usernames.len()));
            if action == ActionKind::NoOp {
                continue;
            }
            let lines: Vec<String> = usernames
                .chunks(columns)
                .map(|chunk| format!("  {}", chunk.join(", ")))
                .collect();
            for block in lines.chunks(lines_per_entry) {
                entries.push(block.join("\n"));
            }
        }

        for outcome in self.outcomes.iter().filter(|o| o.is_error()) {
            entries.push(format!(
                "Error in entry {}: {}",
                outcome.line,
                outcome.error.as_deref().unwrap_or("unknown error")
            ));
        }
        entries.push(format!("Errors: {}", self.error_count()));
        if let Some(reason) = &self.stopped {
            entries.push(reason.to_string());
        }
        if self.dry_run {
            entries.push("This was a dry-run, the directory was not changed".to_string());
        }
        entries.push("------ End of user import statistics ------".to_string());
        entries
    }

    /// Log the statistics block at info level
    pub fn log_statistics(&self, output: &OutputConfig) {
        for entry in self.statistics(output) {
            info!("{}", entry);
        }
    }
}
