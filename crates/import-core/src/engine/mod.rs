//! Import engine
//!
//! The ImportEngine is responsible for:
//! - Mapping and validating each input record
//! - Resolving usernames, record identifiers and initial passwords
//! - Deciding one action per record and applying it to the directory
//! - Deactivating and removing users that disappeared from the input
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐
//! │  Records    │─── RawRecord ───┐
//! └─────────────┘                 │
//!                                 ▼
//!                        ┌──────────────┐
//!                        │ ImportEngine │──── HookPipeline (pre/post)
//!                        └──────────────┘
//!                                 │
//!         ┌───────────────────────┼───────────────────────┐
//!         │                       │                       │
//!         ▼                       ▼                       ▼
//! ┌─────────────┐        ┌──────────────────┐     ┌─────────────┐
//! │ StateStore  │        │ DirectoryBackend │     │   Events    │
//! │ (reserve)   │        │ (write)          │     │  (notify)   │
//! └─────────────┘        └──────────────────┘     └─────────────┘
//! ```
//!
//! ## Record Flow
//!
//! 1. `entry_read` hooks, then column mapping
//! 2. Role, school and identity resolution, validation
//! 3. Existing user lookup, username and password
//! 4. Action decision
//! 5. `pre_*` hooks, directory write, `post_*` hooks
//!
//! Records are processed strictly one after the other in input order. A
//! failure of any step is a record error: it is reported, and the next record
//! is processed.

pub mod diff;
pub mod validation;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::checks::CheckRegistry;
use crate::config::{Configuration, GracePeriodConfig, ImportConfig};
use crate::directory::with_timeout;
use crate::error::{Error, RecordError, Result};
use crate::hooks::HookPipeline;
use crate::identity::{PasswordGenerator, Scheme, SchemeContext, UsernameGenerator};
use crate::models::{
    ActionKind, DirectoryUserState, ExistingUser, ForcedAction, Identity, ImportAction,
    RawRecord, Role,
};
use crate::reader::ColumnMapping;
use crate::state::DryRunStateStore;
use crate::traits::{DirectoryBackend, EntryVerdict, HookStage, StateStore};
use crate::writer::{ImportReport, RecordOutcome, StopReason};
use diff::{decide_action, decide_missing};
use validation::{RunIndex, check_birthday, check_email, check_mandatory};

/// Scheme keys that are not rendered into plain attributes
const RESERVED_SCHEMES: [&str; 2] = ["username", "record_uid"];

/// Events emitted by the ImportEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportEvent {
    /// Run started
    Started { dry_run: bool },

    /// A record was processed successfully
    RecordProcessed {
        line: usize,
        action: ActionKind,
        username: String,
    },

    /// A record failed
    RecordFailed { line: usize, error: String },

    /// A user missing from the input was deactivated or removed
    MissingUserHandled { username: String, action: ActionKind },

    /// Run ended
    Finished {
        processed: usize,
        errors: usize,
        stopped: Option<String>,
    },
}

/// What is known about a record so far, for error reporting
#[derive(Debug, Default)]
struct Progress {
    role: Option<Role>,
    source_uid: Option<String>,
    record_uid: Option<String>,
    username: Option<String>,
    /// Outcome of a create that reached the directory
    created: Option<RecordOutcome>,
}

impl Progress {
    fn fail(self, line: usize, error: Error) -> FailedRecord {
        let error =
            RecordError::new(line, error).with_identity(self.source_uid, self.record_uid, self.username);
        FailedRecord {
            error,
            role: self.role,
            created: self.created,
        }
    }
}

/// A record error with what is known about the record
#[derive(Debug)]
struct FailedRecord {
    error: RecordError,
    role: Option<Role>,
    /// Set if the user was created before the record failed
    created: Option<RecordOutcome>,
}

impl FailedRecord {
    fn new(error: RecordError, role: Option<Role>) -> Self {
        Self {
            error,
            role,
            created: None,
        }
    }
}

/// Mutable state of one run
#[derive(Debug, Default)]
struct RunState {
    index: RunIndex,
    /// Identities present in the input, failed records included
    seen: BTreeSet<Identity>,
    errors: usize,
}

/// The import engine
///
/// Owns everything a run needs: the frozen configuration, the collaborators
/// and the per-run generators.
///
/// ## Lifecycle
///
/// 1. Create with [`ImportEngine::new()`]; configuration checks run here,
///    before any input is read
/// 2. Start with [`ImportEngine::run()`] or [`ImportEngine::run_with_shutdown()`]
/// 3. Write the returned [`ImportReport`]
///
/// ## Dry-run
///
/// Reservations and missing marks go to an in-memory overlay, directory
/// writes are skipped, and hooks without dry-run support are not loaded.
/// Everything else, reporting included, runs exactly as in a real run.
pub struct ImportEngine {
    config: Configuration,
    directory: Arc<dyn DirectoryBackend>,
    store: Arc<dyn StateStore>,
    hooks: HookPipeline,
    mapping: ColumnMapping,
    usernames: UsernameGenerator,
    passwords: PasswordGenerator,
    username_schemes: BTreeMap<Role, Scheme>,
    record_uid_scheme: Option<Scheme>,
    attribute_schemes: Vec<(String, Scheme)>,
    timeout: Duration,
    today: NaiveDate,
    event_tx: mpsc::Sender<ImportEvent>,
}

impl ImportEngine {
    /// Create a new import engine, running the built-in configuration checks
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    ///
    /// # Errors
    ///
    /// Run-level errors only: a failed configuration check, a hook pipeline
    /// built for the other dry-run mode, an unparsable scheme, an unusable
    /// column mapping or password setting.
    pub fn new(
        config: Configuration,
        directory: Arc<dyn DirectoryBackend>,
        store: Arc<dyn StateStore>,
        hooks: HookPipeline,
    ) -> Result<(Self, mpsc::Receiver<ImportEvent>)> {
        Self::with_checks(&CheckRegistry::with_defaults(), config, directory, store, hooks)
    }

    /// Create a new import engine, running the checks of `checks`
    pub fn with_checks(
        checks: &CheckRegistry,
        config: Configuration,
        directory: Arc<dyn DirectoryBackend>,
        store: Arc<dyn StateStore>,
        hooks: HookPipeline,
    ) -> Result<(Self, mpsc::Receiver<ImportEvent>)> {
        checks.run(&config)?;

        let settings = config.settings();
        hooks.check_mode(settings.dry_run)?;
        let store: Arc<dyn StateStore> = if settings.dry_run {
            info!("Dry-run: no changes will be written to the directory or the state store");
            Arc::new(DryRunStateStore::new(store))
        } else {
            store
        };

        let mut username_schemes = BTreeMap::new();
        for role in Role::ALL {
            if let Some(template) = settings.username_scheme(role) {
                username_schemes.insert(role, parse_scheme("username", template)?);
            }
        }
        let record_uid_scheme = settings
            .scheme
            .attributes
            .get("record_uid")
            .map(|template| parse_scheme("record_uid", template))
            .transpose()?;
        let attribute_schemes = settings
            .scheme
            .attributes
            .iter()
            .filter(|(name, _)| !RESERVED_SCHEMES.contains(&name.as_str()))
            .map(|(name, template)| parse_scheme(name, template).map(|s| (name.clone(), s)))
            .collect::<Result<Vec<_>>>()?;

        let timeout = Duration::from_secs(settings.directory.timeout_secs);
        let usernames = UsernameGenerator::new(
            Arc::clone(&store),
            Arc::clone(&directory),
            &settings.username,
            timeout,
        );
        let passwords = PasswordGenerator::new(settings)?;
        let mapping = ColumnMapping::new(&settings.csv)?;

        let (tx, rx) = mpsc::channel(settings.engine.event_channel_capacity.max(1));

        let engine = Self {
            directory,
            store,
            hooks,
            mapping,
            usernames,
            passwords,
            username_schemes,
            record_uid_scheme,
            attribute_schemes,
            timeout,
            today: chrono::Local::now().date_naive(),
            event_tx: tx,
            config,
        };

        Ok((engine, rx))
    }

    /// Use `today` as the run date for grace periods and date tokens
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    /// Replace the password generator, e.g. with a seeded one
    pub fn with_passwords(mut self, passwords: PasswordGenerator) -> Self {
        self.passwords = passwords;
        self
    }

    pub fn settings(&self) -> &ImportConfig {
        self.config.settings()
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    /// Run the import over `records`
    ///
    /// # Returns
    ///
    /// The report of the run. Record errors and an early stop are part of the
    /// report, not of the `Err` case.
    ///
    /// # Errors
    ///
    /// Only if the state store can't be flushed at the end.
    pub async fn run<I>(&self, records: I) -> Result<ImportReport>
    where
        I: IntoIterator<Item = Result<RawRecord>>,
    {
        self.run_internal(records, None).await
    }

    /// Run with a shutdown signal, checked between records
    ///
    /// Records processed before the signal stay committed.
    pub async fn run_with_shutdown<I>(
        &self,
        records: I,
        shutdown_rx: oneshot::Receiver<()>,
    ) -> Result<ImportReport>
    where
        I: IntoIterator<Item = Result<RawRecord>>,
    {
        self.run_internal(records, Some(shutdown_rx)).await
    }

    async fn run_internal<I>(
        &self,
        records: I,
        mut shutdown_rx: Option<oneshot::Receiver<()>>,
    ) -> Result<ImportReport>
    where
        I: IntoIterator<Item = Result<RawRecord>>,
    {
        let settings = self.settings();
        self.emit_event(ImportEvent::Started {
            dry_run: settings.dry_run,
        });

        let mut report = ImportReport::new(settings.dry_run);
        let mut run = RunState::default();

        for (index, item) in records.into_iter().enumerate() {
            if shutdown_requested(&mut shutdown_rx) {
                info!("Shutdown signal received, stopping before entry {}", index + 1);
                report.stopped = Some(StopReason::Cancelled);
                break;
            }
            report.records_read += 1;

            let result = match item {
                Ok(record) => self.process_record(record, &mut run).await,
                Err(e) => Err(Progress::default().fail(index + 1, e)),
            };

            match result {
                Ok(Some(outcome)) => {
                    self.emit_event(ImportEvent::RecordProcessed {
                        line: outcome.line,
                        action: outcome.action,
                        username: outcome.username.clone().unwrap_or_default(),
                    });
                    report.push(outcome);
                }
                Ok(None) => report.skipped += 1,
                Err(failed) => {
                    if let Some(stop) = self.record_failed(&mut report, &mut run, failed) {
                        report.stopped = Some(stop);
                        break;
                    }
                }
            }
        }

        if report.stopped.is_none() {
            if settings.no_delete {
                info!("Deletion of missing users is disabled");
            } else {
                self.handle_missing(&mut report, &mut run, &mut shutdown_rx).await;
            }
        }

        self.store.flush().await?;

        if let Some(stop) = &report.stopped {
            warn!("{}", stop);
        }
        info!(
            "Import finished: {} records, {} errors",
            report.records_read,
            report.error_count()
        );
        self.emit_event(ImportEvent::Finished {
            processed: report.records_read,
            errors: report.error_count(),
            stopped: report.stopped.as_ref().map(ToString::to_string),
        });

        Ok(report)
    }

    /// Book a record error; returns a stop reason once the tolerance is exceeded
    fn record_failed(
        &self,
        report: &mut ImportReport,
        run: &mut RunState,
        failed: FailedRecord,
    ) -> Option<StopReason> {
        let err = failed.error;
        error!("{}", err);
        self.emit_event(ImportEvent::RecordFailed {
            line: err.line,
            error: err.error.to_string(),
        });
        let outcome = match failed.created {
            Some(created) => {
                warn!(
                    "User {} was created before the error; its password is kept in the credentials",
                    err.username.as_deref().unwrap_or("-")
                );
                created.into_failed(&err)
            }
            None => RecordOutcome::failed(&err, failed.role),
        };
        report.push(outcome);
        run.errors += 1;

        match self.settings().tolerate_errors {
            Some(tolerated) if run.errors > tolerated => Some(StopReason::TooManyErrors {
                count: run.errors,
                tolerated,
            }),
            _ => None,
        }
    }

    /// Process one record; `Ok(None)` if a hook skipped it
    async fn process_record(
        &self,
        mut record: RawRecord,
        run: &mut RunState,
    ) -> std::result::Result<Option<RecordOutcome>, FailedRecord> {
        let line = record.line;
        let mut progress = Progress::default();
        match self.resolve_and_apply(&mut record, run, &mut progress).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => Err(progress.fail(line, e)),
        }
    }

    async fn resolve_and_apply(
        &self,
        record: &mut RawRecord,
        run: &mut RunState,
        progress: &mut Progress,
    ) -> Result<Option<RecordOutcome>> {
        let settings = self.settings();
        let line = record.line;

        if self.hooks.run_entry_read(record).await? == EntryVerdict::Skip {
            return Ok(None);
        }
        let candidate = self.mapping.map(record)?;

        let role = match candidate.role() {
            Some(role) => role,
            None => settings
                .user_role
                .ok_or_else(|| Error::UnknownRole("record has no role".to_string()))?,
        };
        progress.role = Some(role);

        let source_uid = candidate
            .source_uid
            .clone()
            .unwrap_or_else(|| settings.source_uid.clone());
        progress.source_uid = Some(source_uid.clone());

        let school = candidate
            .school
            .clone()
            .or_else(|| settings.school.clone())
            .ok_or_else(|| Error::validation("record has no school"))?;
        let mut schools = candidate.schools.clone();
        if !schools.contains(&school) {
            schools.insert(0, school.clone());
        }

        let mut attributes = candidate.attributes.clone();
        check_mandatory(&attributes, &settings.mandatory_attributes)?;

        let record_uid = match (&candidate.record_uid, &self.record_uid_scheme) {
            (Some(uid), _) => uid.clone(),
            (None, Some(scheme)) => {
                let vars = self.scheme_variables(&attributes, &school);
                scheme.render_value(&self.context(&vars))?
            }
            (None, None) => return Err(Error::validation("record has no record_uid")),
        };
        progress.record_uid = Some(record_uid.clone());
        run.index.claim_record_uid(&source_uid, &record_uid)?;
        let identity = Identity::new(&source_uid, &record_uid);
        run.seen.insert(identity.clone());

        let existing = with_timeout(
            self.timeout,
            "lookup",
            self.directory.lookup(&source_uid, &record_uid),
        )
        .await?;

        match (candidate.action, &existing) {
            (Some(ForcedAction::Add), Some(user)) => {
                return Err(Error::lookup(format!(
                    "user to add already exists as '{}' ({})",
                    user.username, identity
                )));
            }
            (Some(ForcedAction::Modify), None) => {
                return Err(Error::lookup(format!("user to modify not found ({})", identity)));
            }
            (Some(ForcedAction::Delete), None) => {
                return Err(Error::lookup(format!("user to delete not found ({})", identity)));
            }
            _ => {}
        }
        if existing.is_some() {
            self.store.clear_missing(&identity).await?;
        }

        if let (Some(ForcedAction::Delete), Some(user)) = (candidate.action, &existing) {
            progress.username = Some(user.username.clone());
            let mut state = user.to_state();
            self.apply(&ImportAction::Remove, &mut state, &mut false).await?;
            return Ok(Some(RecordOutcome::applied(line, &ImportAction::Remove, &state)));
        }

        let max_length = settings.username_max_length(role);
        let username = match (&existing, &candidate.username) {
            (Some(user), explicit) => {
                if explicit.as_ref().is_some_and(|name| name != &user.username) {
                    debug!(
                        "Keeping username '{}' of existing user, input has '{}'",
                        user.username,
                        explicit.as_deref().unwrap_or("")
                    );
                }
                user.username.clone()
            }
            (None, Some(explicit)) => {
                self.usernames
                    .claim_explicit(explicit, &identity, max_length)
                    .await?
            }
            (None, None) => {
                let scheme = self.username_schemes.get(&role).ok_or_else(|| {
                    Error::format(format!("no username scheme for role {}", role))
                })?;
                let vars = self.scheme_variables(&attributes, &school);
                self.usernames
                    .generate(scheme, &self.context(&vars), &identity, max_length)
                    .await?
            }
        };
        progress.username = Some(username.clone());
        run.index.claim_username(&username)?;

        for (name, scheme) in &self.attribute_schemes {
            if attributes.get(name).is_none_or(|v| v.is_empty()) {
                let mut vars = self.scheme_variables(&attributes, &school);
                vars.insert("username".to_string(), username.clone());
                let value = scheme.render_value(&self.context(&vars))?;
                attributes.insert(name.clone(), value);
            }
        }

        if let Some(email) = attributes.get("email") {
            check_email(email)?;
            run.index.claim_email(email)?;
        }
        if let Some(birthday) = attributes.get("birthday") {
            check_birthday(birthday)?;
        }

        let disabled = match (candidate.disabled, &existing) {
            (Some(disabled), _) => disabled,
            // users deactivated by an earlier run come back enabled
            (None, Some(user)) if user.expiration.is_some() => false,
            (None, Some(user)) => user.disabled,
            (None, None) => !settings.activate_new_user(role),
        };

        if let Some(user) = &existing {
            for name in &settings.machine_managed_attributes {
                match user.attributes.get(name) {
                    Some(value) => attributes.insert(name.clone(), value.clone()),
                    None => attributes.remove(name),
                };
            }
            // attributes the input does not carry keep their directory value
            for (name, value) in &user.attributes {
                attributes
                    .entry(name.clone())
                    .or_insert_with(|| value.clone());
            }
        }

        let password = match existing {
            Some(_) => None,
            None => Some(
                candidate
                    .password
                    .clone()
                    .unwrap_or_else(|| self.passwords.generate()),
            ),
        };

        let mut state = DirectoryUserState {
            username,
            record_uid,
            source_uid,
            role,
            school,
            schools,
            attributes,
            password,
            disabled,
            expiration: None,
        };

        let action = decide_action(&state, existing.as_ref(), &settings.machine_managed_attributes);
        let mut written = false;
        let applied = self.apply(&action, &mut state, &mut written).await;
        if written && action == ImportAction::Create {
            // the user exists now; its password must reach the credentials
            progress.created = Some(RecordOutcome::applied(line, &action, &state));
        }
        applied?;

        Ok(Some(RecordOutcome::applied(line, &action, &state)))
    }

    /// Record attributes plus `school` and `maildomain`, for scheme rendering
    fn scheme_variables(
        &self,
        attributes: &BTreeMap<String, String>,
        school: &str,
    ) -> BTreeMap<String, String> {
        let mut vars = attributes.clone();
        vars.entry("school".to_string())
            .or_insert_with(|| school.to_string());
        if let Some(domain) = &self.settings().maildomain {
            vars.entry("maildomain".to_string())
                .or_insert_with(|| domain.clone());
        }
        vars
    }

    fn context<'a>(&self, vars: &'a BTreeMap<String, String>) -> SchemeContext<'a> {
        SchemeContext {
            attributes: vars,
            today: self.today,
        }
    }

    /// Run the hook pair around the directory write for `action`
    ///
    /// `post_*` handlers only run if the write succeeded; `written` is set as
    /// soon as it did.
    async fn apply(
        &self,
        action: &ImportAction,
        state: &mut DirectoryUserState,
        written: &mut bool,
    ) -> Result<()> {
        let (pre, post) = match action {
            ImportAction::Create => (HookStage::PreCreate, HookStage::PostCreate),
            ImportAction::Modify(_) => (HookStage::PreModify, HookStage::PostModify),
            ImportAction::Move { .. } => (HookStage::PreMove, HookStage::PostMove),
            ImportAction::Deactivate | ImportAction::Remove => {
                (HookStage::PreRemove, HookStage::PostRemove)
            }
            ImportAction::NoOp | ImportAction::Error(_) => {
                debug!("No changes for {}", state.username);
                return Ok(());
            }
        };

        self.hooks.run_stage(pre, state).await?;

        if self.settings().dry_run {
            info!("Dry-run: not writing {:?} of {}", action.kind(), state.username);
        } else {
            self.write(action, state).await?;
        }
        *written = true;

        self.hooks.run_stage(post, state).await?;
        Ok(())
    }

    async fn write(&self, action: &ImportAction, state: &DirectoryUserState) -> Result<()> {
        let directory = &self.directory;
        match action {
            ImportAction::Create => {
                with_timeout(self.timeout, "create", directory.create(state)).await?;
                info!("Created user {} ({})", state.username, state.role);
            }
            ImportAction::Modify(diff) => {
                with_timeout(self.timeout, "modify", directory.modify(state)).await?;
                info!("Modified user {}: {}", state.username, diff);
            }
            ImportAction::Move { from, to, diff } => {
                with_timeout(
                    self.timeout,
                    "move_user",
                    directory.move_user(&state.username, to),
                )
                .await?;
                with_timeout(self.timeout, "modify", directory.modify(state)).await?;
                info!("Moved user {} from {} to {}", state.username, from, to);
                if !diff.is_empty() {
                    info!("Modified user {}: {}", state.username, diff);
                }
            }
            ImportAction::Deactivate => {
                with_timeout(self.timeout, "modify", directory.modify(state)).await?;
                info!("Deactivated user {}", state.username);
            }
            ImportAction::Remove => {
                with_timeout(self.timeout, "delete", directory.delete(&state.username)).await?;
                info!("Removed user {}", state.username);
            }
            ImportAction::NoOp | ImportAction::Error(_) => {}
        }
        Ok(())
    }

    /// Deactivate or remove users of this source that were not in the input
    async fn handle_missing(
        &self,
        report: &mut ImportReport,
        run: &mut RunState,
        shutdown_rx: &mut Option<oneshot::Receiver<()>>,
    ) {
        let settings = self.settings();
        let grace = &settings.deletion_grace_period;
        let partition = settings.school.as_deref();

        let users = match with_timeout(
            self.timeout,
            "enumerate",
            self.directory.enumerate(&settings.source_uid, partition),
        )
        .await
        {
            Ok(users) => users,
            Err(e) => {
                let err = RecordError::new(0, e).with_identity(
                    Some(settings.source_uid.clone()),
                    None,
                    None,
                );
                if let Some(stop) = self.record_failed(report, run, FailedRecord::new(err, None)) {
                    report.stopped = Some(stop);
                }
                return;
            }
        };

        for user in users {
            let identity = user.identity();
            if run.seen.contains(&identity) {
                continue;
            }
            if shutdown_requested(shutdown_rx) {
                info!("Shutdown signal received, stopping deletion phase");
                report.stopped = Some(StopReason::Cancelled);
                return;
            }
            if partition.is_some_and(|school| school != user.school) {
                warn!(
                    "Not touching {} outside of school {}",
                    user.username,
                    partition.unwrap_or_default()
                );
                continue;
            }

            match self.handle_missing_user(&user, grace).await {
                Ok(None) => {}
                Ok(Some(outcome)) => {
                    self.emit_event(ImportEvent::MissingUserHandled {
                        username: user.username.clone(),
                        action: outcome.action,
                    });
                    report.push(outcome);
                }
                Err(e) => {
                    let err = RecordError::new(0, e).with_identity(
                        Some(user.source_uid.clone()),
                        Some(user.record_uid.clone()),
                        Some(user.username.clone()),
                    );
                    let failed = FailedRecord::new(err, Some(user.role));
                    if let Some(stop) = self.record_failed(report, run, failed) {
                        report.stopped = Some(stop);
                        return;
                    }
                }
            }
        }
    }

    async fn handle_missing_user(
        &self,
        user: &ExistingUser,
        grace: &GracePeriodConfig,
    ) -> Result<Option<RecordOutcome>> {
        let identity = user.identity();
        let since = self.store.mark_missing(&identity, self.today).await?;
        let elapsed = (self.today - since).num_days();
        let action = decide_missing(elapsed, grace, user.disabled);
        debug!(
            "{} missing since {} ({} days): {:?}",
            user.username,
            since,
            elapsed,
            action.kind()
        );

        let mut state = user.to_state();
        match action {
            ImportAction::Deactivate => {
                state.disabled = true;
                state.expiration = Some(self.today);
            }
            ImportAction::Remove => {}
            _ => return Ok(None),
        }

        self.apply(&action, &mut state, &mut false).await?;
        if action == ImportAction::Remove {
            self.store.clear_missing(&identity).await?;
        }
        Ok(Some(RecordOutcome::applied(0, &action, &state)))
    }

    /// Emit an event to the event channel
    ///
    /// If the channel is full, the event is dropped and a warning is logged.
    fn emit_event(&self, event: ImportEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Event channel full, dropping event. Consider increasing engine:event_channel_capacity.");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Event channel closed");
            }
        }
    }
}

fn parse_scheme(name: &str, template: &str) -> Result<Scheme> {
    Scheme::parse(template)
        .map_err(|e| Error::config(format!("invalid scheme for '{}': {}", name, e)))
}

/// Whether the operator asked to stop; a dropped sender never stops the run
fn shutdown_requested(shutdown_rx: &mut Option<oneshot::Receiver<()>>) -> bool {
    let Some(rx) = shutdown_rx else {
        return false;
    };
    match rx.try_recv() {
        Ok(()) => true,
        Err(oneshot::error::TryRecvError::Empty) => false,
        Err(oneshot::error::TryRecvError::Closed) => {
            *shutdown_rx = None;
            false
        }
    }
}
