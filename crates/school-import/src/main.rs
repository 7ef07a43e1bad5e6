// # school-import - School User Import
//
// This binary is a THIN integration layer:
// - DO NOT add import logic here
// - All decisions MUST be in school-import-core
// - Process settings come from environment variables ONLY
//
// The binary is responsible for:
// 1. Reading process settings from environment variables
// 2. Initializing logging and the runtime
// 3. Registering hooks and opening the stores
// 4. Running the import and writing its output files
// 5. Mapping the run outcome to the exit status
//
// ## Configuration
//
// - `SCHOOL_IMPORT_CONFIG`: Comma-separated list of JSON configuration files,
//   merged in order on top of the built-in defaults (required)
// - `SCHOOL_IMPORT_INPUT`: Input file; overrides `input:filename`
// - `SCHOOL_IMPORT_DRY_RUN`: `1`/`true` to decide without writing anything
// - `SCHOOL_IMPORT_STATE_PATH`: Reservation state file
//   (default: /var/lib/school-import/state.json)
// - `SCHOOL_IMPORT_DIRECTORY_PATH`: Directory snapshot file
//   (default: /var/lib/school-import/directory.json)
// - `SCHOOL_IMPORT_LOG_LEVEL`: trace, debug, info, warn or error (default: info)
//
// ## Example
//
// ```bash
// export SCHOOL_IMPORT_CONFIG=/etc/school-import/global.json,/etc/school-import/gym1.json
// export SCHOOL_IMPORT_INPUT=/srv/import/gym1.csv
// export SCHOOL_IMPORT_DRY_RUN=1
//
// school-import
// ```

use anyhow::{Context, Result};
use school_import_core::{
    CheckRegistry, Configuration, CsvReader, FileDirectory, FileStateStore, HookRegistry,
    ImportEngine, RunOutcome,
};
use school_import_core::traits::{DirectoryBackend, StateStore};
use school_import_core::writer::write_outputs;
use serde_json::{Value, json};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

const DEFAULT_STATE_PATH: &str = "/var/lib/school-import/state.json";
const DEFAULT_DIRECTORY_PATH: &str = "/var/lib/school-import/directory.json";

/// Exit codes for the possible run outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ImportExitCode {
    /// Every record was processed without error
    Success = 0,
    /// Configuration, input or startup failure, or the state store could not
    /// be flushed at the end of the run
    Fatal = 1,
    /// The run finished, but at least one record failed
    RecordErrors = 2,
    /// The operator cancelled the run
    Aborted = 3,
    /// Every record was processed, but an output file could not be written
    OutputErrors = 4,
}

impl From<ImportExitCode> for ExitCode {
    fn from(code: ImportExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

impl From<RunOutcome> for ImportExitCode {
    fn from(outcome: RunOutcome) -> Self {
        match outcome {
            RunOutcome::Success => ImportExitCode::Success,
            RunOutcome::RecordErrors => ImportExitCode::RecordErrors,
            RunOutcome::Aborted => ImportExitCode::Aborted,
        }
    }
}

/// Process settings
#[derive(Debug)]
struct Settings {
    config_files: Vec<PathBuf>,
    input: Option<PathBuf>,
    dry_run: bool,
    state_path: PathBuf,
    directory_path: PathBuf,
    log_level: String,
}

impl Settings {
    /// Load settings from environment variables
    fn from_env() -> Result<Self> {
        Ok(Self {
            config_files: env::var("SCHOOL_IMPORT_CONFIG")
                .unwrap_or_default()
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .collect(),
            input: env::var("SCHOOL_IMPORT_INPUT").ok().map(PathBuf::from),
            dry_run: parse_flag("SCHOOL_IMPORT_DRY_RUN")?,
            state_path: env::var("SCHOOL_IMPORT_STATE_PATH")
                .unwrap_or_else(|_| DEFAULT_STATE_PATH.to_string())
                .into(),
            directory_path: env::var("SCHOOL_IMPORT_DIRECTORY_PATH")
                .unwrap_or_else(|_| DEFAULT_DIRECTORY_PATH.to_string())
                .into(),
            log_level: env::var("SCHOOL_IMPORT_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Validate the settings
    fn validate(&self) -> Result<()> {
        if self.config_files.is_empty() {
            anyhow::bail!(
                "SCHOOL_IMPORT_CONFIG is required. \
                Set it via: export SCHOOL_IMPORT_CONFIG=/etc/school-import/global.json"
            );
        }
        for path in &self.config_files {
            if !path.is_file() {
                anyhow::bail!("configuration file {} does not exist", path.display());
            }
        }
        if let Some(input) = &self.input {
            if !input.is_file() {
                anyhow::bail!("SCHOOL_IMPORT_INPUT {} does not exist", input.display());
            }
        }
        if self.state_path == self.directory_path {
            anyhow::bail!(
                "SCHOOL_IMPORT_STATE_PATH and SCHOOL_IMPORT_DIRECTORY_PATH must differ"
            );
        }
        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => anyhow::bail!(
                "SCHOOL_IMPORT_LOG_LEVEL '{}' is not supported. \
                Supported levels: trace, debug, info, warn, error",
                other
            ),
        }
        Ok(())
    }

    fn level(&self) -> Level {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }

    /// Layer holding the settings that override the configuration files
    fn override_layer(&self) -> Value {
        let mut layer = json!({});
        if self.dry_run {
            layer["dry_run"] = json!(true);
        }
        if let Some(input) = &self.input {
            layer["input"] = json!({ "filename": input.display().to_string() });
        }
        layer
    }
}

fn parse_flag(name: &str) -> Result<bool> {
    match env::var(name) {
        Err(_) => Ok(false),
        Ok(value) => match value.trim().to_lowercase().as_str() {
            "" | "0" | "false" | "no" => Ok(false),
            "1" | "true" | "yes" => Ok(true),
            other => anyhow::bail!("{} has invalid value '{}'", name, other),
        },
    }
}

fn main() -> ExitCode {
    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ImportExitCode::Fatal.into();
        }
    };

    if let Err(e) = settings.validate() {
        eprintln!("Configuration validation error: {}", e);
        return ImportExitCode::Fatal.into();
    }

    let subscriber = FmtSubscriber::builder()
        .with_max_level(settings.level())
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return ImportExitCode::Fatal.into();
    }

    info!("Starting school-import");

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return ImportExitCode::Fatal.into();
        }
    };

    let code = rt.block_on(async {
        match run_import(settings).await {
            Ok(code) => code,
            Err(e) => {
                error!("Import failed: {:#}", e);
                ImportExitCode::Fatal
            }
        }
    });

    info!("Exiting with status {}", code as u8);
    code.into()
}

/// Exit status of a finished run whose output files may have failed
fn finished(outcome: RunOutcome, outputs_written: bool) -> ImportExitCode {
    match (outcome, outputs_written) {
        (RunOutcome::Success, false) => ImportExitCode::OutputErrors,
        (outcome, _) => ImportExitCode::from(outcome),
    }
}

/// Wire collaborators, run the import and write its outputs
async fn run_import(settings: Settings) -> Result<ImportExitCode> {
    let config =
        Configuration::from_files(&settings.config_files, Some(settings.override_layer()))?;

    // nothing on disk is touched before the configuration passed its checks
    CheckRegistry::with_defaults().run(&config)?;

    let input = config
        .settings()
        .input
        .filename
        .clone()
        .context("no input file: set SCHOOL_IMPORT_INPUT or input:filename")?;

    let mut registry = HookRegistry::new();
    #[cfg(feature = "builtin-hooks")]
    {
        info!("Registering built-in hooks");
        school_import_hooks::register(&mut registry)?;
    }
    let hooks = registry.build_pipeline(&config)?;
    info!("Loaded hooks: {}", hooks.hook_names().join(", "));

    let store: Arc<dyn StateStore> = Arc::new(FileStateStore::new(&settings.state_path).await?);
    let directory: Arc<dyn DirectoryBackend> =
        Arc::new(FileDirectory::open(&settings.directory_path).await?);
    info!("Directory backend: {}", directory.backend_name());

    let (engine, mut events) = ImportEngine::new(config.clone(), directory, store, hooks)?;
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            tracing::debug!("Import event: {:?}", event);
        }
    });

    let reader = CsvReader::open(&input, config.settings()).await?;
    info!(
        "Reading {} ({:?}, delimiter {:?})",
        input,
        reader.encoding(),
        reader.delimiter() as char
    );

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Interrupt received, stopping after the current record");
                let _ = shutdown_tx.send(());
            }
            Err(e) => warn!("Cannot listen for interrupts: {}", e),
        }
    });

    let report = engine.run_with_shutdown(reader, shutdown_rx).await?;

    let output = &config.settings().output;
    report.log_statistics(output);
    let outputs_written = match write_outputs(&report, output).await {
        Ok(()) => true,
        Err(e) => {
            error!("Failed to write output files: {}", e);
            false
        }
    };

    Ok(finished(report.outcome(), outputs_written))
}
