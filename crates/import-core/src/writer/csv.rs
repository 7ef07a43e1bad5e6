//! Summary and credentials files
//!
//! Both tables are written as comma-separated UTF-8 with a header row,
//! which legacy mode leaves out. A run without records still produces valid
//! files.

use std::path::Path;

use tracing::info;

use super::report::{ImportReport, RecordOutcome};
use crate::config::OutputConfig;
use crate::error::Result;

pub const SUMMARY_COLUMNS: [&str; 16] = [
    "line",
    "success",
    "error",
    "action",
    "role",
    "username",
    "schools",
    "firstname",
    "lastname",
    "birthday",
    "email",
    "disabled",
    "source_uid",
    "record_uid",
    "changes",
    "error_msg",
];

pub const CREDENTIALS_COLUMNS: [&str; 7] = [
    "username",
    "password",
    "role",
    "record_uid",
    "firstname",
    "lastname",
    "school",
];

fn flag(value: bool) -> &'static str {
    if value { "1" } else { "0" }
}

fn summary_row(outcome: &RecordOutcome) -> Vec<String> {
    vec![
        outcome.line.to_string(),
        flag(!outcome.is_error()).to_string(),
        flag(outcome.is_error()).to_string(),
        outcome.action.code().to_string(),
        outcome.role.map(|r| r.to_string()).unwrap_or_default(),
        outcome.username.clone().unwrap_or_default(),
        outcome.schools.join(","),
        outcome.attribute("firstname").to_string(),
        outcome.attribute("lastname").to_string(),
        outcome.attribute("birthday").to_string(),
        outcome.attribute("email").to_string(),
        flag(outcome.disabled).to_string(),
        outcome.source_uid.clone().unwrap_or_default(),
        outcome.record_uid.clone().unwrap_or_default(),
        outcome.changes.to_string(),
        outcome.error.clone().unwrap_or_default(),
    ]
}

fn credentials_row(outcome: &RecordOutcome) -> Vec<String> {
    vec![
        outcome.username.clone().unwrap_or_default(),
        outcome.password.clone().unwrap_or_default(),
        outcome.role.map(|r| r.to_string()).unwrap_or_default(),
        outcome.record_uid.clone().unwrap_or_default(),
        outcome.attribute("firstname").to_string(),
        outcome.attribute("lastname").to_string(),
        outcome.schools.first().cloned().unwrap_or_default(),
    ]
}

fn to_csv(
    header: &[&str],
    rows: impl Iterator<Item = Vec<String>>,
    legacy: bool,
) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    if !legacy {
        writer.write_record(header)?;
    }
    for row in rows {
        writer.write_record(&row)?;
    }
    writer
        .into_inner()
        .map_err(|e| crate::Error::Other(format!("cannot finish CSV output: {}", e)))
}

/// Summary table of all outcomes
pub fn summary_csv(report: &ImportReport, legacy: bool) -> Result<Vec<u8>> {
    to_csv(
        &SUMMARY_COLUMNS,
        report.outcomes().iter().map(summary_row),
        legacy,
    )
}

/// Credentials of the users created in this run
pub fn credentials_csv(report: &ImportReport, legacy: bool) -> Result<Vec<u8>> {
    to_csv(
        &CREDENTIALS_COLUMNS,
        report.credentials().map(credentials_row),
        legacy,
    )
}

/// Write the configured output files
///
/// The credentials file is not written in dry-run: no user was created.
pub async fn write_outputs(report: &ImportReport, output: &OutputConfig) -> Result<()> {
    if let Some(path) = &output.summary_file {
        write_file(path, &summary_csv(report, output.legacy)?).await?;
        info!("Wrote summary of {} records to {}", report.outcomes().len(), path);
    }
    if let Some(path) = &output.password_file {
        if report.dry_run {
            info!("Dry-run, not writing credentials to {}", path);
        } else {
            write_file(path, &credentials_csv(report, output.legacy)?).await?;
            info!("Wrote {} credentials to {}", report.credentials().count(), path);
        }
    }
    Ok(())
}

async fn write_file(path: &str, content: &[u8]) -> Result<()> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    tokio::fs::write(path, content).await?;
    Ok(())
}
