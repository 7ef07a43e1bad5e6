//! Result writing and reporting

pub mod csv;
pub mod report;

pub use self::csv::{credentials_csv, summary_csv, write_outputs};
pub use report::{ImportReport, RecordOutcome, RunOutcome, StopReason};
