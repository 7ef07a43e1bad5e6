//! Error types for the import engine
//!
//! This module defines all error types used throughout the crate.
//!
//! Errors fall into two classes (see [`Error::is_fatal`]):
//!
//! - **Run-level**: configuration and input errors abort before any record is
//!   processed; operator cancellation and the error tolerance limit end the
//!   run between records.
//! - **Record-level**: everything else. These are captured per record in a
//!   [`RecordError`] and never leave the record boundary.

use thiserror::Error;

/// Result type alias for import operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the import engine
#[derive(Error, Debug)]
pub enum Error {
    /// A configuration check failed or a required check is missing
    #[error("Initialisation error: {0}")]
    Initialisation(String),

    /// Malformed or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input could not be decoded
    #[error("Unsupported encoding: {0}")]
    UnsupportedEncoding(String),

    /// Input is structurally unusable (missing columns, unreadable file)
    #[error("Unsupported input: {0}")]
    UnsupportedInput(String),

    /// Operator cancelled the run between two records
    #[error("Run aborted: {0}")]
    RunAborted(String),

    /// More record errors than `tolerate_errors` allows
    #[error("More than {tolerated} errors, aborting run ({count} errors)")]
    TooManyErrors {
        /// Number of errors collected so far
        count: usize,
        /// Configured tolerance
        tolerated: usize,
    },

    /// Directory backend errors
    #[error("Directory error: {0}")]
    Directory(String),

    /// A directory call did not finish in time
    #[error("Directory call timed out: {0}")]
    Timeout(String),

    /// State store errors
    #[error("State store error: {0}")]
    StateStore(String),

    /// A hook handler failed
    #[error("Hook error ({hook}): {message}")]
    Hook {
        /// Hook name
        hook: String,
        /// Error message
        message: String,
    },

    /// A scheme could not be rendered
    #[error("Format error: {0}")]
    Format(String),

    /// No free username within the attempt limit
    #[error("No free username for scheme '{scheme}' after {attempts} attempts")]
    UsernameExhausted {
        /// The scheme that was rendered
        scheme: String,
        /// Number of attempts made
        attempts: usize,
    },

    /// Record failed validation
    #[error("Validation error: {0}")]
    Validation(String),

    /// Existing user lookup did not match the requested action
    #[error("Lookup error: {0}")]
    Lookup(String),

    /// Unknown or missing role
    #[error("Unknown role: {0}")]
    UnknownRole(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an initialisation error
    pub fn initialisation(msg: impl Into<String>) -> Self {
        Self::Initialisation(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an unsupported encoding error
    pub fn unsupported_encoding(msg: impl Into<String>) -> Self {
        Self::UnsupportedEncoding(msg.into())
    }

    /// Create an unsupported input error
    pub fn unsupported_input(msg: impl Into<String>) -> Self {
        Self::UnsupportedInput(msg.into())
    }

    /// Create a directory error
    pub fn directory(msg: impl Into<String>) -> Self {
        Self::Directory(msg.into())
    }

    /// Create a state store error
    pub fn state_store(msg: impl Into<String>) -> Self {
        Self::StateStore(msg.into())
    }

    /// Create a hook error
    pub fn hook(hook: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Hook {
            hook: hook.into(),
            message: message.into(),
        }
    }

    /// Create a format error
    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a lookup error
    pub fn lookup(msg: impl Into<String>) -> Self {
        Self::Lookup(msg.into())
    }

    /// Whether this error ends the whole run rather than a single record
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Initialisation(_)
                | Self::Config(_)
                | Self::UnsupportedEncoding(_)
                | Self::UnsupportedInput(_)
                | Self::RunAborted(_)
                | Self::TooManyErrors { .. }
        )
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

/// A failure confined to one input record
///
/// Carries enough identity to be reported in the summary table next to the
/// successfully processed records.
#[derive(Debug)]
pub struct RecordError {
    /// Input line (entry number) of the record, 0 if not tied to a line
    pub line: usize,
    /// Source identifier, if already resolved
    pub source_uid: Option<String>,
    /// Record identifier, if already resolved
    pub record_uid: Option<String>,
    /// Username, if already resolved
    pub username: Option<String>,
    /// The underlying error
    pub error: Error,
}

impl RecordError {
    /// Wrap an error that happened while processing the record on `line`
    pub fn new(line: usize, error: Error) -> Self {
        Self {
            line,
            source_uid: None,
            record_uid: None,
            username: None,
            error,
        }
    }

    /// Attach the record's identity
    pub fn with_identity(
        mut self,
        source_uid: Option<String>,
        record_uid: Option<String>,
        username: Option<String>,
    ) -> Self {
        self.source_uid = source_uid;
        self.record_uid = record_uid;
        self.username = username;
        self
    }
}

impl std::fmt::Display for RecordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "entry {}: {}", self.line, self.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(Error::initialisation("missing check").is_fatal());
        assert!(Error::unsupported_encoding("binary").is_fatal());
        assert!(Error::RunAborted("ctrl-c".into()).is_fatal());
        assert!(!Error::directory("write failed").is_fatal());
        assert!(!Error::hook("log", "boom").is_fatal());
        assert!(
            !Error::UsernameExhausted {
                scheme: "x".into(),
                attempts: 3
            }
            .is_fatal()
        );
    }

    #[test]
    fn test_record_error_display() {
        let err = RecordError::new(4, Error::validation("no lastname"));
        assert_eq!(err.to_string(), "entry 4: Validation error: no lastname");
    }
}
