//! Input reading
//!
//! - [`encoding`]: detection and decoding of the raw bytes
//! - [`csv`]: header handling, delimiter sniffing, lazy record sequence
//! - [`mapping`]: record to [`CandidateUser`](crate::models::CandidateUser)

pub mod csv;
pub mod encoding;
pub mod mapping;

pub use self::csv::{CsvReader, Records};
pub use encoding::{Encoding, decode, detect_encoding};
pub use mapping::{ColumnInterpreter, ColumnMapping, interpreter_for, is_truthy};
