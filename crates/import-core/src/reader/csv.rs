//! Delimited text input
//!
//! [`CsvReader::from_bytes`] does all the checking up front: encoding,
//! header, mapped columns. Only then does [`CsvReader::read`] hand out the
//! records, lazily and exactly once.

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use super::encoding::{Encoding, decode, detect_encoding};
use crate::config::ImportConfig;
use crate::models::RawRecord;
use crate::{Error, Result};

/// Delimiters tried when none is configured
const DELIMITER_CANDIDATES: [u8; 4] = [b',', b';', b'\t', b'|'];

/// A checked, not yet consumed CSV input
pub struct CsvReader {
    encoding: Encoding,
    delimiter: u8,
    columns: Arc<[String]>,
    /// First data record, read to learn the column count of header-less input
    pending: Option<csv::StringRecord>,
    reader: csv::Reader<Cursor<Vec<u8>>>,
}

impl std::fmt::Debug for CsvReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsvReader")
            .field("encoding", &self.encoding)
            .field("delimiter", &(self.delimiter as char))
            .field("columns", &self.columns)
            .finish()
    }
}

impl CsvReader {
    /// Read and check the input file
    ///
    /// # Errors
    ///
    /// `Error::UnsupportedInput` if the file can't be read, plus everything
    /// [`Self::from_bytes`] returns.
    pub async fn open<P: AsRef<Path>>(path: P, settings: &ImportConfig) -> Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            Error::unsupported_input(format!("cannot read {}: {}", path.display(), e))
        })?;
        tracing::debug!("Read {} bytes from {}", bytes.len(), path.display());
        Self::from_bytes(&bytes, settings)
    }

    /// Check in-memory input
    ///
    /// # Errors
    ///
    /// - `Error::UnsupportedEncoding` if the input can't be decoded
    /// - `Error::UnsupportedInput` if the header is missing or a mapped column
    ///   is absent and not allowed to be
    pub fn from_bytes(bytes: &[u8], settings: &ImportConfig) -> Result<Self> {
        let encoding = detect_encoding(bytes, settings.input.encoding.as_deref())?;
        let text = decode(bytes, encoding)?;
        let header_lines = settings.input.header_lines;

        let body = skip_lines(&text, header_lines.saturating_sub(1));
        let delimiter = match settings.input.delimiter.as_deref() {
            Some(forced) => parse_delimiter(forced)?,
            None => sniff_delimiter(body.lines().next().unwrap_or("")),
        };

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(header_lines > 0)
            .flexible(true)
            .from_reader(Cursor::new(body.as_bytes().to_vec()));

        let (columns, pending): (Vec<String>, _) = if header_lines > 0 {
            let headers = reader.headers().map_err(|e| {
                Error::unsupported_input(format!("cannot read header: {}", e))
            })?;
            if headers.is_empty() {
                return Err(Error::unsupported_input("input has no header line"));
            }
            (headers.iter().map(|h| h.trim().to_string()).collect(), None)
        } else {
            let mut first = csv::StringRecord::new();
            let has_row = reader.read_record(&mut first).map_err(|e| {
                Error::unsupported_input(format!("cannot read first line: {}", e))
            })?;
            let count = if has_row { first.len() } else { 0 };
            (
                (0..count).map(|i| i.to_string()).collect(),
                has_row.then_some(first),
            )
        };

        let missing: Vec<&str> = settings
            .csv
            .mapping
            .keys()
            .filter(|column| !columns.contains(*column))
            .filter(|column| !settings.csv.allowed_missing_columns.contains(*column))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(Error::unsupported_input(format!(
                "columns missing from input: {}",
                missing.join(", ")
            )));
        }

        tracing::info!(
            "Input: {} columns, encoding {}, delimiter {:?}",
            columns.len(),
            encoding.name(),
            delimiter as char
        );

        Ok(Self {
            encoding,
            delimiter,
            columns: columns.into(),
            pending,
            reader,
        })
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn delimiter(&self) -> u8 {
        self.delimiter
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Consume the reader and yield its records in input order
    pub fn read(self) -> Records {
        Records {
            columns: self.columns,
            pending: self.pending,
            records: self.reader.into_records(),
            entry: 0,
        }
    }
}

impl IntoIterator for CsvReader {
    type Item = Result<RawRecord>;
    type IntoIter = Records;

    fn into_iter(self) -> Self::IntoIter {
        self.read()
    }
}

/// Lazy record sequence of a [`CsvReader`]
pub struct Records {
    columns: Arc<[String]>,
    pending: Option<csv::StringRecord>,
    records: csv::StringRecordsIntoIter<Cursor<Vec<u8>>>,
    entry: usize,
}

impl Iterator for Records {
    type Item = Result<RawRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let next = match self.pending.take() {
            Some(record) => Ok(record),
            None => self.records.next()?,
        };
        self.entry += 1;
        Some(
            next.map(|record| {
                RawRecord::new(
                    self.entry,
                    Arc::clone(&self.columns),
                    record.iter().map(str::to_string).collect(),
                )
            })
            .map_err(|e| Error::validation(format!("malformed line: {}", e))),
        )
    }
}

fn skip_lines(text: &str, count: usize) -> &str {
    let mut rest = text;
    for _ in 0..count {
        match rest.find('\n') {
            Some(pos) => rest = &rest[pos + 1..],
            None => return "",
        }
    }
    rest
}

fn parse_delimiter(value: &str) -> Result<u8> {
    match value {
        "\\t" | "tab" | "\t" => Ok(b'\t'),
        v if v.len() == 1 && v.is_ascii() => Ok(v.as_bytes()[0]),
        other => Err(Error::config(format!("invalid delimiter '{}'", other))),
    }
}

/// Pick the candidate occurring most often outside quotes in `line`
fn sniff_delimiter(line: &str) -> u8 {
    let mut counts = [0usize; DELIMITER_CANDIDATES.len()];
    let mut quoted = false;
    for byte in line.bytes() {
        if byte == b'"' {
            quoted = !quoted;
        } else if !quoted {
            if let Some(i) = DELIMITER_CANDIDATES.iter().position(|&d| d == byte) {
                counts[i] += 1;
            }
        }
    }
    counts
        .iter()
        .enumerate()
        .filter(|(_, count)| **count > 0)
        .max_by_key(|(i, count)| (**count, std::cmp::Reverse(*i)))
        .map_or(b',', |(i, _)| DELIMITER_CANDIDATES[i])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn settings(layer: serde_json::Value) -> ImportConfig {
        crate::config::Configuration::load(vec![layer])
            .unwrap()
            .settings()
            .clone()
    }

    #[test]
    fn test_semicolon_input_with_header() {
        let settings = settings(json!({
            "csv": {"mapping": {"Vorname": "firstname", "Name": "lastname"}}
        }));
        let reader =
            CsvReader::from_bytes("Vorname;Name\nJane;Doe\n\"Max; Jr\";Muster\n".as_bytes(), &settings)
                .unwrap();
        assert_eq!(reader.delimiter(), b';');
        assert_eq!(reader.columns(), ["Vorname", "Name"]);

        let records: Vec<RawRecord> = reader.read().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].line, 1);
        assert_eq!(records[1].get("Vorname"), Some("Max; Jr"));
    }

    #[test]
    fn test_header_on_later_line() {
        let settings = settings(json!({"input": {"header_lines": 2}}));
        let reader =
            CsvReader::from_bytes(b"Export 2024-01-01\nfirst,last\nJane,Doe\n", &settings).unwrap();
        assert_eq!(reader.columns(), ["first", "last"]);
        assert_eq!(reader.read().count(), 1);
    }

    #[test]
    fn test_no_header_numbers_columns() {
        let settings = settings(json!({
            "input": {"header_lines": 0},
            "csv": {"mapping": {"0": "firstname", "1": "lastname"}}
        }));
        let reader = CsvReader::from_bytes(b"Jane\tDoe\nJohn\tRoe\n", &settings).unwrap();
        assert_eq!(reader.columns(), ["0", "1"]);
        let records: Vec<RawRecord> = reader.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("1"), Some("Doe"));
        assert_eq!(records[1].line, 2);
    }

    #[test]
    fn test_missing_mapped_column() {
        let layer = json!({
            "csv": {"mapping": {"Vorname": "firstname", "Mail": "email"}}
        });
        let err = CsvReader::from_bytes(b"Vorname\nJane\n", &settings(layer.clone())).unwrap_err();
        assert!(matches!(err, Error::UnsupportedInput(_)));
        assert!(err.to_string().contains("Mail"));

        let mut allowed = layer;
        allowed["csv"]["allowed_missing_columns"] = json!(["Mail"]);
        let reader = CsvReader::from_bytes(b"Vorname\nJane\n", &settings(allowed)).unwrap();
        let record = reader.read().next().unwrap().unwrap();
        assert_eq!(record.get("Mail"), None);
    }

    #[test]
    fn test_binary_input_rejected_before_rows() {
        let err = CsvReader::from_bytes(&[b'a', 0, b'b', 0], &ImportConfig::default()).unwrap_err();
        assert!(matches!(err, Error::UnsupportedEncoding(_)));
    }

    #[test]
    fn test_forced_delimiter() {
        let settings = settings(json!({"input": {"delimiter": "|"}}));
        let reader = CsvReader::from_bytes(b"a,b|c\n1,2|3\n", &settings).unwrap();
        assert_eq!(reader.columns(), ["a,b", "c"]);
    }

    #[tokio::test]
    async fn test_open_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = CsvReader::open(dir.path().join("nope.csv"), &ImportConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedInput(_)));
    }
}
