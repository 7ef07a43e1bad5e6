//! Input encoding detection and decoding
//!
//! Detection looks at byte order marks first. Without a BOM the input must
//! be valid UTF-8 and free of NUL bytes; anything else is rejected before a
//! single row is produced. ISO-8859-1 can't be told apart from binary data
//! and is therefore only used when forced.

use crate::{Error, Result};

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];
const UTF16_LE_BOM: &[u8] = &[0xFF, 0xFE];
const UTF16_BE_BOM: &[u8] = &[0xFE, 0xFF];

/// Supported input encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
    /// UTF-8 with byte order mark
    Utf8Bom,
    Utf16Le,
    Utf16Be,
    Latin1,
}

impl Encoding {
    /// Parse a configured encoding name
    pub fn from_name(name: &str) -> Result<Self> {
        match name.trim().to_lowercase().replace('_', "-").as_str() {
            "utf-8" | "utf8" => Ok(Encoding::Utf8),
            "utf-8-sig" => Ok(Encoding::Utf8Bom),
            "utf-16le" | "utf-16-le" => Ok(Encoding::Utf16Le),
            "utf-16be" | "utf-16-be" => Ok(Encoding::Utf16Be),
            "iso-8859-1" | "iso8859-1" | "latin1" | "latin-1" => Ok(Encoding::Latin1),
            other => Err(Error::unsupported_encoding(format!(
                "unknown encoding '{}'",
                other
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Encoding::Utf8 => "utf-8",
            Encoding::Utf8Bom => "utf-8-sig",
            Encoding::Utf16Le => "utf-16le",
            Encoding::Utf16Be => "utf-16be",
            Encoding::Latin1 => "iso-8859-1",
        }
    }
}

/// Determine the encoding of `bytes`
///
/// A forced name wins over detection, except that `utf-16` (without byte
/// order) still needs a BOM to pick the byte order.
pub fn detect_encoding(bytes: &[u8], forced: Option<&str>) -> Result<Encoding> {
    if let Some(name) = forced {
        let normalized = name.trim().to_lowercase();
        if normalized == "utf-16" || normalized == "utf16" {
            return match bom_encoding(bytes) {
                Some(enc @ (Encoding::Utf16Le | Encoding::Utf16Be)) => Ok(enc),
                _ => Err(Error::unsupported_encoding(
                    "utf-16 input without byte order mark",
                )),
            };
        }
        return Encoding::from_name(name);
    }

    if let Some(encoding) = bom_encoding(bytes) {
        return Ok(encoding);
    }

    if bytes.contains(&0) {
        return Err(Error::unsupported_encoding(
            "input contains NUL bytes, binary or undetectable encoding",
        ));
    }

    match std::str::from_utf8(bytes) {
        Ok(_) => Ok(Encoding::Utf8),
        Err(e) => Err(Error::unsupported_encoding(format!(
            "input is not valid UTF-8 ({}), set input:encoding to force an encoding",
            e
        ))),
    }
}

fn bom_encoding(bytes: &[u8]) -> Option<Encoding> {
    if bytes.starts_with(UTF8_BOM) {
        Some(Encoding::Utf8Bom)
    } else if bytes.starts_with(UTF16_LE_BOM) {
        Some(Encoding::Utf16Le)
    } else if bytes.starts_with(UTF16_BE_BOM) {
        Some(Encoding::Utf16Be)
    } else {
        None
    }
}

/// Decode `bytes` to text, dropping a byte order mark
pub fn decode(bytes: &[u8], encoding: Encoding) -> Result<String> {
    match encoding {
        Encoding::Utf8 | Encoding::Utf8Bom => {
            let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
            String::from_utf8(body.to_vec())
                .map_err(|e| Error::unsupported_encoding(format!("invalid UTF-8: {}", e)))
        }
        Encoding::Utf16Le => decode_utf16(
            bytes.strip_prefix(UTF16_LE_BOM).unwrap_or(bytes),
            u16::from_le_bytes,
        ),
        Encoding::Utf16Be => decode_utf16(
            bytes.strip_prefix(UTF16_BE_BOM).unwrap_or(bytes),
            u16::from_be_bytes,
        ),
        Encoding::Latin1 => Ok(bytes.iter().map(|&b| b as char).collect()),
    }
}

fn decode_utf16(bytes: &[u8], unit: fn([u8; 2]) -> u16) -> Result<String> {
    if bytes.len() % 2 != 0 {
        return Err(Error::unsupported_encoding("odd number of bytes in UTF-16 input"));
    }
    let units = bytes.chunks_exact(2).map(|pair| unit([pair[0], pair[1]]));
    char::decode_utf16(units)
        .collect::<std::result::Result<String, _>>()
        .map_err(|e| Error::unsupported_encoding(format!("invalid UTF-16: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_utf8() {
        assert_eq!(
            detect_encoding("Vorname;Name\nJörg;Weiß".as_bytes(), None).unwrap(),
            Encoding::Utf8
        );
        let with_bom = [UTF8_BOM, b"a,b".as_slice()].concat();
        assert_eq!(detect_encoding(&with_bom, None).unwrap(), Encoding::Utf8Bom);
        assert_eq!(decode(&with_bom, Encoding::Utf8Bom).unwrap(), "a,b");
    }

    #[test]
    fn test_detect_utf16() {
        let mut bytes = UTF16_LE_BOM.to_vec();
        for unit in "ä,b".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        let encoding = detect_encoding(&bytes, None).unwrap();
        assert_eq!(encoding, Encoding::Utf16Le);
        assert_eq!(decode(&bytes, encoding).unwrap(), "ä,b");
    }

    #[test]
    fn test_binary_rejected() {
        let err = detect_encoding(&[0x50, 0x4B, 0x03, 0x04, 0x00, 0x00], None).unwrap_err();
        assert!(matches!(err, Error::UnsupportedEncoding(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_latin1_needs_forcing() {
        let bytes = b"J\xf6rg";
        assert!(detect_encoding(bytes, None).is_err());
        let encoding = detect_encoding(bytes, Some("ISO-8859-1")).unwrap();
        assert_eq!(decode(bytes, encoding).unwrap(), "Jörg");
    }

    #[test]
    fn test_unknown_forced_encoding() {
        assert!(detect_encoding(b"a", Some("ebcdic")).is_err());
        assert!(detect_encoding(b"a", Some("utf-16")).is_err());
    }
}
