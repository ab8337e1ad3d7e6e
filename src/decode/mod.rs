//! Upload decoders: turn raw uploaded bytes into a lazy sequence of
//! example records plus the discovered column set.

pub mod arrow;
pub mod csv;
pub mod keys;

use std::collections::BTreeSet;

use crate::error::{Error, Result};

/// One decoded example row. Field values are opaque JSON documents.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Declared MIME type of an uploaded file.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ContentType {
    Csv,
    ArrowStream,
}

impl ContentType {
    pub const CSV: &'static str = "text/csv";
    pub const ARROW_STREAM: &'static str = "application/x-pandas-pyarrow";

    /// Case-insensitive parse; anything unrecognized is a client error
    /// naming the offending value.
    pub fn parse(value: &str) -> Result<Self> {
        if value.eq_ignore_ascii_case(Self::CSV) {
            Ok(ContentType::Csv)
        } else if value.eq_ignore_ascii_case(Self::ARROW_STREAM) {
            Ok(ContentType::ArrowStream)
        } else {
            Err(Error::Malformed(format!(
                "invalid file content type: {value}"
            )))
        }
    }
}

/// Declared content encoding of an uploaded file. A missing declaration
/// means no compression.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ContentEncoding {
    None,
    Gzip,
    Deflate,
}

impl ContentEncoding {
    pub fn parse(value: Option<&str>) -> Result<Self> {
        let Some(value) = value else {
            return Ok(ContentEncoding::None);
        };
        if value.eq_ignore_ascii_case("none") {
            Ok(ContentEncoding::None)
        } else if value.eq_ignore_ascii_case("gzip") {
            Ok(ContentEncoding::Gzip)
        } else if value.eq_ignore_ascii_case("deflate") {
            Ok(ContentEncoding::Deflate)
        } else {
            Err(Error::Malformed(format!(
                "invalid file content encoding: {value}"
            )))
        }
    }
}

/// A validated upload: the discovered column names plus a lazy, consumed-
/// exactly-once record sequence. Dropping the iterator releases every
/// buffer it holds, so early abandonment (failed validation, full queue)
/// leaks nothing.
pub struct DecodedUpload {
    pub columns: BTreeSet<String>,
    pub records: RecordIter,
}

/// Lazy record producer over either upload format.
#[derive(Debug)]
pub enum RecordIter {
    Csv(self::csv::CsvRecords),
    Arrow(self::arrow::ArrowRecords),
}

impl Iterator for RecordIter {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            RecordIter::Csv(records) => records.next(),
            RecordIter::Arrow(records) => records.next(),
        }
    }
}

/// Decode an upload according to its declared content type. Only the
/// header (or embedded schema) is parsed eagerly; rows are produced on
/// demand by the returned iterator.
pub fn decode_upload(
    bytes: Vec<u8>,
    content_type: ContentType,
    content_encoding: ContentEncoding,
) -> Result<DecodedUpload> {
    match content_type {
        ContentType::Csv => {
            let (columns, records) = self::csv::decode_csv(bytes, content_encoding)?;
            Ok(DecodedUpload {
                columns,
                records: RecordIter::Csv(records),
            })
        }
        ContentType::ArrowStream => {
            let (columns, records) = self::arrow::decode_arrow_stream(bytes)?;
            Ok(DecodedUpload {
                columns,
                records: RecordIter::Arrow(records),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_is_case_insensitive() {
        assert_eq!(ContentType::parse("TEXT/CSV").unwrap(), ContentType::Csv);
        assert_eq!(
            ContentType::parse("Application/X-Pandas-PyArrow").unwrap(),
            ContentType::ArrowStream
        );
    }

    #[test]
    fn unknown_content_type_names_the_value() {
        let err = ContentType::parse("application/json").unwrap_err();
        assert!(err.to_string().contains("application/json"));
    }

    #[test]
    fn missing_encoding_means_none() {
        assert_eq!(
            ContentEncoding::parse(None).unwrap(),
            ContentEncoding::None
        );
        assert_eq!(
            ContentEncoding::parse(Some("GZIP")).unwrap(),
            ContentEncoding::Gzip
        );
    }

    #[test]
    fn unknown_encoding_is_malformed() {
        let err = ContentEncoding::parse(Some("br")).unwrap_err();
        assert!(matches!(err, Error::Malformed(_)));
        assert!(err.to_string().contains("br"));
    }
}
