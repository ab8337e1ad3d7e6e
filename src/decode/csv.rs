//! Text-delimited decoder: decompress, parse the header row eagerly,
//! yield one record per remaining line without materializing the file.

use std::collections::{BTreeSet, HashSet};
use std::io::{Cursor, Read};

use flate2::read::{GzDecoder, ZlibDecoder};
use serde_json::Value;

use super::{ContentEncoding, Record};
use crate::error::{Error, Result};

pub(super) fn decode_csv(
    bytes: Vec<u8>,
    content_encoding: ContentEncoding,
) -> Result<(BTreeSet<String>, CsvRecords)> {
    let bytes = decompress(bytes, content_encoding)?;
    let mut reader = ::csv::Reader::from_reader(Cursor::new(bytes));
    let headers = reader
        .headers()
        .map_err(|e| Error::Malformed(format!("failed to parse CSV header: {e}")))?
        .clone();
    if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
        return Err(Error::Malformed("missing CSV column header".to_string()));
    }
    let mut seen = HashSet::new();
    for header in headers.iter() {
        if !seen.insert(header) {
            return Err(Error::Malformed(format!(
                "duplicated column header in CSV file: {header}"
            )));
        }
    }
    let columns = headers.iter().map(|h| h.to_string()).collect();
    Ok((
        columns,
        CsvRecords {
            headers,
            records: reader.into_records(),
        },
    ))
}

fn decompress(bytes: Vec<u8>, content_encoding: ContentEncoding) -> Result<Vec<u8>> {
    match content_encoding {
        ContentEncoding::None => Ok(bytes),
        ContentEncoding::Gzip => {
            let mut out = Vec::new();
            GzDecoder::new(bytes.as_slice())
                .read_to_end(&mut out)
                .map_err(|e| Error::Malformed(format!("failed to decompress gzip payload: {e}")))?;
            Ok(out)
        }
        ContentEncoding::Deflate => {
            let mut out = Vec::new();
            ZlibDecoder::new(bytes.as_slice())
                .read_to_end(&mut out)
                .map_err(|e| {
                    Error::Malformed(format!("failed to decompress deflate payload: {e}"))
                })?;
            Ok(out)
        }
    }
}

/// Lazy row iterator over a parsed CSV payload. Cell values are produced
/// as JSON strings, mirroring how a dict-reader treats untyped text.
pub struct CsvRecords {
    headers: ::csv::StringRecord,
    records: ::csv::StringRecordsIntoIter<Cursor<Vec<u8>>>,
}

impl std::fmt::Debug for CsvRecords {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsvRecords")
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl Iterator for CsvRecords {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = match self.records.next()? {
            Ok(record) => record,
            Err(e) => {
                return Some(Err(Error::Malformed(format!(
                    "failed to parse CSV row: {e}"
                ))))
            }
        };
        let mut row = Record::new();
        for (header, cell) in self.headers.iter().zip(record.iter()) {
            row.insert(header.to_string(), Value::String(cell.to_string()));
        }
        Some(Ok(row))
    }
}
