//! Columnar binary decoder: opens the payload as a self-describing Arrow
//! IPC stream and yields row-materialized records batch by batch.

use std::collections::{BTreeSet, VecDeque};
use std::io::Cursor;

use arrow::ipc::reader::StreamReader;
use arrow::record_batch::RecordBatch;

use super::Record;
use crate::error::{Error, Result};

pub(super) fn decode_arrow_stream(
    bytes: Vec<u8>,
) -> Result<(BTreeSet<String>, ArrowRecords)> {
    let reader = StreamReader::try_new(Cursor::new(bytes), None)
        .map_err(|e| Error::Malformed(format!("file is not a valid arrow stream: {e}")))?;
    let columns = reader
        .schema()
        .fields()
        .iter()
        .map(|field| field.name().clone())
        .collect();
    Ok((
        columns,
        ArrowRecords {
            reader,
            pending: VecDeque::new(),
        },
    ))
}

/// Lazy row iterator over an Arrow IPC stream. Batches are pulled from the
/// stream one at a time and row-materialized through the arrow JSON
/// writer, so memory stays bounded by the batch size.
#[derive(Debug)]
pub struct ArrowRecords {
    reader: StreamReader<Cursor<Vec<u8>>>,
    pending: VecDeque<Record>,
}

impl Iterator for ArrowRecords {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(row) = self.pending.pop_front() {
                return Some(Ok(row));
            }
            match self.reader.next()? {
                Ok(batch) => match rows_from_batch(&batch) {
                    Ok(rows) => self.pending = rows,
                    Err(e) => return Some(Err(e)),
                },
                Err(e) => {
                    return Some(Err(Error::Malformed(format!(
                        "failed to read arrow stream: {e}"
                    ))))
                }
            }
        }
    }
}

fn rows_from_batch(batch: &RecordBatch) -> Result<VecDeque<Record>> {
    let mut writer = arrow::json::ArrayWriter::new(Vec::new());
    writer
        .write(batch)
        .and_then(|_| writer.finish())
        .map_err(|e| Error::Malformed(format!("failed to materialize arrow batch: {e}")))?;
    let buf = writer.into_inner();
    if buf.is_empty() {
        return Ok(VecDeque::new());
    }
    serde_json::from_slice(&buf)
        .map_err(|e| Error::Malformed(format!("failed to materialize arrow batch: {e}")))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::ipc::writer::StreamWriter;

    use super::*;

    fn sample_stream() -> Vec<u8> {
        let schema = Arc::new(Schema::new(vec![
            Field::new("q", DataType::Utf8, false),
            Field::new("score", DataType::Int64, false),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from(vec!["hello", "foo"])),
                Arc::new(Int64Array::from(vec![1, 2])),
            ],
        )
        .unwrap();
        let mut writer = StreamWriter::try_new(Vec::new(), &schema).unwrap();
        writer.write(&batch).unwrap();
        writer.finish().unwrap();
        writer.into_inner().unwrap()
    }

    #[test]
    fn decodes_schema_and_rows() {
        let (columns, records) = decode_arrow_stream(sample_stream()).unwrap();
        assert!(columns.contains("q"));
        assert!(columns.contains("score"));
        let rows: Vec<_> = records.map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["q"], "hello");
        assert_eq!(rows[1]["score"], 2);
    }

    #[test]
    fn garbage_is_malformed() {
        let err = decode_arrow_stream(b"definitely not arrow".to_vec()).unwrap_err();
        assert!(matches!(err, Error::Malformed(_)));
    }
}
