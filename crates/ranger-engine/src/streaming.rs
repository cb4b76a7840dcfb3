//! Streaming reads and writes of row batches.
//!
//! Streams are lazy sequences of row batches: `next_batch` yields
//! `Some(batch)` until the end, `close` releases the source. The wire form
//! is newline-delimited JSON, one batch (a JSON array of rows) per line;
//! inserts and reads share it. Restartability is not required.

use std::io::{BufRead, Write};
use std::path::PathBuf;

use ranger_core::{codes, RangerError, Result};
use ranger_storage::{files, Row};

/// A lazy sequence of row batches.
pub trait BatchStream {
    /// The next batch, or `None` at end of stream.
    fn next_batch(&mut self) -> Result<Option<Vec<Row>>>;

    fn close(&mut self);
}

/// Streams a table's stored batches, opening one data file at a time.
pub struct TableBatchStream {
    files: std::vec::IntoIter<PathBuf>,
    pending: std::vec::IntoIter<Vec<Row>>,
    closed: bool,
}

impl TableBatchStream {
    pub fn new(file_paths: Vec<PathBuf>) -> Self {
        Self {
            files: file_paths.into_iter(),
            pending: Vec::new().into_iter(),
            closed: false,
        }
    }

    /// Encode every remaining batch to `writer`, one JSON line per batch.
    pub fn write_to(&mut self, writer: &mut impl Write) -> Result<u64> {
        let mut batches = 0u64;
        while let Some(batch) = self.next_batch()? {
            let mut line = serde_json::to_string(&batch).map_err(encode_error)?;
            line.push('\n');
            writer.write_all(line.as_bytes()).map_err(|e| {
                RangerError::new(codes::COMMON_INTERNAL, "failed to write batch stream")
                    .with_cause(e)
            })?;
            batches += 1;
        }
        Ok(batches)
    }
}

impl BatchStream for TableBatchStream {
    fn next_batch(&mut self) -> Result<Option<Vec<Row>>> {
        if self.closed {
            return Ok(None);
        }
        loop {
            if let Some(batch) = self.pending.next() {
                return Ok(Some(batch));
            }
            match self.files.next() {
                Some(path) => {
                    self.pending = files::read_batches(&path)?.into_iter();
                }
                None => return Ok(None),
            }
        }
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

/// Decodes newline-delimited JSON row batches from a reader.
pub struct JsonBatchReader<R: BufRead> {
    reader: R,
    /// Index of the next batch, surfaced in error context on failure.
    batch_index: usize,
    closed: bool,
}

impl<R: BufRead> JsonBatchReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            batch_index: 0,
            closed: false,
        }
    }

    pub fn batch_index(&self) -> usize {
        self.batch_index
    }
}

impl<R: BufRead> BatchStream for JsonBatchReader<R> {
    fn next_batch(&mut self) -> Result<Option<Vec<Row>>> {
        if self.closed {
            return Ok(None);
        }
        let mut line = String::new();
        loop {
            line.clear();
            let read = self.reader.read_line(&mut line).map_err(|e| {
                RangerError::new(codes::COMMON_INVALID_INPUT, "failed to read batch stream")
                    .with_context("batch_index", self.batch_index)
                    .with_cause(e)
            })?;
            if read == 0 {
                return Ok(None);
            }
            if line.trim().is_empty() {
                continue;
            }
            let batch: Vec<Row> = serde_json::from_str(line.trim()).map_err(|e| {
                RangerError::new(
                    codes::COMMON_INVALID_INPUT,
                    format!("malformed row batch at index {}", self.batch_index),
                )
                .with_context("batch_index", self.batch_index)
                .with_cause(e)
            })?;
            self.batch_index += 1;
            return Ok(Some(batch));
        }
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

fn encode_error(e: serde_json::Error) -> RangerError {
    RangerError::new(codes::COMMON_INTERNAL, "failed to encode row batch").with_cause(e)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_batch_reader() {
        let input = "[[1,\"a\"],[2,\"b\"]]\n\n[[3,\"c\"]]\n";
        let mut reader = JsonBatchReader::new(input.as_bytes());
        let first = reader.next_batch().unwrap().unwrap();
        assert_eq!(first.len(), 2);
        let second = reader.next_batch().unwrap().unwrap();
        assert_eq!(second.len(), 1);
        assert!(reader.next_batch().unwrap().is_none());
        assert_eq!(reader.batch_index(), 2);
    }

    #[test]
    fn test_json_batch_reader_surfaces_batch_index() {
        let input = "[[1]]\nnot json\n";
        let mut reader = JsonBatchReader::new(input.as_bytes());
        reader.next_batch().unwrap();
        let err = reader.next_batch().unwrap_err();
        assert_eq!(
            err.context().get("batch_index"),
            Some(&ranger_core::ContextValue::Int(1))
        );
    }

    #[test]
    fn test_closed_stream_yields_nothing() {
        let mut reader = JsonBatchReader::new("[[1]]\n".as_bytes());
        reader.close();
        assert!(reader.next_batch().unwrap().is_none());
    }
}
