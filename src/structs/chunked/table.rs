//! # **Table** - *Chunked sequence of RecordBatches under one schema*
//!
//! ## Behaviour
//! - All batches share the table schema (compared without metadata).
//! - Row counts may differ between batches, including zero-row batches.
//! - [`TableBatchReader`] re-chunks the table into slices of at most `chunksize` rows.
//!   Slices never span two batches, so they stay zero-copy.

use std::sync::Arc;

use tracing::trace;

use crate::enums::error::ColbridgeError;
use crate::ffi::schema::Schema;
use crate::structs::record_batch::RecordBatch;
use crate::traits::record_batch_reader::RecordBatchReader;

/// # Table
///
/// Ordered sequence of `RecordBatch` chunks with a consistent schema.
#[derive(Clone, Debug, PartialEq)]
pub struct Table {
    schema: Arc<Schema>,
    batches: Vec<RecordBatch>,
    n_rows: usize,
}

impl Table {
    /// Creates an empty table.
    pub fn new(schema: Arc<Schema>) -> Self {
        Self { schema, batches: Vec::new(), n_rows: 0 }
    }

    /// Builds a table from batches, checking each against `schema`.
    pub fn try_new(schema: Arc<Schema>, batches: Vec<RecordBatch>) -> Result<Self, ColbridgeError> {
        let mut table = Self::new(schema);
        for batch in batches {
            table.push(batch)?;
        }
        Ok(table)
    }

    /// Builds a table taking the schema from the first batch.
    pub fn from_batches(batches: Vec<RecordBatch>) -> Result<Self, ColbridgeError> {
        let schema = batches
            .first()
            .map(|b| b.schema().clone())
            .ok_or_else(|| ColbridgeError::invalid("cannot infer a table schema from zero batches"))?;
        Self::try_new(schema, batches)
    }

    /// Appends a batch.
    pub fn push(&mut self, batch: RecordBatch) -> Result<(), ColbridgeError> {
        if !batch.schema().eq_ignoring_metadata(&self.schema) {
            return Err(ColbridgeError::SchemaMismatch {
                message: format!(
                    "batch {} schema does not match table schema",
                    self.batches.len()
                ),
            });
        }
        self.n_rows += batch.n_rows();
        self.batches.push(batch);
        Ok(())
    }

    #[inline]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    #[inline]
    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    #[inline]
    pub fn n_batches(&self) -> usize {
        self.batches.len()
    }

    #[inline]
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    #[inline]
    pub fn n_cols(&self) -> usize {
        self.schema.fields.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.n_rows == 0
    }

    /// Reader yielding slices of at most `chunksize` rows.
    pub fn batch_reader(&self, chunksize: usize) -> TableBatchReader {
        TableBatchReader::new(self.clone(), chunksize)
    }
}

/// # TableBatchReader
///
/// Splits a [`Table`] into row-bounded `RecordBatch` slices.
///
/// - Each yielded batch has `1..=chunksize` rows; zero-row chunks are skipped.
/// - A `chunksize` of zero is treated as one.
#[derive(Debug, Clone)]
pub struct TableBatchReader {
    table: Table,
    chunksize: usize,
    batch_idx: usize,
    row_idx: usize,
}

impl TableBatchReader {
    pub fn new(table: Table, chunksize: usize) -> Self {
        Self { table, chunksize: chunksize.max(1), batch_idx: 0, row_idx: 0 }
    }
}

impl RecordBatchReader for TableBatchReader {
    fn schema(&mut self) -> Result<Arc<Schema>, ColbridgeError> {
        Ok(self.table.schema.clone())
    }

    fn read_next(&mut self) -> Result<Option<RecordBatch>, ColbridgeError> {
        while let Some(batch) = self.table.batches.get(self.batch_idx) {
            let remaining = batch.n_rows() - self.row_idx;
            if remaining == 0 {
                self.batch_idx += 1;
                self.row_idx = 0;
                continue;
            }
            let take = remaining.min(self.chunksize);
            let out = batch.slice(self.row_idx, take);
            trace!(batch = self.batch_idx, offset = self.row_idx, rows = take, "table chunk");
            self.row_idx += take;
            return Ok(Some(out));
        }
        Ok(None)
    }
}

impl Iterator for TableBatchReader {
    type Item = Result<RecordBatch, ColbridgeError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_next().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ArrayData, ArrowType, Field};

    fn batch(values: &[i64]) -> RecordBatch {
        let schema = Arc::new(Schema::from(vec![Field::new("v", ArrowType::Int64, false, None)]));
        let col = ArrayData::from_primitive(ArrowType::Int64, values.to_vec(), None).unwrap();
        RecordBatch::try_new(schema, vec![col.into_ref()]).unwrap()
    }

    #[test]
    fn test_chunking_respects_batch_boundaries() {
        let table =
            Table::from_batches(vec![batch(&[1, 2, 3, 4, 5]), batch(&[]), batch(&[6, 7])]).unwrap();
        assert_eq!(table.n_rows(), 7);
        let sizes: Vec<usize> =
            table.batch_reader(2).map(|b| b.unwrap().n_rows()).collect();
        assert_eq!(sizes, vec![2, 2, 1, 2]);
    }

    #[test]
    fn test_chunk_values() {
        let table = Table::from_batches(vec![batch(&[1, 2, 3])]).unwrap();
        let mut reader = table.batch_reader(2);
        let second = reader.nth(1).unwrap().unwrap();
        assert_eq!(second.column(0).values::<i64>().unwrap(), &[3]);
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_push_rejects_other_schema() {
        let mut table = Table::from_batches(vec![batch(&[1])]).unwrap();
        let other = Arc::new(Schema::from(vec![Field::new("w", ArrowType::Int64, false, None)]));
        let col = ArrayData::from_primitive(ArrowType::Int64, vec![1i64], None).unwrap();
        let b = RecordBatch::try_new(other, vec![col.into_ref()]).unwrap();
        assert!(matches!(table.push(b), Err(ColbridgeError::SchemaMismatch { .. })));
    }
}
