//! # **RecordBatch Module** - *Schema plus equal-length columns*
//!
//! The unit of exchange between the importer, the stream reader and the CSV encoder.
//! Columns are `ArrayRef`s so a batch is cheap to clone and slice.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::sync::Arc;

use crate::enums::error::ColbridgeError;
use crate::ffi::schema::Schema;
use crate::structs::array_data::ArrayRef;

/// # RecordBatch
///
/// - `schema` describes every column; `columns[i]` has the type of `schema.fields[i]`.
/// - All columns are exactly `n_rows` long.
/// - `slice` is zero-copy: every column is re-windowed over the same buffers.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordBatch {
    schema: Arc<Schema>,
    columns: Vec<ArrayRef>,
    n_rows: usize,
}

impl RecordBatch {
    /// Validating constructor.
    ///
    /// Fails when the column count or any column type differs from `schema`, or when
    /// column lengths disagree.
    pub fn try_new(schema: Arc<Schema>, columns: Vec<ArrayRef>) -> Result<Self, ColbridgeError> {
        let n_rows = columns.first().map(|c| c.len()).unwrap_or(0);
        Self::try_new_with_rows(schema, columns, n_rows)
    }

    /// As [`RecordBatch::try_new`], with the row count stated explicitly so that
    /// zero-column batches keep their length.
    pub fn try_new_with_rows(
        schema: Arc<Schema>,
        columns: Vec<ArrayRef>,
        n_rows: usize,
    ) -> Result<Self, ColbridgeError> {
        if schema.fields.len() != columns.len() {
            return Err(ColbridgeError::SchemaMismatch {
                message: format!(
                    "schema has {} fields but {} columns were supplied",
                    schema.fields.len(),
                    columns.len()
                ),
            });
        }
        for (i, (col, field)) in columns.iter().zip(&schema.fields).enumerate() {
            if col.dtype() != &field.dtype {
                return Err(ColbridgeError::SchemaMismatch {
                    message: format!(
                        "column {} ('{}') has type {}, schema declares {}",
                        i,
                        field.name,
                        col.dtype(),
                        field.dtype
                    ),
                });
            }
            if col.len() != n_rows {
                return Err(ColbridgeError::ColumnLengthMismatch {
                    col: i,
                    expected: n_rows,
                    found: col.len(),
                });
            }
        }
        Ok(Self { schema, columns, n_rows })
    }

    /// Zero-column, zero-row batch.
    pub fn new_empty(schema: Arc<Schema>) -> Self {
        Self { schema, columns: Vec::new(), n_rows: 0 }
    }

    #[inline]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    #[inline]
    pub fn columns(&self) -> &[ArrayRef] {
        &self.columns
    }

    #[inline]
    pub fn column(&self, i: usize) -> &ArrayRef {
        &self.columns[i]
    }

    #[inline]
    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    #[inline]
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.n_rows == 0
    }

    /// Returns a zero-copy view over rows `[offset, offset+len)`.
    ///
    /// Panics if the window is out of bounds.
    pub fn slice(&self, offset: usize, len: usize) -> RecordBatch {
        assert!(offset + len <= self.n_rows, "RecordBatch::slice: window out of bounds");
        RecordBatch {
            schema: self.schema.clone(),
            columns: self.columns.iter().map(|c| Arc::new(c.slice(offset, len))).collect(),
            n_rows: len,
        }
    }
}

impl Display for RecordBatch {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        writeln!(f, "RecordBatch [{} rows x {} cols]", self.n_rows, self.columns.len())?;
        for field in &self.schema.fields {
            writeln!(f, "  {}", field)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ArrayData, ArrowType, Field};

    fn schema() -> Arc<Schema> {
        Arc::new(Schema::from(vec![
            Field::new("a", ArrowType::Int32, true, None),
            Field::new("b", ArrowType::String, true, None),
        ]))
    }

    #[test]
    fn test_try_new_and_slice() {
        let a = ArrayData::from_options(ArrowType::Int32, &[Some(1), Some(2), None]).unwrap();
        let b = ArrayData::from_strs(&[Some("x"), None, Some("z")]);
        let batch = RecordBatch::try_new(schema(), vec![a.into_ref(), b.into_ref()]).unwrap();
        assert_eq!(batch.n_rows(), 3);
        let s = batch.slice(1, 2);
        assert_eq!(s.n_rows(), 2);
        assert_eq!(s.column(0).values::<i32>().unwrap(), &[2, 0]);
        assert!(s.column(0).is_null(1));
    }

    #[test]
    fn test_length_mismatch() {
        let a = ArrayData::from_options(ArrowType::Int32, &[Some(1), Some(2)]).unwrap();
        let b = ArrayData::from_strs(&[Some("x")]);
        let err = RecordBatch::try_new(schema(), vec![a.into_ref(), b.into_ref()]).unwrap_err();
        assert_eq!(err, ColbridgeError::ColumnLengthMismatch { col: 1, expected: 2, found: 1 });
    }

    #[test]
    fn test_type_mismatch() {
        let a = ArrayData::from_strs(&[Some("x")]);
        let b = ArrayData::from_strs(&[Some("y")]);
        let err = RecordBatch::try_new(schema(), vec![a.into_ref(), b.into_ref()]);
        assert!(matches!(err, Err(ColbridgeError::SchemaMismatch { .. })));
    }
}
