//! # **RecordBatchReader** - *Pull interface over a sequence of batches*
//!
//! Implemented by [`crate::TableBatchReader`] and the C stream reader
//! [`crate::ArrowArrayStreamReader`], consumed by the CSV writer and the stream exporter.

use std::sync::Arc;

use crate::enums::error::ColbridgeError;
use crate::ffi::schema::Schema;
use crate::structs::record_batch::RecordBatch;

/// Pull-based batch source sharing one schema.
///
/// `read_next` returns `Ok(None)` once the source is exhausted; callers should not
/// assume it keeps returning `None` afterwards.
pub trait RecordBatchReader {
    /// Schema of every batch this reader yields.
    fn schema(&mut self) -> Result<Arc<Schema>, ColbridgeError>;

    /// Next batch, or `None` at end of stream.
    fn read_next(&mut self) -> Result<Option<RecordBatch>, ColbridgeError>;
}

impl<R: RecordBatchReader + ?Sized> RecordBatchReader for Box<R> {
    fn schema(&mut self) -> Result<Arc<Schema>, ColbridgeError> {
        (**self).schema()
    }

    fn read_next(&mut self) -> Result<Option<RecordBatch>, ColbridgeError> {
        (**self).read_next()
    }
}
