//! # **Stream Module** - *Arrow C Stream Interface*
//!
//! ABI struct for `ArrowArrayStream`, a pull-based reader over a foreign stream, and
//! an exporter that exposes any [`RecordBatchReader`] as a stream.
//!
//! ## Reading
//! - The schema is fetched on first use (first `schema()` or `read_next()` call) and
//!   cached. The local `ArrowSchema` copy is released right after import.
//! - Each `read_next()` imports exactly one struct array as one `RecordBatch`.
//! - A released array returned by `get_next` marks end of stream, not an error.
//! - A non-zero errno becomes [`ColbridgeError::Stream`] carrying the producer's
//!   `get_last_error` text.
//! - The stream is released once, when the reader is dropped.

use std::ffi::{CStr, CString, c_char, c_int, c_void};
use std::ptr;
use std::sync::Arc;

use tracing::debug;

use crate::enums::error::ColbridgeError;
use crate::ffi::arrow_c_ffi::{ArrowArray, ArrowSchema, export_record_batch, export_schema};
use crate::ffi::import::import_record_batch_with_schema;
use crate::ffi::schema::{Schema, import_schema};
use crate::structs::record_batch::RecordBatch;
use crate::traits::record_batch_reader::RecordBatchReader;

const EIO: c_int = 5;
const ENOMEM: c_int = 12;
const EINVAL: c_int = 22;
// macOS value (Linux uses 38); matches what other Arrow stream producers report.
const ENOSYS: c_int = 78;

/// ArrowArrayStream as laid out by the Arrow C Stream Interface
#[repr(C)]
#[derive(Debug)]
pub struct ArrowArrayStream {
    pub get_schema: Option<unsafe extern "C" fn(*mut ArrowArrayStream, *mut ArrowSchema) -> c_int>,
    pub get_next: Option<unsafe extern "C" fn(*mut ArrowArrayStream, *mut ArrowArray) -> c_int>,
    pub get_last_error: Option<unsafe extern "C" fn(*mut ArrowArrayStream) -> *const c_char>,
    pub release: Option<unsafe extern "C" fn(*mut ArrowArrayStream)>,
    pub private_data: *mut c_void,
}

unsafe impl Send for ArrowArrayStream {}

impl ArrowArrayStream {
    /// A released stream struct.
    pub fn empty() -> Self {
        Self {
            get_schema: None,
            get_next: None,
            get_last_error: None,
            release: None,
            private_data: ptr::null_mut(),
        }
    }

    #[inline]
    pub fn is_released(&self) -> bool {
        self.release.is_none()
    }
}

impl Drop for ArrowArrayStream {
    fn drop(&mut self) {
        if let Some(release) = self.release {
            unsafe { release(self) };
            self.release = None;
        }
    }
}

/// Maps a crate error onto the errno a C stream callback returns.
pub fn errno_for(err: &ColbridgeError) -> c_int {
    match err {
        ColbridgeError::Io { kind, .. } if *kind == std::io::ErrorKind::OutOfMemory => ENOMEM,
        ColbridgeError::Io { .. } => EIO,
        ColbridgeError::NotImplemented { .. } => ENOSYS,
        ColbridgeError::Invalid { .. } | ColbridgeError::SchemaMismatch { .. } => EINVAL,
        _ => EIO,
    }
}

/// # ArrowArrayStreamReader
///
/// Pulls `RecordBatch`es from a foreign `ArrowArrayStream`.
#[derive(Debug)]
pub struct ArrowArrayStreamReader {
    stream: ArrowArrayStream,
    schema: Option<Arc<Schema>>,
    finished: bool,
}

impl ArrowArrayStreamReader {
    /// Takes ownership of an owned stream struct.
    pub fn try_new(stream: ArrowArrayStream) -> Result<Self, ColbridgeError> {
        if stream.is_released() {
            return Err(ColbridgeError::ffi("ArrowArrayStream has already been released"));
        }
        if stream.get_schema.is_none() || stream.get_next.is_none() {
            return Err(ColbridgeError::ffi("ArrowArrayStream is missing callbacks"));
        }
        Ok(Self { stream, schema: None, finished: false })
    }

    /// Moves the stream out of `raw`, leaving it released.
    ///
    /// # Safety
    /// `raw` must be null or point at a valid `ArrowArrayStream`.
    pub unsafe fn from_raw(raw: *mut ArrowArrayStream) -> Result<Self, ColbridgeError> {
        if raw.is_null() {
            return Err(ColbridgeError::ffi("null ArrowArrayStream pointer"));
        }
        let stream = unsafe { ptr::replace(raw, ArrowArrayStream::empty()) };
        Self::try_new(stream)
    }

    fn last_error(&mut self) -> Option<String> {
        let get_last_error = self.stream.get_last_error?;
        let msg = unsafe { get_last_error(&mut self.stream) };
        if msg.is_null() {
            return None;
        }
        Some(unsafe { CStr::from_ptr(msg) }.to_string_lossy().into_owned())
    }

    fn stream_error(&mut self, errno: c_int) -> ColbridgeError {
        let message = self.last_error().unwrap_or_else(|| "no error message".to_string());
        debug!(errno, message = %message, "ArrowArrayStream error");
        ColbridgeError::Stream { errno, message }
    }
}

impl RecordBatchReader for ArrowArrayStreamReader {
    fn schema(&mut self) -> Result<Arc<Schema>, ColbridgeError> {
        if let Some(schema) = &self.schema {
            return Ok(schema.clone());
        }
        let get_schema = self
            .stream
            .get_schema
            .ok_or_else(|| ColbridgeError::ffi("ArrowArrayStream has no get_schema"))?;
        let mut out = ArrowSchema::empty();
        let rc = unsafe { get_schema(&mut self.stream, &mut out) };
        if rc != 0 {
            return Err(self.stream_error(rc));
        }
        let schema = Arc::new(unsafe { import_schema(&mut out)? });
        self.schema = Some(schema.clone());
        Ok(schema)
    }

    fn read_next(&mut self) -> Result<Option<RecordBatch>, ColbridgeError> {
        let schema = self.schema()?;
        if self.finished {
            return Ok(None);
        }
        let get_next = self
            .stream
            .get_next
            .ok_or_else(|| ColbridgeError::ffi("ArrowArrayStream has no get_next"))?;
        let mut out = ArrowArray::empty();
        let rc = unsafe { get_next(&mut self.stream, &mut out) };
        if rc != 0 {
            return Err(self.stream_error(rc));
        }
        if out.is_released() {
            debug!("ArrowArrayStream end of stream");
            self.finished = true;
            return Ok(None);
        }
        unsafe { import_record_batch_with_schema(&mut out, &schema) }.map(Some)
    }
}

impl Iterator for ArrowArrayStreamReader {
    type Item = Result<RecordBatch, ColbridgeError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_next().transpose()
    }
}

struct StreamPrivate {
    reader: Box<dyn RecordBatchReader + Send>,
    last_error: Option<CString>,
}

impl StreamPrivate {
    fn fail(&mut self, err: ColbridgeError) -> c_int {
        let errno = errno_for(&err);
        let text = err.to_string().replace('\0', " ");
        self.last_error = CString::new(text).ok();
        errno
    }
}

unsafe fn private_of<'a>(stream: *mut ArrowArrayStream) -> &'a mut StreamPrivate {
    unsafe { &mut *((*stream).private_data as *mut StreamPrivate) }
}

unsafe extern "C" fn stream_get_schema(
    stream: *mut ArrowArrayStream,
    out: *mut ArrowSchema,
) -> c_int {
    let private = unsafe { private_of(stream) };
    match private.reader.schema().and_then(|s| export_schema(&s)) {
        Ok(schema) => {
            unsafe { ptr::write(out, schema) };
            0
        }
        Err(e) => private.fail(e),
    }
}

unsafe extern "C" fn stream_get_next(stream: *mut ArrowArrayStream, out: *mut ArrowArray) -> c_int {
    let private = unsafe { private_of(stream) };
    match private.reader.read_next() {
        Ok(Some(batch)) => match export_record_batch(&batch) {
            Ok((array, _schema)) => {
                unsafe { ptr::write(out, array) };
                0
            }
            Err(e) => private.fail(e),
        },
        Ok(None) => {
            unsafe { ptr::write(out, ArrowArray::empty()) };
            0
        }
        Err(e) => private.fail(e),
    }
}

unsafe extern "C" fn stream_get_last_error(stream: *mut ArrowArrayStream) -> *const c_char {
    let private = unsafe { private_of(stream) };
    private.last_error.as_ref().map_or(ptr::null(), |s| s.as_ptr())
}

unsafe extern "C" fn stream_release(stream: *mut ArrowArrayStream) {
    if stream.is_null() {
        return;
    }
    let stream = unsafe { &mut *stream };
    if stream.release.is_none() {
        return;
    }
    drop(unsafe { Box::from_raw(stream.private_data as *mut StreamPrivate) });
    stream.get_schema = None;
    stream.get_next = None;
    stream.get_last_error = None;
    stream.private_data = ptr::null_mut();
    stream.release = None;
}

/// Exposes a batch reader as a C `ArrowArrayStream`.
pub fn export_reader_stream(reader: Box<dyn RecordBatchReader + Send>) -> ArrowArrayStream {
    let private = Box::new(StreamPrivate { reader, last_error: None });
    ArrowArrayStream {
        get_schema: Some(stream_get_schema),
        get_next: Some(stream_get_next),
        get_last_error: Some(stream_get_last_error),
        release: Some(stream_release),
        private_data: Box::into_raw(private) as *mut c_void,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ArrayData, ArrowType, Field, Table};

    fn table() -> Table {
        let schema = Arc::new(Schema::from(vec![Field::new("x", ArrowType::Int32, true, None)]));
        let col = ArrayData::from_options(ArrowType::Int32, &[Some(1), None, Some(3)]).unwrap();
        let batch = RecordBatch::try_new(schema, vec![col.into_ref()]).unwrap();
        Table::from_batches(vec![batch]).unwrap()
    }

    #[test]
    fn test_export_then_read() {
        let t = table();
        let stream = export_reader_stream(Box::new(t.batch_reader(2)));
        let mut reader = ArrowArrayStreamReader::try_new(stream).unwrap();
        assert_eq!(reader.schema().unwrap().as_ref(), t.schema().as_ref());
        let batches: Vec<RecordBatch> = reader.by_ref().map(|b| b.unwrap()).collect();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].n_rows(), 2);
        assert!(batches[0].column(0).is_null(1));
        assert!(reader.read_next().unwrap().is_none());
    }

    #[test]
    fn test_errno_mapping() {
        assert_eq!(errno_for(&ColbridgeError::invalid("x")), EINVAL);
        assert_eq!(errno_for(&ColbridgeError::not_implemented("x")), ENOSYS);
        assert_eq!(errno_for(&std::io::Error::other("x").into()), EIO);
        assert_eq!(errno_for(&ColbridgeError::ffi("x")), EIO);
    }

    #[test]
    fn test_released_stream_rejected() {
        assert!(ArrowArrayStreamReader::try_new(ArrowArrayStream::empty()).is_err());
    }
}
