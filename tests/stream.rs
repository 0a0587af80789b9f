//! `ArrowArrayStream` consumption and export.

use std::ffi::{CString, c_char, c_int, c_void};
use std::ptr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use colbridge::{
    ArrayData, ArrowArray, ArrowArrayStream, ArrowArrayStreamReader, ArrowSchema, ArrowType,
    ColbridgeError, Field, RecordBatch, RecordBatchReader, Schema, Table, export_reader_stream,
    export_record_batch, export_schema,
};

const EINVAL: c_int = 22;
const ENOSYS: c_int = 78;

fn schema() -> Arc<Schema> {
    Arc::new(Schema::from(vec![
        Field::new("n", ArrowType::Int32, false, None),
        Field::new("s", ArrowType::String, true, None),
    ]))
}

fn batch(start: i32) -> RecordBatch {
    RecordBatch::try_new(
        schema(),
        vec![
            ArrayData::from_options(ArrowType::Int32, &[Some(start), Some(start + 1)])
                .unwrap()
                .into_ref(),
            ArrayData::from_strs(&[Some("x"), None]).into_ref(),
        ],
    )
    .unwrap()
}

/// A foreign producer that serves `batches`, failing with EINVAL at `fail_at`.
struct Producer {
    batches: Vec<RecordBatch>,
    next: usize,
    fail_at: Option<usize>,
    error: CString,
    releases: Arc<AtomicUsize>,
}

unsafe fn producer<'a>(stream: *mut ArrowArrayStream) -> &'a mut Producer {
    unsafe { &mut *((*stream).private_data as *mut Producer) }
}

unsafe extern "C" fn get_schema(_stream: *mut ArrowArrayStream, out: *mut ArrowSchema) -> c_int {
    match export_schema(&schema()) {
        Ok(s) => {
            unsafe { ptr::write(out, s) };
            0
        }
        Err(_) => EINVAL,
    }
}

unsafe extern "C" fn get_next(stream: *mut ArrowArrayStream, out: *mut ArrowArray) -> c_int {
    let p = unsafe { producer(stream) };
    if p.fail_at == Some(p.next) {
        return EINVAL;
    }
    let Some(batch) = p.batches.get(p.next) else {
        unsafe { ptr::write(out, ArrowArray::empty()) };
        return 0;
    };
    p.next += 1;
    match export_record_batch(batch) {
        Ok((array, _schema)) => {
            unsafe { ptr::write(out, array) };
            0
        }
        Err(_) => EINVAL,
    }
}

unsafe extern "C" fn get_last_error(stream: *mut ArrowArrayStream) -> *const c_char {
    unsafe { producer(stream) }.error.as_ptr()
}

unsafe extern "C" fn release(stream: *mut ArrowArrayStream) {
    let stream = unsafe { &mut *stream };
    let p = unsafe { Box::from_raw(stream.private_data as *mut Producer) };
    p.releases.fetch_add(1, Ordering::SeqCst);
    stream.private_data = ptr::null_mut();
    stream.release = None;
}

fn foreign_stream(
    batches: Vec<RecordBatch>,
    fail_at: Option<usize>,
) -> (ArrowArrayStream, Arc<AtomicUsize>) {
    let releases = Arc::new(AtomicUsize::new(0));
    let p = Box::new(Producer {
        batches,
        next: 0,
        fail_at,
        error: CString::new("producer exploded").unwrap(),
        releases: releases.clone(),
    });
    let stream = ArrowArrayStream {
        get_schema: Some(get_schema),
        get_next: Some(get_next),
        get_last_error: Some(get_last_error),
        release: Some(release),
        private_data: Box::into_raw(p) as *mut c_void,
    };
    (stream, releases)
}

#[test]
fn reads_all_batches_then_end_of_stream() {
    let (mut raw, releases) = foreign_stream(vec![batch(0), batch(10)], None);
    let mut reader = unsafe { ArrowArrayStreamReader::from_raw(&mut raw) }.unwrap();
    assert!(raw.is_released());

    assert_eq!(reader.schema().unwrap().as_ref(), schema().as_ref());
    let batches: Vec<RecordBatch> = reader.by_ref().collect::<Result<_, _>>().unwrap();
    assert_eq!(batches, vec![batch(0), batch(10)]);
    assert!(reader.read_next().unwrap().is_none());
    assert_eq!(releases.load(Ordering::SeqCst), 0);

    drop(reader);
    assert_eq!(releases.load(Ordering::SeqCst), 1);
}

#[test]
fn producer_error_carries_errno_and_message() {
    let (raw, releases) = foreign_stream(vec![batch(0), batch(10)], Some(1));
    let mut reader = ArrowArrayStreamReader::try_new(raw).unwrap();
    assert!(reader.read_next().unwrap().is_some());
    let err = reader.read_next().unwrap_err();
    assert_eq!(
        err,
        ColbridgeError::Stream { errno: EINVAL, message: "producer exploded".into() }
    );
    drop(reader);
    assert_eq!(releases.load(Ordering::SeqCst), 1);
}

/// A reader that fails on the first pull.
struct Broken;

impl RecordBatchReader for Broken {
    fn schema(&mut self) -> Result<Arc<Schema>, ColbridgeError> {
        Ok(schema())
    }

    fn read_next(&mut self) -> Result<Option<RecordBatch>, ColbridgeError> {
        Err(ColbridgeError::not_implemented("no batches here"))
    }
}

#[test]
fn exported_reader_reports_failures() {
    let stream = export_reader_stream(Box::new(Broken));
    let mut reader = ArrowArrayStreamReader::try_new(stream).unwrap();
    match reader.read_next() {
        Err(ColbridgeError::Stream { errno, message }) => {
            assert_eq!(errno, ENOSYS);
            assert!(message.contains("no batches here"), "{}", message);
        }
        other => panic!("expected stream error, got {:?}", other),
    }
}

#[test]
fn exported_table_round_trips() {
    let table = Table::from_batches(vec![batch(0), batch(2), batch(4)]).unwrap();
    let stream = export_reader_stream(Box::new(table.batch_reader(4)));
    let reader = ArrowArrayStreamReader::try_new(stream).unwrap();
    let batches: Vec<RecordBatch> = reader.collect::<Result<_, _>>().unwrap();
    assert_eq!(batches.len(), 3);
    let rebuilt = Table::from_batches(batches).unwrap();
    assert_eq!(rebuilt.n_rows(), 6);
    assert_eq!(rebuilt.batches(), table.batches());
}
