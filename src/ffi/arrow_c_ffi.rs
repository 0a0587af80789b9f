//! # **Arrow-C-FFI Module** - *Share data to another language and/or run-time*
//!
//! Implements the *Apache Arrow* **C Data Interface** ABI for Colbridge, enabling
//! zero-copy data exchange across language boundaries.
//! Compatible with any runtime implementing the Arrow C interface, including Python,
//! C++, Go, Java, and others.
//!
//! ## Features
//! - **ABI structs**: bit-exact `ArrowArray` and `ArrowSchema` layouts plus flag constants.
//! - **Ownership**: both structs release themselves on `Drop` if still live, and the
//!   release callback is invoked at most once. [`move_array`] / [`move_schema`] transfer
//!   ownership out of a foreign-owned struct, leaving it marked released.
//! - **Export**: [`export_array`], [`export_field`], [`export_schema`] and
//!   [`export_record_batch`] produce structs whose pointers are kept alive by a private
//!   holder until the consumer calls `release`.
//!
//! Import lives in [`crate::ffi::import`] and [`crate::ffi::schema`].
//!
//! ## Trademark Notice
//! *Apache Arrow* is a trademark of the Apache Software Foundation, used here under
//! fair-use to implement its published interoperability standard as per
//! https://www.apache.org/foundation/marks/ .

use std::ffi::{CString, c_char, c_void};
use std::ptr;
use std::sync::Arc;

use tracing::trace;

use crate::enums::error::ColbridgeError;
use crate::ffi::arrow_dtype::ArrowType;
use crate::ffi::format::{encode_format, encode_metadata};
use crate::ffi::schema::Schema;
use crate::structs::array_data::{ArrayData, ArrayRef};
use crate::structs::record_batch::RecordBatch;
use crate::Field;

// Provides compatibility with the cross-platform `Apache Arrow` standard
// via the `C Data Interface` specification:
// https://arrow.apache.org/docs/format/CDataInterface.html

/// Dictionary indices are ordered.
pub const ARROW_FLAG_DICTIONARY_ORDERED: i64 = 1;
/// The field is nullable.
pub const ARROW_FLAG_NULLABLE: i64 = 2;
/// Map keys are sorted within each entry.
pub const ARROW_FLAG_MAP_KEYS_SORTED: i64 = 4;

/// ArrowArray as laid out by the Arrow C Data Interface
#[repr(C)]
#[derive(Debug)]
pub struct ArrowArray {
    pub length: i64,
    pub null_count: i64,
    pub offset: i64,
    pub n_buffers: i64,
    pub n_children: i64,
    pub buffers: *mut *const c_void,
    pub children: *mut *mut ArrowArray,
    pub dictionary: *mut ArrowArray,
    pub release: Option<unsafe extern "C" fn(*mut ArrowArray)>,
    pub private_data: *mut c_void,
}

impl ArrowArray {
    /// A released, all-null struct. Also the state a moved-from struct is left in.
    pub fn empty() -> Self {
        Self {
            length: 0,
            null_count: 0,
            offset: 0,
            n_buffers: 0,
            n_children: 0,
            buffers: ptr::null_mut(),
            children: ptr::null_mut(),
            dictionary: ptr::null_mut(),
            release: None,
            private_data: ptr::null_mut(),
        }
    }

    /// True once the release callback has run, or for a moved-from struct.
    #[inline]
    pub fn is_released(&self) -> bool {
        self.release.is_none()
    }
}

impl Drop for ArrowArray {
    fn drop(&mut self) {
        if let Some(release) = self.release {
            unsafe { release(self) };
            self.release = None;
        }
    }
}

/// ArrowSchema as laid out by the Arrow C Data Interface
#[repr(C)]
#[derive(Debug)]
pub struct ArrowSchema {
    pub format: *const c_char,
    pub name: *const c_char,
    pub metadata: *const c_char,
    pub flags: i64,
    pub n_children: i64,
    pub children: *mut *mut ArrowSchema,
    pub dictionary: *mut ArrowSchema,
    pub release: Option<unsafe extern "C" fn(*mut ArrowSchema)>,
    pub private_data: *mut c_void,
}

impl ArrowSchema {
    /// A released, all-null struct. Also the state a moved-from struct is left in.
    pub fn empty() -> Self {
        Self {
            format: ptr::null(),
            name: ptr::null(),
            metadata: ptr::null(),
            flags: 0,
            n_children: 0,
            children: ptr::null_mut(),
            dictionary: ptr::null_mut(),
            release: None,
            private_data: ptr::null_mut(),
        }
    }

    #[inline]
    pub fn is_released(&self) -> bool {
        self.release.is_none()
    }
}

impl Drop for ArrowSchema {
    fn drop(&mut self) {
        if let Some(release) = self.release {
            unsafe { release(self) };
            self.release = None;
        }
    }
}

/// Moves a foreign `ArrowArray` into an owned value, leaving `src` released.
///
/// # Safety
/// `src` must be non-null and point at a valid, initialised `ArrowArray`.
pub unsafe fn move_array(src: *mut ArrowArray) -> ArrowArray {
    unsafe {
        let moved = ptr::read(src);
        ptr::write(src, ArrowArray::empty());
        moved
    }
}

/// Moves a foreign `ArrowSchema` into an owned value, leaving `src` released.
///
/// # Safety
/// `src` must be non-null and point at a valid, initialised `ArrowSchema`.
pub unsafe fn move_schema(src: *mut ArrowSchema) -> ArrowSchema {
    unsafe {
        let moved = ptr::read(src);
        ptr::write(src, ArrowSchema::empty());
        moved
    }
}

/// Keeps the exported array and every pointer handed out alive until release.
struct ArrayHolder {
    _data: ArrayRef,
    _buffers: Box<[*const c_void]>,
    children: Box<[*mut ArrowArray]>,
}

/// Keeps the exported schema strings and children alive until release.
struct SchemaHolder {
    _format: CString,
    _name: CString,
    _metadata: Option<Vec<u8>>,
    children: Box<[*mut ArrowSchema]>,
}

/// Release callback installed on exported arrays.
///
/// Releases any children the consumer has not moved out, frees the holder and marks
/// the struct released.
unsafe extern "C" fn release_exported_array(arr: *mut ArrowArray) {
    if arr.is_null() {
        return;
    }
    let arr = unsafe { &mut *arr };
    if arr.release.is_none() {
        return;
    }
    let holder = unsafe { Box::from_raw(arr.private_data as *mut ArrayHolder) };
    for &child in holder.children.iter() {
        // Dropping the box runs the child's release if it is still live.
        drop(unsafe { Box::from_raw(child) });
    }
    drop(holder);
    arr.release = None;
    arr.private_data = ptr::null_mut();
}

/// Release callback installed on exported schemas.
unsafe extern "C" fn release_exported_schema(s: *mut ArrowSchema) {
    if s.is_null() {
        return;
    }
    let s = unsafe { &mut *s };
    if s.release.is_none() {
        return;
    }
    let holder = unsafe { Box::from_raw(s.private_data as *mut SchemaHolder) };
    for &child in holder.children.iter() {
        drop(unsafe { Box::from_raw(child) });
    }
    drop(holder);
    s.release = None;
    s.private_data = ptr::null_mut();
}

/// Exports an array over the C Data Interface without copying its buffers.
///
/// The returned struct owns a reference to `data`; buffers stay valid until the
/// consumer calls `release` (or the struct is dropped on the Rust side).
pub fn export_array(data: &ArrayRef) -> Result<ArrowArray, ColbridgeError> {
    let layout = data.dtype().layout()?;

    let mut buffers: Vec<*const c_void> = Vec::with_capacity(layout.n_buffers());
    if layout.n_buffers() > 0 {
        let validity = data.nulls().map_or(ptr::null(), |m| m.as_ptr() as *const c_void);
        buffers.push(validity);
        for b in data.buffers() {
            buffers.push(b.as_ptr() as *const c_void);
        }
    }
    let mut buffers = buffers.into_boxed_slice();

    // Export every child before boxing, so a failure drops (and releases) the rest.
    let exported = data.children().iter().map(export_array).collect::<Result<Vec<_>, _>>()?;
    let mut children: Box<[*mut ArrowArray]> =
        exported.into_iter().map(|c| Box::into_raw(Box::new(c))).collect();

    trace!(dtype = %data.dtype(), len = data.len(), "export array");
    let (n_buffers, n_children) = (buffers.len() as i64, children.len() as i64);
    let (buffers_ptr, children_ptr) = (buffers.as_mut_ptr(), children.as_mut_ptr());
    // Boxed slices keep their heap address when moved into the holder.
    let holder = Box::new(ArrayHolder { _data: data.clone(), _buffers: buffers, children });
    Ok(ArrowArray {
        length: data.len() as i64,
        null_count: data.null_count() as i64,
        offset: data.offset() as i64,
        n_buffers,
        n_children,
        buffers: buffers_ptr,
        children: children_ptr,
        dictionary: ptr::null_mut(),
        release: Some(release_exported_array),
        private_data: Box::into_raw(holder) as *mut c_void,
    })
}

/// Exports a field (and its children) as an `ArrowSchema`.
pub fn export_field(field: &Field) -> Result<ArrowSchema, ColbridgeError> {
    let mut flags = 0;
    if field.nullable {
        flags |= ARROW_FLAG_NULLABLE;
    }
    if let ArrowType::Map(_, true) = field.dtype {
        flags |= ARROW_FLAG_MAP_KEYS_SORTED;
    }
    let children = field
        .dtype
        .children()
        .into_iter()
        .map(export_field)
        .collect::<Result<Vec<_>, _>>()?;
    build_schema(&encode_format(&field.dtype), &field.name, &field.metadata, flags, children)
}

/// Exports a schema as a top-level struct (`+s`) `ArrowSchema`.
pub fn export_schema(schema: &Schema) -> Result<ArrowSchema, ColbridgeError> {
    let children = schema.fields.iter().map(export_field).collect::<Result<Vec<_>, _>>()?;
    build_schema("+s", "", &schema.metadata, 0, children)
}

fn build_schema(
    format: &str,
    name: &str,
    metadata: &std::collections::BTreeMap<String, String>,
    flags: i64,
    children: Vec<ArrowSchema>,
) -> Result<ArrowSchema, ColbridgeError> {
    let cstring = |s: &str| {
        CString::new(s)
            .map_err(|_| ColbridgeError::invalid(format!("'{}' contains an interior NUL byte", s)))
    };
    let format_c = cstring(format)?;
    let name_c = cstring(name)?;
    let metadata = encode_metadata(metadata);
    let mut children: Box<[*mut ArrowSchema]> =
        children.into_iter().map(|c| Box::into_raw(Box::new(c))).collect();
    let n_children = children.len() as i64;
    let children_ptr = children.as_mut_ptr();
    let (format_ptr, name_ptr) = (format_c.as_ptr(), name_c.as_ptr());
    let metadata_ptr = metadata.as_ref().map_or(ptr::null(), |m| m.as_ptr() as *const c_char);
    let holder = Box::new(SchemaHolder {
        _format: format_c,
        _name: name_c,
        _metadata: metadata,
        children,
    });
    Ok(ArrowSchema {
        format: format_ptr,
        name: name_ptr,
        metadata: metadata_ptr,
        flags,
        n_children,
        children: children_ptr,
        dictionary: ptr::null_mut(),
        release: Some(release_exported_schema),
        private_data: Box::into_raw(holder) as *mut c_void,
    })
}

/// Exports a record batch as a top-level struct array plus its schema.
pub fn export_record_batch(
    batch: &RecordBatch,
) -> Result<(ArrowArray, ArrowSchema), ColbridgeError> {
    let fields = batch.schema().fields.clone();
    let data = ArrayData::new_struct(fields, batch.columns().to_vec(), batch.n_rows(), None)?;
    let array = export_array(&Arc::new(data))?;
    let schema = export_schema(batch.schema())?;
    Ok((array, schema))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CStr;

    #[test]
    fn test_export_array_layout() {
        let data = ArrayData::from_options(crate::ArrowType::Int32, &[Some(1), None, Some(3)])
            .unwrap()
            .into_ref();
        let mut arr = export_array(&data).unwrap();
        assert_eq!(arr.length, 3);
        assert_eq!(arr.null_count, 1);
        assert_eq!(arr.n_buffers, 2);
        let values = unsafe { *arr.buffers.add(1) } as *const i32;
        assert_eq!(unsafe { *values.add(2) }, 3);
        // Holder keeps a reference alive until release.
        assert_eq!(Arc::strong_count(&data), 2);
        unsafe { (arr.release.unwrap())(&mut arr) };
        assert!(arr.is_released());
        assert_eq!(Arc::strong_count(&data), 1);
    }

    #[test]
    fn test_drop_releases_once() {
        let data = ArrayData::from_strs(&[Some("a")]).into_ref();
        {
            let _arr = export_array(&data).unwrap();
            assert_eq!(Arc::strong_count(&data), 2);
        }
        assert_eq!(Arc::strong_count(&data), 1);
    }

    #[test]
    fn test_export_field_strings_and_flags() {
        let field = Field::new("col", ArrowType::Decimal128(16, 4), true, None);
        let s = export_field(&field).unwrap();
        assert_eq!(unsafe { CStr::from_ptr(s.format) }.to_str().unwrap(), "d:16,4");
        assert_eq!(unsafe { CStr::from_ptr(s.name) }.to_str().unwrap(), "col");
        assert_eq!(s.flags & ARROW_FLAG_NULLABLE, ARROW_FLAG_NULLABLE);
        assert!(s.metadata.is_null());
    }

    #[test]
    fn test_move_leaves_source_released() {
        let data = ArrayData::from_strs(&[Some("a")]).into_ref();
        let mut src = export_array(&data).unwrap();
        let moved = unsafe { move_array(&mut src) };
        assert!(src.is_released());
        assert!(!moved.is_released());
        drop(moved);
        assert_eq!(Arc::strong_count(&data), 1);
    }

    #[test]
    fn test_interior_nul_rejected() {
        let field = Field::new("a\0b", ArrowType::Int8, false, None);
        assert!(export_field(&field).is_err());
    }
}
