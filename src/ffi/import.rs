//! # **Import Module** - *Zero-copy import of foreign C Data Interface arrays*
//!
//! Turns a foreign-owned `ArrowArray` into an [`ArrayRef`] whose buffers alias the
//! foreign memory directly.
//!
//! ## Ownership
//! - The root `ArrowArray` is moved out of the caller's struct (which is left
//!   released) into an [`ImportedArray`] guard shared through an `Arc`.
//! - Every imported buffer, at every depth, holds a clone of that `Arc`. The foreign
//!   release callback runs once, when the last buffer view is dropped, or
//!   immediately if the import fails.
//! - Children are not moved; the root release callback owns and frees them.
//!
//! ## Per-node steps
//! 1. Check the child count for the expected type and import each child.
//! 2. Check the buffer count for the expected type.
//! 3. Build the validity view: `ceil((offset + length) / 8)` bytes when `null_count > 0`.
//! 4. Build value views sized from the type, reading variable-length value sizes from
//!    the last entry of the already-decoded offsets buffer.
//! 5. Validate the assembled node like any other `ArrayData`.
//!
//! Buffers misaligned for their element width are copied once, with a warning; every
//! other buffer is a zero-copy view.

use std::sync::Arc;

use tracing::trace;

use crate::enums::error::ColbridgeError;
use crate::ffi::arrow_c_ffi::{ArrowArray, ArrowSchema, move_array};
use crate::ffi::arrow_dtype::{ArrowType, PhysicalLayout};
use crate::ffi::schema::{Schema, import_field};
use crate::structs::array_data::{ArrayData, ArrayRef};
use crate::structs::bitmask::{Bitmask, bytes_for_bits};
use crate::structs::buffer::Buffer;
use crate::structs::field::Field;
use crate::structs::record_batch::RecordBatch;
use crate::structs::shared_buffer::{BufferOwner, SharedBuffer};
use crate::traits::type_unions::NativeType;

/// Owns a moved foreign `ArrowArray`; dropping it runs the release callback once.
pub struct ImportedArray {
    array: ArrowArray,
}

// The guard only hands out immutable views and releases from a single drop.
unsafe impl Send for ImportedArray {}
unsafe impl Sync for ImportedArray {}

impl ImportedArray {
    /// Moves the array behind `src` into a new guard.
    ///
    /// # Safety
    /// `src` must be null or point at a valid `ArrowArray`.
    pub unsafe fn take(src: *mut ArrowArray) -> Result<Self, ColbridgeError> {
        if src.is_null() {
            return Err(ColbridgeError::ffi("null ArrowArray pointer"));
        }
        if unsafe { (*src).is_released() } {
            return Err(ColbridgeError::ffi("ArrowArray has already been released"));
        }
        Ok(Self { array: unsafe { move_array(src) } })
    }

    #[inline]
    pub fn array(&self) -> &ArrowArray {
        &self.array
    }
}

impl Drop for ImportedArray {
    fn drop(&mut self) {
        trace!(len = self.array.length, "releasing imported ArrowArray");
        // `self.array` releases itself when dropped.
    }
}

/// Imports a foreign array as `dtype`, consuming it.
///
/// On success the returned array aliases the foreign buffers. On any error the
/// foreign release callback has already run by the time this returns.
///
/// # Safety
/// `array` must be null or point at a valid `ArrowArray` produced according to the
/// C Data Interface, whose layout matches `dtype`.
pub unsafe fn import_array(
    array: *mut ArrowArray,
    dtype: &ArrowType,
) -> Result<ArrayRef, ColbridgeError> {
    let guard = Arc::new(unsafe { ImportedArray::take(array)? });
    unsafe { import_guarded(guard, dtype) }
}

/// Imports an array together with its schema, consuming both.
///
/// Both structs are released on every error path.
///
/// # Safety
/// As for [`import_array`] and [`import_field`].
pub unsafe fn import_array_with_schema(
    array: *mut ArrowArray,
    schema: *mut ArrowSchema,
) -> Result<(Field, ArrayRef), ColbridgeError> {
    // Take both before inspecting either, so neither leaks if the other is bad.
    let guard = unsafe { ImportedArray::take(array) };
    let field = unsafe { import_field(schema) };
    let (guard, field) = (guard?, field?);
    let data = unsafe { import_guarded(Arc::new(guard), &field.dtype)? };
    Ok((field, data))
}

/// Imports a top-level struct array and its `+s` schema as a record batch.
///
/// # Safety
/// As for [`import_array_with_schema`].
pub unsafe fn import_record_batch(
    array: *mut ArrowArray,
    schema: *mut ArrowSchema,
) -> Result<RecordBatch, ColbridgeError> {
    let (field, data) = unsafe { import_array_with_schema(array, schema)? };
    let ArrowType::Struct(fields) = field.dtype else {
        return Err(ColbridgeError::invalid(format!(
            "record batch must be a struct array, got {}",
            field.dtype
        )));
    };
    struct_to_batch(&data, Arc::new(Schema::new(fields, field.metadata)))
}

/// Imports a top-level struct array against an already-known schema.
///
/// # Safety
/// As for [`import_array`].
pub unsafe fn import_record_batch_with_schema(
    array: *mut ArrowArray,
    schema: &Arc<Schema>,
) -> Result<RecordBatch, ColbridgeError> {
    let dtype = ArrowType::Struct(schema.fields.clone());
    let data = unsafe { import_array(array, &dtype)? };
    struct_to_batch(&data, schema.clone())
}

/// Splits a struct array into batch columns, applying the parent window to each child.
fn struct_to_batch(data: &ArrayData, schema: Arc<Schema>) -> Result<RecordBatch, ColbridgeError> {
    if data.null_count() > 0 {
        return Err(ColbridgeError::invalid(format!(
            "record batch struct array has {} top-level nulls",
            data.null_count()
        )));
    }
    let columns = data
        .children()
        .iter()
        .map(|c| Arc::new(c.slice(data.offset(), data.len())))
        .collect();
    RecordBatch::try_new_with_rows(schema, columns, data.len())
}

unsafe fn import_guarded(
    guard: Arc<ImportedArray>,
    dtype: &ArrowType,
) -> Result<ArrayRef, ColbridgeError> {
    let owner: BufferOwner = guard.clone();
    let data = unsafe { import_node(guard.array(), dtype, &owner)? };
    Ok(Arc::new(data))
}

/// Reads pointer slot `i` of a C pointer array.
#[inline]
unsafe fn slot<T>(base: *mut *const T, i: usize) -> *const T {
    unsafe { *base.add(i) }
}

unsafe fn import_node(
    arr: &ArrowArray,
    dtype: &ArrowType,
    owner: &BufferOwner,
) -> Result<ArrayData, ColbridgeError> {
    let len = usize::try_from(arr.length)
        .map_err(|_| ColbridgeError::invalid(format!("negative length {} for {}", arr.length, dtype)))?;
    let offset = usize::try_from(arr.offset)
        .map_err(|_| ColbridgeError::invalid(format!("negative offset {} for {}", arr.offset, dtype)))?;
    if arr.null_count < -1 {
        return Err(ColbridgeError::invalid(format!(
            "invalid null_count {} for {}",
            arr.null_count, dtype
        )));
    }
    if !arr.dictionary.is_null() {
        return Err(ColbridgeError::not_implemented("dictionary-encoded arrays are not supported"));
    }
    let layout = dtype.layout()?;

    // Children
    if arr.n_children != layout.n_children() as i64 {
        return Err(ColbridgeError::ChildCountMismatch {
            dtype: dtype.to_string(),
            expected: layout.n_children(),
            found: arr.n_children,
        });
    }
    if layout.n_children() > 0 && arr.children.is_null() {
        return Err(ColbridgeError::invalid(format!("{} has a null children pointer", dtype)));
    }
    let mut children = Vec::with_capacity(layout.n_children());
    for (i, field) in dtype.children().into_iter().enumerate() {
        let child = unsafe { *arr.children.add(i) };
        if child.is_null() {
            return Err(ColbridgeError::invalid(format!("child {} of {} is null", i, dtype)));
        }
        children.push(Arc::new(unsafe { import_node(&*child, &field.dtype, owner)? }));
    }

    // Buffers
    if arr.n_buffers != layout.n_buffers() as i64 {
        return Err(ColbridgeError::BufferCountMismatch {
            dtype: dtype.to_string(),
            expected: layout.n_buffers(),
            found: arr.n_buffers,
        });
    }
    if layout.n_buffers() > 0 && arr.buffers.is_null() {
        return Err(ColbridgeError::invalid(format!("{} has a null buffers pointer", dtype)));
    }
    let end = offset + len;
    let buffer = |i: usize, size: usize| -> Result<SharedBuffer, ColbridgeError> {
        let ptr = unsafe { slot(arr.buffers, i) } as *const u8;
        if ptr.is_null() && size > 0 {
            return Err(ColbridgeError::invalid(format!(
                "buffer {} of {} is null but {} bytes are required",
                i, dtype, size
            )));
        }
        Ok(unsafe { SharedBuffer::from_foreign(ptr, size, owner.clone()) })
    };

    let (nulls, null_count) = if layout.n_buffers() == 0 {
        (None, len)
    } else {
        let validity = unsafe { slot(arr.buffers, 0) } as *const u8;
        match (arr.null_count, validity.is_null()) {
            (0, _) | (-1, true) => (None, 0),
            (n, true) => {
                return Err(ColbridgeError::invalid(format!(
                    "ArrowArray struct has null bitmap buffer, but non-zero null_count {}",
                    n
                )));
            }
            (n, false) => {
                let mask = Bitmask::from_shared(buffer(0, bytes_for_bits(end))?, end)?;
                let n = if n == -1 { mask.count_zeros_in(offset, len) } else { n as usize };
                (Some(mask), n)
            }
        }
    };

    let buffers = match layout {
        PhysicalLayout::Null => Vec::new(),
        PhysicalLayout::FixedWidth { bit_width } => {
            let size = match bit_width {
                1 => bytes_for_bits(end),
                b if b % 8 == 0 => b / 8 * end,
                b => {
                    return Err(ColbridgeError::UnsupportedBitWidth {
                        dtype: dtype.to_string(),
                        bits: b,
                    });
                }
            };
            vec![realign(buffer(1, size)?, bit_width)?]
        }
        PhysicalLayout::VariableBinary => {
            let offsets = import_offsets(&buffer, end)?;
            let values_len = last_offset(&offsets, end, dtype)?;
            vec![offsets, buffer(2, values_len)?]
        }
        PhysicalLayout::List => vec![import_offsets(&buffer, end)?],
        PhysicalLayout::FixedSizeList { .. } | PhysicalLayout::Struct { .. } => Vec::new(),
    };

    trace!(dtype = %dtype, len, offset, null_count, "imported array node");
    ArrayData::try_new_with_null_count(
        dtype.clone(),
        len,
        offset,
        nulls,
        buffers,
        children,
        Some(null_count),
    )
}

/// Offsets view of `end + 1` entries; a zero-length array may omit the buffer.
fn import_offsets<F>(buffer: &F, end: usize) -> Result<SharedBuffer, ColbridgeError>
where
    F: Fn(usize, usize) -> Result<SharedBuffer, ColbridgeError>,
{
    if end == 0 {
        if let Ok(b) = buffer(1, 4) {
            return realign_as::<i32>(b);
        }
        return Ok(SharedBuffer::new());
    }
    realign_as::<i32>(buffer(1, 4 * (end + 1))?)
}

fn last_offset(offsets: &SharedBuffer, end: usize, dtype: &ArrowType) -> Result<usize, ColbridgeError> {
    let Some(&last) = offsets.typed::<i32>()?.get(end) else {
        return Ok(0);
    };
    usize::try_from(last)
        .map_err(|_| ColbridgeError::invalid(format!("{} has negative final offset {}", dtype, last)))
}

/// Copies a region into aligned storage when its start is misaligned for `bit_width`.
fn realign(region: SharedBuffer, bit_width: usize) -> Result<SharedBuffer, ColbridgeError> {
    match bit_width {
        16 => realign_as::<u16>(region),
        32 => realign_as::<u32>(region),
        64 => realign_as::<u64>(region),
        128 => realign_as::<i128>(region),
        _ => Ok(region),
    }
}

fn realign_as<T: NativeType>(region: SharedBuffer) -> Result<SharedBuffer, ColbridgeError> {
    if region.is_aligned_for::<T>() {
        return Ok(region);
    }
    Ok(Buffer::<T>::from_shared(region)?.into_shared())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::arrow_c_ffi::{export_array, export_field};

    #[test]
    fn test_round_trip_primitive_zero_copy() {
        let data = ArrayData::from_options(ArrowType::Int64, &[Some(7i64), None, Some(9)])
            .unwrap()
            .into_ref();
        let mut exported = export_array(&data).unwrap();
        let imported = unsafe { import_array(&mut exported, &ArrowType::Int64) }.unwrap();
        assert!(exported.is_released());
        assert_eq!(*imported, *data);
        assert_eq!(
            imported.values::<i64>().unwrap().as_ptr(),
            data.values::<i64>().unwrap().as_ptr()
        );
    }

    #[test]
    fn test_wrong_type_releases() {
        let data = ArrayData::from_strs(&[Some("a")]).into_ref();
        let mut exported = export_array(&data).unwrap();
        let err = unsafe { import_array(&mut exported, &ArrowType::Int32) }.unwrap_err();
        assert_eq!(
            err,
            ColbridgeError::BufferCountMismatch { dtype: "Int32".into(), expected: 2, found: 3 }
        );
        assert!(exported.is_released());
        assert_eq!(Arc::strong_count(&data), 1);
    }

    #[test]
    fn test_with_schema_sliced() {
        let data = ArrayData::from_strs(&[Some("a"), None, Some("ccc"), Some("dd")]);
        let sliced = Arc::new(data.slice(1, 3));
        let field = Field::new("s", ArrowType::String, true, None);
        let mut arr = export_array(&sliced).unwrap();
        let mut sch = export_field(&field).unwrap();
        let (f, imported) = unsafe { import_array_with_schema(&mut arr, &mut sch) }.unwrap();
        assert_eq!(f, field);
        assert_eq!(imported.offset(), 1);
        assert_eq!(*imported, *sliced);
    }

    #[test]
    fn test_null_pointer() {
        let err = unsafe { import_array(std::ptr::null_mut(), &ArrowType::Int8) };
        assert!(matches!(err, Err(ColbridgeError::Ffi { .. })));
    }
}
