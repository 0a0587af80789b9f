//! # **Array Builders** - *Convenience constructors for `ArrayData`*
//!
//! Builds validated `ArrayData` from Rust values: primitives, booleans, strings,
//! binary, fixed-size binary and the nested list / fixed-size list / struct / map
//! layouts. Every constructor routes through [`ArrayData::try_new`].

use std::sync::Arc;

use crate::enums::error::ColbridgeError;
use crate::ffi::arrow_dtype::{ArrowType, PhysicalLayout};
use crate::structs::array_data::{ArrayData, ArrayRef};
use crate::structs::bitmask::Bitmask;
use crate::structs::buffer::Buffer;
use crate::structs::shared_buffer::SharedBuffer;
use crate::traits::type_unions::NativeType;
use crate::Field;

/// Builds a validity mask from option flags, or `None` when every slot is valid.
fn validity_from<I: IntoIterator<Item = bool>>(flags: I) -> Option<Bitmask> {
    let flags: Vec<bool> = flags.into_iter().collect();
    if flags.iter().all(|v| *v) { None } else { Some(Bitmask::from_bools(&flags)) }
}

impl ArrayData {
    /// All-null array of the `Null` type.
    pub fn new_null(len: usize) -> ArrayData {
        ArrayData::try_new(ArrowType::Null, len, 0, None, Vec::new(), Vec::new())
            .unwrap_or_else(|_| unreachable!("null arrays carry no buffers to validate"))
    }

    /// Fixed-width array over `values`, tagged with `dtype`.
    ///
    /// `dtype` must have a fixed bit width equal to `size_of::<T>() * 8`.
    pub fn from_primitive<T: NativeType>(
        dtype: ArrowType,
        values: impl Into<Buffer<T>>,
        nulls: Option<Bitmask>,
    ) -> Result<ArrayData, ColbridgeError> {
        let values = values.into();
        match dtype.layout()? {
            PhysicalLayout::FixedWidth { bit_width } if bit_width == size_of::<T>() * 8 => {}
            _ => {
                return Err(ColbridgeError::TypeError {
                    from: std::any::type_name::<T>().to_string(),
                    to: "fixed-width ArrowType",
                    message: Some(format!(
                        "{} does not store {}-byte values",
                        dtype,
                        size_of::<T>()
                    )),
                });
            }
        }
        let len = values.len();
        ArrayData::try_new(dtype, len, 0, nulls, vec![values.into_shared()], Vec::new())
    }

    /// Fixed-width array from optional values; nulls are stored as `T::default()`.
    pub fn from_options<T: NativeType + Default>(
        dtype: ArrowType,
        values: &[Option<T>],
    ) -> Result<ArrayData, ColbridgeError> {
        let data: Vec<T> = values.iter().map(|v| v.unwrap_or_default()).collect();
        let nulls = validity_from(values.iter().map(Option::is_some));
        ArrayData::from_primitive(dtype, data, nulls)
    }

    /// Boolean array from optional values.
    pub fn from_bools(values: &[Option<bool>]) -> ArrayData {
        let bits: Vec<bool> = values.iter().map(|v| v.unwrap_or(false)).collect();
        let packed = Bitmask::from_bools(&bits);
        let nulls = validity_from(values.iter().map(Option::is_some));
        ArrayData::try_new(
            ArrowType::Boolean,
            values.len(),
            0,
            nulls,
            vec![packed.bits.into_shared()],
            Vec::new(),
        )
        .unwrap_or_else(|e| unreachable!("packed boolean array is well-formed: {}", e))
    }

    /// Utf8 array from optional strings.
    pub fn from_strs<S: AsRef<str>>(values: &[Option<S>]) -> ArrayData {
        let (offsets, bytes) =
            pack_var_len(values.iter().map(|v| v.as_ref().map(|s| s.as_ref().as_bytes())));
        let nulls = validity_from(values.iter().map(Option::is_some));
        Self::var_len_unchecked(ArrowType::String, values.len(), nulls, offsets, bytes)
    }

    /// Binary array from optional byte strings.
    pub fn from_binary<B: AsRef<[u8]>>(values: &[Option<B>]) -> ArrayData {
        let (offsets, bytes) =
            pack_var_len(values.iter().map(|v| v.as_ref().map(|b| b.as_ref())));
        let nulls = validity_from(values.iter().map(Option::is_some));
        Self::var_len_unchecked(ArrowType::Binary, values.len(), nulls, offsets, bytes)
    }

    /// Binary or utf8 array from pre-packed offsets and bytes.
    pub fn from_var_len(
        dtype: ArrowType,
        offsets: Vec<i32>,
        bytes: Vec<u8>,
        nulls: Option<Bitmask>,
    ) -> Result<ArrayData, ColbridgeError> {
        if !matches!(dtype, ArrowType::Binary | ArrowType::String) {
            return Err(ColbridgeError::invalid(format!(
                "{} is not variable-length binary",
                dtype
            )));
        }
        let len = offsets.len().saturating_sub(1);
        ArrayData::try_new(
            dtype,
            len,
            0,
            nulls,
            vec![SharedBuffer::from_vec(offsets), SharedBuffer::from_vec(bytes)],
            Vec::new(),
        )
    }

    fn var_len_unchecked(
        dtype: ArrowType,
        len: usize,
        nulls: Option<Bitmask>,
        offsets: Vec<i32>,
        bytes: Vec<u8>,
    ) -> ArrayData {
        ArrayData::try_new(
            dtype,
            len,
            0,
            nulls,
            vec![SharedBuffer::from_vec(offsets), SharedBuffer::from_vec(bytes)],
            Vec::new(),
        )
        .unwrap_or_else(|e| unreachable!("packed offsets are monotonic: {}", e))
    }

    /// Fixed-size binary array; every valid value must be `width` bytes.
    pub fn from_fixed_size_binary(
        width: i32,
        values: &[Option<&[u8]>],
    ) -> Result<ArrayData, ColbridgeError> {
        let w = usize::try_from(width).map_err(|_| {
            ColbridgeError::invalid(format!("negative fixed-size-binary width {}", width))
        })?;
        let mut bytes = Vec::with_capacity(values.len() * w);
        for v in values {
            match v {
                Some(b) if b.len() == w => bytes.extend_from_slice(b),
                Some(b) => {
                    return Err(ColbridgeError::invalid(format!(
                        "fixed-size-binary value of {} bytes, expected {}",
                        b.len(),
                        w
                    )));
                }
                None => bytes.resize(bytes.len() + w, 0),
            }
        }
        let nulls = validity_from(values.iter().map(Option::is_some));
        ArrayData::try_new(
            ArrowType::FixedSizeBinary(width),
            values.len(),
            0,
            nulls,
            vec![SharedBuffer::from_vec(bytes)],
            Vec::new(),
        )
    }

    /// List array; `offsets` has one more entry than the list has rows.
    pub fn new_list(
        item: Field,
        offsets: Vec<i32>,
        child: ArrayRef,
        nulls: Option<Bitmask>,
    ) -> Result<ArrayData, ColbridgeError> {
        let len = offsets.len().saturating_sub(1);
        ArrayData::try_new(
            ArrowType::List(Box::new(item)),
            len,
            0,
            nulls,
            vec![SharedBuffer::from_vec(offsets)],
            vec![child],
        )
    }

    /// Fixed-size list array of `len` rows, `size` child values each.
    pub fn new_fixed_size_list(
        item: Field,
        size: i32,
        len: usize,
        child: ArrayRef,
        nulls: Option<Bitmask>,
    ) -> Result<ArrayData, ColbridgeError> {
        ArrayData::try_new(
            ArrowType::FixedSizeList(Box::new(item), size),
            len,
            0,
            nulls,
            Vec::new(),
            vec![child],
        )
    }

    /// Struct array of `len` rows.
    pub fn new_struct(
        fields: Vec<Field>,
        children: Vec<ArrayRef>,
        len: usize,
        nulls: Option<Bitmask>,
    ) -> Result<ArrayData, ColbridgeError> {
        ArrayData::try_new(ArrowType::Struct(fields), len, 0, nulls, Vec::new(), children)
    }

    /// Map array over a two-field `entries` struct child.
    pub fn new_map(
        entries: Field,
        offsets: Vec<i32>,
        entries_child: ArrayRef,
        keys_sorted: bool,
        nulls: Option<Bitmask>,
    ) -> Result<ArrayData, ColbridgeError> {
        let len = offsets.len().saturating_sub(1);
        ArrayData::try_new(
            ArrowType::Map(Box::new(entries), keys_sorted),
            len,
            0,
            nulls,
            vec![SharedBuffer::from_vec(offsets)],
            vec![entries_child],
        )
    }

    /// Wraps into a shared handle.
    #[inline]
    pub fn into_ref(self) -> ArrayRef {
        Arc::new(self)
    }
}

/// Packs optional byte strings into i32 offsets and a values buffer.
///
/// Panics if the total byte length exceeds `i32::MAX`.
fn pack_var_len<'a, I>(values: I) -> (Vec<i32>, Vec<u8>)
where
    I: Iterator<Item = Option<&'a [u8]>>,
{
    let mut offsets = vec![0i32];
    let mut bytes = Vec::new();
    for v in values {
        if let Some(b) = v {
            bytes.extend_from_slice(b);
        }
        let end = i32::try_from(bytes.len())
            .unwrap_or_else(|_| panic!("variable-length array exceeds i32 offsets"));
        offsets.push(end);
    }
    (offsets, bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::bitmask::bytes_for_bits;

    #[test]
    fn test_from_primitive_rejects_width_mismatch() {
        let err = ArrayData::from_primitive(ArrowType::Int64, vec![1i32, 2], None);
        assert!(matches!(err, Err(ColbridgeError::TypeError { .. })));
    }

    #[test]
    fn test_bools() {
        let a = ArrayData::from_bools(&[Some(true), None, Some(false)]);
        assert_eq!(a.null_count(), 1);
        assert!(a.bool_value(0));
        assert!(a.is_null(1));
        assert!(!a.bool_value(2));
        assert_eq!(a.buffers()[0].len(), bytes_for_bits(3));
    }

    #[test]
    fn test_fixed_size_binary() {
        let a = ArrayData::from_fixed_size_binary(2, &[Some(&b"ab"[..]), None]).unwrap();
        assert_eq!(a.fixed_value_bytes(0, 2), b"ab");
        assert!(ArrayData::from_fixed_size_binary(2, &[Some(&b"abc"[..])]).is_err());
    }

    #[test]
    fn test_struct_and_map() {
        let k = Field::new("key", ArrowType::String, false, None);
        let v = Field::new("value", ArrowType::Int32, true, None);
        let keys = ArrayData::from_strs(&[Some("a"), Some("b"), Some("c")]).into_ref();
        let vals = ArrayData::from_options(ArrowType::Int32, &[Some(1), None, Some(3)])
            .unwrap()
            .into_ref();
        let entries =
            ArrayData::new_struct(vec![k.clone(), v.clone()], vec![keys, vals], 3, None).unwrap();
        let entries_field = Field::new("entries", entries.dtype().clone(), false, None);
        let map = ArrayData::new_map(entries_field, vec![0, 2, 3], entries.into_ref(), false, None)
            .unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.value_offsets().unwrap(), &[0, 2, 3]);
    }

    #[test]
    fn test_map_requires_two_field_struct() {
        let child = ArrayData::from_options(ArrowType::Int32, &[Some(1)]).unwrap().into_ref();
        let entries = Field::new("entries", ArrowType::Int32, false, None);
        assert!(ArrayData::new_map(entries, vec![0, 1], child, false, None).is_err());
    }
}
