//! # **ArrayData Module** - *Generic Arrow-layout array*
//!
//! `ArrayData` is the single in-memory array representation used throughout
//! Colbridge: imported foreign arrays, arrays built in Rust, and the utf8
//! intermediates of the CSV encoder all share it.
//!
//! ## Layout
//! - `dtype` selects a [`PhysicalLayout`]; `buffers` holds every buffer of that layout
//!   **except** validity, which lives in `nulls`.
//! - `offset` is a base offset into all buffers (and struct / fixed-size-list children),
//!   supporting zero-copy slicing. The validity mask covers `offset + len` bits.
//! - Children are reference-counted, so a child may outlive its parent.
//!
//! ## Invariants
//! - `null_count == 0` implies validity is not consulted; `null_count > 0` requires a mask.
//! - Offsets buffers hold at least `offset + len + 1` non-decreasing `i32` entries.
//! - All invariants are checked by [`ArrayData::try_new`]; foreign imports go through
//!   the same validation.

use std::fmt;
use std::mem;
use std::sync::Arc;

use crate::enums::error::ColbridgeError;
use crate::ffi::arrow_dtype::{ArrowType, PhysicalLayout};
use crate::structs::bitmask::{Bitmask, bytes_for_bits, get_bit};
use crate::structs::shared_buffer::SharedBuffer;
use crate::traits::type_unions::NativeType;

/// Shared, immutable array handle.
pub type ArrayRef = Arc<ArrayData>;

/// Generic Arrow-layout array.
#[derive(Clone)]
pub struct ArrayData {
    dtype: ArrowType,
    len: usize,
    offset: usize,
    null_count: usize,
    nulls: Option<Bitmask>,
    buffers: Vec<SharedBuffer>,
    children: Vec<ArrayRef>,
}

impl ArrayData {
    /// Validating constructor. The null count is derived from `nulls`.
    pub fn try_new(
        dtype: ArrowType,
        len: usize,
        offset: usize,
        nulls: Option<Bitmask>,
        buffers: Vec<SharedBuffer>,
        children: Vec<ArrayRef>,
    ) -> Result<Self, ColbridgeError> {
        Self::try_new_with_null_count(dtype, len, offset, nulls, buffers, children, None)
    }

    /// Validating constructor with a caller-supplied null count.
    ///
    /// `None` derives the count from `nulls`. A supplied count of zero drops the mask.
    pub(crate) fn try_new_with_null_count(
        dtype: ArrowType,
        len: usize,
        offset: usize,
        nulls: Option<Bitmask>,
        buffers: Vec<SharedBuffer>,
        children: Vec<ArrayRef>,
        null_count: Option<usize>,
    ) -> Result<Self, ColbridgeError> {
        let layout = dtype.layout()?;
        if let PhysicalLayout::Null = layout {
            let data = Self {
                dtype,
                len,
                offset,
                null_count: len,
                nulls: None,
                buffers,
                children,
            };
            data.validate(&layout)?;
            return Ok(data);
        }

        if let Some(mask) = &nulls {
            if mask.len() < offset + len {
                return Err(ColbridgeError::invalid(format!(
                    "validity bitmap of {} bits is shorter than offset + length {}",
                    mask.len(),
                    offset + len
                )));
            }
        }
        let null_count = match (null_count, &nulls) {
            (Some(n), _) => n,
            (None, Some(mask)) => mask.count_zeros_in(offset, len),
            (None, None) => 0,
        };
        if null_count > len {
            return Err(ColbridgeError::invalid(format!(
                "null count {} exceeds length {}",
                null_count, len
            )));
        }
        if null_count > 0 && nulls.is_none() {
            return Err(ColbridgeError::invalid(format!(
                "{} array has null count {} but no validity bitmap",
                dtype, null_count
            )));
        }
        let nulls = if null_count == 0 { None } else { nulls };

        let data = Self { dtype, len, offset, null_count, nulls, buffers, children };
        data.validate(&layout)?;
        Ok(data)
    }

    fn validate(&self, layout: &PhysicalLayout) -> Result<(), ColbridgeError> {
        let expected_buffers = layout.n_buffers().saturating_sub(1);
        if self.buffers.len() != expected_buffers {
            return Err(ColbridgeError::BufferCountMismatch {
                dtype: self.dtype.to_string(),
                expected: layout.n_buffers(),
                found: self.buffers.len() as i64 + 1,
            });
        }
        if self.children.len() != layout.n_children() {
            return Err(ColbridgeError::ChildCountMismatch {
                dtype: self.dtype.to_string(),
                expected: layout.n_children(),
                found: self.children.len() as i64,
            });
        }
        for (child, field) in self.children.iter().zip(self.dtype.children()) {
            if child.dtype != field.dtype {
                return Err(ColbridgeError::invalid(format!(
                    "child '{}' of {} has type {}, expected {}",
                    field.name, self.dtype, child.dtype, field.dtype
                )));
            }
        }

        let end = self.offset + self.len;
        match *layout {
            PhysicalLayout::Null => Ok(()),
            PhysicalLayout::FixedWidth { bit_width } => {
                let need = if bit_width == 1 {
                    bytes_for_bits(end)
                } else {
                    end * (bit_width / 8)
                };
                if self.buffers[0].len() < need {
                    return Err(ColbridgeError::invalid(format!(
                        "{} values buffer has {} bytes, needs {}",
                        self.dtype,
                        self.buffers[0].len(),
                        need
                    )));
                }
                Ok(())
            }
            PhysicalLayout::VariableBinary => {
                let last = self.check_offsets()?;
                if last > self.buffers[1].len() {
                    return Err(ColbridgeError::invalid(format!(
                        "{} last offset {} exceeds values buffer of {} bytes",
                        self.dtype,
                        last,
                        self.buffers[1].len()
                    )));
                }
                Ok(())
            }
            PhysicalLayout::List => {
                let last = self.check_offsets()?;
                if let ArrowType::Map(entries, _) = &self.dtype {
                    match &entries.dtype {
                        ArrowType::Struct(kv) if kv.len() == 2 => {}
                        other => {
                            return Err(ColbridgeError::invalid(format!(
                                "map entries must be a struct of two fields, got {}",
                                other
                            )));
                        }
                    }
                }
                if last > self.children[0].len {
                    return Err(ColbridgeError::invalid(format!(
                        "{} last offset {} exceeds child length {}",
                        self.dtype, last, self.children[0].len
                    )));
                }
                Ok(())
            }
            PhysicalLayout::FixedSizeList { size } => {
                if self.children[0].len < end * size {
                    return Err(ColbridgeError::invalid(format!(
                        "{} child has {} values, needs {}",
                        self.dtype,
                        self.children[0].len,
                        end * size
                    )));
                }
                Ok(())
            }
            PhysicalLayout::Struct { .. } => {
                for (i, child) in self.children.iter().enumerate() {
                    if child.len < end {
                        return Err(ColbridgeError::invalid(format!(
                            "struct child {} has length {}, needs {}",
                            i, child.len, end
                        )));
                    }
                }
                Ok(())
            }
        }
    }

    /// Checks the offsets window and returns its last entry.
    fn check_offsets(&self) -> Result<usize, ColbridgeError> {
        let offsets = self.value_offsets()?;
        let mut prev = offsets[0];
        if prev < 0 {
            return Err(ColbridgeError::invalid(format!(
                "{} offsets start at negative value {}",
                self.dtype, prev
            )));
        }
        for (i, &cur) in offsets.iter().enumerate().skip(1) {
            if cur < prev {
                return Err(ColbridgeError::invalid(format!(
                    "{} offsets not monotonically non-decreasing at {}: {} < {}",
                    self.dtype, i, cur, prev
                )));
            }
            prev = cur;
        }
        Ok(prev as usize)
    }

    #[inline]
    pub fn dtype(&self) -> &ArrowType {
        &self.dtype
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Base offset into the buffers.
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[inline]
    pub fn null_count(&self) -> usize {
        self.null_count
    }

    /// Validity mask covering `offset + len` bits, absent when there are no nulls.
    #[inline]
    pub fn nulls(&self) -> Option<&Bitmask> {
        self.nulls.as_ref()
    }

    /// Non-validity buffers in C Data Interface order.
    #[inline]
    pub fn buffers(&self) -> &[SharedBuffer] {
        &self.buffers
    }

    #[inline]
    pub fn children(&self) -> &[ArrayRef] {
        &self.children
    }

    /// Returns true if row `i` holds a value.
    #[inline]
    pub fn is_valid(&self, i: usize) -> bool {
        debug_assert!(i < self.len);
        if matches!(self.dtype, ArrowType::Null) {
            return false;
        }
        match &self.nulls {
            Some(mask) => mask.get(self.offset + i),
            None => true,
        }
    }

    #[inline]
    pub fn is_null(&self, i: usize) -> bool {
        !self.is_valid(i)
    }

    /// Zero-copy slice of `len` rows starting at row `offset`.
    ///
    /// Panics if the range is out of bounds.
    pub fn slice(&self, offset: usize, len: usize) -> ArrayData {
        assert!(
            offset + len <= self.len,
            "ArrayData::slice: {}+{} out of bounds for length {}",
            offset,
            len,
            self.len
        );
        let new_offset = self.offset + offset;
        let null_count = match (&self.dtype, &self.nulls) {
            (ArrowType::Null, _) => len,
            (_, Some(mask)) => mask.count_zeros_in(new_offset, len),
            (_, None) => 0,
        };
        ArrayData {
            dtype: self.dtype.clone(),
            len,
            offset: new_offset,
            null_count,
            nulls: if null_count == 0 { None } else { self.nulls.clone() },
            buffers: self.buffers.clone(),
            children: self.children.clone(),
        }
    }

    /// Typed view over the values of a fixed-width array, windowed to this slice.
    pub fn values<T: NativeType>(&self) -> Result<&[T], ColbridgeError> {
        match self.dtype.layout()? {
            PhysicalLayout::FixedWidth { bit_width } if bit_width == mem::size_of::<T>() * 8 => {
                let all = self.buffers[0].typed::<T>()?;
                Ok(&all[self.offset..self.offset + self.len])
            }
            _ => Err(ColbridgeError::TypeError {
                from: self.dtype.to_string(),
                to: std::any::type_name::<T>(),
                message: Some("element width does not match".into()),
            }),
        }
    }

    /// Raw bytes of fixed-width value `i`, for widths that are whole bytes.
    #[inline]
    pub fn fixed_value_bytes(&self, i: usize, byte_width: usize) -> &[u8] {
        let start = (self.offset + i) * byte_width;
        &self.buffers[0].as_slice()[start..start + byte_width]
    }

    /// Boolean value at row `i`.
    #[inline]
    pub fn bool_value(&self, i: usize) -> bool {
        get_bit(self.buffers[0].as_slice(), self.offset + i)
    }

    /// Offsets window `[offset, offset + len]` of a variable-length or list array.
    pub fn value_offsets(&self) -> Result<&[i32], ColbridgeError> {
        match self.dtype.layout()? {
            PhysicalLayout::VariableBinary | PhysicalLayout::List => {}
            _ => {
                return Err(ColbridgeError::invalid(format!(
                    "{} has no offsets buffer",
                    self.dtype
                )));
            }
        }
        let all = self.buffers[0].typed::<i32>()?;
        if all.is_empty() && self.offset + self.len == 0 {
            return Ok(&[0]);
        }
        let end = self.offset + self.len;
        if all.len() < end + 1 {
            return Err(ColbridgeError::invalid(format!(
                "{} offsets buffer has {} entries, needs {}",
                self.dtype,
                all.len(),
                end + 1
            )));
        }
        Ok(&all[self.offset..=end])
    }

    /// Borrowed accessor for binary and utf8 arrays.
    pub fn binary_view(&self) -> Result<BinaryView<'_>, ColbridgeError> {
        match self.dtype {
            ArrowType::Binary | ArrowType::String => Ok(BinaryView {
                data: self,
                offsets: self.value_offsets()?,
                values: self.buffers[1].as_slice(),
            }),
            _ => Err(ColbridgeError::invalid(format!(
                "{} is not a binary or utf8 array",
                self.dtype
            ))),
        }
    }

    /// Compares row `i` of `self` with row `j` of `other`, validity included.
    fn elem_eq(&self, i: usize, other: &ArrayData, j: usize) -> bool {
        let (va, vb) = (self.is_valid(i), other.is_valid(j));
        if va != vb {
            return false;
        }
        if !va {
            return true;
        }
        let layout = match self.dtype.layout() {
            Ok(l) => l,
            Err(_) => return false,
        };
        match layout {
            PhysicalLayout::Null => true,
            PhysicalLayout::FixedWidth { bit_width: 1 } => self.bool_value(i) == other.bool_value(j),
            PhysicalLayout::FixedWidth { bit_width } => {
                let w = bit_width / 8;
                self.fixed_value_bytes(i, w) == other.fixed_value_bytes(j, w)
            }
            PhysicalLayout::VariableBinary => {
                match (self.binary_view(), other.binary_view()) {
                    (Ok(a), Ok(b)) => a.value(i) == b.value(j),
                    _ => false,
                }
            }
            PhysicalLayout::List => {
                let (Ok(oa), Ok(ob)) = (self.value_offsets(), other.value_offsets()) else {
                    return false;
                };
                let (sa, ea) = (oa[i] as usize, oa[i + 1] as usize);
                let (sb, eb) = (ob[j] as usize, ob[j + 1] as usize);
                if ea - sa != eb - sb {
                    return false;
                }
                let (ca, cb) = (&self.children[0], &other.children[0]);
                (0..ea - sa).all(|k| ca.elem_eq(sa + k, cb, sb + k))
            }
            PhysicalLayout::FixedSizeList { size } => {
                let (ca, cb) = (&self.children[0], &other.children[0]);
                let (sa, sb) = ((self.offset + i) * size, (other.offset + j) * size);
                (0..size).all(|k| ca.elem_eq(sa + k, cb, sb + k))
            }
            PhysicalLayout::Struct { .. } => self
                .children
                .iter()
                .zip(&other.children)
                .all(|(ca, cb)| ca.elem_eq(self.offset + i, cb, other.offset + j)),
        }
    }
}

/// Logical equality: same type, length and validity, and equal values at every
/// valid row. Offsets, buffer identity and bytes behind nulls are ignored.
impl PartialEq for ArrayData {
    fn eq(&self, other: &Self) -> bool {
        self.dtype == other.dtype
            && self.len == other.len
            && self.null_count == other.null_count
            && (0..self.len).all(|i| self.elem_eq(i, other, i))
    }
}

impl fmt::Debug for ArrayData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayData")
            .field("dtype", &self.dtype)
            .field("len", &self.len)
            .field("offset", &self.offset)
            .field("null_count", &self.null_count)
            .field("buffers", &self.buffers)
            .field("children", &self.children)
            .finish()
    }
}

/// Borrowed row accessor over a binary or utf8 `ArrayData`.
#[derive(Clone, Copy)]
pub struct BinaryView<'a> {
    data: &'a ArrayData,
    offsets: &'a [i32],
    values: &'a [u8],
}

impl<'a> BinaryView<'a> {
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.len == 0
    }

    #[inline]
    pub fn is_null(&self, i: usize) -> bool {
        self.data.is_null(i)
    }

    /// Bytes of row `i`, empty for nulls that carry no data.
    #[inline]
    pub fn value(&self, i: usize) -> &'a [u8] {
        let start = self.offsets[i] as usize;
        let end = self.offsets[i + 1] as usize;
        &self.values[start..end]
    }

    /// `None` for null rows.
    #[inline]
    pub fn get(&self, i: usize) -> Option<&'a [u8]> {
        if self.is_null(i) { None } else { Some(self.value(i)) }
    }
}
