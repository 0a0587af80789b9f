//! # **Bitmask Module** - *Fast Bitpacked Byte Bitmask*
//!
//! Arrow-compatible, packed validity/boolean bitmask.
//!
//! ## Purpose
//! - Validity (null) masks for all array types (1 = valid, 0 = null).
//! - Backing storage for boolean values.
//!
//! ## Behaviour
//! - LSB corresponds to the first logical element.
//! - The mask of an `ArrayData` covers `offset + len` bits, so slicing an array never
//!   touches its bitmask.
//!
//! ## Interop
//! - Memory layout matches Arrow, and is safe to pass over the Arrow C Data Interface.

use std::fmt::{Debug, Formatter, Result as FmtResult};

use crate::enums::error::ColbridgeError;
use crate::structs::buffer::Buffer;
use crate::structs::shared_buffer::SharedBuffer;

/// Reads bit `i` of an LSB-first packed byte slice.
#[inline(always)]
pub fn get_bit(bytes: &[u8], i: usize) -> bool {
    (bytes[i >> 3] >> (i & 7)) & 1 == 1
}

/// Number of bytes needed to hold `bits` bits.
#[inline(always)]
pub fn bytes_for_bits(bits: usize) -> usize {
    bits.div_ceil(8)
}

/// # Bitmask
///
/// Packed bitmask.
///
/// ### Description
/// - Used for boolean data and as the validity/null mask for all datatypes.
/// - Arrow-compatible: LSB = first element, 1 = set/valid, 0 = cleared/null.
///
/// # Example
/// ```rust
/// use colbridge::Bitmask;
///
/// let mut m = Bitmask::new_set_all(10, false);
/// m.set(3, true);
/// m.set(7, true);
/// assert!(m.get(3) && m.get(7));
/// assert_eq!(m.count_zeros_in(0, 10), 8);
/// ```
#[derive(Clone, PartialEq, Default)]
pub struct Bitmask {
    pub bits: Buffer<u8>,
    pub len: usize,
}

impl Bitmask {
    /// Constructs a bitmask over existing packed bytes.
    pub fn new(data: impl Into<Buffer<u8>>, len: usize) -> Self {
        let bits = data.into();
        debug_assert!(bits.len() >= bytes_for_bits(len));
        Self { bits, len }
    }

    /// Creates a mask of `len` bits, all set to `set`.
    pub fn new_set_all(len: usize, set: bool) -> Self {
        let fill = if set { 0xFF } else { 0x00 };
        let mut m = Self::new(vec![fill; bytes_for_bits(len)], len);
        m.mask_trailing_bits();
        m
    }

    /// Packs a slice of booleans.
    pub fn from_bools(bits: &[bool]) -> Self {
        let mut bytes = vec![0u8; bytes_for_bits(bits.len())];
        for (i, &b) in bits.iter().enumerate() {
            if b {
                bytes[i >> 3] |= 1 << (i & 7);
            }
        }
        Self::new(bytes, bits.len())
    }

    /// Wraps a shared region as a bitmask of `len` bits without copying.
    ///
    /// Fails when the region is shorter than `ceil(len / 8)` bytes.
    pub fn from_shared(region: SharedBuffer, len: usize) -> Result<Self, ColbridgeError> {
        let need = bytes_for_bits(len);
        if region.len() < need {
            return Err(ColbridgeError::invalid(format!(
                "bitmask of {} bits needs {} bytes, buffer has {}",
                len,
                need,
                region.len()
            )));
        }
        Ok(Self { bits: Buffer::from_shared(region.slice(..need))?, len })
    }

    /// Clears unused bits in the final byte, if owned.
    pub fn mask_trailing_bits(&mut self) {
        let rem = self.len & 7;
        if rem == 0 || self.bits.is_empty() {
            return;
        }
        let last = self.bits.len() - 1;
        self.bits.as_mut_slice()[last] &= (1u8 << rem) - 1;
    }

    /// Returns the packed bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        self.bits.as_slice()
    }

    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.bits.as_ptr()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the value of bit `idx`.
    ///
    /// Panics if `idx >= len`.
    #[inline]
    pub fn get(&self, idx: usize) -> bool {
        assert!(idx < self.len, "Bitmask::get: index {} out of bounds ({})", idx, self.len);
        get_bit(self.bits.as_slice(), idx)
    }

    /// Sets bit `i`, copying a shared mask on first write.
    #[inline]
    pub fn set(&mut self, i: usize, value: bool) {
        assert!(i < self.len, "Bitmask::set: index {} out of bounds ({})", i, self.len);
        let byte = &mut self.bits.as_mut_slice()[i >> 3];
        if value {
            *byte |= 1 << (i & 7);
        } else {
            *byte &= !(1 << (i & 7));
        }
    }

    /// Counts set bits in `[start, start + len)`.
    pub fn count_ones_in(&self, start: usize, len: usize) -> usize {
        assert!(start + len <= self.len, "Bitmask::count_ones_in: range out of bounds");
        let bytes = self.bits.as_slice();
        let end = start + len;
        let mut i = start;
        let mut count = 0usize;
        // Leading partial byte
        while i < end && i & 7 != 0 {
            count += get_bit(bytes, i) as usize;
            i += 1;
        }
        // Whole bytes
        while i + 8 <= end {
            count += bytes[i >> 3].count_ones() as usize;
            i += 8;
        }
        while i < end {
            count += get_bit(bytes, i) as usize;
            i += 1;
        }
        count
    }

    /// Counts cleared bits in `[start, start + len)`, i.e. nulls for a validity mask.
    #[inline]
    pub fn count_zeros_in(&self, start: usize, len: usize) -> usize {
        len - self.count_ones_in(start, len)
    }
}

impl Debug for Bitmask {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "Bitmask [")?;
        for i in 0..self.len.min(64) {
            write!(f, "{}", if self.get(i) { '1' } else { '.' })?;
        }
        if self.len > 64 {
            write!(f, "…")?;
        }
        write!(f, "] ({} bits)", self.len)
    }
}
