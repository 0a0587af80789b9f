//! # **SharedBuffer Internal Module** - Backs *Buffer* for zero-copy foreign buffer sharing
//!
//! Zero-copy, reference-counted, read-only byte region.
//!
//! A `SharedBuffer` is a `(ptr, len)` window plus an `Arc` to whatever keeps that
//! memory alive: a `Vec<T>` the crate allocated, an arbitrary `AsRef<[u8]>` owner, or
//! the guard of an imported foreign `ArrowArray` whose release callback frees the
//! memory once the last window is dropped.

use std::any::Any;
use std::fmt;
use std::mem;
use std::ops::{Bound, Deref, RangeBounds};
use std::slice;
use std::sync::Arc;

use crate::enums::error::ColbridgeError;
use crate::traits::type_unions::NativeType;

/// Keeps the memory behind a [`SharedBuffer`] alive.
pub type BufferOwner = Arc<dyn Any + Send + Sync>;

/// # SharedBuffer
///
/// Zero-copy, reference-counted byte buffer.
///
/// ## Features
/// - O(1) cloning and slicing, both share the same owner.
/// - Multiple backend sources: `Vec<T>` of any native type, `AsRef<[u8]>` owners,
///   and foreign regions tied to an import guard.
/// - Typed views via [`SharedBuffer::typed`] with alignment checks.
///
/// ## Usage
/// ```rust
/// use colbridge::SharedBuffer;
/// let sb = SharedBuffer::from_vec(vec![1u8, 2, 3, 4, 5]);
/// let slice = sb.slice(0..2);
/// assert_eq!(slice.as_slice(), &[1, 2]);
/// ```
#[derive(Clone)]
pub struct SharedBuffer {
    ptr: *const u8,
    len: usize,
    owner: BufferOwner,
}

// The region is immutable and kept alive by `owner`, which is itself Send + Sync.
unsafe impl Send for SharedBuffer {}
unsafe impl Sync for SharedBuffer {}

impl SharedBuffer {
    /// Constructs a new, empty `SharedBuffer`
    pub fn new() -> Self {
        Self {
            ptr: std::ptr::null(),
            len: 0,
            owner: Arc::new(()),
        }
    }

    /// Takes ownership of a typed vector without copying, preserving its alignment.
    pub fn from_vec<T: NativeType>(v: Vec<T>) -> Self {
        let ptr = v.as_ptr() as *const u8;
        let len = v.len() * mem::size_of::<T>();
        Self {
            ptr,
            len,
            owner: Arc::new(v),
        }
    }

    /// Constructs a `SharedBuffer` from an arbitrary owner.
    ///
    /// The owner must implement `AsRef<[u8]> + Send + Sync + 'static`.
    pub fn from_owner<T>(owner: T) -> Self
    where
        T: AsRef<[u8]> + Send + Sync + 'static,
    {
        let owner = Arc::new(owner);
        let buf = (*owner).as_ref();
        Self {
            ptr: buf.as_ptr(),
            len: buf.len(),
            owner,
        }
    }

    /// Wraps a foreign memory region without copying.
    ///
    /// # Safety
    /// `ptr` must be valid for reads of `len` bytes for as long as `owner` is alive,
    /// and the memory must not be mutated through other aliases during that time.
    pub unsafe fn from_foreign(ptr: *const u8, len: usize, owner: BufferOwner) -> Self {
        if len == 0 {
            return Self { ptr: std::ptr::null(), len: 0, owner };
        }
        Self { ptr, len, owner }
    }

    /// Returns the number of bytes in this buffer.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if this buffer is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Start address of the region, null when empty.
    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr
    }

    /// Returns a read-only view of the data as a slice.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        if self.len == 0 || self.ptr.is_null() {
            return &[];
        }
        unsafe { slice::from_raw_parts(self.ptr, self.len) }
    }

    /// Returns a zero-copy slice of this buffer's data.
    ///
    /// Panics if range is out of bounds.
    pub fn slice(&self, range: impl RangeBounds<usize>) -> Self {
        let start = match range.start_bound() {
            Bound::Unbounded => 0,
            Bound::Included(&n) => n,
            Bound::Excluded(&n) => n + 1,
        };
        let end = match range.end_bound() {
            Bound::Unbounded => self.len,
            Bound::Included(&n) => n + 1,
            Bound::Excluded(&n) => n,
        };
        assert!(
            start <= end && end <= self.len,
            "SharedBuffer::slice: {}..{} out of bounds for length {}",
            start,
            end,
            self.len
        );
        if start == end {
            return Self { ptr: std::ptr::null(), len: 0, owner: self.owner.clone() };
        }
        Self {
            ptr: unsafe { self.ptr.add(start) },
            len: end - start,
            owner: self.owner.clone(),
        }
    }

    /// True when the region start is aligned for `T`.
    #[inline]
    pub fn is_aligned_for<T>(&self) -> bool {
        self.len == 0 || (self.ptr as usize) % mem::align_of::<T>() == 0
    }

    /// Reinterprets the region as a slice of `T`.
    ///
    /// Fails when the start address is misaligned for `T` or the byte length is
    /// not a multiple of `size_of::<T>()`.
    pub fn typed<T: NativeType>(&self) -> Result<&[T], ColbridgeError> {
        let size = mem::size_of::<T>();
        if self.len == 0 {
            return Ok(&[]);
        }
        if !self.is_aligned_for::<T>() {
            return Err(ColbridgeError::invalid(format!(
                "buffer at {:p} is not aligned for {}",
                self.ptr,
                std::any::type_name::<T>()
            )));
        }
        if self.len % size != 0 {
            return Err(ColbridgeError::invalid(format!(
                "buffer length {} is not a multiple of {}",
                self.len, size
            )));
        }
        Ok(unsafe { slice::from_raw_parts(self.ptr as *const T, self.len / size) })
    }

    /// Number of strong references to the owner, for diagnostics and tests.
    #[inline]
    pub fn owner_count(&self) -> usize {
        Arc::strong_count(&self.owner)
    }
}

impl Default for SharedBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for SharedBuffer {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl AsRef<[u8]> for SharedBuffer {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl PartialEq for SharedBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl fmt::Debug for SharedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedBuffer")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vec_and_slice() {
        let sb = SharedBuffer::from_vec(vec![1u8, 2, 3, 4, 5]);
        assert_eq!(sb.len(), 5);
        let s = sb.slice(1..4);
        assert_eq!(s.as_slice(), &[2, 3, 4]);
        assert_eq!(sb.owner_count(), 2);
        assert!(sb.slice(2..2).is_empty());
    }

    #[test]
    fn test_typed_view() {
        let sb = SharedBuffer::from_vec(vec![10i32, 20, 30]);
        assert_eq!(sb.len(), 12);
        assert_eq!(sb.typed::<i32>().unwrap(), &[10, 20, 30]);
        // Offsetting by one byte breaks alignment for i32
        assert!(sb.slice(1..5).typed::<i32>().is_err());
        assert!(sb.slice(0..6).typed::<i32>().is_err());
    }

    #[test]
    fn test_from_owner() {
        let owner: Arc<[u8]> = Arc::from(&b"abc"[..]);
        let sb = SharedBuffer::from_owner(owner.clone());
        assert_eq!(&*sb, b"abc");
        assert_eq!(sb.as_ptr(), owner.as_ptr());
    }
}
