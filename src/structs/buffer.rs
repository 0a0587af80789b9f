//! # Buffer — *Unified owned/shared data storage*
//!
//! Buffer backs the typed views handed out by `ArrayData` and the bits of `Bitmask`.
//!
//! # Design
//! `Buffer<T>` abstracts over two storage backends:
//! - **Owned**: `Vec<T>`, heap-allocated by this crate.
//! - **Shared**: [`SharedBuffer`] — a zero-copy, read-only window into externally owned
//!   memory (e.g. an imported C Data Interface array).
//!
//! ## Behaviour
//! - **Read-only ops** (`&[T]` slicing, iteration) operate directly on the backing
//!   memory regardless of ownership.
//! - **Mutating ops** (push, `as_mut_slice`) transparently convert shared buffers into
//!   owned `Vec<T>` before modifying.
//! - Shared buffers must be aligned for `T`. If not, they are cloned into an owned
//!   `Vec<T>` on ingestion, the only path where an import copies data.
//!
//! ## Typical use
//! ```rust
//! use colbridge::{Buffer, SharedBuffer};
//!
//! let mut b = Buffer::from(vec![1u32, 2, 3]);
//! b.push(4);
//! assert_eq!(b.as_slice(), &[1, 2, 3, 4]);
//!
//! let shared = SharedBuffer::from_vec(vec![10u32, 20, 30]);
//! let view = Buffer::<u32>::from_shared(shared).unwrap();
//! assert_eq!(view[1], 20);
//! ```

use std::fmt;
use std::mem;
use std::ops::Deref;

use tracing::warn;

use crate::enums::error::ColbridgeError;
use crate::structs::shared_buffer::SharedBuffer;
use crate::traits::type_unions::NativeType;

/// # Buffer
///
/// Data buffer abstraction that blends an owned `Vec<T>` with an externally
/// backed and borrowed source.
///
/// ### Behaviour:
/// - **Semantically equivalent to `Vec<T>`** for reads.
/// - **Mutation operations** always copy a shared buffer into an owned `Vec<T>`
///   on first write, as we cannot guarantee control of the source.
pub struct Buffer<T> {
    storage: Storage<T>,
}

/// Internal memory ownership tracking store
/// for `Buffer`
enum Storage<T> {
    Owned(Vec<T>),
    Shared {
        owner: SharedBuffer,
        len: usize, // element count
    },
}

impl<T: Clone> Buffer<T> {
    /// Construct an owned buffer from a slice, copying the data.
    #[inline]
    pub fn from_slice(slice: &[T]) -> Self {
        Buffer::from_vec(slice.to_vec())
    }
}

impl<T> Buffer<T> {
    /// Construct from an owned `Vec<T>`.
    #[inline]
    pub fn from_vec(v: Vec<T>) -> Self {
        Self { storage: Storage::Owned(v) }
    }

    /// Returns the number of elements in the buffer.
    #[inline]
    pub fn len(&self) -> usize {
        match &self.storage {
            Storage::Owned(v) => v.len(),
            Storage::Shared { len, .. } => *len,
        }
    }

    /// Returns true if the buffer is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when the data lives in a shared region rather than an owned vector.
    #[inline]
    pub fn is_shared(&self) -> bool {
        matches!(self.storage, Storage::Shared { .. })
    }
}

impl<T: NativeType> Buffer<T> {
    /// Construct a buffer as a view over a SharedBuffer (zero-copy, read-only).
    ///
    /// # Behaviour
    /// - A region misaligned for `T` is copied into a fresh `Vec<T>`.
    /// - A region whose byte length is not a multiple of `size_of::<T>()` is rejected.
    pub fn from_shared(owner: SharedBuffer) -> Result<Self, ColbridgeError> {
        let size_of_t = mem::size_of::<T>();
        if owner.len() % size_of_t != 0 {
            return Err(ColbridgeError::invalid(format!(
                "buffer of {} bytes is not a valid {} slice",
                owner.len(),
                std::any::type_name::<T>()
            )));
        }
        let len = owner.len() / size_of_t;

        if !owner.is_aligned_for::<T>() {
            warn!(
                ptr = ?owner.as_ptr(),
                align = mem::align_of::<T>(),
                "Buffer::from_shared: region not aligned for element type, cloning to owned Vec"
            );
            let bytes = owner.as_slice();
            let mut v: Vec<T> = Vec::with_capacity(len);
            unsafe {
                std::ptr::copy_nonoverlapping(
                    bytes.as_ptr(),
                    v.as_mut_ptr() as *mut u8,
                    len * size_of_t,
                );
                v.set_len(len);
            }
            return Ok(Buffer::from_vec(v));
        }

        Ok(Self { storage: Storage::Shared { owner, len } })
    }

    /// Returns the buffer as a slice.
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        match &self.storage {
            Storage::Owned(vec) => vec.as_slice(),
            Storage::Shared { owner, len } => {
                if *len == 0 {
                    return &[];
                }
                unsafe { std::slice::from_raw_parts(owner.as_ptr() as *const T, *len) }
            }
        }
    }

    /// Returns a mutable slice; will copy on write if buffer is shared.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        self.make_owned_mut().as_mut_slice()
    }

    #[inline]
    pub fn push(&mut self, v: T) {
        self.make_owned_mut().push(v);
    }

    /// Converts into a byte region without copying.
    ///
    /// Owned vectors move into the region's owner; shared views hand back their window.
    pub fn into_shared(self) -> SharedBuffer {
        match self.storage {
            Storage::Owned(v) => SharedBuffer::from_vec(v),
            Storage::Shared { owner, .. } => owner,
        }
    }

    fn make_owned_mut(&mut self) -> &mut Vec<T> {
        if let Storage::Shared { .. } = self.storage {
            let v = self.as_slice().to_vec();
            self.storage = Storage::Owned(v);
        }
        match &mut self.storage {
            Storage::Owned(v) => v,
            Storage::Shared { .. } => unreachable!("converted to owned above"),
        }
    }
}

impl<T: NativeType> Deref for Buffer<T> {
    type Target = [T];

    #[inline]
    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T: NativeType> AsRef<[T]> for Buffer<T> {
    #[inline]
    fn as_ref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T> From<Vec<T>> for Buffer<T> {
    #[inline]
    fn from(v: Vec<T>) -> Self {
        Buffer::from_vec(v)
    }
}

impl<T> Default for Buffer<T> {
    fn default() -> Self {
        Buffer::from_vec(Vec::new())
    }
}

impl<T: Clone> Clone for Buffer<T> {
    fn clone(&self) -> Self {
        match &self.storage {
            Storage::Owned(v) => Buffer::from_vec(v.clone()),
            Storage::Shared { owner, len } => Self {
                storage: Storage::Shared { owner: owner.clone(), len: *len },
            },
        }
    }
}

impl<T: NativeType> PartialEq for Buffer<T> {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl<T: NativeType> fmt::Debug for Buffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("shared", &self.is_shared())
            .field("data", &self.as_slice())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owned_push() {
        let mut b = Buffer::from(vec![1i64, 2]);
        b.push(3);
        assert_eq!(&*b, &[1, 2, 3]);
        assert!(!b.is_shared());
    }

    #[test]
    fn test_shared_zero_copy() {
        let sb = SharedBuffer::from_vec(vec![7u32, 8, 9]);
        let ptr = sb.as_ptr();
        let b = Buffer::<u32>::from_shared(sb).unwrap();
        assert!(b.is_shared());
        assert_eq!(b.as_slice().as_ptr() as *const u8, ptr);
        assert_eq!(b.len(), 3);
    }

    #[test]
    fn test_shared_copy_on_write() {
        let sb = SharedBuffer::from_vec(vec![1u16, 2]);
        let mut b = Buffer::<u16>::from_shared(sb.clone()).unwrap();
        b.as_mut_slice()[0] = 9;
        assert_eq!(&*b, &[9, 2]);
        assert_eq!(sb.typed::<u16>().unwrap(), &[1, 2]);
    }

    #[test]
    fn test_misaligned_is_copied() {
        let sb = SharedBuffer::from_vec(vec![0u64; 2]).slice(1..9);
        let b = Buffer::<u64>::from_shared(sb).unwrap();
        assert_eq!(b.len(), 1);
        assert!(!b.is_shared());
    }

    #[test]
    fn test_bad_length_rejected() {
        let sb = SharedBuffer::from_vec(vec![0u8; 6]);
        assert!(Buffer::<u32>::from_shared(sb).is_err());
    }

    #[test]
    fn test_into_shared_round_trip() {
        let b = Buffer::from(vec![1.5f64, 2.5]);
        let sb = b.into_shared();
        assert_eq!(sb.typed::<f64>().unwrap(), &[1.5, 2.5]);
    }
}
