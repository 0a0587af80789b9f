use std::fmt::{Debug, Display};

use num_traits::{Float as NumFloat, PrimInt, ToPrimitive};

/// Plain-old-data element that can be viewed directly over a byte buffer.
///
/// # Safety
/// Implementors must have no padding and no invalid bit patterns, so that any
/// correctly aligned byte region of `size_of::<Self>()` bytes is a valid value.
pub unsafe trait NativeType: Copy + Debug + PartialEq + Send + Sync + 'static {}

unsafe impl NativeType for u8 {}
unsafe impl NativeType for u16 {}
unsafe impl NativeType for u32 {}
unsafe impl NativeType for u64 {}
unsafe impl NativeType for i8 {}
unsafe impl NativeType for i16 {}
unsafe impl NativeType for i32 {}
unsafe impl NativeType for i64 {}
unsafe impl NativeType for i128 {}
unsafe impl NativeType for f32 {}
unsafe impl NativeType for f64 {}
unsafe impl NativeType for half::f16 {}

/// Trait for types valid as integer elements in columnar arrays.
///
/// Extends and constrains the *num-traits* `PrimInt` implementation to fit the crate's type universe.
pub trait Integer: NativeType + PrimInt + ToPrimitive + Display + Default {}
impl Integer for u8 {}
impl Integer for u16 {}
impl Integer for u32 {}
impl Integer for u64 {}
impl Integer for i8 {}
impl Integer for i16 {}
impl Integer for i32 {}
impl Integer for i64 {}

/// Trait for types valid as float elements in columnar arrays.
///
/// Useful when specifying `my_fn::<T: Float>() {}`. The `ryu::Float` bound gives
/// shortest round-trip text rendering at the element's own precision.
pub trait Float: NativeType + NumFloat + Default + ryu::Float {}
impl Float for f32 {}
impl Float for f64 {}
