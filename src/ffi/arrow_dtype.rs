//! # ArrowDType Module - *Arrow type tagging for self-documenting data*
//!
//! Unified Colbridge representation of the supported *Apache Arrow* logical types.
//!
//! ## Overview
//! - A closed set: null, boolean, signed/unsigned integers, half/single/double floats,
//!   binary, UTF-8, fixed-size binary, decimal128, the temporal family (date, time,
//!   timestamp, duration, interval), and the nested list, fixed-size list, struct and map.
//! - Each variant resolves to a [`PhysicalLayout`] describing the buffers and children
//!   an array of that type carries over the C Data Interface.
//!
//! ## Display
//! - Human-readable type names are produced for all variants and are used
//!   in error messages (e.g. buffer count mismatches).
//!
//! ## Not covered
//! - Large (64-bit offset) string, binary and list variants.
//! - Dictionary encoding, unions, extension types and 256-bit decimals.

use std::fmt::{Display, Formatter, Result as FmtResult};

use crate::enums::error::ColbridgeError;
use crate::enums::time_units::{IntervalUnit, TimeUnit};
use crate::Field;

/// # ArrowType
///
/// Unified representation of supported *Apache Arrow* data types.
///
/// ## Purpose
/// - Single discriminant used across the crate for schema definitions, import dispatch,
///   the utf8 cast kernel and CSV populator selection.
/// - Nested variants carry their child `Field`s, so a `Field` tree is fully described
///   by its root type.
///
/// ## Notes
/// - `Timestamp` carries an optional timezone. Importing `tss:` with an empty zone
///   yields `Some("UTC")`.
/// - `Map` holds the `entries` struct field and the keys-sorted flag.
#[derive(PartialEq, Eq, Clone, Debug, Hash)]
pub enum ArrowType {
    Null,
    Boolean,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float16,
    Float32,
    Float64,
    Binary,
    String,
    /// Byte width of each value.
    FixedSizeBinary(i32),
    /// Precision, scale.
    Decimal128(u8, i8),
    /// Days since the UNIX epoch.
    Date32,
    /// Milliseconds since the UNIX epoch.
    Date64,
    Time32(TimeUnit),
    Time64(TimeUnit),
    Timestamp(TimeUnit, Option<String>),
    Duration(TimeUnit),
    Interval(IntervalUnit),
    List(Box<Field>),
    FixedSizeList(Box<Field>, i32),
    Struct(Vec<Field>),
    /// Entries struct field (key, value) and whether keys are sorted.
    Map(Box<Field>, bool),
}

/// Physical buffer/child arrangement for an `ArrowType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhysicalLayout {
    /// No buffers at all.
    Null,
    /// `[validity, values]` with a fixed bit width per slot.
    FixedWidth { bit_width: usize },
    /// `[validity, offsets(i32), values]`.
    VariableBinary,
    /// `[validity, offsets(i32)]` plus one child.
    List,
    /// `[validity]` plus one child holding `size` values per slot.
    FixedSizeList { size: usize },
    /// `[validity]` plus one child per field.
    Struct { n_children: usize },
}

impl PhysicalLayout {
    /// Number of buffers, validity included, an exported array must carry.
    pub fn n_buffers(&self) -> usize {
        match self {
            PhysicalLayout::Null => 0,
            PhysicalLayout::FixedWidth { .. } => 2,
            PhysicalLayout::VariableBinary => 3,
            PhysicalLayout::List => 2,
            PhysicalLayout::FixedSizeList { .. } | PhysicalLayout::Struct { .. } => 1,
        }
    }

    /// Number of child arrays an exported array must carry.
    pub fn n_children(&self) -> usize {
        match self {
            PhysicalLayout::Null | PhysicalLayout::FixedWidth { .. } => 0,
            PhysicalLayout::VariableBinary => 0,
            PhysicalLayout::List | PhysicalLayout::FixedSizeList { .. } => 1,
            PhysicalLayout::Struct { n_children } => *n_children,
        }
    }
}

impl ArrowType {
    /// Resolves the physical layout.
    ///
    /// Fails for widths that cannot describe a buffer, e.g. a negative
    /// fixed-size-binary width or list size.
    pub fn layout(&self) -> Result<PhysicalLayout, ColbridgeError> {
        let fixed = |bits: usize| Ok(PhysicalLayout::FixedWidth { bit_width: bits });
        match self {
            ArrowType::Null => Ok(PhysicalLayout::Null),
            ArrowType::Boolean => fixed(1),
            ArrowType::Int8 | ArrowType::UInt8 => fixed(8),
            ArrowType::Int16 | ArrowType::UInt16 | ArrowType::Float16 => fixed(16),
            ArrowType::Int32 | ArrowType::UInt32 | ArrowType::Float32 => fixed(32),
            ArrowType::Date32 | ArrowType::Time32(_) => fixed(32),
            ArrowType::Int64 | ArrowType::UInt64 | ArrowType::Float64 => fixed(64),
            ArrowType::Date64 | ArrowType::Time64(_) => fixed(64),
            ArrowType::Timestamp(_, _) | ArrowType::Duration(_) => fixed(64),
            ArrowType::Interval(IntervalUnit::YearMonth) => fixed(32),
            ArrowType::Interval(IntervalUnit::DaysTime) => fixed(64),
            ArrowType::Interval(IntervalUnit::MonthDaysNs) => fixed(128),
            ArrowType::Decimal128(_, _) => fixed(128),
            ArrowType::FixedSizeBinary(w) => {
                let w = usize::try_from(*w).map_err(|_| {
                    ColbridgeError::invalid(format!("negative fixed-size-binary width {}", w))
                })?;
                fixed(w * 8)
            }
            ArrowType::Binary | ArrowType::String => Ok(PhysicalLayout::VariableBinary),
            ArrowType::List(_) | ArrowType::Map(_, _) => Ok(PhysicalLayout::List),
            ArrowType::FixedSizeList(_, n) => {
                let size = usize::try_from(*n).map_err(|_| {
                    ColbridgeError::invalid(format!("negative fixed-size-list size {}", n))
                })?;
                Ok(PhysicalLayout::FixedSizeList { size })
            }
            ArrowType::Struct(fields) => Ok(PhysicalLayout::Struct { n_children: fields.len() }),
        }
    }

    /// Child fields in C Data Interface order.
    pub fn children(&self) -> Vec<&Field> {
        match self {
            ArrowType::List(f) | ArrowType::FixedSizeList(f, _) | ArrowType::Map(f, _) => {
                vec![f.as_ref()]
            }
            ArrowType::Struct(fields) => fields.iter().collect(),
            _ => Vec::new(),
        }
    }

    /// True for list, fixed-size list, struct and map.
    #[inline]
    pub fn is_nested(&self) -> bool {
        matches!(
            self,
            ArrowType::List(_)
                | ArrowType::FixedSizeList(_, _)
                | ArrowType::Struct(_)
                | ArrowType::Map(_, _)
        )
    }

    /// True for types whose rendering may contain arbitrary bytes.
    #[inline]
    pub fn is_binary_like(&self) -> bool {
        matches!(
            self,
            ArrowType::Binary | ArrowType::String | ArrowType::FixedSizeBinary(_)
        )
    }

    /// Structural equality that skips field metadata at every depth.
    pub fn eq_ignoring_metadata(&self, other: &ArrowType) -> bool {
        match (self, other) {
            (ArrowType::List(a), ArrowType::List(b)) => a.eq_ignoring_metadata(b),
            (ArrowType::FixedSizeList(a, n), ArrowType::FixedSizeList(b, m)) => {
                n == m && a.eq_ignoring_metadata(b)
            }
            (ArrowType::Map(a, s), ArrowType::Map(b, t)) => s == t && a.eq_ignoring_metadata(b),
            (ArrowType::Struct(a), ArrowType::Struct(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.eq_ignoring_metadata(y))
            }
            _ => self == other,
        }
    }
}

impl Display for ArrowType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ArrowType::Null => f.write_str("Null"),
            ArrowType::Boolean => f.write_str("Boolean"),
            ArrowType::Int8 => f.write_str("Int8"),
            ArrowType::Int16 => f.write_str("Int16"),
            ArrowType::Int32 => f.write_str("Int32"),
            ArrowType::Int64 => f.write_str("Int64"),
            ArrowType::UInt8 => f.write_str("UInt8"),
            ArrowType::UInt16 => f.write_str("UInt16"),
            ArrowType::UInt32 => f.write_str("UInt32"),
            ArrowType::UInt64 => f.write_str("UInt64"),
            ArrowType::Float16 => f.write_str("Float16"),
            ArrowType::Float32 => f.write_str("Float32"),
            ArrowType::Float64 => f.write_str("Float64"),
            ArrowType::Binary => f.write_str("Binary"),
            ArrowType::String => f.write_str("Utf8"),
            ArrowType::FixedSizeBinary(w) => write!(f, "FixedSizeBinary({})", w),
            ArrowType::Decimal128(p, s) => write!(f, "Decimal128({}, {})", p, s),
            ArrowType::Date32 => f.write_str("Date32"),
            ArrowType::Date64 => f.write_str("Date64"),
            ArrowType::Time32(u) => write!(f, "Time32({})", u),
            ArrowType::Time64(u) => write!(f, "Time64({})", u),
            ArrowType::Timestamp(u, Some(tz)) => write!(f, "Timestamp({}, \"{}\")", u, tz),
            ArrowType::Timestamp(u, None) => write!(f, "Timestamp({})", u),
            ArrowType::Duration(u) => write!(f, "Duration({})", u),
            ArrowType::Interval(u) => write!(f, "Interval({})", u),
            ArrowType::List(c) => write!(f, "List<{}: {}>", c.name, c.dtype),
            ArrowType::FixedSizeList(c, n) => {
                write!(f, "FixedSizeList[{}]<{}: {}>", n, c.name, c.dtype)
            }
            ArrowType::Struct(fields) => {
                f.write_str("Struct<")?;
                for (i, c) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", c.name, c.dtype)?;
                }
                f.write_str(">")
            }
            ArrowType::Map(entries, sorted) => {
                write!(f, "Map<{}", entries.dtype)?;
                if *sorted {
                    f.write_str(", sorted")?;
                }
                f.write_str(">")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layouts() {
        assert_eq!(ArrowType::Null.layout().unwrap().n_buffers(), 0);
        assert_eq!(
            ArrowType::Boolean.layout().unwrap(),
            PhysicalLayout::FixedWidth { bit_width: 1 }
        );
        assert_eq!(ArrowType::String.layout().unwrap().n_buffers(), 3);
        assert_eq!(
            ArrowType::FixedSizeBinary(3).layout().unwrap(),
            PhysicalLayout::FixedWidth { bit_width: 24 }
        );
        let list = ArrowType::List(Box::new(Field::new("item", ArrowType::Int8, true, None)));
        assert_eq!(list.layout().unwrap().n_buffers(), 2);
        assert_eq!(list.layout().unwrap().n_children(), 1);
        assert!(ArrowType::FixedSizeBinary(-1).layout().is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(ArrowType::String.to_string(), "Utf8");
        assert_eq!(
            ArrowType::Timestamp(TimeUnit::Seconds, Some("UTC".into())).to_string(),
            "Timestamp(Seconds, \"UTC\")"
        );
    }
}
