//! # **TimeUnits Module** - *Arrow Datetime Units*
//!
//! Defines time and interval units used by the temporal logical types.
//!
//! `TimeUnit` standardises second, millisecond, microsecond and nanosecond resolution
//! across `Time32`, `Time64`, `Timestamp` and `Duration`.
//! `IntervalUnit` specifies year–month, day–time, or month–day–nanosecond intervals.
//!
//! Both map one-to-one onto the unit suffixes of the C Data Interface format strings.

use std::fmt::{Display, Formatter, Result as FmtResult};

/// # TimeUnit
///
/// Unified time unit enumeration.
///
/// ## Behaviour
/// - The unit is carried on the `ArrowType`, not on the data, so a single
///   integer-backed buffer layout serves every temporal type.
/// - Dates use days/milliseconds implicitly and do not carry a unit.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default, Hash)]
pub enum TimeUnit {
    Seconds,
    #[default]
    Milliseconds,
    Microseconds,
    Nanoseconds,
}

impl TimeUnit {
    /// Number of units in one second.
    #[inline]
    pub fn per_second(self) -> i64 {
        match self {
            TimeUnit::Seconds => 1,
            TimeUnit::Milliseconds => 1_000,
            TimeUnit::Microseconds => 1_000_000,
            TimeUnit::Nanoseconds => 1_000_000_000,
        }
    }

    /// Number of fractional-second digits rendered for this unit.
    #[inline]
    pub fn fraction_digits(self) -> usize {
        match self {
            TimeUnit::Seconds => 0,
            TimeUnit::Milliseconds => 3,
            TimeUnit::Microseconds => 6,
            TimeUnit::Nanoseconds => 9,
        }
    }

    /// Single-character suffix used in format strings (`s`, `m`, `u`, `n`).
    #[inline]
    pub fn format_char(self) -> char {
        match self {
            TimeUnit::Seconds => 's',
            TimeUnit::Milliseconds => 'm',
            TimeUnit::Microseconds => 'u',
            TimeUnit::Nanoseconds => 'n',
        }
    }

    /// Inverse of [`TimeUnit::format_char`].
    #[inline]
    pub fn from_format_char(c: u8) -> Option<Self> {
        match c {
            b's' => Some(TimeUnit::Seconds),
            b'm' => Some(TimeUnit::Milliseconds),
            b'u' => Some(TimeUnit::Microseconds),
            b'n' => Some(TimeUnit::Nanoseconds),
            _ => None,
        }
    }
}

/// # IntervalUnit
///
/// Inner Arrow discriminant for representing interval types
#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash)]
pub enum IntervalUnit {
    /// 32-bit month count.
    YearMonth,
    /// Two 32-bit integers: days, milliseconds.
    DaysTime,
    /// 32-bit months, 32-bit days, 64-bit nanoseconds.
    MonthDaysNs,
}

impl Display for TimeUnit {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            TimeUnit::Seconds => f.write_str("Seconds"),
            TimeUnit::Milliseconds => f.write_str("Milliseconds"),
            TimeUnit::Microseconds => f.write_str("Microseconds"),
            TimeUnit::Nanoseconds => f.write_str("Nanoseconds"),
        }
    }
}

impl Display for IntervalUnit {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            IntervalUnit::YearMonth => f.write_str("YearMonth"),
            IntervalUnit::DaysTime => f.write_str("DaysTime"),
            IntervalUnit::MonthDaysNs => f.write_str("MonthDaysNs"),
        }
    }
}
