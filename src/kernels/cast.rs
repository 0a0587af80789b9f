//! # **Cast Kernel** - *Flat types to utf8*
//!
//! Canonical string rendering for every flat logical type. The CSV encoder
//! casts each column slice through here before measuring and writing it.
//!
//! ## Renderings
//! - Integers and durations: decimal digits.
//! - Floats: shortest round-trip form via `ryu`, with a trailing `.0` dropped;
//!   `nan`, `inf`, `-inf` for non-finite values.
//! - Decimal128: the unscaled integer with the scale applied.
//! - Date32 / Date64: `YYYY-MM-DD`.
//! - Time32 / Time64: `HH:MM:SS[.fraction]`, one fraction digit per unit decimal.
//! - Timestamp: `YYYY-MM-DD HH:MM:SS[.fraction]` in UTC.
//! - Intervals: `{months}M`, `{days}d{millis}ms`, `{months}M{days}d{nanos}ns`.
//! - Utf8 passes through untouched; binary and fixed-size binary must be valid UTF-8.
//!
//! Nested types have no flat string form and are rejected.

use std::fmt::Write;

use time::{Date, OffsetDateTime};

use crate::enums::error::ColbridgeError;
use crate::enums::time_units::{IntervalUnit, TimeUnit};
use crate::ffi::arrow_dtype::ArrowType;
use crate::structs::array_data::ArrayData;
use crate::structs::bitmask::Bitmask;
use crate::traits::type_unions::{Float, Integer};

/// Julian day number of 1970-01-01.
const UNIX_EPOCH_JULIAN_DAY: i64 = 2_440_588;
const MILLIS_PER_DAY: i64 = 86_400_000;
const NANOS_PER_SECOND: i128 = 1_000_000_000;

/// Casts a flat array to a `String` array with the same length and validity.
///
/// Utf8 input is returned as a zero-copy clone, and binary input is retagged
/// over its existing buffers once every valid value is checked to be UTF-8.
pub fn cast_to_utf8(array: &ArrayData) -> Result<ArrayData, ColbridgeError> {
    match array.dtype() {
        ArrowType::String => Ok(array.clone()),
        ArrowType::Binary => retag_binary(array),
        ArrowType::Null => Ok(all_null(array.len())),
        ArrowType::Boolean => render_each(array, |i, out| {
            out.push_str(if array.bool_value(i) { "true" } else { "false" });
            Ok(())
        }),
        ArrowType::Int8 => integers::<i8>(array),
        ArrowType::Int16 => integers::<i16>(array),
        ArrowType::Int32 => integers::<i32>(array),
        ArrowType::Int64 => integers::<i64>(array),
        ArrowType::UInt8 => integers::<u8>(array),
        ArrowType::UInt16 => integers::<u16>(array),
        ArrowType::UInt32 => integers::<u32>(array),
        ArrowType::UInt64 => integers::<u64>(array),
        ArrowType::Float16 => {
            let values = array.values::<half::f16>()?;
            let mut buf = ryu::Buffer::new();
            render_each(array, |i, out| {
                write_float(out, &mut buf, values[i].to_f32());
                Ok(())
            })
        }
        ArrowType::Float32 => floats::<f32>(array),
        ArrowType::Float64 => floats::<f64>(array),
        ArrowType::FixedSizeBinary(width) => {
            let width = *width as usize;
            render_each(array, |i, out| {
                out.push_str(utf8_value(array.fixed_value_bytes(i, width), i)?);
                Ok(())
            })
        }
        ArrowType::Decimal128(_, scale) => {
            let scale = *scale;
            render_each(array, |i, out| {
                let mut raw = [0u8; 16];
                raw.copy_from_slice(array.fixed_value_bytes(i, 16));
                write_decimal(out, i128::from_ne_bytes(raw), scale)
            })
        }
        ArrowType::Date32 => {
            let values = array.values::<i32>()?;
            render_each(array, |i, out| write_date(out, values[i] as i64))
        }
        ArrowType::Date64 => {
            let values = array.values::<i64>()?;
            render_each(array, |i, out| write_date(out, values[i].div_euclid(MILLIS_PER_DAY)))
        }
        ArrowType::Time32(unit) => {
            let unit = *unit;
            let values = array.values::<i32>()?;
            render_each(array, |i, out| write_time_of_day(out, values[i] as i64, unit))
        }
        ArrowType::Time64(unit) => {
            let unit = *unit;
            let values = array.values::<i64>()?;
            render_each(array, |i, out| write_time_of_day(out, values[i], unit))
        }
        ArrowType::Timestamp(unit, _) => {
            let unit = *unit;
            let values = array.values::<i64>()?;
            render_each(array, |i, out| write_timestamp(out, values[i], unit))
        }
        ArrowType::Duration(_) => integers::<i64>(array),
        ArrowType::Interval(IntervalUnit::YearMonth) => {
            let values = array.values::<i32>()?;
            render_each(array, |i, out| Ok(write!(out, "{}M", values[i])?))
        }
        ArrowType::Interval(IntervalUnit::DaysTime) => render_each(array, |i, out| {
            let raw = array.fixed_value_bytes(i, 8);
            let days = read_i32(&raw[0..4]);
            let millis = read_i32(&raw[4..8]);
            Ok(write!(out, "{}d{}ms", days, millis)?)
        }),
        ArrowType::Interval(IntervalUnit::MonthDaysNs) => render_each(array, |i, out| {
            let raw = array.fixed_value_bytes(i, 16);
            let months = read_i32(&raw[0..4]);
            let days = read_i32(&raw[4..8]);
            let mut nanos = [0u8; 8];
            nanos.copy_from_slice(&raw[8..16]);
            Ok(write!(out, "{}M{}d{}ns", months, days, i64::from_ne_bytes(nanos))?)
        }),
        ArrowType::List(_)
        | ArrowType::FixedSizeList(_, _)
        | ArrowType::Struct(_)
        | ArrowType::Map(_, _) => Err(ColbridgeError::TypeError {
            from: array.dtype().to_string(),
            to: "Utf8",
            message: Some("nested types have no flat string form".into()),
        }),
    }
}

/// Accumulates utf8 values and validity into offsets/bytes buffers.
struct Utf8Builder {
    offsets: Vec<i32>,
    bytes: Vec<u8>,
    validity: Vec<bool>,
    null_count: usize,
}

impl Utf8Builder {
    fn with_capacity(len: usize) -> Self {
        let mut offsets = Vec::with_capacity(len + 1);
        offsets.push(0);
        Self {
            offsets,
            bytes: Vec::new(),
            validity: Vec::with_capacity(len),
            null_count: 0,
        }
    }

    fn push(&mut self, value: &[u8]) -> Result<(), ColbridgeError> {
        self.bytes.extend_from_slice(value);
        self.validity.push(true);
        self.push_offset()
    }

    fn push_null(&mut self) -> Result<(), ColbridgeError> {
        self.validity.push(false);
        self.null_count += 1;
        self.push_offset()
    }

    fn push_offset(&mut self) -> Result<(), ColbridgeError> {
        let end = i32::try_from(self.bytes.len()).map_err(|_| {
            ColbridgeError::invalid("utf8 cast output exceeds the 32-bit offset range")
        })?;
        self.offsets.push(end);
        Ok(())
    }

    fn finish(self) -> Result<ArrayData, ColbridgeError> {
        let nulls = (self.null_count > 0).then(|| Bitmask::from_bools(&self.validity));
        ArrayData::from_var_len(ArrowType::String, self.offsets, self.bytes, nulls)
    }
}

/// Renders every valid row with `f`, carrying nulls across unchanged.
fn render_each<F>(array: &ArrayData, mut f: F) -> Result<ArrayData, ColbridgeError>
where
    F: FnMut(usize, &mut String) -> Result<(), ColbridgeError>,
{
    let mut builder = Utf8Builder::with_capacity(array.len());
    let mut scratch = String::new();
    for i in 0..array.len() {
        if array.is_null(i) {
            builder.push_null()?;
            continue;
        }
        scratch.clear();
        f(i, &mut scratch)?;
        builder.push(scratch.as_bytes())?;
    }
    builder.finish()
}

fn integers<T: Integer>(array: &ArrayData) -> Result<ArrayData, ColbridgeError> {
    let values = array.values::<T>()?;
    render_each(array, |i, out| Ok(write!(out, "{}", values[i])?))
}

fn floats<T: Float>(array: &ArrayData) -> Result<ArrayData, ColbridgeError> {
    let values = array.values::<T>()?;
    let mut buf = ryu::Buffer::new();
    render_each(array, |i, out| {
        write_float(out, &mut buf, values[i]);
        Ok(())
    })
}

fn write_float<T: Float>(out: &mut String, buf: &mut ryu::Buffer, v: T) {
    if v.is_nan() {
        out.push_str("nan");
    } else if v.is_infinite() {
        out.push_str(if v.is_sign_negative() { "-inf" } else { "inf" });
    } else {
        let s = buf.format_finite(v);
        out.push_str(s.strip_suffix(".0").unwrap_or(s));
    }
}

fn write_decimal(out: &mut String, value: i128, scale: i8) -> Result<(), ColbridgeError> {
    if value < 0 {
        out.push('-');
    }
    let digits = value.unsigned_abs().to_string();
    if scale <= 0 {
        out.push_str(&digits);
        if digits != "0" {
            out.extend(std::iter::repeat_n('0', scale.unsigned_abs() as usize));
        }
        return Ok(());
    }
    let scale = scale as usize;
    if digits.len() <= scale {
        out.push_str("0.");
        out.extend(std::iter::repeat_n('0', scale - digits.len()));
        out.push_str(&digits);
    } else {
        let (int, frac) = digits.split_at(digits.len() - scale);
        write!(out, "{}.{}", int, frac)?;
    }
    Ok(())
}

fn write_date(out: &mut String, days: i64) -> Result<(), ColbridgeError> {
    let date = i32::try_from(days + UNIX_EPOCH_JULIAN_DAY)
        .ok()
        .and_then(|jd| Date::from_julian_day(jd).ok())
        .ok_or_else(|| ColbridgeError::invalid(format!("date {} days is out of range", days)))?;
    write!(out, "{:04}-{:02}-{:02}", date.year(), u8::from(date.month()), date.day())?;
    Ok(())
}

fn write_time_of_day(out: &mut String, value: i64, unit: TimeUnit) -> Result<(), ColbridgeError> {
    let per = unit.per_second();
    let secs = value.div_euclid(per);
    let frac = value.rem_euclid(per);
    if !(0..86_400).contains(&secs) {
        return Err(ColbridgeError::invalid(format!(
            "time of day {} {} is out of range",
            value, unit
        )));
    }
    write!(out, "{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)?;
    write_fraction(out, frac, unit)
}

fn write_timestamp(out: &mut String, value: i64, unit: TimeUnit) -> Result<(), ColbridgeError> {
    let nanos_per_unit = NANOS_PER_SECOND / unit.per_second() as i128;
    let dt = OffsetDateTime::from_unix_timestamp_nanos(value as i128 * nanos_per_unit)
        .map_err(|e| ColbridgeError::invalid(format!("timestamp {} {}: {}", value, unit, e)))?;
    write!(
        out,
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        dt.year(),
        u8::from(dt.month()),
        dt.day(),
        dt.hour(),
        dt.minute(),
        dt.second()
    )?;
    write_fraction(out, (dt.nanosecond() as i128 / nanos_per_unit) as i64, unit)
}

fn write_fraction(out: &mut String, frac: i64, unit: TimeUnit) -> Result<(), ColbridgeError> {
    let digits = unit.fraction_digits();
    if digits > 0 {
        write!(out, ".{:0width$}", frac, width = digits)?;
    }
    Ok(())
}

#[inline]
fn read_i32(bytes: &[u8]) -> i32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(bytes);
    i32::from_ne_bytes(raw)
}

fn utf8_value(bytes: &[u8], row: usize) -> Result<&str, ColbridgeError> {
    std::str::from_utf8(bytes)
        .map_err(|e| ColbridgeError::invalid(format!("invalid UTF-8 at row {}: {}", row, e)))
}

fn retag_binary(array: &ArrayData) -> Result<ArrayData, ColbridgeError> {
    let view = array.binary_view()?;
    for i in 0..view.len() {
        if let Some(bytes) = view.get(i) {
            utf8_value(bytes, i)?;
        }
    }
    ArrayData::try_new(
        ArrowType::String,
        array.len(),
        array.offset(),
        array.nulls().cloned(),
        array.buffers().to_vec(),
        Vec::new(),
    )
}

fn all_null(len: usize) -> ArrayData {
    let nulls = (len > 0).then(|| Bitmask::new_set_all(len, false));
    ArrayData::from_var_len(ArrowType::String, vec![0; len + 1], Vec::new(), nulls)
        .unwrap_or_else(|e| unreachable!("zeroed offsets are monotonic: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Field;

    fn strings(array: &ArrayData) -> Vec<Option<String>> {
        let view = array.binary_view().unwrap();
        (0..view.len())
            .map(|i| view.get(i).map(|b| String::from_utf8(b.to_vec()).unwrap()))
            .collect()
    }

    fn some(values: &[&str]) -> Vec<Option<String>> {
        values.iter().map(|s| Some(s.to_string())).collect()
    }

    #[test]
    fn test_integers_keep_nulls() {
        let arr = ArrayData::from_options(ArrowType::Int32, &[Some(5), None, Some(-12)]).unwrap();
        let out = cast_to_utf8(&arr).unwrap();
        assert_eq!(out.dtype(), &ArrowType::String);
        assert_eq!(out.null_count(), 1);
        assert_eq!(strings(&out), vec![Some("5".into()), None, Some("-12".into())]);
    }

    #[test]
    fn test_sliced_input() {
        let arr = ArrayData::from_options(ArrowType::UInt16, &[Some(1u16), Some(2), Some(3), None])
            .unwrap();
        let out = cast_to_utf8(&arr.slice(1, 3)).unwrap();
        assert_eq!(strings(&out), vec![Some("2".into()), Some("3".into()), None]);
    }

    #[test]
    fn test_floats() {
        let arr = ArrayData::from_options(
            ArrowType::Float64,
            &[Some(1.0), Some(0.1), Some(f64::NAN), Some(f64::NEG_INFINITY), Some(-2.5)],
        )
        .unwrap();
        assert_eq!(strings(&cast_to_utf8(&arr).unwrap()), some(&["1", "0.1", "nan", "-inf", "-2.5"]));
    }

    #[test]
    fn test_booleans() {
        let arr = ArrayData::from_bools(&[Some(true), None, Some(false)]);
        assert_eq!(
            strings(&cast_to_utf8(&arr).unwrap()),
            vec![Some("true".into()), None, Some("false".into())]
        );
    }

    #[test]
    fn test_decimal_scales() {
        let mut out = String::new();
        write_decimal(&mut out, 12345, 2).unwrap();
        assert_eq!(out, "123.45");
        out.clear();
        write_decimal(&mut out, -5, 3).unwrap();
        assert_eq!(out, "-0.005");
        out.clear();
        write_decimal(&mut out, 7, -2).unwrap();
        assert_eq!(out, "700");
        out.clear();
        write_decimal(&mut out, 0, 0).unwrap();
        assert_eq!(out, "0");

        let arr = ArrayData::from_options(ArrowType::Decimal128(10, 4), &[Some(15_000i128), None])
            .unwrap();
        assert_eq!(strings(&cast_to_utf8(&arr).unwrap()), vec![Some("1.5000".into()), None]);
    }

    #[test]
    fn test_dates() {
        let arr = ArrayData::from_options(ArrowType::Date32, &[Some(0), Some(19_723), Some(-1)])
            .unwrap();
        assert_eq!(
            strings(&cast_to_utf8(&arr).unwrap()),
            some(&["1970-01-01", "2024-01-01", "1969-12-31"])
        );
        let arr = ArrayData::from_options(ArrowType::Date64, &[Some(19_723 * MILLIS_PER_DAY + 5)])
            .unwrap();
        assert_eq!(strings(&cast_to_utf8(&arr).unwrap()), some(&["2024-01-01"]));
    }

    #[test]
    fn test_times_and_timestamps() {
        let arr = ArrayData::from_options(
            ArrowType::Time32(TimeUnit::Milliseconds),
            &[Some(3_723_004)],
        )
        .unwrap();
        assert_eq!(strings(&cast_to_utf8(&arr).unwrap()), some(&["01:02:03.004"]));

        let arr = ArrayData::from_options(
            ArrowType::Timestamp(TimeUnit::Seconds, None),
            &[Some(1_704_067_200i64)],
        )
        .unwrap();
        assert_eq!(strings(&cast_to_utf8(&arr).unwrap()), some(&["2024-01-01 00:00:00"]));

        let arr = ArrayData::from_options(
            ArrowType::Timestamp(TimeUnit::Microseconds, Some("UTC".into())),
            &[Some(1_704_067_200_000_123i64)],
        )
        .unwrap();
        assert_eq!(strings(&cast_to_utf8(&arr).unwrap()), some(&["2024-01-01 00:00:00.000123"]));
    }

    #[test]
    fn test_intervals() {
        let arr = ArrayData::from_options(ArrowType::Interval(IntervalUnit::YearMonth), &[Some(14)])
            .unwrap();
        assert_eq!(strings(&cast_to_utf8(&arr).unwrap()), some(&["14M"]));

        let mut raw = Vec::new();
        raw.extend_from_slice(&3i32.to_ne_bytes());
        raw.extend_from_slice(&250i32.to_ne_bytes());
        let arr = ArrayData::from_primitive(
            ArrowType::Interval(IntervalUnit::DaysTime),
            vec![i64::from_ne_bytes(raw.try_into().unwrap())],
            None,
        )
        .unwrap();
        assert_eq!(strings(&cast_to_utf8(&arr).unwrap()), some(&["3d250ms"]));
    }

    #[test]
    fn test_binary_and_null() {
        let arr = ArrayData::from_binary(&[Some(&b"ab"[..]), None]);
        let out = cast_to_utf8(&arr).unwrap();
        assert_eq!(out.buffers()[1].as_ptr(), arr.buffers()[1].as_ptr());
        assert_eq!(strings(&out), vec![Some("ab".into()), None]);

        let bad = ArrayData::from_binary(&[Some(&[0xffu8][..])]);
        assert!(matches!(cast_to_utf8(&bad), Err(ColbridgeError::Invalid { .. })));

        let out = cast_to_utf8(&ArrayData::new_null(2)).unwrap();
        assert_eq!(out.null_count(), 2);
        assert_eq!(strings(&out), vec![None, None]);
    }

    #[test]
    fn test_nested_rejected() {
        let child = ArrayData::from_options(ArrowType::Int8, &[Some(1i8)]).unwrap().into_ref();
        let list = ArrayData::new_list(
            Field::new("item", ArrowType::Int8, true, None),
            vec![0, 1],
            child,
            None,
        )
        .unwrap();
        assert!(matches!(cast_to_utf8(&list), Err(ColbridgeError::TypeError { .. })));
    }
}
