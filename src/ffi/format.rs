//! # **Format Module** - *C Data Interface type-format grammar and metadata blob*
//!
//! Decodes and encodes the compact format strings carried by `ArrowSchema.format`,
//! and the binary key/value metadata blob carried by `ArrowSchema.metadata`.
//!
//! ## Grammar
//! - Single-letter primitives: `n b c C s S i I l L e f g z u`.
//! - Temporal: `tdD tdm`, `tt[smun]`, `tD[smun]`, `ti[MDn]`, and `ts[smun]:<tz>`.
//! - Parameterised: `w:<bytes>`, `d:<precision>,<scale>`.
//! - Nested: `+l`, `+w:<size>`, `+s`, `+m`; children are decoded first and passed in.
//!
//! Anything else fails closed as not implemented.

use std::collections::BTreeMap;
use std::ffi::c_char;

use crate::enums::error::ColbridgeError;
use crate::enums::time_units::{IntervalUnit, TimeUnit};
use crate::ffi::arrow_c_ffi::ARROW_FLAG_MAP_KEYS_SORTED;
use crate::ffi::arrow_dtype::ArrowType;
use crate::Field;

/// Timezone assigned to `ts?:` formats with an empty zone.
pub const DEFAULT_TIMEZONE: &str = "UTC";

/// Largest precision a 128-bit decimal can hold.
pub const DECIMAL128_MAX_PRECISION: u8 = 38;

/// Decodes a format string into a logical type.
///
/// `children` are the already-decoded child fields; `flags` is the field's flag
/// bitmask, consulted for the map keys-sorted bit.
pub fn decode_format(
    format: &str,
    children: Vec<Field>,
    flags: i64,
) -> Result<ArrowType, ColbridgeError> {
    if !format.starts_with('+') && !children.is_empty() {
        return Err(ColbridgeError::ChildCountMismatch {
            dtype: format.to_string(),
            expected: 0,
            found: children.len() as i64,
        });
    }

    let simple = match format {
        "n" => Some(ArrowType::Null),
        "b" => Some(ArrowType::Boolean),
        "c" => Some(ArrowType::Int8),
        "C" => Some(ArrowType::UInt8),
        "s" => Some(ArrowType::Int16),
        "S" => Some(ArrowType::UInt16),
        "i" => Some(ArrowType::Int32),
        "I" => Some(ArrowType::UInt32),
        "l" => Some(ArrowType::Int64),
        "L" => Some(ArrowType::UInt64),
        "e" => Some(ArrowType::Float16),
        "f" => Some(ArrowType::Float32),
        "g" => Some(ArrowType::Float64),
        "z" => Some(ArrowType::Binary),
        "u" => Some(ArrowType::String),
        "tdD" => Some(ArrowType::Date32),
        "tdm" => Some(ArrowType::Date64),
        "tts" => Some(ArrowType::Time32(TimeUnit::Seconds)),
        "ttm" => Some(ArrowType::Time32(TimeUnit::Milliseconds)),
        "ttu" => Some(ArrowType::Time64(TimeUnit::Microseconds)),
        "ttn" => Some(ArrowType::Time64(TimeUnit::Nanoseconds)),
        "tDs" => Some(ArrowType::Duration(TimeUnit::Seconds)),
        "tDm" => Some(ArrowType::Duration(TimeUnit::Milliseconds)),
        "tDu" => Some(ArrowType::Duration(TimeUnit::Microseconds)),
        "tDn" => Some(ArrowType::Duration(TimeUnit::Nanoseconds)),
        "tiM" => Some(ArrowType::Interval(IntervalUnit::YearMonth)),
        "tiD" => Some(ArrowType::Interval(IntervalUnit::DaysTime)),
        "tin" => Some(ArrowType::Interval(IntervalUnit::MonthDaysNs)),
        _ => None,
    };
    if let Some(dtype) = simple {
        return Ok(dtype);
    }

    match format {
        "U" | "Z" | "+L" => {
            return Err(ColbridgeError::not_implemented(format!(
                "64-bit offset type '{}' is not supported",
                format
            )));
        }
        "+l" => {
            let child = single_child(format, children)?;
            return Ok(ArrowType::List(Box::new(child)));
        }
        "+s" => return Ok(ArrowType::Struct(children)),
        "+m" => {
            let entries = single_child(format, children)?;
            match &entries.dtype {
                ArrowType::Struct(kv) if kv.len() == 2 => {}
                other => {
                    return Err(ColbridgeError::invalid(format!(
                        "map entries must be a struct of key and value, got {}",
                        other
                    )));
                }
            }
            let keys_sorted = flags & ARROW_FLAG_MAP_KEYS_SORTED != 0;
            return Ok(ArrowType::Map(Box::new(entries), keys_sorted));
        }
        _ => {}
    }

    let Some((head, param)) = format.split_once(':') else {
        return Err(unimplemented(format));
    };
    match head {
        "tss" | "tsm" | "tsu" | "tsn" => {
            let unit = TimeUnit::from_format_char(head.as_bytes()[2])
                .ok_or_else(|| unimplemented(format))?;
            let tz = if param.is_empty() { DEFAULT_TIMEZONE } else { param };
            Ok(ArrowType::Timestamp(unit, Some(tz.to_string())))
        }
        "w" => Ok(ArrowType::FixedSizeBinary(parse_width(format, param)?)),
        "d" => {
            let parts: Vec<&str> = param.split(',').collect();
            match parts.as_slice() {
                [p, s] => {
                    let precision = p.trim().parse::<u8>().map_err(|_| {
                        ColbridgeError::invalid(format!("invalid decimal precision in '{}'", format))
                    })?;
                    let scale = s.trim().parse::<i8>().map_err(|_| {
                        ColbridgeError::invalid(format!("invalid decimal scale in '{}'", format))
                    })?;
                    if precision == 0 || precision > DECIMAL128_MAX_PRECISION {
                        return Err(ColbridgeError::invalid(format!(
                            "decimal precision {} in '{}' is outside 1..={}",
                            precision, format, DECIMAL128_MAX_PRECISION
                        )));
                    }
                    if scale > 0 && scale as u8 > precision {
                        return Err(ColbridgeError::invalid(format!(
                            "decimal scale {} exceeds precision {} in '{}'",
                            scale, precision, format
                        )));
                    }
                    Ok(ArrowType::Decimal128(precision, scale))
                }
                [_, _, _] => Err(ColbridgeError::not_implemented("only decimal128 is supported")),
                _ => Err(ColbridgeError::invalid(format!(
                    "decimal format '{}' needs precision and scale",
                    format
                ))),
            }
        }
        "+w" => {
            let size = parse_width(format, param)?;
            let child = single_child(format, children)?;
            Ok(ArrowType::FixedSizeList(Box::new(child), size))
        }
        _ => Err(unimplemented(format)),
    }
}

/// Encodes a logical type as its format string.
pub fn encode_format(dtype: &ArrowType) -> String {
    let s = match dtype {
        ArrowType::Null => "n",
        ArrowType::Boolean => "b",
        ArrowType::Int8 => "c",
        ArrowType::UInt8 => "C",
        ArrowType::Int16 => "s",
        ArrowType::UInt16 => "S",
        ArrowType::Int32 => "i",
        ArrowType::UInt32 => "I",
        ArrowType::Int64 => "l",
        ArrowType::UInt64 => "L",
        ArrowType::Float16 => "e",
        ArrowType::Float32 => "f",
        ArrowType::Float64 => "g",
        ArrowType::Binary => "z",
        ArrowType::String => "u",
        ArrowType::Date32 => "tdD",
        ArrowType::Date64 => "tdm",
        ArrowType::Time32(u) | ArrowType::Time64(u) => {
            return format!("tt{}", u.format_char());
        }
        ArrowType::Duration(u) => return format!("tD{}", u.format_char()),
        ArrowType::Interval(IntervalUnit::YearMonth) => "tiM",
        ArrowType::Interval(IntervalUnit::DaysTime) => "tiD",
        ArrowType::Interval(IntervalUnit::MonthDaysNs) => "tin",
        ArrowType::Timestamp(u, tz) => {
            return format!("ts{}:{}", u.format_char(), tz.as_deref().unwrap_or(""));
        }
        ArrowType::FixedSizeBinary(w) => return format!("w:{}", w),
        ArrowType::Decimal128(p, s) => return format!("d:{},{}", p, s),
        ArrowType::List(_) => "+l",
        ArrowType::FixedSizeList(_, n) => return format!("+w:{}", n),
        ArrowType::Struct(_) => "+s",
        ArrowType::Map(_, _) => "+m",
    };
    s.to_string()
}

fn unimplemented(format: &str) -> ColbridgeError {
    ColbridgeError::not_implemented(format!("unimplemented type '{}'", format))
}

fn parse_width(format: &str, param: &str) -> Result<i32, ColbridgeError> {
    match param.parse::<i32>() {
        Ok(n) if n >= 0 => Ok(n),
        _ => Err(ColbridgeError::invalid(format!(
            "invalid width parameter in format '{}'",
            format
        ))),
    }
}

fn single_child(format: &str, mut children: Vec<Field>) -> Result<Field, ColbridgeError> {
    if children.len() != 1 {
        return Err(ColbridgeError::ChildCountMismatch {
            dtype: format.to_string(),
            expected: 1,
            found: children.len() as i64,
        });
    }
    Ok(children.remove(0))
}

/// Encodes metadata as the C Data Interface blob: an `i32` pair count followed by
/// length-prefixed keys and values, all native-endian.
///
/// Returns `None` for empty metadata, which is exported as a null pointer.
pub fn encode_metadata(metadata: &BTreeMap<String, String>) -> Option<Vec<u8>> {
    if metadata.is_empty() {
        return None;
    }
    let mut out = Vec::new();
    out.extend_from_slice(&(metadata.len() as i32).to_ne_bytes());
    for (k, v) in metadata {
        out.extend_from_slice(&(k.len() as i32).to_ne_bytes());
        out.extend_from_slice(k.as_bytes());
        out.extend_from_slice(&(v.len() as i32).to_ne_bytes());
        out.extend_from_slice(v.as_bytes());
    }
    Some(out)
}

/// Decodes a metadata blob from a byte slice.
///
/// Non-UTF-8 keys or values are decoded lossily.
pub fn decode_metadata_bytes(bytes: &[u8]) -> Result<BTreeMap<String, String>, ColbridgeError> {
    let mut cursor = MetadataCursor { bytes, pos: 0 };
    let n_pairs = cursor.read_len()?;
    let mut out = BTreeMap::new();
    for _ in 0..n_pairs {
        let k = cursor.read_str()?;
        let v = cursor.read_str()?;
        out.insert(k, v);
    }
    Ok(out)
}

/// Decodes a metadata blob from a raw pointer. A null pointer yields empty metadata.
///
/// # Safety
/// `ptr` must be null or point at a well-formed blob that stays valid for the call.
pub unsafe fn decode_metadata(ptr: *const c_char) -> Result<BTreeMap<String, String>, ColbridgeError> {
    if ptr.is_null() {
        return Ok(BTreeMap::new());
    }
    let base = ptr as *const u8;
    // The blob carries no total length, so walk the prefixes first.
    let read_i32 = |at: usize| unsafe { (base.add(at) as *const i32).read_unaligned() };
    let n_pairs = read_i32(0);
    if n_pairs < 0 {
        return Err(ColbridgeError::invalid(format!("negative metadata pair count {}", n_pairs)));
    }
    let mut pos = 4usize;
    for _ in 0..(n_pairs as usize) * 2 {
        let len = read_i32(pos);
        if len < 0 {
            return Err(ColbridgeError::invalid(format!("negative metadata length {}", len)));
        }
        pos += 4 + len as usize;
    }
    let bytes = unsafe { std::slice::from_raw_parts(base, pos) };
    decode_metadata_bytes(bytes)
}

struct MetadataCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl MetadataCursor<'_> {
    fn take(&mut self, n: usize) -> Result<&[u8], ColbridgeError> {
        let end = self.pos.checked_add(n).filter(|&e| e <= self.bytes.len()).ok_or_else(|| {
            ColbridgeError::invalid(format!(
                "metadata blob truncated at byte {} (needs {} more)",
                self.pos, n
            ))
        })?;
        let out = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn read_len(&mut self) -> Result<usize, ColbridgeError> {
        let raw = self.take(4)?;
        let v = i32::from_ne_bytes([raw[0], raw[1], raw[2], raw[3]]);
        usize::try_from(v)
            .map_err(|_| ColbridgeError::invalid(format!("negative metadata length {}", v)))
    }

    fn read_str(&mut self) -> Result<String, ColbridgeError> {
        let len = self.read_len()?;
        Ok(String::from_utf8_lossy(self.take(len)?).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_codes() {
        assert_eq!(decode_format("e", vec![], 0).unwrap(), ArrowType::Float16);
        assert_eq!(decode_format("z", vec![], 0).unwrap(), ArrowType::Binary);
        assert_eq!(
            decode_format("ttm", vec![], 0).unwrap(),
            ArrowType::Time32(TimeUnit::Milliseconds)
        );
    }

    #[test]
    fn test_timestamp_default_zone() {
        assert_eq!(
            decode_format("tsu:", vec![], 0).unwrap(),
            ArrowType::Timestamp(TimeUnit::Microseconds, Some("UTC".into()))
        );
    }

    #[test]
    fn test_decimal_three_part_rejected() {
        let err = decode_format("d:10,2,256", vec![], 0).unwrap_err();
        assert_eq!(err, ColbridgeError::not_implemented("only decimal128 is supported"));
    }

    #[test]
    fn test_decimal_precision_and_scale_bounds() {
        assert_eq!(
            decode_format("d:38,38", vec![], 0).unwrap(),
            ArrowType::Decimal128(38, 38)
        );
        assert_eq!(decode_format("d:5,-3", vec![], 0).unwrap(), ArrowType::Decimal128(5, -3));
        for bad in ["d:50,2", "d:0,0", "d:5,9"] {
            assert!(
                matches!(decode_format(bad, vec![], 0), Err(ColbridgeError::Invalid { .. })),
                "{}",
                bad
            );
        }
    }

    #[test]
    fn test_unknown_fails_closed() {
        assert!(matches!(
            decode_format("q", vec![], 0),
            Err(ColbridgeError::NotImplemented { .. })
        ));
        assert!(matches!(
            decode_format("+l", vec![], 0),
            Err(ColbridgeError::ChildCountMismatch { expected: 1, found: 0, .. })
        ));
        assert!(decode_format("w:-3", vec![], 0).is_err());
    }

    #[test]
    fn test_metadata_round_trip() {
        let mut md = BTreeMap::new();
        md.insert("k1".to_string(), "v1".to_string());
        md.insert("key".to_string(), String::new());
        let blob = encode_metadata(&md).unwrap();
        assert_eq!(decode_metadata_bytes(&blob).unwrap(), md);
        let via_ptr = unsafe { decode_metadata(blob.as_ptr() as *const c_char) }.unwrap();
        assert_eq!(via_ptr, md);
        assert!(encode_metadata(&BTreeMap::new()).is_none());
    }

    #[test]
    fn test_metadata_truncated() {
        let mut blob = 1i32.to_ne_bytes().to_vec();
        blob.extend_from_slice(&10i32.to_ne_bytes());
        blob.extend_from_slice(b"abc");
        assert!(decode_metadata_bytes(&blob).is_err());
    }
}
