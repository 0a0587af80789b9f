//! # **Column Populators** - *Per-column CSV rendering*
//!
//! A populator renders one column of a slice in two passes:
//!
//! 1. [`ColumnPopulator::update_row_lengths`] casts the column to utf8, keeps the
//!    casted array, and adds each row's rendered byte count to a running per-row total.
//! 2. [`ColumnPopulator::populate_columns`] writes the column into the output buffer
//!    *backwards*, starting at each row's current end offset and moving the offset
//!    down to the column's first byte.
//!
//! Populators must be driven in reverse column order in pass 2: only row end
//! offsets are known after pass 1, so the rightmost column is written first.

use std::sync::Arc;

use memchr::{memchr, memchr_iter, memchr3};

use crate::csv::options::QuotingStyle;
use crate::enums::error::ColbridgeError;
use crate::ffi::arrow_dtype::ArrowType;
use crate::kernels::cast::cast_to_utf8;
use crate::structs::array_data::ArrayData;
use crate::Field;

/// Opening and closing quote.
pub const QUOTE_COUNT: usize = 2;
/// Quote pair plus a one-byte end char.
pub const QUOTE_DELIMITER_COUNT: usize = QUOTE_COUNT + 1;

#[derive(Debug, Clone)]
enum PopulatorKind {
    /// Values written bare. With `reject_values_with_quotes` set, any value holding
    /// a structural character is an error.
    Unquoted { reject_values_with_quotes: bool },
    /// Valid values wrapped in quotes with embedded quotes doubled. The per-row
    /// escaping flags are recorded in pass 1 so pass 2 skips the scan for clean values.
    Quoted { row_needs_escaping: Vec<bool> },
}

/// # ColumnPopulator
///
/// Renders one column across the length / fill protocol. Built once per writer
/// column and reused across every slice.
#[derive(Debug, Clone)]
pub struct ColumnPopulator {
    kind: PopulatorKind,
    /// Delimiter, or the row terminator for the last column.
    end_chars: Vec<u8>,
    null_string: Arc<[u8]>,
    delimiter: u8,
    casted: Option<ArrayData>,
}

impl ColumnPopulator {
    pub fn unquoted(
        end_chars: Vec<u8>,
        null_string: Arc<[u8]>,
        delimiter: u8,
        reject_values_with_quotes: bool,
    ) -> Self {
        Self {
            kind: PopulatorKind::Unquoted { reject_values_with_quotes },
            end_chars,
            null_string,
            delimiter,
            casted: None,
        }
    }

    pub fn quoted(end_chars: Vec<u8>, null_string: Arc<[u8]>, delimiter: u8) -> Self {
        Self {
            kind: PopulatorKind::Quoted { row_needs_escaping: Vec::new() },
            end_chars,
            null_string,
            delimiter,
            casted: None,
        }
    }

    /// Chooses the populator for `field` under `quoting_style`.
    ///
    /// Nested types are rejected: CSV has no representation for them.
    pub fn for_field(
        field: &Field,
        end_chars: Vec<u8>,
        null_string: Arc<[u8]>,
        delimiter: u8,
        quoting_style: QuotingStyle,
    ) -> Result<Self, ColbridgeError> {
        if field.dtype.is_nested() {
            return Err(ColbridgeError::invalid(format!("Unsupported Type: {}", field.dtype)));
        }
        let string_like = field.dtype.is_binary_like();
        let populator = match quoting_style {
            QuotingStyle::AllValid => Self::quoted(end_chars, null_string, delimiter),
            QuotingStyle::Needed if string_like => Self::quoted(end_chars, null_string, delimiter),
            QuotingStyle::Needed => Self::unquoted(end_chars, null_string, delimiter, false),
            QuotingStyle::None => {
                let reject = string_like || matches!(field.dtype, ArrowType::Decimal128(_, _));
                Self::unquoted(end_chars, null_string, delimiter, reject)
            }
        };
        Ok(populator)
    }

    /// True when valid values are wrapped in quotes.
    #[inline]
    pub fn is_quoted(&self) -> bool {
        matches!(self.kind, PopulatorKind::Quoted { .. })
    }

    /// Pass 1: adds each row's rendered length for `data` onto `row_lengths`.
    ///
    /// `row_lengths` must have one entry per row of `data`.
    pub fn update_row_lengths(
        &mut self,
        data: &ArrayData,
        row_lengths: &mut [usize],
    ) -> Result<(), ColbridgeError> {
        debug_assert_eq!(data.len(), row_lengths.len());
        let casted = cast_to_utf8(data)?;
        let null_len = self.null_string.len();
        {
            let view = casted.binary_view()?;
            match &mut self.kind {
                PopulatorKind::Unquoted { reject_values_with_quotes } => {
                    for (i, len) in row_lengths.iter_mut().enumerate() {
                        *len += match view.get(i) {
                            Some(value) => {
                                if *reject_values_with_quotes {
                                    check_no_structural_chars(value, self.delimiter)?;
                                }
                                value.len()
                            }
                            None => null_len,
                        };
                    }
                }
                PopulatorKind::Quoted { row_needs_escaping } => {
                    row_needs_escaping.clear();
                    row_needs_escaping.resize(view.len(), false);
                    for (i, len) in row_lengths.iter_mut().enumerate() {
                        *len += match view.get(i) {
                            Some(value) => {
                                let quotes = memchr_iter(b'"', value).count();
                                row_needs_escaping[i] = quotes > 0;
                                value.len() + quotes + QUOTE_COUNT
                            }
                            None => null_len,
                        };
                    }
                }
            }
        }
        self.casted = Some(casted);
        Ok(())
    }

    /// Pass 2: writes the column backward from each row's end offset in `offsets`,
    /// leaving each offset at the first byte written.
    pub fn populate_columns(
        &self,
        output: &mut [u8],
        offsets: &mut [usize],
    ) -> Result<(), ColbridgeError> {
        let casted = self.casted.as_ref().ok_or_else(|| {
            ColbridgeError::invalid("populate_columns called before update_row_lengths")
        })?;
        let view = casted.binary_view()?;
        let ec = self.end_chars.len();
        for (i, offset) in offsets.iter_mut().enumerate() {
            let end = *offset;
            output[end - ec..end].copy_from_slice(&self.end_chars);
            let value = match view.get(i) {
                Some(value) => value,
                None => {
                    let start = end - ec - self.null_string.len();
                    output[start..end - ec].copy_from_slice(&self.null_string);
                    *offset = start;
                    continue;
                }
            };
            match &self.kind {
                PopulatorKind::Unquoted { .. } => {
                    let start = end - ec - value.len();
                    output[start..end - ec].copy_from_slice(value);
                    *offset = start;
                }
                PopulatorKind::Quoted { row_needs_escaping } => {
                    let close = end - ec - 1;
                    output[close] = b'"';
                    let start = if row_needs_escaping[i] {
                        escape_reverse(value, output, close)
                    } else {
                        let start = close - value.len();
                        output[start..close].copy_from_slice(value);
                        start
                    };
                    output[start - 1] = b'"';
                    *offset = start - 1;
                }
            }
        }
        Ok(())
    }
}

/// Copies `value` so that it ends just before `end`, doubling every quote.
///
/// Returns the index of the first byte written.
pub fn escape_reverse(value: &[u8], out: &mut [u8], mut end: usize) -> usize {
    for &b in value.iter().rev() {
        end -= 1;
        out[end] = b;
        if b == b'"' {
            end -= 1;
            out[end] = b;
        }
    }
    end
}

fn check_no_structural_chars(value: &[u8], delimiter: u8) -> Result<(), ColbridgeError> {
    if memchr3(b'\n', b'\r', delimiter, value).is_some() || memchr(b'"', value).is_some() {
        return Err(ColbridgeError::invalid(format!(
            "CSV values may not contain structural characters if quoting style is \"None\". \
             See RFC4180. Invalid value: {}",
            String::from_utf8_lossy(value)
        )));
    }
    Ok(())
}
