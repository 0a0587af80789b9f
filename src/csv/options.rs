//! # **CSV Options** - *Writer configuration*
//!
//! Plain options struct for [`CsvWriter`](crate::CsvWriter). Every field has a
//! default and a chained `with_*` setter; [`WriteOptions::validate`] runs once when a
//! writer is constructed, so configuration errors never surface mid-stream.

use std::fmt::{Display, Formatter};

use crate::enums::error::ColbridgeError;

/// When values are wrapped in quote characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuotingStyle {
    /// Quote string-like columns only. Numeric and temporal renderings never
    /// carry structural characters, so they are written bare.
    #[default]
    Needed,
    /// Quote every valid value of every column. Nulls stay bare.
    AllValid,
    /// Never quote. A string-like value containing a delimiter, quote or line
    /// break fails the write instead of producing malformed output.
    None,
}

impl Display for QuotingStyle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            QuotingStyle::Needed => f.write_str("Needed"),
            QuotingStyle::AllValid => f.write_str("AllValid"),
            QuotingStyle::None => f.write_str("None"),
        }
    }
}

/// # WriteOptions
///
/// Configuration for the CSV encoder.
///
/// ## Defaults
/// Header on, slices of 1024 rows, `,` delimiter, empty null string, `\n` line
/// terminator, [`QuotingStyle::Needed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOptions {
    /// Write a header row of quoted field names before any data.
    pub include_header: bool,
    /// Maximum rows translated per slice; bounds the output buffer size.
    pub batch_size: usize,
    /// Single-byte field separator.
    pub delimiter: u8,
    /// Written in place of null values. Never quoted.
    pub null_string: String,
    /// Row terminator.
    pub eol: String,
    pub quoting_style: QuotingStyle,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            include_header: true,
            batch_size: 1024,
            delimiter: b',',
            null_string: String::new(),
            eol: "\n".to_string(),
            quoting_style: QuotingStyle::Needed,
        }
    }
}

impl WriteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header(mut self, include_header: bool) -> Self {
        self.include_header = include_header;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_null_string(mut self, null_string: impl Into<String>) -> Self {
        self.null_string = null_string.into();
        self
    }

    pub fn with_eol(mut self, eol: impl Into<String>) -> Self {
        self.eol = eol.into();
        self
    }

    pub fn with_quoting_style(mut self, quoting_style: QuotingStyle) -> Self {
        self.quoting_style = quoting_style;
        self
    }

    /// Checks the options for values the encoder cannot honour.
    pub fn validate(&self) -> Result<(), ColbridgeError> {
        if self.batch_size < 1 {
            return Err(ColbridgeError::invalid(format!(
                "Batch size must be at least 1: {}",
                self.batch_size
            )));
        }
        if matches!(self.delimiter, b'"' | b'\r' | b'\n') {
            return Err(ColbridgeError::invalid(format!(
                "Delimiter cannot be a quote or line break: {:?}",
                self.delimiter as char
            )));
        }
        if self.null_string.contains('"') {
            return Err(ColbridgeError::invalid("Null string cannot contain quotes."));
        }
        if self.eol.is_empty() {
            return Err(ColbridgeError::invalid("End of line string cannot be empty."));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let opts = WriteOptions::default();
        assert!(opts.include_header);
        assert_eq!(opts.batch_size, 1024);
        assert_eq!(opts.delimiter, b',');
        assert_eq!(opts.quoting_style, QuotingStyle::Needed);
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_null_string_with_quote_rejected() {
        let err = WriteOptions::new().with_null_string("\"NA\"").validate().unwrap_err();
        assert_eq!(err, ColbridgeError::invalid("Null string cannot contain quotes."));
    }

    #[test]
    fn test_bad_settings_rejected() {
        assert!(WriteOptions::new().with_batch_size(0).validate().is_err());
        assert!(WriteOptions::new().with_delimiter(b'"').validate().is_err());
        assert!(WriteOptions::new().with_delimiter(b'\n').validate().is_err());
        assert!(WriteOptions::new().with_eol("").validate().is_err());
        assert!(WriteOptions::new().with_delimiter(b'\t').with_eol("\r\n").validate().is_ok());
    }
}
