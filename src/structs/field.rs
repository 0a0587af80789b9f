//! # Field Module - *Arrow-compliant Column Metadata Tagging*
//!
//! Defines column-level schema metadata for `Colbridge`.
//!
//! A `Field` captures a column’s name, logical Arrow data type,
//! nullability, and optional lightweight metadata. Nested types carry their
//! child fields inside the `ArrowType`, so a single root `Field` describes
//! the whole tree.
//!
//! This module contains only the schema description — it does not hold
//! any row data. Pair with `ArrayData` to bind a schema to actual values.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use crate::ffi::arrow_dtype::ArrowType;

/// # Field
///
/// ## Description
/// `Field` struct supporting:
/// - Array metadata such as type, name, nullability, etc.
/// - Light metadata, e.g. a few key-value pairs, kept in key order.
/// - `Schema` construction and decoding/encoding over the C Data Interface.
///
/// ### Tips:
/// - Equality is structural and metadata-sensitive. Use
///   [`Field::eq_ignoring_metadata`] when comparing shapes only.
/// - Unlike array columns, imported names are preserved verbatim, including
///   empty names, as foreign producers commonly leave child names blank.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    pub name: String,
    pub dtype: ArrowType,
    pub nullable: bool,
    pub metadata: BTreeMap<String, String>,
}

impl Field {
    /// Constructs a new `Field`.
    pub fn new<T: Into<String>>(
        name: T,
        dtype: ArrowType,
        nullable: bool,
        metadata: Option<BTreeMap<String, String>>,
    ) -> Self {
        Field {
            name: name.into(),
            dtype,
            nullable,
            metadata: metadata.unwrap_or_default(),
        }
    }

    /// Child fields of a nested type, empty otherwise.
    #[inline]
    pub fn children(&self) -> Vec<&Field> {
        self.dtype.children()
    }

    /// Returns a copy with the given metadata.
    pub fn with_metadata(mut self, metadata: BTreeMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Structural comparison of name, type tree and nullability.
    pub fn eq_ignoring_metadata(&self, other: &Field) -> bool {
        self.name == other.name
            && self.nullable == other.nullable
            && self.dtype.eq_ignoring_metadata(&other.dtype)
    }
}

impl Display for Field {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Field \"{}\": {}{}",
            self.name,
            self.dtype,
            if self.nullable { " (nullable)" } else { "" }
        )?;
        if !self.metadata.is_empty() {
            write!(f, " [metadata: {:?}]", self.metadata)?;
        }
        Ok(())
    }
}
