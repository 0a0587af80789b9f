//! # **Schema Module** - *Schema type and `ArrowSchema` import*
//!
//! Decodes foreign `ArrowSchema` trees into [`Field`] / [`Schema`] values.
//!
//! ## Ownership
//! [`import_field`] and [`import_schema`] move the foreign struct out before
//! decoding, so its release callback runs exactly once whether decoding succeeds
//! or fails. Children are released by the parent's callback, as the C Data
//! Interface requires.

use std::collections::BTreeMap;
use std::ffi::CStr;
use std::fmt::{Display, Formatter};

use tracing::trace;

use crate::enums::error::ColbridgeError;
use crate::ffi::arrow_c_ffi::{ARROW_FLAG_NULLABLE, ArrowSchema, move_schema};
use crate::ffi::arrow_dtype::ArrowType;
use crate::ffi::format::{decode_format, decode_metadata};
use crate::Field;

/// Ordered fields plus top-level metadata.
///
/// Equality is structural and metadata-sensitive; use
/// [`Schema::eq_ignoring_metadata`] to compare shapes only.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Schema {
    pub fields: Vec<Field>,
    pub metadata: BTreeMap<String, String>,
}

impl Schema {
    #[inline]
    pub fn new(fields: Vec<Field>, metadata: BTreeMap<String, String>) -> Self {
        Self { fields, metadata }
    }

    #[inline]
    pub fn n_fields(&self) -> usize {
        self.fields.len()
    }

    #[inline]
    pub fn field(&self, i: usize) -> &Field {
        &self.fields[i]
    }

    /// Index of the first field called `name`.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Field names in order.
    pub fn names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Compares field names, types and nullability, skipping all metadata.
    pub fn eq_ignoring_metadata(&self, other: &Schema) -> bool {
        self.fields.len() == other.fields.len()
            && self.fields.iter().zip(&other.fields).all(|(a, b)| a.eq_ignoring_metadata(b))
    }
}

impl From<Vec<Field>> for Schema {
    fn from(fields: Vec<Field>) -> Self {
        Self { fields, ..Default::default() }
    }
}

impl Display for Schema {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Schema ({} fields)", self.fields.len())?;
        for field in &self.fields {
            writeln!(f, "  {}", field)?;
        }
        Ok(())
    }
}

/// Imports a field from a foreign `ArrowSchema`, consuming it.
///
/// The struct behind `schema` is left released on return, on success and on error.
///
/// # Safety
/// `schema` must be null or point at a valid `ArrowSchema` whose strings, metadata and
/// children are valid per the C Data Interface.
pub unsafe fn import_field(schema: *mut ArrowSchema) -> Result<Field, ColbridgeError> {
    if schema.is_null() {
        return Err(ColbridgeError::ffi("null ArrowSchema pointer"));
    }
    if unsafe { (*schema).is_released() } {
        return Err(ColbridgeError::ffi("ArrowSchema has already been released"));
    }
    let owned = unsafe { move_schema(schema) };
    // `owned` releases itself when it goes out of scope.
    unsafe { decode_field(&owned) }
}

/// Imports a schema from a foreign top-level struct (`+s`) `ArrowSchema`, consuming it.
///
/// # Safety
/// As for [`import_field`].
pub unsafe fn import_schema(schema: *mut ArrowSchema) -> Result<Schema, ColbridgeError> {
    let field = unsafe { import_field(schema)? };
    match field.dtype {
        ArrowType::Struct(fields) => Ok(Schema::new(fields, field.metadata)),
        other => Err(ColbridgeError::invalid(format!(
            "top-level schema must be a struct, got {}",
            other
        ))),
    }
}

/// Decodes a borrowed `ArrowSchema` without releasing it.
///
/// # Safety
/// `s` must be a live `ArrowSchema` with valid pointers per the C Data Interface.
pub unsafe fn decode_field(s: &ArrowSchema) -> Result<Field, ColbridgeError> {
    if s.format.is_null() {
        return Err(ColbridgeError::invalid("ArrowSchema has a null format string"));
    }
    let format = unsafe { CStr::from_ptr(s.format) }
        .to_str()
        .map_err(|_| ColbridgeError::invalid("ArrowSchema format is not valid UTF-8"))?;
    let name = if s.name.is_null() {
        String::new()
    } else {
        unsafe { CStr::from_ptr(s.name) }.to_string_lossy().into_owned()
    };
    if !s.dictionary.is_null() {
        return Err(ColbridgeError::not_implemented(format!(
            "dictionary-encoded field '{}' is not supported",
            name
        )));
    }

    let n_children = usize::try_from(s.n_children).map_err(|_| {
        ColbridgeError::invalid(format!("negative n_children {} on '{}'", s.n_children, name))
    })?;
    if n_children > 0 && s.children.is_null() {
        return Err(ColbridgeError::invalid(format!(
            "'{}' declares {} children but has a null children pointer",
            name, n_children
        )));
    }
    let mut children = Vec::with_capacity(n_children);
    for i in 0..n_children {
        let child = unsafe { *s.children.add(i) };
        if child.is_null() {
            return Err(ColbridgeError::invalid(format!("child {} of '{}' is null", i, name)));
        }
        children.push(unsafe { decode_field(&*child)? });
    }

    let metadata = unsafe { decode_metadata(s.metadata)? };
    let dtype = decode_format(format, children, s.flags)?;
    trace!(name = %name, format, dtype = %dtype, "decoded schema field");
    Ok(Field {
        name,
        dtype,
        nullable: s.flags & ARROW_FLAG_NULLABLE != 0,
        metadata,
    })
}
