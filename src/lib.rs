//! Copyright © 2025 Peter Garfield Bower. All rights reserved.
//!
//! # **Colbridge** - *Arrow C Data Interface bridge and columnar CSV encoder*
//!
//! - Imports foreign `ArrowArray` / `ArrowSchema` / `ArrowArrayStream` structures
//!   without copying their buffers. Every imported buffer keeps the producer's
//!   allocation alive, and the producer's release callback runs exactly once, when
//!   the last buffer is dropped or as soon as an import fails.
//! - Decodes C Data Interface format strings into [`ArrowType`] and back.
//! - Exports arrays, schemas and batch readers through the same ABI.
//! - Encodes `RecordBatch`es, `Table`s and batch readers as RFC4180 CSV using a
//!   two-pass, single-allocation-per-slice algorithm (feature `csv`).

pub mod enums {
    pub mod error;
    pub mod time_units;
}

pub mod ffi {
    pub mod arrow_c_ffi;
    pub mod arrow_dtype;
    pub mod format;
    pub mod import;
    pub mod schema;
    pub mod stream;
}

pub mod structs {
    pub mod chunked {
        pub mod table;
    }
    pub mod array_builders;
    pub mod array_data;
    pub mod bitmask;
    pub mod buffer;
    pub mod field;
    pub mod record_batch;
    pub mod shared_buffer;
}

pub mod traits {
    pub mod record_batch_reader;
    pub mod type_unions;
}

pub mod kernels {
    pub mod cast;
}

#[cfg(feature = "csv")]
pub mod csv {
    pub mod options;
    pub mod populator;
    pub mod writer;
}

pub use enums::error::ColbridgeError;
pub use enums::time_units::{IntervalUnit, TimeUnit};

pub use ffi::arrow_c_ffi::{
    ARROW_FLAG_DICTIONARY_ORDERED, ARROW_FLAG_MAP_KEYS_SORTED, ARROW_FLAG_NULLABLE, ArrowArray,
    ArrowSchema, export_array, export_field, export_record_batch, export_schema,
};
pub use ffi::arrow_dtype::{ArrowType, PhysicalLayout};
pub use ffi::format::{decode_format, encode_format};
pub use ffi::import::{
    ImportedArray, import_array, import_array_with_schema, import_record_batch,
    import_record_batch_with_schema,
};
pub use ffi::schema::{Schema, import_field, import_schema};
pub use ffi::stream::{ArrowArrayStream, ArrowArrayStreamReader, export_reader_stream};

pub use structs::array_data::{ArrayData, ArrayRef, BinaryView};
pub use structs::bitmask::Bitmask;
pub use structs::buffer::Buffer;
pub use structs::chunked::table::{Table, TableBatchReader};
pub use structs::field::Field;
pub use structs::record_batch::RecordBatch;
pub use structs::shared_buffer::SharedBuffer;

pub use traits::record_batch_reader::RecordBatchReader;
pub use traits::type_unions::{Float, Integer, NativeType};

pub use kernels::cast::cast_to_utf8;

#[cfg(feature = "csv")]
pub use csv::options::{QuotingStyle, WriteOptions};
#[cfg(feature = "csv")]
pub use csv::writer::{CsvWriter, WriteStats, write_csv_batch, write_csv_reader, write_csv_table};
