//! # **CSV Writer** - *Two-pass columnar CSV encoder*
//!
//! Streams `RecordBatch`es, `Table`s and batch readers to any [`std::io::Write`] sink
//! as RFC4180 text.
//!
//! ## Algorithm
//! Input is cut into slices of at most `batch_size` rows. For each slice:
//! 1. Every column is cast to utf8 and its per-row rendered length is summed into
//!    `offsets`, left to right.
//! 2. The per-row totals plus delimiters and row terminator are made cumulative, which
//!    gives each row's end offset and the exact slice size.
//! 3. The single output buffer is resized once to that size. It never releases
//!    capacity between slices.
//! 4. Columns are written right to left, each moving its rows' offsets down to the
//!    column start. After the leftmost column, `offsets[0] == 0`.
//!
//! The header row is written once at construction with the same reverse technique.
//! Populators are chosen per column at construction and reused for every slice.

use std::io::Write;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::csv::options::WriteOptions;
use crate::csv::populator::{ColumnPopulator, QUOTE_DELIMITER_COUNT, escape_reverse};
use crate::enums::error::ColbridgeError;
use crate::ffi::schema::Schema;
use crate::structs::chunked::table::Table;
use crate::structs::record_batch::RecordBatch;
use crate::traits::record_batch_reader::RecordBatchReader;

/// Initial buffer bytes reserved per cell.
const COLUMN_SIZE_GUESS: usize = 8;
const MAX_INITIAL_BUFFER: usize = 1 << 20;

/// Counters for a writer's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteStats {
    /// Translated slices, each written to the sink as one block.
    pub num_record_batches: u64,
}

/// # CsvWriter
///
/// Encodes batches that share one schema into a sink.
///
/// ## Behaviour
/// - Options are validated and populators selected in [`CsvWriter::try_new`]; any
///   configuration or unsupported-type error surfaces there.
/// - Every written batch must match the writer's schema, ignoring metadata.
/// - Zero-row batches write nothing.
/// - A failed slice aborts the call; earlier slices are already in the sink.
pub struct CsvWriter<W: Write> {
    sink: W,
    schema: Arc<Schema>,
    options: WriteOptions,
    populators: Vec<ColumnPopulator>,
    offsets: Vec<usize>,
    data_buffer: Vec<u8>,
    stats: WriteStats,
}

impl<W: Write> CsvWriter<W> {
    /// Validates `options`, builds one populator per field and writes the header
    /// if enabled.
    pub fn try_new(
        sink: W,
        schema: Arc<Schema>,
        options: WriteOptions,
    ) -> Result<Self, ColbridgeError> {
        options.validate()?;
        let n_cols = schema.n_fields();
        if n_cols == 0 {
            return Err(ColbridgeError::invalid("CSV output needs at least one column"));
        }
        let null_string: Arc<[u8]> = Arc::from(options.null_string.as_bytes());
        let populators = schema
            .fields
            .iter()
            .enumerate()
            .map(|(col, field)| {
                let end_chars = if col + 1 < n_cols {
                    vec![options.delimiter]
                } else {
                    options.eol.as_bytes().to_vec()
                };
                ColumnPopulator::for_field(
                    field,
                    end_chars,
                    null_string.clone(),
                    options.delimiter,
                    options.quoting_style,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            columns = n_cols,
            quoting = %options.quoting_style,
            batch_size = options.batch_size,
            "created CSV writer"
        );

        let mut writer = Self {
            sink,
            data_buffer: Vec::with_capacity(
                options
                    .batch_size
                    .saturating_mul(n_cols * COLUMN_SIZE_GUESS)
                    .min(MAX_INITIAL_BUFFER),
            ),
            schema,
            options,
            populators,
            offsets: Vec::new(),
            stats: WriteStats::default(),
        };
        if writer.options.include_header {
            writer.write_header()?;
        }
        Ok(writer)
    }

    #[inline]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    #[inline]
    pub fn options(&self) -> &WriteOptions {
        &self.options
    }

    #[inline]
    pub fn stats(&self) -> WriteStats {
        self.stats
    }

    /// Writes `batch` in slices of at most `batch_size` rows.
    pub fn write_batch(&mut self, batch: &RecordBatch) -> Result<(), ColbridgeError> {
        self.check_schema(batch.schema())?;
        self.write_rows(batch)
    }

    /// Writes `table` in row chunks of `max_chunksize`, or `batch_size` when that is
    /// `None` or zero. Chunks never span the table's batches, and each chunk is
    /// further cut to `batch_size`.
    pub fn write_table(
        &mut self,
        table: &Table,
        max_chunksize: Option<usize>,
    ) -> Result<(), ColbridgeError> {
        self.check_schema(table.schema())?;
        let chunksize = match max_chunksize {
            Some(n) if n > 0 => n,
            _ => self.options.batch_size,
        };
        for chunk in table.batch_reader(chunksize) {
            self.write_rows(&chunk?)?;
        }
        Ok(())
    }

    /// Drains `reader`, writing each batch as [`CsvWriter::write_batch`] does.
    pub fn write_reader<R>(&mut self, reader: &mut R) -> Result<(), ColbridgeError>
    where
        R: RecordBatchReader + ?Sized,
    {
        while let Some(batch) = reader.read_next()? {
            self.write_batch(&batch)?;
        }
        Ok(())
    }

    /// Flushes the sink.
    pub fn flush(&mut self) -> Result<(), ColbridgeError> {
        self.sink.flush()?;
        Ok(())
    }

    /// Flushes and returns the sink.
    pub fn into_inner(mut self) -> Result<W, ColbridgeError> {
        self.sink.flush()?;
        Ok(self.sink)
    }

    fn write_rows(&mut self, batch: &RecordBatch) -> Result<(), ColbridgeError> {
        let n_rows = batch.n_rows();
        let mut offset = 0;
        while offset < n_rows {
            let len = self.options.batch_size.min(n_rows - offset);
            self.write_slice(&batch.slice(offset, len))?;
            offset += len;
        }
        Ok(())
    }

    fn check_schema(&self, schema: &Arc<Schema>) -> Result<(), ColbridgeError> {
        if Arc::ptr_eq(schema, &self.schema) || schema.eq_ignoring_metadata(&self.schema) {
            return Ok(());
        }
        Err(ColbridgeError::SchemaMismatch {
            message: format!(
                "batch fields [{}] do not match writer fields [{}]",
                schema.names().join(", "),
                self.schema.names().join(", ")
            ),
        })
    }

    fn write_slice(&mut self, slice: &RecordBatch) -> Result<(), ColbridgeError> {
        if slice.n_rows() == 0 {
            return Ok(());
        }
        self.translate_minimal_batch(slice)?;
        self.sink.write_all(&self.data_buffer)?;
        self.stats.num_record_batches += 1;
        Ok(())
    }

    fn header_size(&self) -> usize {
        let names: usize = self
            .schema
            .fields
            .iter()
            .map(|f| f.name.len() + memchr::memchr_iter(b'"', f.name.as_bytes()).count())
            .sum();
        names + QUOTE_DELIMITER_COUNT * self.schema.n_fields() + self.options.eol.len() - 1
    }

    fn write_header(&mut self) -> Result<(), ColbridgeError> {
        let size = self.header_size();
        self.data_buffer.resize(size, 0);
        let eol = self.options.eol.as_bytes();
        let mut next = size - eol.len();
        self.data_buffer[next..].copy_from_slice(eol);
        let last = self.schema.n_fields() - 1;
        for (col, field) in self.schema.fields.iter().enumerate().rev() {
            if col != last {
                next -= 1;
                self.data_buffer[next] = self.options.delimiter;
            }
            next -= 1;
            self.data_buffer[next] = b'"';
            next = escape_reverse(field.name.as_bytes(), &mut self.data_buffer, next);
            next -= 1;
            self.data_buffer[next] = b'"';
        }
        debug_assert_eq!(next, 0);
        self.sink.write_all(&self.data_buffer)?;
        Ok(())
    }

    /// Renders one non-empty slice into `data_buffer`.
    fn translate_minimal_batch(&mut self, batch: &RecordBatch) -> Result<(), ColbridgeError> {
        let n_rows = batch.n_rows();
        self.offsets.clear();
        self.offsets.resize(n_rows, 0);

        for (col, populator) in self.populators.iter_mut().enumerate() {
            populator.update_row_lengths(batch.column(col), &mut self.offsets)?;
        }

        // one delimiter between columns, then the row terminator
        let delimiters_length = self.populators.len() - 1 + self.options.eol.len();
        let mut total = 0;
        for row_end in self.offsets.iter_mut() {
            total += *row_end + delimiters_length;
            *row_end = total;
        }
        self.data_buffer.resize(total, 0);

        for populator in self.populators.iter().rev() {
            populator.populate_columns(&mut self.data_buffer, &mut self.offsets)?;
        }
        debug_assert_eq!(self.offsets[0], 0);
        trace!(rows = n_rows, bytes = total, "translated CSV slice");
        Ok(())
    }
}

/// Writes one batch to `sink`.
pub fn write_csv_batch<W: Write>(
    batch: &RecordBatch,
    options: &WriteOptions,
    sink: W,
) -> Result<WriteStats, ColbridgeError> {
    let mut writer = CsvWriter::try_new(sink, batch.schema().clone(), options.clone())?;
    writer.write_batch(batch)?;
    writer.flush()?;
    Ok(writer.stats())
}

/// Writes a whole table to `sink`, chunked by `options.batch_size`.
pub fn write_csv_table<W: Write>(
    table: &Table,
    options: &WriteOptions,
    sink: W,
) -> Result<WriteStats, ColbridgeError> {
    let mut writer = CsvWriter::try_new(sink, table.schema().clone(), options.clone())?;
    writer.write_table(table, None)?;
    writer.flush()?;
    Ok(writer.stats())
}

/// Drains `reader` into `sink`.
pub fn write_csv_reader<W, R>(
    reader: &mut R,
    options: &WriteOptions,
    sink: W,
) -> Result<WriteStats, ColbridgeError>
where
    W: Write,
    R: RecordBatchReader + ?Sized,
{
    let schema = reader.schema()?;
    let mut writer = CsvWriter::try_new(sink, schema, options.clone())?;
    writer.write_reader(reader)?;
    writer.flush()?;
    Ok(writer.stats())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csv::options::QuotingStyle;
    use crate::{ArrayData, ArrowType, Field};

    fn schema() -> Arc<Schema> {
        Arc::new(Schema::from(vec![
            Field::new("id", ArrowType::Int32, false, None),
            Field::new("name", ArrowType::String, true, None),
        ]))
    }

    fn batch(ids: &[i32], names: &[Option<&str>]) -> RecordBatch {
        let ids: Vec<Option<i32>> = ids.iter().copied().map(Some).collect();
        RecordBatch::try_new(
            schema(),
            vec![
                ArrayData::from_options(ArrowType::Int32, &ids).unwrap().into_ref(),
                ArrayData::from_strs(names).into_ref(),
            ],
        )
        .unwrap()
    }

    fn encode(batch: &RecordBatch, options: &WriteOptions) -> String {
        let mut out = Vec::new();
        write_csv_batch(batch, options, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_header_and_rows() {
        let b = batch(&[1, 5], &[Some("a"), None]);
        assert_eq!(encode(&b, &WriteOptions::default()), "\"id\",\"name\"\n1,\"a\"\n5,\n");
    }

    #[test]
    fn test_header_escapes_quotes() {
        let schema = Arc::new(Schema::from(vec![Field::new("say \"x\"", ArrowType::Int8, true, None)]));
        let mut out = Vec::new();
        let w = CsvWriter::try_new(&mut out, schema, WriteOptions::default()).unwrap();
        drop(w);
        assert_eq!(String::from_utf8(out).unwrap(), "\"say \"\"x\"\"\"\n");
    }

    #[test]
    fn test_slicing_counts_stats() {
        let b = batch(&[1, 2, 3, 4, 5], &[Some("a"); 5]);
        let mut out = Vec::new();
        let opts = WriteOptions::new().with_header(false).with_batch_size(2);
        let stats = write_csv_batch(&b, &opts, &mut out).unwrap();
        assert_eq!(stats.num_record_batches, 3);
        assert_eq!(String::from_utf8(out).unwrap().lines().count(), 5);
    }

    #[test]
    fn test_custom_delimiter_eol_and_null() {
        let b = batch(&[7], &[None]);
        let opts = WriteOptions::new()
            .with_delimiter(b'\t')
            .with_eol("\r\n")
            .with_null_string("NULL")
            .with_quoting_style(QuotingStyle::AllValid);
        assert_eq!(encode(&b, &opts), "\"id\"\t\"name\"\r\n\"7\"\tNULL\r\n");
    }

    #[test]
    fn test_schema_mismatch() {
        let mut out = Vec::new();
        let other = Arc::new(Schema::from(vec![Field::new("x", ArrowType::Int64, true, None)]));
        let mut w = CsvWriter::try_new(&mut out, other, WriteOptions::default()).unwrap();
        let err = w.write_batch(&batch(&[1], &[Some("a")])).unwrap_err();
        assert!(matches!(err, ColbridgeError::SchemaMismatch { .. }));
    }

    #[test]
    fn test_empty_schema_rejected() {
        let err = CsvWriter::try_new(Vec::new(), Arc::new(Schema::default()), WriteOptions::default())
            .err()
            .unwrap();
        assert!(matches!(err, ColbridgeError::Invalid { .. }));
    }
}
