//! Buffered tab-delimited report output.
//!
//! Integers are formatted with itoa to avoid allocation in the hot path.

use std::io::{BufWriter, Write};

use crate::error::{Error, Result};
use crate::streaming::buffers::DEFAULT_OUTPUT_BUFFER;
use crate::variant::OutputRecord;

/// Fixed leading columns of a variant report.
pub const FIXED_COLUMNS: [&str; 9] = [
    "#CHROM", "POS", "ID", "REF", "ALT", "QUAL", "FILTER", "INFO", "FORMAT",
];

/// Tab-delimited report writer.
///
/// Every write error is returned as [`Error::Write`]. Callers should still
/// [`flush`](Self::flush) after a failure so buffered lines reach the file.
pub struct ReportWriter<W: Write> {
    writer: BufWriter<W>,
    itoa_buf: itoa::Buffer,
}

impl<W: Write> ReportWriter<W> {
    pub fn new(output: W) -> Self {
        Self::with_capacity(DEFAULT_OUTPUT_BUFFER, output)
    }

    pub fn with_capacity(capacity: usize, output: W) -> Self {
        Self {
            writer: BufWriter::with_capacity(capacity, output),
            itoa_buf: itoa::Buffer::new(),
        }
    }

    /// Write the fixed columns, the sample labels and the annotation columns.
    pub fn write_header<'s>(
        &mut self,
        labels: impl IntoIterator<Item = &'s str>,
        columns: &[String],
    ) -> Result<()> {
        self.write_bytes(FIXED_COLUMNS.join("\t").as_bytes())?;
        for label in labels {
            self.write_tab()?;
            self.write_bytes(label.as_bytes())?;
        }
        for column in columns {
            self.write_tab()?;
            self.write_bytes(column.as_bytes())?;
        }
        self.write_newline()
    }

    /// Write one variant. `columns` annotation cells are written, each the
    /// stored value or `placeholder` when the variant has no annotation.
    pub fn write_record(
        &mut self,
        record: &OutputRecord<'_>,
        columns: usize,
        placeholder: &str,
    ) -> Result<()> {
        let mut first = true;
        for field in record.fixed.iter().chain(&record.genotypes) {
            if !std::mem::take(&mut first) {
                self.write_tab()?;
            }
            self.write_bytes(field.as_bytes())?;
        }
        for idx in 0..columns {
            let value = record
                .annotation
                .and_then(|a| a.get(idx))
                .unwrap_or(placeholder);
            self.write_tab()?;
            self.write_bytes(value.as_bytes())?;
        }
        self.write_newline()
    }

    /// Write fields joined by tabs, then a newline.
    pub fn write_fields<I, S>(&mut self, fields: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for (idx, field) in fields.into_iter().enumerate() {
            if idx > 0 {
                self.write_tab()?;
            }
            self.write_bytes(field.as_ref().as_bytes())?;
        }
        self.write_newline()
    }

    #[inline]
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes).map_err(Error::Write)
    }

    #[inline]
    pub fn write_tab(&mut self) -> Result<()> {
        self.write_bytes(b"\t")
    }

    #[inline]
    pub fn write_newline(&mut self) -> Result<()> {
        self.write_bytes(b"\n")
    }

    /// Write an integer using itoa.
    #[inline]
    pub fn write_int<I: itoa::Integer>(&mut self, n: I) -> Result<()> {
        self.writer
            .write_all(self.itoa_buf.format(n).as_bytes())
            .map_err(Error::Write)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush().map_err(Error::Write)
    }
}
