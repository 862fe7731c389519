//! Genotype counts and carriers per variant.
//!
//! Single pass over a variant stream. Each data row produces one output
//! row with the genotype class tallies over the reported samples and the
//! list of samples carrying an alternate allele.

use std::fmt;
use std::io::{BufRead, Write};

use crate::error::{Error, Result};
use crate::genotype::{carries_alt, GenotypeCounts};
use crate::header::{read_variant_header, SampleIndex};
use crate::streaming::buffers::line_capacity;
use crate::streaming::parsing::{decode_line, split_fields, LineKind};
use crate::streaming::ReportWriter;

const HEADER: [&str; 11] = [
    "CHROM", "POS", "ID", "REF", "ALT", "HOM_REF", "HET", "HOM_ALT", "NO_CALL", "OTHER", "CARRIERS",
];

/// Find the samples carrying each variant.
#[derive(Debug, Clone, Default)]
pub struct FindCarriersCommand {
    /// Case-insensitive substrings of header samples to drop
    pub exclusions: Vec<String>,
}

impl FindCarriersCommand {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_exclusions(mut self, exclusions: Vec<String>) -> Self {
        self.exclusions = exclusions;
        self
    }

    pub fn run_streaming<R: BufRead, W: Write>(
        &self,
        mut input: R,
        output: W,
    ) -> Result<FindCarriersStats> {
        let mut line_no = 0;
        let header = read_variant_header(&mut input, &mut line_no)?;
        let samples = SampleIndex::from_header(&header, &self.exclusions)?;

        let mut writer = ReportWriter::new(output);
        let result = self.scan(&mut input, line_no, &samples, &mut writer);
        let flushed = writer.flush();
        let stats = result?;
        flushed?;

        if stats.malformed > 0 {
            log::warn!("Skipped {} malformed variant rows", stats.malformed);
        }
        log::info!("Finished counting carriers. {}", stats);
        Ok(stats)
    }

    fn scan<R: BufRead, W: Write>(
        &self,
        input: &mut R,
        mut line_no: usize,
        samples: &SampleIndex,
        writer: &mut ReportWriter<W>,
    ) -> Result<FindCarriersStats> {
        writer.write_fields(HEADER)?;

        let mut stats = FindCarriersStats::default();
        let mut buf = Vec::with_capacity(line_capacity(samples.header_columns()));
        let mut carriers = String::new();

        loop {
            buf.clear();
            let n = input.read_until(b'\n', &mut buf).map_err(|source| Error::Input {
                line: line_no,
                source,
            })?;
            if n == 0 {
                break;
            }
            line_no += 1;

            let Some(line) = decode_line(&buf) else {
                log::debug!("line {}: not valid UTF-8", line_no);
                stats.variants_read += 1;
                stats.malformed += 1;
                continue;
            };
            if LineKind::of(line) != LineKind::Data {
                continue;
            }
            stats.variants_read += 1;

            let fields = split_fields(line);
            if fields.len() != samples.header_columns() {
                log::debug!(
                    "line {}: expected {} columns, found {}",
                    line_no,
                    samples.header_columns(),
                    fields.len()
                );
                stats.malformed += 1;
                continue;
            }

            let mut counts = GenotypeCounts::new();
            carriers.clear();
            for sample in samples.samples() {
                let call = fields[sample.column];
                counts.add(call);
                if carries_alt(call) {
                    if !carriers.is_empty() {
                        carriers.push(',');
                    }
                    carriers.push_str(&sample.id);
                    carriers.push(':');
                    carriers.push_str(call);
                }
            }
            if !carriers.is_empty() {
                stats.with_carriers += 1;
            }

            for (idx, field) in fields[..5].iter().enumerate() {
                if idx > 0 {
                    writer.write_tab()?;
                }
                writer.write_bytes(field.as_bytes())?;
            }
            // Partial calls are reported under OTHER.
            for n in [
                counts.hom_ref,
                counts.het,
                counts.hom_alt,
                counts.no_call,
                counts.partial + counts.other,
            ] {
                writer.write_tab()?;
                writer.write_int(n)?;
            }
            writer.write_tab()?;
            let carriers_field: &[u8] = if carriers.is_empty() {
                b"-"
            } else {
                carriers.as_bytes()
            };
            writer.write_bytes(carriers_field)?;
            writer.write_newline()?;
        }
        Ok(stats)
    }
}

/// Statistics from find-carriers.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FindCarriersStats {
    pub variants_read: usize,
    pub with_carriers: usize,
    pub malformed: usize,
}

impl fmt::Display for FindCarriersStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Variants: {}, With carriers: {}, Malformed: {}",
            self.variants_read, self.with_carriers, self.malformed
        )
    }
}
