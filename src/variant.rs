//! Per-record filtering and transformation of variant rows.
//!
//! A row is kept when its allele frequency is at or below the threshold and
//! at least one reported sample carries an alternate allele. Kept rows are
//! turned into [`OutputRecord`]s with calls in sample-index order and the
//! variant's annotation attached.

use std::num::ParseFloatError;
use thiserror::Error;

use crate::annotation::{AnnotationRecord, AnnotationStore};
use crate::config::{AlleleFrequencyField, SAMPLE_COLUMN_OFFSET};
use crate::genotype::carries_alt;
use crate::header::SampleIndex;
use crate::streaming::parsing::split_fields;

const INFO_COLUMN: usize = 7;
const ID_COLUMN: usize = 2;

/// A problem with a single variant row. The row is skipped; the run goes on.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    #[error("line {line}: expected {expected} columns, found {found}")]
    ColumnCount {
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("line {line}: allele frequency field {field} not found in INFO")]
    MissingFrequency { line: usize, field: String },

    #[error("line {line}: not valid UTF-8")]
    InvalidUtf8 { line: usize },

    #[error("line {line}: invalid allele frequency '{value}': {source}")]
    BadFrequency {
        line: usize,
        value: String,
        #[source]
        source: ParseFloatError,
    },
}

/// What happened to a well-formed row.
#[derive(Debug, Clone, PartialEq)]
pub enum Filtered<'a> {
    Kept(OutputRecord<'a>),
    AboveThreshold,
    /// No reported sample carries an alternate allele
    ReferenceOnly,
}

/// A kept variant ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputRecord<'a> {
    /// CHROM through FORMAT
    pub fixed: Vec<String>,
    /// Calls in sample-index order
    pub genotypes: Vec<String>,
    pub annotation: Option<&'a AnnotationRecord>,
}

/// Extract the allele frequencies named by `field` from an INFO string.
pub fn allele_frequencies(
    info: &str,
    field: &AlleleFrequencyField,
    line: usize,
) -> Result<Vec<f64>, RecordError> {
    let entry = match field {
        AlleleFrequencyField::Position(pos) => info.split(';').nth(*pos),
        AlleleFrequencyField::Key(key) => info
            .split(';')
            .find(|e| e.split_once('=').is_some_and(|(k, _)| k == key)),
    };
    let missing = || RecordError::MissingFrequency {
        line,
        field: field_name(field),
    };
    let (_, values) = entry.and_then(|e| e.split_once('=')).ok_or_else(missing)?;

    values
        .split(',')
        .map(|v| {
            v.trim().parse::<f64>().map_err(|source| RecordError::BadFrequency {
                line,
                value: v.to_string(),
                source,
            })
        })
        .collect()
}

fn field_name(field: &AlleleFrequencyField) -> String {
    match field {
        AlleleFrequencyField::Position(pos) => format!("#{}", pos),
        AlleleFrequencyField::Key(key) => format!("'{}'", key),
    }
}

/// True if any frequency is at or below the threshold.
#[inline]
pub fn passes_frequency(freqs: &[f64], threshold: f64) -> bool {
    freqs.iter().any(|&f| f <= threshold)
}

/// The filter/transform stage. Borrows the annotation store and sample
/// index for the life of the run.
#[derive(Debug, Clone, Copy)]
pub struct VariantFilter<'a> {
    threshold: f64,
    af_field: &'a AlleleFrequencyField,
    annotations: &'a AnnotationStore,
    samples: &'a SampleIndex,
}

impl<'a> VariantFilter<'a> {
    pub fn new(
        threshold: f64,
        af_field: &'a AlleleFrequencyField,
        annotations: &'a AnnotationStore,
        samples: &'a SampleIndex,
    ) -> Self {
        Self {
            threshold,
            af_field,
            annotations,
            samples,
        }
    }

    /// Apply the retention rules to one data row (without its newline).
    pub fn apply(&self, line: &str, line_no: usize) -> Result<Filtered<'a>, RecordError> {
        let fields = split_fields(line);
        let expected = self.samples.header_columns();
        if fields.len() != expected {
            return Err(RecordError::ColumnCount {
                line: line_no,
                expected,
                found: fields.len(),
            });
        }

        let freqs = allele_frequencies(fields[INFO_COLUMN], self.af_field, line_no)?;
        if !passes_frequency(&freqs, self.threshold) {
            return Ok(Filtered::AboveThreshold);
        }

        let calls = self.samples.samples().iter().map(|s| fields[s.column]);
        if !calls.clone().any(carries_alt) {
            return Ok(Filtered::ReferenceOnly);
        }

        let record = OutputRecord {
            fixed: fields[..SAMPLE_COLUMN_OFFSET]
                .iter()
                .map(|f| f.to_string())
                .collect(),
            genotypes: calls.map(str::to_string).collect(),
            annotation: self.annotations.get(fields[ID_COLUMN]),
        };
        Ok(Filtered::Kept(record))
    }
}

/// Counts per-record failures and keeps the first few messages.
#[derive(Debug, Default)]
pub struct RecordIssues {
    count: usize,
    samples: Vec<RecordError>,
}

impl RecordIssues {
    const KEPT: usize = 100;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, err: RecordError) {
        log::debug!("Skipping variant: {}", err);
        self.count += 1;
        if self.samples.len() < Self::KEPT {
            self.samples.push(err);
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Emit one warning for everything recorded.
    pub fn report(&self) {
        if self.count == 0 {
            return;
        }
        let first = self
            .samples
            .first()
            .map(ToString::to_string)
            .unwrap_or_default();
        log::warn!(
            "Skipped {} malformed variant rows (first: {}); rerun with --log-level debug for details",
            self.count,
            first
        );
    }
}
