//! Variant-stream header handling and sample reconciliation.
//!
//! The `#CHROM` line names the nine fixed columns and then one column per
//! sample. [`SampleIndex`] records which of those columns are reported, in
//! header order, and how each sample is labelled in the output.

use rustc_hash::{FxHashMap, FxHashSet};
use std::io::BufRead;

use crate::config::SAMPLE_COLUMN_OFFSET;
use crate::error::{Error, Result};
use crate::phenotype::PhenotypeMap;
use crate::streaming::parsing::{split_fields, trim_line_end, LineKind};

/// Marker that identifies the column header of a variant stream.
pub const HEADER_MARKER: &str = "#CHROM";

/// Read up to and including the `#CHROM` line. `line_no` is advanced for
/// every line consumed.
///
/// Metadata lines are skipped. Reaching a data line or the end of the
/// stream first means the header was stripped upstream, which is fatal.
pub fn read_variant_header<R: BufRead>(input: &mut R, line_no: &mut usize) -> Result<String> {
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let n = input.read_until(b'\n', &mut buf).map_err(|source| Error::Input {
            line: *line_no,
            source,
        })?;
        if n == 0 {
            return Err(Error::MissingHeader);
        }
        *line_no += 1;

        // Metadata may carry free text in any encoding.
        let text = String::from_utf8_lossy(&buf);
        let line = trim_line_end(&text);
        if line.contains(HEADER_MARKER) {
            return Ok(line.to_string());
        }
        match LineKind::of(line) {
            LineKind::Blank | LineKind::Meta => {}
            LineKind::Header => log::debug!("Ignoring comment line {} before the header", line_no),
            LineKind::Data => return Err(Error::MissingHeader),
        }
    }
}

/// One reported sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedSample {
    pub id: String,
    /// Output label, `id_score` when a phenotype is attached
    pub label: String,
    /// Column in the variant stream
    pub column: usize,
}

/// Ordered samples of the variant header and their stream columns.
#[derive(Debug, Clone)]
pub struct SampleIndex {
    samples: Vec<IndexedSample>,
    by_id: FxHashMap<String, usize>,
    header_columns: usize,
}

impl SampleIndex {
    /// Index the header samples without attaching phenotypes.
    pub fn from_header(header: &str, exclusions: &[String]) -> Result<Self> {
        let (kept, header_columns) = header_samples(header, exclusions)?;
        let samples = kept
            .into_iter()
            .map(|(column, id)| IndexedSample {
                label: id.to_string(),
                id: id.to_string(),
                column,
            })
            .collect();
        Ok(Self::build(samples, header_columns))
    }

    /// Index the header samples and label each with its phenotype.
    ///
    /// Every kept sample must be in `phenotypes`; all missing ids are
    /// reported together and nothing is indexed.
    pub fn reconcile(
        header: &str,
        phenotypes: &PhenotypeMap,
        exclusions: &[String],
    ) -> Result<Self> {
        let (kept, header_columns) = header_samples(header, exclusions)?;

        let missing: Vec<String> = kept
            .iter()
            .filter(|(_, id)| !phenotypes.contains(id))
            .map(|(_, id)| id.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(Error::UnknownSamples { samples: missing });
        }

        let samples: Vec<IndexedSample> = kept
            .into_iter()
            .filter_map(|(column, id)| {
                let entry = phenotypes.get(id)?;
                Some(IndexedSample {
                    id: id.to_string(),
                    label: entry.decorated(),
                    column,
                })
            })
            .collect();

        let unused = phenotypes.len().saturating_sub(samples.len());
        if unused > 0 {
            log::info!(
                "{} phenotype entries do not appear in the variant header and will be ignored",
                unused
            );
        }
        Ok(Self::build(samples, header_columns))
    }

    fn build(samples: Vec<IndexedSample>, header_columns: usize) -> Self {
        let by_id = samples.iter().map(|s| (s.id.clone(), s.column)).collect();
        if samples.is_empty() {
            log::warn!("The variant header has no samples to report");
        }
        Self {
            samples,
            by_id,
            header_columns,
        }
    }

    pub fn samples(&self) -> &[IndexedSample] {
        &self.samples
    }

    /// Output labels, in index order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.samples.iter().map(|s| s.label.as_str())
    }

    /// Stream column of a sample.
    #[inline]
    pub fn column_of(&self, id: &str) -> Option<usize> {
        self.by_id.get(id).copied()
    }

    /// Total columns the header declares; data rows must match.
    #[inline]
    pub fn header_columns(&self) -> usize {
        self.header_columns
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Split the header, check it and apply exclusions.
/// Returns `(column, id)` for each kept sample and the header width.
fn header_samples<'h>(
    header: &'h str,
    exclusions: &[String],
) -> Result<(Vec<(usize, &'h str)>, usize)> {
    let fields = split_fields(header.trim_end());
    if fields.len() < SAMPLE_COLUMN_OFFSET {
        return Err(Error::ShortHeader {
            expected: SAMPLE_COLUMN_OFFSET,
            found: fields.len(),
        });
    }

    let mut seen = FxHashSet::default();
    for id in &fields[SAMPLE_COLUMN_OFFSET..] {
        if !seen.insert(*id) {
            return Err(Error::DuplicateSample(id.to_string()));
        }
    }

    let lowered: Vec<String> = exclusions.iter().map(|e| e.to_lowercase()).collect();
    let total = fields.len() - SAMPLE_COLUMN_OFFSET;
    let kept: Vec<(usize, &str)> = fields
        .iter()
        .enumerate()
        .skip(SAMPLE_COLUMN_OFFSET)
        .filter(|(_, id)| {
            let id = id.to_lowercase();
            !lowered.iter().any(|e| id.contains(e.as_str()))
        })
        .map(|(column, id)| (column, *id))
        .collect();

    if kept.len() < total {
        log::info!(
            "Excluded {} of {} header samples matching: {}",
            total - kept.len(),
            total,
            exclusions.join(",")
        );
    }
    Ok((kept, fields.len()))
}
