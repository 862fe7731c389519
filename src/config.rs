//! Resolved run configuration for the variant pipeline.
//!
//! The CLI layer fills a [`PipelineConfig`]; everything downstream reads
//! already-validated values from it.

use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Default read buffer for the variant stream (5012 * 5012 bytes).
/// Single VCF lines for biobank cohorts can run to tens of megabytes.
pub const DEFAULT_READ_BUFFER: usize = 5012 * 5012;

/// Default maximum allele frequency for a variant to count as rare.
pub const DEFAULT_MAF_THRESHOLD: f64 = 0.1;

/// Rendered in place of an annotation value that does not exist.
pub const DEFAULT_PLACEHOLDER: &str = "-";

/// Default output path, kept from the original tool.
pub const DEFAULT_OUTPUT: &str = "test_output.txt";

/// Sample genotype columns start after the 9 fixed VCF columns.
pub const SAMPLE_COLUMN_OFFSET: usize = 9;

/// Position of the allele-frequency entry within INFO by default.
pub const DEFAULT_AF_POSITION: usize = 2;

/// Where to find the allele frequencies inside the INFO column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlleleFrequencyField {
    /// The n-th `;`-separated INFO entry (0-based).
    Position(usize),
    /// The INFO entry whose key matches, e.g. `AF` in `AF=0.01`.
    Key(String),
}

impl Default for AlleleFrequencyField {
    fn default() -> Self {
        AlleleFrequencyField::Position(DEFAULT_AF_POSITION)
    }
}

impl FromStr for AlleleFrequencyField {
    type Err = String;

    /// A bare number selects by position, anything else by key.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("allele-frequency field cannot be empty".to_string());
        }
        Ok(match s.parse::<usize>() {
            Ok(pos) => AlleleFrequencyField::Position(pos),
            Err(_) => AlleleFrequencyField::Key(s.to_string()),
        })
    }
}

/// Everything the pull-variants pipeline needs, resolved from the CLI.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Compressed annotation file
    pub annotation_path: PathBuf,
    /// Phenotype/score file
    pub phenotype_path: PathBuf,
    /// Annotation columns to carry into the report, in output order
    pub keep_columns: Vec<String>,
    /// Region string, parsed during pre-flight
    pub region: String,
    /// Output report path
    pub output: PathBuf,
    /// Sites pass if any listed frequency is <= this value
    pub maf_threshold: f64,
    pub af_field: AlleleFrequencyField,
    /// Case-insensitive substrings marking header samples to drop
    pub sample_exclusions: Vec<String>,
    pub placeholder: String,
    /// Read buffer capacity for the variant stream
    pub buffer_size: usize,
}

impl PipelineConfig {
    pub fn new(
        annotation_path: impl Into<PathBuf>,
        phenotype_path: impl Into<PathBuf>,
        keep_columns: &str,
        region: impl Into<String>,
    ) -> Self {
        Self {
            annotation_path: annotation_path.into(),
            phenotype_path: phenotype_path.into(),
            keep_columns: split_list(keep_columns),
            region: region.into(),
            output: PathBuf::from(DEFAULT_OUTPUT),
            maf_threshold: DEFAULT_MAF_THRESHOLD,
            af_field: AlleleFrequencyField::default(),
            sample_exclusions: Vec::new(),
            placeholder: DEFAULT_PLACEHOLDER.to_string(),
            buffer_size: DEFAULT_READ_BUFFER,
        }
    }

    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = output.into();
        self
    }

    pub fn with_maf_threshold(mut self, threshold: f64) -> Self {
        self.maf_threshold = threshold;
        self
    }

    pub fn with_af_field(mut self, field: AlleleFrequencyField) -> Self {
        self.af_field = field;
        self
    }

    /// Set exclusion substrings from a comma-separated list.
    pub fn with_sample_exclusions(mut self, exclusions: &str) -> Self {
        self.sample_exclusions = split_list(exclusions);
        self
    }

    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = placeholder.into();
        self
    }

    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Check the values that cannot be caught by the CLI parser.
    pub fn validate(&self) -> Result<()> {
        if self.region.trim().is_empty() {
            return Err(Error::Config("a region is required".to_string()));
        }
        if self.keep_columns.is_empty() {
            return Err(Error::Config(
                "at least one annotation column to keep is required".to_string(),
            ));
        }
        if !self.maf_threshold.is_finite() || self.maf_threshold < 0.0 {
            return Err(Error::Config(format!(
                "MAF threshold must be a non-negative number, got {}",
                self.maf_threshold
            )));
        }
        if self.buffer_size == 0 {
            return Err(Error::Config("buffer size must be greater than 0".to_string()));
        }
        if self.placeholder.contains(['\t', '\n']) {
            return Err(Error::Config(
                "placeholder cannot contain tabs or newlines".to_string(),
            ));
        }
        Ok(())
    }
}

/// Split a comma-separated list, dropping blank entries.
pub fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
