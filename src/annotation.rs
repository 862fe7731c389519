//! Per-variant annotation store.
//!
//! The annotation source (typically VEP tab output, bgzip compressed) is
//! scanned once. Rows outside the target region are dropped; the rest are
//! folded into one [`AnnotationRecord`] per variant key. A variant with
//! several rows (one per transcript) gets each requested column's values
//! joined with `;` in source order. Repeated values are kept as-is.

use flate2::read::MultiGzDecoder;
use rustc_hash::FxHashMap;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::config::DEFAULT_PLACEHOLDER;
use crate::error::{Error, Result};
use crate::region::{Location, RegionSpec};
use crate::streaming::buffers::ANNOTATION_INPUT_BUFFER;
use crate::streaming::parsing::{column_index, decode_line, split_fields, LineKind};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Separator between values from different rows of the same variant.
pub const VALUE_SEPARATOR: char = ';';

/// Accumulated values for one variant, aligned with the store's columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationRecord {
    values: Vec<String>,
}

impl AnnotationRecord {
    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn get(&self, column_idx: usize) -> Option<&str> {
        self.values.get(column_idx).map(String::as_str)
    }
}

/// Variant key -> annotation. Read-only once built.
#[derive(Debug, Clone)]
pub struct AnnotationStore {
    columns: Vec<String>,
    records: FxHashMap<String, AnnotationRecord>,
}

impl AnnotationStore {
    /// Load annotations for `region` from a gzip/bgzip (or plain) file.
    ///
    /// Failing to open or decompress the file is reported before any row
    /// is read. A scan that keeps no variant at all is an error.
    pub fn load<P: AsRef<Path>>(
        path: P,
        columns: &[String],
        region: &RegionSpec,
    ) -> Result<(Self, AnnotationStats)> {
        let path = path.as_ref();
        log::info!("Reading in the annotation file: {}", path.display());
        let reader = open_source(path)?;
        let (store, stats) = Self::from_reader(reader, columns, region, path)?;
        log::info!(
            "Read in {} annotations from the file: {}",
            store.len(),
            path.display()
        );
        Ok((store, stats))
    }

    /// Build from already-decompressed text. `source` is used in messages.
    pub fn from_reader<R: BufRead>(
        reader: R,
        columns: &[String],
        region: &RegionSpec,
        source: &Path,
    ) -> Result<(Self, AnnotationStats)> {
        let mut scan = AnnotationScan::new(columns, region);
        scan.run(reader).map_err(|e| match e {
            Error::Io(io) => Error::Decompress {
                path: source.to_path_buf(),
                source: io,
            },
            other => other,
        })?;

        let (builder, mut stats) = scan.finish();
        if !stats.missing_columns.is_empty() {
            log::warn!(
                "Expected to find {} annotation columns, but {} never appeared in a header of {}: {}. \
                 This is not fatal; those columns will be filled with '{}'",
                columns.len(),
                stats.missing_columns.len(),
                source.display(),
                stats.missing_columns.join(","),
                DEFAULT_PLACEHOLDER
            );
        }
        if stats.rows_bad_position > 0 {
            log::warn!(
                "Skipped {} annotation rows whose position could not be parsed",
                stats.rows_bad_position
            );
        }
        if stats.rows_malformed > 0 {
            log::warn!(
                "Skipped {} annotation rows with too few columns",
                stats.rows_malformed
            );
        }

        let store = builder.finalize().ok_or_else(|| Error::NoAnnotations {
            path: source.to_path_buf(),
            columns: columns.to_vec(),
        })?;
        stats.variants = store.len();
        log::debug!("Annotation scan: {}", stats);
        Ok((store, stats))
    }

    /// Requested column names, in output order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn get(&self, key: &str) -> Option<&AnnotationRecord> {
        self.records.get(key)
    }

    /// Look up one column value for a variant.
    pub fn value(&self, key: &str, column: &str) -> Option<&str> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.get(key)?.get(idx)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Accumulates rows into records. Each record always holds exactly one
/// value per requested column; repeated keys append in arrival order.
#[derive(Debug)]
pub struct AnnotationStoreBuilder {
    columns: Vec<String>,
    records: FxHashMap<String, AnnotationRecord>,
    rows: usize,
}

impl AnnotationStoreBuilder {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            records: FxHashMap::default(),
            rows: 0,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Add one row. `values` must be aligned with the builder's columns.
    pub fn push_row(&mut self, key: &str, values: &[&str]) {
        debug_assert_eq!(values.len(), self.columns.len());
        self.rows += 1;
        match self.records.get_mut(key) {
            Some(record) => {
                for (acc, value) in record.values.iter_mut().zip(values) {
                    acc.push(VALUE_SEPARATOR);
                    acc.push_str(value);
                }
            }
            None => {
                let record = AnnotationRecord {
                    values: values.iter().map(|v| v.to_string()).collect(),
                };
                self.records.insert(key.to_string(), record);
            }
        }
    }

    /// Rows pushed so far.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Distinct variants so far.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Freeze into a store. Returns None if no row was ever pushed.
    pub fn finalize(self) -> Option<AnnotationStore> {
        if self.records.is_empty() {
            return None;
        }
        Some(AnnotationStore {
            columns: self.columns,
            records: self.records,
        })
    }
}

/// Counters from one annotation scan.
#[derive(Debug, Default, Clone)]
pub struct AnnotationStats {
    pub lines_read: usize,
    pub header_lines: usize,
    pub rows_kept: usize,
    pub rows_outside_region: usize,
    pub rows_bad_position: usize,
    pub rows_malformed: usize,
    /// Rows under a header that declares none of the requested columns
    pub rows_without_columns: usize,
    pub variants: usize,
    /// Requested columns that no header line declared
    pub missing_columns: Vec<String>,
}

impl fmt::Display for AnnotationStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Lines: {}, Kept: {}, Outside region: {}, Bad position: {}, Malformed: {}, Variants: {}",
            self.lines_read,
            self.rows_kept,
            self.rows_outside_region,
            self.rows_bad_position,
            self.rows_malformed,
            self.variants
        )
    }
}

/// Where a row's position lives under the current header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PositionColumn {
    /// `chrom:pos[-end]`, the VEP `Location` column
    Location(usize),
    /// A bare `POS` column with an optional `CHROM` column
    Pos { pos: usize, chrom: Option<usize> },
    Missing,
}

/// Column indices resolved from the most recent header line.
#[derive(Debug, Clone)]
struct ColumnLayout {
    wanted: Vec<Option<usize>>,
    position: PositionColumn,
    /// Smallest field count a data row needs
    min_fields: usize,
}

impl ColumnLayout {
    fn from_header(header: &str, columns: &[String]) -> Self {
        let index = column_index(header);
        let wanted: Vec<Option<usize>> = columns.iter().map(|c| index.get(c).copied()).collect();
        let position = match (index.get("Location"), index.get("POS")) {
            (Some(&loc), _) => PositionColumn::Location(loc),
            (None, Some(&pos)) => PositionColumn::Pos {
                pos,
                chrom: index.get("CHROM").copied(),
            },
            (None, None) => PositionColumn::Missing,
        };
        let position_max = match position {
            PositionColumn::Location(i) => i,
            PositionColumn::Pos { pos, chrom } => pos.max(chrom.unwrap_or(0)),
            PositionColumn::Missing => 0,
        };
        let min_fields = wanted.iter().flatten().copied().fold(position_max, usize::max) + 1;
        Self {
            wanted,
            position,
            min_fields,
        }
    }
}

/// Result of testing one data row.
enum RowOutcome {
    Kept,
    Outside,
    BadPosition,
    Malformed,
    NoColumns,
}

/// Single-pass scan state.
struct AnnotationScan<'a> {
    region: &'a RegionSpec,
    builder: AnnotationStoreBuilder,
    layout: Option<ColumnLayout>,
    seen: Vec<bool>,
    stats: AnnotationStats,
}

impl<'a> AnnotationScan<'a> {
    fn new(columns: &[String], region: &'a RegionSpec) -> Self {
        Self {
            region,
            builder: AnnotationStoreBuilder::new(columns.to_vec()),
            layout: None,
            seen: vec![false; columns.len()],
            stats: AnnotationStats::default(),
        }
    }

    fn run<R: BufRead>(&mut self, mut reader: R) -> Result<()> {
        let mut buf = Vec::with_capacity(4096);
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                return Ok(());
            }
            self.stats.lines_read += 1;
            let Some(line) = decode_line(&buf) else {
                log::debug!(
                    "annotation line {}: not valid UTF-8, skipping",
                    self.stats.lines_read
                );
                self.stats.rows_malformed += 1;
                continue;
            };

            match LineKind::of(line) {
                LineKind::Blank | LineKind::Meta => {}
                LineKind::Header => self.declare_header(line),
                LineKind::Data => match self.process_row(line) {
                    RowOutcome::Kept => self.stats.rows_kept += 1,
                    RowOutcome::Outside => self.stats.rows_outside_region += 1,
                    RowOutcome::BadPosition => self.stats.rows_bad_position += 1,
                    RowOutcome::Malformed => self.stats.rows_malformed += 1,
                    RowOutcome::NoColumns => self.stats.rows_without_columns += 1,
                },
            }
        }
    }

    fn declare_header(&mut self, line: &str) {
        let layout = ColumnLayout::from_header(line, self.builder.columns());
        for (seen, idx) in self.seen.iter_mut().zip(&layout.wanted) {
            *seen |= idx.is_some();
        }
        if layout.position == PositionColumn::Missing {
            log::warn!(
                "Annotation header at line {} has neither a 'Location' nor a 'POS' column; \
                 rows under it cannot be placed in the region",
                self.stats.lines_read
            );
        }
        self.stats.header_lines += 1;
        self.layout = Some(layout);
    }

    fn process_row(&mut self, line: &str) -> RowOutcome {
        let Some(layout) = self.layout.as_ref() else {
            log::debug!(
                "annotation line {}: data row before any header, skipping",
                self.stats.lines_read
            );
            return RowOutcome::Malformed;
        };
        if layout.wanted.iter().all(Option::is_none) {
            return RowOutcome::NoColumns;
        }

        let fields = split_fields(line);
        if fields.len() < layout.min_fields {
            log::debug!(
                "annotation line {}: expected at least {} columns, found {}",
                self.stats.lines_read,
                layout.min_fields,
                fields.len()
            );
            return RowOutcome::Malformed;
        }

        let placed = match layout.position {
            PositionColumn::Location(idx) => {
                Location::parse(fields[idx]).map(|loc| (Some(loc.chrom), loc.start, loc.end))
            }
            PositionColumn::Pos { pos, chrom } => fields[pos]
                .trim()
                .parse::<u64>()
                .ok()
                .map(|p| (chrom.map(|c| fields[c]), p, None)),
            PositionColumn::Missing => None,
        };
        let Some((chrom, start, end)) = placed else {
            log::debug!(
                "annotation line {}: cannot parse the position of '{}', skipping",
                self.stats.lines_read,
                fields[0]
            );
            return RowOutcome::BadPosition;
        };

        if chrom.is_some_and(|c| !self.region.same_chrom(c)) || !self.region.admits(start, end) {
            return RowOutcome::Outside;
        }

        let values: Vec<&str> = layout
            .wanted
            .iter()
            .map(|idx| idx.map_or(DEFAULT_PLACEHOLDER, |i| fields[i]))
            .collect();
        self.builder.push_row(fields[0], &values);
        RowOutcome::Kept
    }

    fn finish(mut self) -> (AnnotationStoreBuilder, AnnotationStats) {
        self.stats.missing_columns = self
            .builder
            .columns()
            .iter()
            .zip(&self.seen)
            .filter(|(_, seen)| !**seen)
            .map(|(c, _)| c.clone())
            .collect();
        self.stats.variants = self.builder.len();
        (self.builder, self.stats)
    }
}

/// Open an annotation file, decompressing if it starts with the gzip magic.
///
/// The first block is decoded here so that a corrupt stream fails before
/// the scan starts.
fn open_source(path: &Path) -> Result<Box<dyn BufRead>> {
    let open_err = |source| Error::Open {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(open_err)?;
    let mut raw = BufReader::with_capacity(ANNOTATION_INPUT_BUFFER, file);
    let is_gzip = raw.fill_buf().map_err(open_err)?.starts_with(&GZIP_MAGIC);

    if !is_gzip {
        log::debug!("{} is not gzip compressed; reading as plain text", path.display());
        return Ok(Box::new(raw));
    }

    let mut decoder = BufReader::with_capacity(ANNOTATION_INPUT_BUFFER, MultiGzDecoder::new(raw));
    decoder.fill_buf().map_err(|source| Error::Decompress {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Box::new(decoder))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::NamedTempFile;

    const VEP_HEADER: &str = "## ENSEMBL VARIANT EFFECT PREDICTOR v110\n\
        #Uploaded_variation\tLocation\tAllele\tConsequence\tCLIN_SIG\n";

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn region(s: &str) -> RegionSpec {
        RegionSpec::parse(s).unwrap()
    }

    fn scan(
        content: &str,
        columns: &[&str],
        r: &str,
    ) -> Result<(AnnotationStore, AnnotationStats)> {
        AnnotationStore::from_reader(
            content.as_bytes(),
            &cols(columns),
            &region(r),
            &PathBuf::from("test.tsv.gz"),
        )
    }

    #[test]
    fn test_builder_joins_in_order_without_dedup() {
        let mut builder = AnnotationStoreBuilder::new(cols(&["X", "Y"]));
        builder.push_row("rs1", &["a", "1"]);
        builder.push_row("rs2", &["c", "3"]);
        builder.push_row("rs1", &["b", "1"]);
        assert_eq!(builder.rows(), 3);
        assert_eq!(builder.len(), 2);

        let store = builder.finalize().unwrap();
        assert_eq!(store.value("rs1", "X"), Some("a;b"));
        assert_eq!(store.value("rs1", "Y"), Some("1;1"));
        assert_eq!(store.value("rs2", "X"), Some("c"));
        assert_eq!(store.value("rs3", "X"), None);
    }

    #[test]
    fn test_builder_empty_finalize() {
        let builder = AnnotationStoreBuilder::new(cols(&["X"]));
        assert!(builder.is_empty());
        assert!(builder.finalize().is_none());
    }

    #[test]
    fn test_region_filter() {
        let content = format!(
            "{}rs50\tchr1:50\tA\tintron_variant\t-\n\
             rs150\tchr1:150\tA\tmissense_variant\tpathogenic\n\
             rs250\tchr1:250\tA\tintron_variant\t-\n",
            VEP_HEADER
        );
        let (store, stats) = scan(&content, &["Consequence"], "chr1:100-200").unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.get("rs50").is_none());
        assert_eq!(store.value("rs150", "Consequence"), Some("missense_variant"));
        assert!(store.get("rs250").is_none());
        assert_eq!(stats.rows_kept, 1);
        assert_eq!(stats.rows_outside_region, 2);
    }

    #[test]
    fn test_region_overlap_by_end() {
        let content = format!(
            "{}del1\tchr1:95-105\tA\tframeshift_variant\t-\n\
             del2\tchr1:80-90\tA\tframeshift_variant\t-\n",
            VEP_HEADER
        );
        let (store, _) = scan(&content, &["Consequence"], "chr1:100-200").unwrap();
        assert!(store.get("del1").is_some());
        assert!(store.get("del2").is_none());
    }

    #[test]
    fn test_other_chromosome_excluded() {
        let content = format!(
            "{}rs1\t2:150\tA\tmissense_variant\t-\nrs2\t1:150\tA\tmissense_variant\t-\n",
            VEP_HEADER
        );
        let (store, stats) = scan(&content, &["Consequence"], "chr1:100-200").unwrap();
        assert!(store.get("rs1").is_none());
        assert!(store.get("rs2").is_some());
        assert_eq!(stats.rows_outside_region, 1);
    }

    #[test]
    fn test_multiple_transcripts_aggregate() {
        let content = format!(
            "{}rs1\tchr1:150\tA\tmissense_variant\tpathogenic\n\
             rs1\tchr1:150\tA\tmissense_variant\t-\n\
             rs1\tchr1:150\tA\tsplice_region_variant\t-\n",
            VEP_HEADER
        );
        let (store, _) = scan(&content, &["Consequence", "CLIN_SIG"], "chr1:100-200").unwrap();
        assert_eq!(
            store.value("rs1", "Consequence"),
            Some("missense_variant;missense_variant;splice_region_variant")
        );
        assert_eq!(store.value("rs1", "CLIN_SIG"), Some("pathogenic;-;-"));
    }

    #[test]
    fn test_bad_position_skipped_scan_continues() {
        let content = format!(
            "{}rs1\tchr1:abc\tA\tmissense_variant\t-\n\
             rs2\tchr1:160\tA\tstop_gained\t-\n",
            VEP_HEADER
        );
        let (store, stats) = scan(&content, &["Consequence"], "chr1:100-200").unwrap();
        assert_eq!(stats.rows_bad_position, 1);
        assert_eq!(store.value("rs2", "Consequence"), Some("stop_gained"));
    }

    #[test]
    fn test_invalid_utf8_row_is_malformed() {
        let mut content = VEP_HEADER.as_bytes().to_vec();
        content.extend_from_slice(b"rs1\tchr1:150\tA\tmissense_variant\tcaf\xe9\n");
        content.extend_from_slice(b"rs2\tchr1:160\tA\tstop_gained\t-\n");
        let (store, stats) = AnnotationStore::from_reader(
            content.as_slice(),
            &cols(&["Consequence"]),
            &region("chr1:100-200"),
            &PathBuf::from("test.tsv.gz"),
        )
        .unwrap();
        assert_eq!(stats.rows_malformed, 1);
        assert!(store.get("rs1").is_none());
        assert_eq!(store.value("rs2", "Consequence"), Some("stop_gained"));
    }

    #[test]
    fn test_header_redeclared_mid_stream() {
        let content = "#ID\tLocation\tConsequence\tCLIN_SIG\n\
             rs1\tchr1:150\tmissense_variant\tbenign\n\
             #ID\tLocation\tCLIN_SIG\tConsequence\n\
             rs2\tchr1:160\tpathogenic\tstop_gained\n";
        let (store, stats) = scan(content, &["Consequence"], "chr1:100-200").unwrap();
        assert_eq!(stats.header_lines, 2);
        assert_eq!(store.value("rs1", "Consequence"), Some("missense_variant"));
        assert_eq!(store.value("rs2", "Consequence"), Some("stop_gained"));
    }

    #[test]
    fn test_pos_column_fallback() {
        let content = "#CHROM\tPOS\tID\tGENE\n1\t150\trs1\tBRCA2\n1\t500\trs2\tTP53\n";
        let (store, _) = scan(content, &["GENE"], "chr1:100-200").unwrap();
        // The key is always the first column.
        assert_eq!(store.value("1", "GENE"), Some("BRCA2"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_missing_column_filled_and_reported() {
        let content = format!("{}rs1\tchr1:150\tA\tmissense_variant\t-\n", VEP_HEADER);
        let (store, stats) = scan(&content, &["Consequence", "SIFT"], "chr1:100-200").unwrap();
        assert_eq!(stats.missing_columns, vec!["SIFT"]);
        assert_eq!(store.value("rs1", "SIFT"), Some("-"));
    }

    #[test]
    fn test_all_columns_misspelled_is_error() {
        let content = format!("{}rs1\tchr1:150\tA\tmissense_variant\t-\n", VEP_HEADER);
        let err = scan(&content, &["consequence", "clin_sig"], "chr1:100-200").unwrap_err();
        match err {
            Error::NoAnnotations { columns, .. } => {
                assert_eq!(columns, vec!["consequence", "clin_sig"])
            }
            other => panic!("expected NoAnnotations, got {}", other),
        }
    }

    #[test]
    fn test_short_row_is_malformed() {
        let content = format!("{}rs1\tchr1:150\tA\n", VEP_HEADER);
        let err = scan(&content, &["Consequence"], "chr1:100-200").unwrap_err();
        assert!(matches!(err, Error::NoAnnotations { .. }));
    }

    #[test]
    fn test_nothing_in_region_is_error() {
        let content = format!("{}rs1\tchr1:5000\tA\tmissense_variant\t-\n", VEP_HEADER);
        let err = scan(&content, &["Consequence"], "chr1:100-200").unwrap_err();
        assert!(err.to_string().contains("No annotations were loaded"));
    }

    #[test]
    fn test_load_gzip_file() {
        let mut file = NamedTempFile::new().unwrap();
        {
            let mut encoder = GzEncoder::new(&mut file, Compression::default());
            write!(
                encoder,
                "{}rs150\tchr1:150\tA\tmissense_variant\tpathogenic\n",
                VEP_HEADER
            )
            .unwrap();
            encoder.finish().unwrap();
        }
        file.flush().unwrap();

        let (store, stats) =
            AnnotationStore::load(file.path(), &cols(&["CLIN_SIG"]), &region("chr1:100-200"))
                .unwrap();
        assert_eq!(store.value("rs150", "CLIN_SIG"), Some("pathogenic"));
        assert_eq!(stats.variants, 1);
    }

    #[test]
    fn test_load_missing_file() {
        let err = AnnotationStore::load(
            "/nonexistent/annotations.tsv.gz",
            &cols(&["CLIN_SIG"]),
            &region("chr1:100-200"),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Open { .. }));
    }

    #[test]
    fn test_load_corrupt_gzip() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&[0x1f, 0x8b, 0xff, 0xff, 0x00, 0x01, 0x02, 0x03])
            .unwrap();
        file.flush().unwrap();

        let err = AnnotationStore::load(file.path(), &cols(&["CLIN_SIG"]), &region("chr1"))
            .unwrap_err();
        assert!(matches!(err, Error::Decompress { .. }));
    }
}
