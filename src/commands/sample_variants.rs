//! Per-sample summary of a pull-variants report.
//!
//! For every requested sample found in the report header, lists the
//! variants it carries, split by clinical significance and consequence.

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use rustc_hash::FxHashSet;

use crate::config::{DEFAULT_PLACEHOLDER, SAMPLE_COLUMN_OFFSET};
use crate::error::{Error, Result};
use crate::genotype::carries_alt;
use crate::header::HEADER_MARKER;
use crate::streaming::buffers::SMALL_INPUT_BUFFER;
use crate::streaming::parsing::{column_index, decode_line, split_fields, trim_line_end};
use crate::streaming::ReportWriter;

const HEADER: [&str; 5] = [
    "SAMPLE",
    "SCORE",
    "PATHOGENIC_VARIANTS",
    "NONSYNONYMOUS_VARIANTS",
    "OTHER_VARIANTS",
];

const PATHOGENIC_TERMS: [&str; 1] = ["pathogenic"];
const NONSYNONYMOUS_TERMS: [&str; 2] = ["missense", "nonsynonymous"];

/// A report column matched to a requested sample.
#[derive(Debug, Clone)]
struct SampleColumn {
    id: String,
    score: Option<String>,
    column: usize,
    pathogenic: Vec<String>,
    nonsynonymous: Vec<String>,
    other: Vec<String>,
}

/// Summarise the variants each sample carries.
#[derive(Debug, Clone)]
pub struct SampleVariantsCommand {
    pub samples: Vec<String>,
    pub clinvar_col: String,
    pub consequence_col: String,
}

impl SampleVariantsCommand {
    pub fn new(
        samples: Vec<String>,
        clinvar_col: impl Into<String>,
        consequence_col: impl Into<String>,
    ) -> Self {
        Self {
            samples,
            clinvar_col: clinvar_col.into(),
            consequence_col: consequence_col.into(),
        }
    }

    /// Read the report at `calls_path`.
    pub fn run<P: AsRef<Path>, W: Write>(
        &self,
        calls_path: P,
        output: W,
    ) -> Result<SampleVariantsStats> {
        let path = calls_path.as_ref();
        log::info!("Reading variant calls from {}", path.display());
        let file = File::open(path).map_err(|source| Error::Open {
            path: path.to_path_buf(),
            source,
        })?;
        self.process(BufReader::with_capacity(SMALL_INPUT_BUFFER, file), output, path)
    }

    pub fn run_streaming<R: BufRead, W: Write>(
        &self,
        input: R,
        output: W,
    ) -> Result<SampleVariantsStats> {
        self.process(input, output, Path::new("<stdin>"))
    }

    fn process<R: BufRead, W: Write>(
        &self,
        mut input: R,
        output: W,
        source: &Path,
    ) -> Result<SampleVariantsStats> {
        if self.samples.is_empty() {
            return Err(Error::Config("no samples were requested".to_string()));
        }

        let mut line_no = 0;
        let header = find_header(&mut input, &mut line_no)?;
        let index = column_index(&header);
        let missing_column = |column: &str| Error::MissingColumn {
            column: column.to_string(),
            path: source.to_path_buf(),
        };
        let clinvar = *index
            .get(self.clinvar_col.as_str())
            .ok_or_else(|| missing_column(&self.clinvar_col))?;
        let consequence = *index
            .get(self.consequence_col.as_str())
            .ok_or_else(|| missing_column(&self.consequence_col))?;

        let mut columns = self.map_samples(&header);
        log::info!(
            "Mapped {} of {} requested samples to report columns",
            columns.len(),
            self.samples.len()
        );

        let mut stats = SampleVariantsStats {
            samples_mapped: columns.len(),
            ..Default::default()
        };
        let width = split_fields(&header).len();
        let mut buf = Vec::new();
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
                stats.rows_read += 1;
                stats.malformed += 1;
                continue;
            };
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            stats.rows_read += 1;

            let fields = split_fields(line);
            if fields.len() != width {
                log::debug!(
                    "line {}: expected {} columns, found {}",
                    line_no,
                    width,
                    fields.len()
                );
                stats.malformed += 1;
                continue;
            }

            let is_pathogenic = mentions(fields[clinvar], &PATHOGENIC_TERMS);
            let is_nonsynonymous = mentions(fields[consequence], &NONSYNONYMOUS_TERMS);
            for sample in columns.iter_mut() {
                let call = fields[sample.column];
                if !carries_alt(call) {
                    continue;
                }
                stats.carrier_calls += 1;
                let variant = format!("{}:{}", fields[2], call);
                if is_pathogenic {
                    sample.pathogenic.push(variant.clone());
                }
                if is_nonsynonymous {
                    sample.nonsynonymous.push(variant.clone());
                }
                if !is_pathogenic && !is_nonsynonymous {
                    sample.other.push(variant);
                }
            }
        }

        if stats.malformed > 0 {
            log::warn!("Skipped {} malformed report rows", stats.malformed);
        }
        write_summary(output, &columns)?;
        log::info!("Finished summarising sample variants. {}", stats);
        Ok(stats)
    }

    /// Match report columns to requested samples. A column labelled `id` or
    /// `id_score` belongs to sample `id`.
    fn map_samples(&self, header: &str) -> Vec<SampleColumn> {
        let wanted: FxHashSet<&str> = self.samples.iter().map(String::as_str).collect();
        let mut found = FxHashSet::default();
        let mut columns = Vec::new();

        let labels = split_fields(header);
        for (column, label) in labels.into_iter().enumerate().skip(SAMPLE_COLUMN_OFFSET) {
            let (id, score) = if wanted.contains(label) {
                (label, None)
            } else {
                match label.rsplit_once('_') {
                    Some((id, score)) if wanted.contains(id) => (id, Some(score.to_string())),
                    _ => continue,
                }
            };
            if !found.insert(id) {
                continue;
            }
            columns.push(SampleColumn {
                id: id.to_string(),
                score,
                column,
                pathogenic: Vec::new(),
                nonsynonymous: Vec::new(),
                other: Vec::new(),
            });
        }

        let absent: Vec<&str> = self
            .samples
            .iter()
            .map(String::as_str)
            .filter(|s| !found.contains(s))
            .collect();
        if !absent.is_empty() {
            log::warn!(
                "{} requested samples are not in the report header: {}",
                absent.len(),
                absent.join(",")
            );
        }
        columns
    }
}

fn find_header<R: BufRead>(input: &mut R, line_no: &mut usize) -> Result<String> {
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
        let text = String::from_utf8_lossy(&buf);
        let line = trim_line_end(&text);
        if line.contains(HEADER_MARKER) {
            return Ok(line.to_string());
        }
    }
}

fn mentions(value: &str, terms: &[&str]) -> bool {
    let lower = value.to_lowercase();
    terms.iter().any(|t| lower.contains(t))
}

fn write_summary<W: Write>(output: W, columns: &[SampleColumn]) -> Result<()> {
    let mut writer = ReportWriter::new(output);
    let written = write_rows(&mut writer, columns);
    let flushed = writer.flush();
    written?;
    flushed
}

fn write_rows<W: Write>(writer: &mut ReportWriter<W>, columns: &[SampleColumn]) -> Result<()> {
    writer.write_fields(HEADER)?;
    for sample in columns {
        writer.write_fields([
            sample.id.clone(),
            sample.score.clone().unwrap_or_else(|| DEFAULT_PLACEHOLDER.to_string()),
            join_or_placeholder(&sample.pathogenic),
            join_or_placeholder(&sample.nonsynonymous),
            join_or_placeholder(&sample.other),
        ])?;
    }
    Ok(())
}

fn join_or_placeholder(variants: &[String]) -> String {
    if variants.is_empty() {
        DEFAULT_PLACEHOLDER.to_string()
    } else {
        variants.join(",")
    }
}

/// Statistics from sample-variants.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SampleVariantsStats {
    pub rows_read: usize,
    pub samples_mapped: usize,
    pub carrier_calls: usize,
    pub malformed: usize,
}

impl fmt::Display for SampleVariantsStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Rows: {}, Samples: {}, Carrier calls: {}, Malformed: {}",
            self.rows_read, self.samples_mapped, self.carrier_calls, self.malformed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tA_1.2\tB_0.0\tC_case\tConsequence\tCLIN_SIG\n\
        chr1\t150\trs1\tA\tG\t50\tPASS\tAF=0.01\tGT\t0/1\t0/0\t1/1\tmissense_variant\tpathogenic\n\
        chr1\t160\trs2\tA\tG\t50\tPASS\tAF=0.01\tGT\t0/0\t0/1\t0/0\tintron_variant\tbenign\n\
        chr1\t170\trs3\tA\tG\t50\tPASS\tAF=0.01\tGT\t0/1\t0/0\t0/0\tstop_gained\tLikely_pathogenic\n";

    fn run(samples: &[&str], report: &str) -> Result<(SampleVariantsStats, String)> {
        let cmd = SampleVariantsCommand::new(
            samples.iter().map(|s| s.to_string()).collect(),
            "CLIN_SIG",
            "Consequence",
        );
        let mut out = Vec::new();
        let stats = cmd.run_streaming(report.as_bytes(), &mut out)?;
        Ok((stats, String::from_utf8(out).unwrap()))
    }

    #[test]
    fn test_categories() {
        let (stats, out) = run(&["A", "B", "C"], REPORT).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], HEADER.join("\t"));
        assert_eq!(lines[1], "A\t1.2\trs1:0/1,rs3:0/1\trs1:0/1\t-");
        assert_eq!(lines[2], "B\t0.0\t-\t-\trs2:0/1");
        assert_eq!(lines[3], "C\tcase\trs1:1/1\trs1:1/1\t-");
        assert_eq!(stats.samples_mapped, 3);
        assert_eq!(stats.carrier_calls, 4);
    }

    #[test]
    fn test_pathogenic_missense_never_other() {
        let (_, out) = run(&["C"], REPORT).unwrap();
        let row: Vec<&str> = out.lines().nth(1).unwrap().split('\t').collect();
        assert_eq!(row[2], "rs1:1/1");
        assert_eq!(row[3], "rs1:1/1");
        assert_eq!(row[4], "-");
    }

    #[test]
    fn test_unscored_and_absent_samples() {
        let report = "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS_1\tS2\tCSQ\tCLIN\n\
            chr1\t1\trs1\tA\tG\t.\t.\tAF=0\tGT\t0/1\t1/1\tsynonymous_variant\t-\n";
        let samples = vec!["S2".to_string(), "S_1".to_string(), "Z".to_string()];
        let cmd = SampleVariantsCommand::new(samples, "CLIN", "CSQ");
        let mut out = Vec::new();
        let stats = cmd.run_streaming(report.as_bytes(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        // Report column order; S_1 matches its own label exactly.
        assert_eq!(lines[1], "S_1\t-\t-\t-\trs1:0/1");
        assert_eq!(lines[2], "S2\t-\t-\t-\trs1:1/1");
        assert_eq!(stats.samples_mapped, 2);
    }

    #[test]
    fn test_missing_column_is_fatal() {
        let cmd = SampleVariantsCommand::new(vec!["A".to_string()], "ClinVar", "Consequence");
        let err = cmd.run_streaming(REPORT.as_bytes(), Vec::new()).unwrap_err();
        assert!(matches!(err, Error::MissingColumn { ref column, .. } if column == "ClinVar"));
    }

    #[test]
    fn test_no_samples_is_fatal() {
        assert!(matches!(run(&[], REPORT).unwrap_err(), Error::Config(_)));
    }

    #[test]
    fn test_missing_header() {
        assert!(matches!(
            run(&["A"], "chr1\t1\trs1\n").unwrap_err(),
            Error::MissingHeader
        ));
    }
}
