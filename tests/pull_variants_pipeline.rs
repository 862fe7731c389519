//! End-to-end tests for the pull-variants pipeline.
//!
//! Fixtures are written to temp files: a bgzip-style annotation file built
//! with flate2, a phenotype file, and a VCF stream passed in memory.

use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::{tempdir, NamedTempFile, TempDir};

use phers_parser::commands::{FindCarriersCommand, PullVariantsCommand, RunPipelineCommand};
use phers_parser::config::PipelineConfig;
use phers_parser::error::Error;

// =============================================================================
// Helper functions
// =============================================================================

const ANNOTATIONS: &str = "## ENSEMBL VARIANT EFFECT PREDICTOR v110\n\
    ## Output produced at 2024-01-01\n\
    #Uploaded_variation\tLocation\tAllele\tGene\tConsequence\tCLIN_SIG\n\
    rs50\tchr1:50\tG\tENSG1\tintron_variant\t-\n\
    rs150\tchr1:150\tG\tENSG1\tmissense_variant\tpathogenic\n\
    rs150\tchr1:150\tG\tENSG2\tmissense_variant\t-\n\
    rs160\tchr1:160-162\tG\tENSG1\tframeshift_variant\tlikely_pathogenic\n\
    rs250\tchr1:250\tG\tENSG1\tsynonymous_variant\tbenign\n";

const PHENOTYPES: &str = "GRID\tPheRS\nA\t1.23\nB\t0.0\nC\tcase\n";

const VCF: &str = "##fileformat=VCFv4.2\n\
    ##INFO=<ID=AF,Number=A,Type=Float,Description=\"Allele Frequency\">\n\
    #CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tA\tB\tC\n\
    chr1\t150\trs150\tA\tG\t50\tPASS\tAC=1;AN=6;AF=0.05\tGT\t0/1\t0/0\t0/0\n\
    chr1\t155\trs155\tA\tG\t50\tPASS\tAC=4;AN=6;AF=0.6\tGT\t0/1\t1/1\t0/1\n\
    chr1\t160\trs160\tAT\tA\t50\tPASS\tAC=1;AN=6;AF=0.01\tGT:DP\t0/0:10\t0/1:12\t./.:0\n\
    chr1\t170\trs170\tC\tT\t50\tPASS\tAC=0;AN=6;AF=0.0\tGT\t0/0\t./.\t0/0\n\
    chr1\t180\trs180\tC\tT\t50\tPASS\tAC=2;AN=6;AF=0.02\tGT\t1/1\t0/0\t0/.\n";

fn gzip_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    {
        let mut encoder = GzEncoder::new(&mut file, Compression::default());
        encoder.write_all(content.as_bytes()).unwrap();
        encoder.finish().unwrap();
    }
    file.flush().unwrap();
    file
}

fn text_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{}", content).unwrap();
    file.flush().unwrap();
    file
}

struct Fixture {
    annotations: NamedTempFile,
    phenotypes: NamedTempFile,
    dir: TempDir,
}

impl Fixture {
    fn new(phenotypes: &str) -> Self {
        Self {
            annotations: gzip_file(ANNOTATIONS),
            phenotypes: text_file(phenotypes),
            dir: tempdir().unwrap(),
        }
    }

    fn output(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn config(&self, region: &str, output: &Path) -> PipelineConfig {
        PipelineConfig::new(
            self.annotations.path(),
            self.phenotypes.path(),
            "Consequence,CLIN_SIG",
            region,
        )
        .with_output(output)
    }
}

fn data_rows(text: &str) -> Vec<Vec<String>> {
    text.lines()
        .skip(1)
        .map(|l| l.split('\t').map(str::to_string).collect())
        .collect()
}

// =============================================================================
// pull-variants
// =============================================================================

#[test]
fn test_pull_variants_end_to_end() {
    let fx = Fixture::new(PHENOTYPES);
    let out = fx.output("variants.txt");
    let stats = PullVariantsCommand::new(fx.config("chr1:100-200", &out))
        .execute(VCF.as_bytes())
        .unwrap();

    let text = fs::read_to_string(&out).unwrap();
    let header = text.lines().next().unwrap();
    assert_eq!(
        header,
        "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tA_1.2\tB_0.0\tC_case\tConsequence\tCLIN_SIG"
    );

    let rows = data_rows(&text);
    let ids: Vec<&str> = rows.iter().map(|r| r[2].as_str()).collect();
    assert_eq!(ids, vec!["rs150", "rs160", "rs180"]);

    // Two transcripts joined in source order, no dedup.
    assert_eq!(rows[0][12], "missense_variant;missense_variant");
    assert_eq!(rows[0][13], "pathogenic;-");
    // FORMAT fields carried through unchanged.
    assert_eq!(rows[1][9..12], ["0/0:10", "0/1:12", "./.:0"]);
    assert_eq!(rows[1][12], "frameshift_variant");
    // No annotation for rs180.
    assert_eq!(rows[2][12..], ["-", "-"]);

    assert_eq!(stats.lines_read, 5);
    assert_eq!(stats.written, 3);
    assert_eq!(stats.above_threshold, 1);
    assert_eq!(stats.reference_only, 1);
    assert_eq!(stats.annotated, 2);
    assert_eq!(stats.unannotated, 1);
}

#[test]
fn test_region_limits_annotations() {
    let fx = Fixture::new(PHENOTYPES);
    let out = fx.output("narrow.txt");
    PullVariantsCommand::new(fx.config("chr1:155-170", &out))
        .execute(VCF.as_bytes())
        .unwrap();

    let rows = data_rows(&fs::read_to_string(&out).unwrap());
    // rs150 is still written but its annotation lies outside the region.
    assert_eq!(rows[0][2], "rs150");
    assert_eq!(rows[0][12], "-");
    assert_eq!(rows[1][12], "frameshift_variant");
}

#[test]
fn test_unknown_sample_creates_no_output() {
    let fx = Fixture::new("A\t1.0\nB\t2.0\n");
    let out = fx.output("never.txt");
    let err = PullVariantsCommand::new(fx.config("chr1:100-200", &out))
        .execute(VCF.as_bytes())
        .unwrap_err();

    assert!(matches!(err, Error::UnknownSamples { ref samples } if samples == &["C"]));
    assert!(!out.exists());
}

#[test]
fn test_inverted_region_is_preflight_error() {
    let fx = Fixture::new(PHENOTYPES);
    let out = fx.output("never.txt");
    let err = PullVariantsCommand::new(fx.config("chr1:200-100", &out))
        .execute(VCF.as_bytes())
        .unwrap_err();
    assert!(matches!(err, Error::Region(_)));
    assert!(!out.exists());
}

#[test]
fn test_column_typo_is_fatal() {
    let fx = Fixture::new(PHENOTYPES);
    let out = fx.output("never.txt");
    let config = PipelineConfig::new(
        fx.annotations.path(),
        fx.phenotypes.path(),
        "consequence,clin_sig",
        "chr1:100-200",
    )
    .with_output(&out);
    let err = PullVariantsCommand::new(config)
        .execute(VCF.as_bytes())
        .unwrap_err();
    assert!(matches!(err, Error::NoAnnotations { .. }), "got {}", err);
}

#[test]
fn test_exclusions_and_af_key() {
    let fx = Fixture::new(PHENOTYPES);
    let out = fx.output("excluded.txt");
    let config = fx
        .config("chr1:100-200", &out)
        .with_sample_exclusions("a")
        .with_af_field("AF".parse().unwrap());
    let stats = PullVariantsCommand::new(config)
        .execute(VCF.as_bytes())
        .unwrap();

    let text = fs::read_to_string(&out).unwrap();
    assert!(text.lines().next().unwrap().contains("\tB_0.0\tC_case\t"));
    // Without A, rs150 and rs180 have no carrier among reported samples.
    let ids: Vec<String> = data_rows(&text).into_iter().map(|r| r[2].clone()).collect();
    assert_eq!(ids, vec!["rs160"]);
    assert_eq!(stats.reference_only, 3);
}

#[test]
fn test_repeat_runs_identical() {
    let fx = Fixture::new(PHENOTYPES);
    let first = fx.output("first.txt");
    let second = fx.output("second.txt");
    PullVariantsCommand::new(fx.config("chr1:100-200", &first))
        .execute(VCF.as_bytes())
        .unwrap();
    PullVariantsCommand::new(fx.config("chr1:100-200", &second))
        .execute(VCF.as_bytes())
        .unwrap();
    assert_eq!(fs::read(first).unwrap(), fs::read(second).unwrap());
}

// =============================================================================
// find-carriers and run-pipeline
// =============================================================================

#[test]
fn test_find_carriers_on_stream() {
    let mut out = Vec::new();
    let stats = FindCarriersCommand::new()
        .run_streaming(VCF.as_bytes(), &mut out)
        .unwrap();
    let text = String::from_utf8(out).unwrap();
    let rows = data_rows(&text);
    assert_eq!(rows.len(), 5);
    assert_eq!(rows[1][5..], ["0", "2", "1", "0", "0", "A:0/1,B:1/1,C:0/1"]);
    assert_eq!(rows[3][10], "-");
    assert_eq!(stats.with_carriers, 4);
}

#[test]
fn test_run_pipeline_writes_both_reports() {
    let fx = Fixture::new(PHENOTYPES);
    let prefix = fx.output("cohort.txt");
    let cmd = RunPipelineCommand::new(fx.config("chr1:100-200", &prefix), "CLIN_SIG", "Consequence");
    let stats = cmd.execute(VCF.as_bytes()).unwrap();

    let (variants, summary) = cmd.output_paths();
    assert!(variants.ends_with("cohort_all_network_id_variants.txt"));
    assert_eq!(stats.pull.written, 3);

    let text = fs::read_to_string(summary).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines[0],
        "SAMPLE\tSCORE\tPATHOGENIC_VARIANTS\tNONSYNONYMOUS_VARIANTS\tOTHER_VARIANTS"
    );
    // Only the bare reference tokens are non-carriers; FORMAT-suffixed
    // calls such as `0/0:10` are listed.
    assert_eq!(
        lines[1],
        "A\t1.2\trs150:0/1,rs160:0/0:10\trs150:0/1\trs180:1/1"
    );
    assert_eq!(lines[2], "B\t0.0\trs160:0/1:12\t-\t-");
    assert_eq!(lines[3], "C\tcase\trs160:./.:0\t-\t-");
}
