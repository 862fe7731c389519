//! pull-variants followed by sample-variants over every phenotyped sample.
//!
//! The configured output path is a prefix; any extension is dropped.

use std::ffi::OsString;
use std::fmt;
use std::fs::File;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::commands::pull_variants::{PullVariantsCommand, PullVariantsStats};
use crate::commands::sample_variants::{SampleVariantsCommand, SampleVariantsStats};
use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::phenotype::PhenotypeMap;

const VARIANTS_SUFFIX: &str = "_all_network_id_variants.txt";
const SUMMARY_SUFFIX: &str = "_cases_in_network_variants.txt";

/// Both stages of the analysis.
#[derive(Debug, Clone)]
pub struct RunPipelineCommand {
    config: PipelineConfig,
    clinvar_col: String,
    consequence_col: String,
}

impl RunPipelineCommand {
    pub fn new(
        config: PipelineConfig,
        clinvar_col: impl Into<String>,
        consequence_col: impl Into<String>,
    ) -> Self {
        Self {
            config,
            clinvar_col: clinvar_col.into(),
            consequence_col: consequence_col.into(),
        }
    }

    /// Output paths of the two stages.
    pub fn output_paths(&self) -> (PathBuf, PathBuf) {
        let prefix = self.config.output.with_extension("");
        (with_suffix(&prefix, VARIANTS_SUFFIX), with_suffix(&prefix, SUMMARY_SUFFIX))
    }

    pub fn execute<R: BufRead + Send>(&self, input: R) -> Result<RunPipelineStats> {
        if self.clinvar_col.trim().is_empty() || self.consequence_col.trim().is_empty() {
            return Err(Error::Config(
                "both --clinvar-col and --consequence-col are required".to_string(),
            ));
        }

        let started = Instant::now();
        log::info!("Starting the analysis");
        let (variants_path, summary_path) = self.output_paths();

        let pull = PullVariantsCommand::new(self.config.clone().with_output(&variants_path))
            .execute(input)?;

        let samples: Vec<String> = PhenotypeMap::from_path(&self.config.phenotype_path)?
            .ids()
            .map(str::to_string)
            .collect();
        let output = File::create(&summary_path).map_err(|source| Error::CreateOutput {
            path: summary_path.clone(),
            source,
        })?;
        log::info!("Writing sample summary to {}", summary_path.display());
        let summary = SampleVariantsCommand::new(samples, &self.clinvar_col, &self.consequence_col)
            .run(&variants_path, output)?;

        log::info!("Finished the analysis in {:.2?}", started.elapsed());
        Ok(RunPipelineStats { pull, summary })
    }
}

fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(prefix.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Statistics from both stages.
#[derive(Debug, Clone)]
pub struct RunPipelineStats {
    pub pull: PullVariantsStats,
    pub summary: SampleVariantsStats,
}

impl fmt::Display for RunPipelineStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}; {}", self.pull, self.summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_paths_strip_extension() {
        let config =
            PipelineConfig::new("a.gz", "p.tsv", "CLIN_SIG", "chr1").with_output("out/run1.txt");
        let cmd = RunPipelineCommand::new(config, "CLIN_SIG", "Consequence");
        let (variants, summary) = cmd.output_paths();
        assert_eq!(variants, PathBuf::from("out/run1_all_network_id_variants.txt"));
        assert_eq!(summary, PathBuf::from("out/run1_cases_in_network_variants.txt"));
    }

    #[test]
    fn test_requires_columns() {
        let config = PipelineConfig::new("a.gz", "p.tsv", "CLIN_SIG", "chr1");
        let cmd = RunPipelineCommand::new(config, "", "Consequence");
        assert!(matches!(cmd.execute("".as_bytes()), Err(Error::Config(_))));
    }
}
