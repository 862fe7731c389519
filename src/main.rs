//! phers-parser: rare-variant extraction and annotation for PheRS cohorts
//!
//! Usage: bcftools view -r chr1:100-200 cohort.vcf.gz | phers-parser <COMMAND> [OPTIONS]

use clap::builder::RangedU64ValueParser;
use clap::{ArgGroup, Args, Parser, Subcommand};
use log::LevelFilter;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::process;

use phers_parser::commands::{
    FindCarriersCommand, PullVariantsCommand, RunPipelineCommand, SampleVariantsCommand,
};
use phers_parser::config::{
    split_list, AlleleFrequencyField, PipelineConfig, DEFAULT_MAF_THRESHOLD, DEFAULT_OUTPUT,
    DEFAULT_PLACEHOLDER, DEFAULT_READ_BUFFER,
};
use phers_parser::error::{Error, Result};
use phers_parser::phenotype::PhenotypeMap;

#[derive(Parser)]
#[command(name = "phers-parser")]
#[command(version)]
#[command(
    about = "Read through streamed sequencing data and report the carriers of rare variants with their PheRS values",
    long_about = None
)]
struct Cli {
    /// Read buffer for the streamed variant input, in bytes
    #[arg(
        long,
        short = 'b',
        global = true,
        default_value_t = DEFAULT_READ_BUFFER,
        value_parser = RangedU64ValueParser::<usize>::new().range(1..)
    )]
    buffer_size: usize,

    /// Log level: off, error, warn, info, debug or trace
    #[arg(long, global = true, default_value = "info")]
    log_level: LevelFilter,

    /// Write log messages to this file instead of stderr
    #[arg(long, global = true, alias = "log-filepath")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pull rare variants in a region from a VCF streamed on stdin and annotate them
    PullVariants(PullArgs),

    /// Count genotypes and list the carriers of each variant streamed on stdin
    FindCarriers {
        /// Output file
        #[arg(short, long, default_value = DEFAULT_OUTPUT)]
        output: PathBuf,

        /// Comma-separated substrings; header samples containing any are dropped
        #[arg(long, alias = "sample-exclusion-string")]
        exclude_samples: Option<String>,
    },

    /// List the variants carried by samples of interest in a pull-variants report
    #[command(alias = "view-sample-variants")]
    SampleVariants(SampleArgs),

    /// Run pull-variants and then sample-variants for every phenotyped sample
    RunPipeline {
        #[command(flatten)]
        pull: PullArgs,

        /// Clinical significance column of the report
        #[arg(long)]
        clinvar_col: String,

        /// Consequence column of the report
        #[arg(long)]
        consequence_col: String,
    },
}

#[derive(Args)]
struct PullArgs {
    /// Annotation file (VEP tab output, gzip or bgzip compressed)
    #[arg(short = 'a', long = "anno-file")]
    annotations: PathBuf,

    /// Phenotype file: sample id, then an optional score or case/control status
    #[arg(short = 'p', long = "pheno-file")]
    phenotypes: PathBuf,

    /// Comma-separated annotation columns to keep
    #[arg(short = 'c', long = "keep-cols")]
    keep_columns: String,

    /// Region to load annotations for (chrom, chrom:pos or chrom:start-end)
    #[arg(short, long)]
    region: String,

    /// Output file (a prefix for run-pipeline)
    #[arg(short, long, default_value = DEFAULT_OUTPUT)]
    output: PathBuf,

    /// Keep variants with any allele frequency at or below this value
    #[arg(long, default_value_t = DEFAULT_MAF_THRESHOLD)]
    maf_threshold: f64,

    /// INFO entry holding allele frequencies: a 0-based position or a key such as AF
    #[arg(long, default_value = "2")]
    af_field: AlleleFrequencyField,

    /// Comma-separated substrings; header samples containing any are dropped
    #[arg(long, alias = "sample-exclusion-string")]
    exclude_samples: Option<String>,

    /// Value written for annotation columns of unannotated variants
    #[arg(long, default_value = DEFAULT_PLACEHOLDER)]
    placeholder: String,
}

impl PullArgs {
    fn into_config(self, buffer_size: usize) -> PipelineConfig {
        PipelineConfig::new(
            self.annotations,
            self.phenotypes,
            &self.keep_columns,
            self.region,
        )
        .with_output(self.output)
        .with_maf_threshold(self.maf_threshold)
        .with_af_field(self.af_field)
        .with_sample_exclusions(self.exclude_samples.as_deref().unwrap_or_default())
        .with_placeholder(self.placeholder)
        .with_buffer_size(buffer_size)
    }
}

#[derive(Args)]
#[command(group(ArgGroup::new("sample_source").required(true).args(["samples", "samples_file"])))]
struct SampleArgs {
    /// pull-variants report to summarise
    #[arg(short = 'i', long = "calls-file")]
    calls: PathBuf,

    /// Comma-separated sample ids
    #[arg(short = 's', long, alias = "samples-list")]
    samples: Option<String>,

    /// File whose first column lists sample ids (a header line is skipped)
    #[arg(short = 'S', long)]
    samples_file: Option<PathBuf>,

    /// Clinical significance column of the report
    #[arg(long)]
    clinvar_col: String,

    /// Consequence column of the report
    #[arg(long)]
    consequence_col: String,

    /// Output file
    #[arg(short, long, default_value = DEFAULT_OUTPUT)]
    output: PathBuf,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_level, cli.log_file.as_deref());

    let buffer_size = cli.buffer_size;
    let result = match cli.command {
        Commands::PullVariants(args) => run_pull_variants(args, buffer_size),
        Commands::FindCarriers {
            output,
            exclude_samples,
        } => run_find_carriers(output, exclude_samples, buffer_size),
        Commands::SampleVariants(args) => run_sample_variants(args),
        Commands::RunPipeline {
            pull,
            clinvar_col,
            consequence_col,
        } => run_pipeline(pull, clinvar_col, consequence_col, buffer_size),
    };

    if let Err(e) = result {
        log::error!("{}", e);
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Log to stderr, or to `log_file` when one is given and can be created.
fn init_logging(level: LevelFilter, log_file: Option<&Path>) {
    let mut builder = env_logger::Builder::from_default_env();
    builder.filter_level(level).format_target(false);

    let mut unopened = None;
    match log_file.map(|path| (path, File::create(path))) {
        Some((_, Ok(file))) => {
            builder
                .format_timestamp_secs()
                .target(env_logger::Target::Pipe(Box::new(file)));
        }
        Some((path, Err(e))) => {
            builder.format_timestamp(None);
            unopened = Some((path, e));
        }
        None => {
            builder.format_timestamp(None);
        }
    }
    builder.init();

    if let Some((path, e)) = unopened {
        log::warn!(
            "Could not create the log file {} ({}); logging to stderr instead",
            path.display(),
            e
        );
    }
}

/// Buffered stdin that can be handed to a worker thread.
fn variant_input(buffer_size: usize) -> BufReader<io::Stdin> {
    BufReader::with_capacity(buffer_size, io::stdin())
}

fn run_pull_variants(args: PullArgs, buffer_size: usize) -> Result<()> {
    let config = args.into_config(buffer_size);
    config.validate()?;
    let input = variant_input(config.buffer_size);
    PullVariantsCommand::new(config).execute(input)?;
    Ok(())
}

fn run_find_carriers(
    output: PathBuf,
    exclude_samples: Option<String>,
    buffer_size: usize,
) -> Result<()> {
    let exclusions = split_list(exclude_samples.as_deref().unwrap_or_default());
    let file = File::create(&output).map_err(|source| Error::CreateOutput {
        path: output.clone(),
        source,
    })?;
    log::info!("Writing carriers to {}", output.display());

    FindCarriersCommand::new()
        .with_exclusions(exclusions)
        .run_streaming(variant_input(buffer_size), file)?;
    Ok(())
}

fn run_sample_variants(args: SampleArgs) -> Result<()> {
    let samples = match (args.samples, args.samples_file) {
        (Some(list), _) => split_list(&list),
        (None, Some(path)) => PhenotypeMap::from_path(path)?
            .ids()
            .map(str::to_string)
            .collect(),
        (None, None) => Vec::new(),
    };

    let file = File::create(&args.output).map_err(|source| Error::CreateOutput {
        path: args.output.clone(),
        source,
    })?;
    log::info!("Writing sample variants to {}", args.output.display());

    SampleVariantsCommand::new(samples, args.clinvar_col, args.consequence_col)
        .run(&args.calls, file)?;
    Ok(())
}

fn run_pipeline(
    pull: PullArgs,
    clinvar_col: String,
    consequence_col: String,
    buffer_size: usize,
) -> Result<()> {
    let config = pull.into_config(buffer_size);
    config.validate()?;
    let input = variant_input(config.buffer_size);
    let stats = RunPipelineCommand::new(config, clinvar_col, consequence_col).execute(input)?;
    log::info!("{}", stats);
    Ok(())
}
