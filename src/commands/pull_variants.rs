//! Rare-variant extraction with annotation join.
//!
//! # Pipeline
//!
//! Pre-flight (everything that can fail before output exists):
//! 1. Validate the configuration and parse the region
//! 2. Load the annotation store for the region
//! 3. Load phenotypes, read the `#CHROM` header and reconcile samples
//!
//! Streaming, two threads joined by a rendezvous channel:
//! - `variant-filter` reads rows, applies [`VariantFilter`] and sends each
//!   kept record
//! - `report-writer` writes the header, then every record it receives
//!
//! The channel has no buffer, so the producer blocks until the writer takes
//! each record. Output order is input order. The producer dropping its
//! sender ends the stream; the writer dropping its receiver (on a write
//! failure) makes the producer's next send fail and stops reading.

use crossbeam_channel::{bounded, Receiver, Sender};
use std::fmt;
use std::fs::File;
use std::io::{BufRead, Write};
use std::thread;
use thiserror::Error;

use crate::annotation::AnnotationStore;
use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::header::{read_variant_header, SampleIndex};
use crate::phenotype::PhenotypeMap;
use crate::region::RegionSpec;
use crate::streaming::buffers::line_capacity;
use crate::streaming::parsing::{decode_line, LineKind};
use crate::streaming::ReportWriter;
use crate::variant::{Filtered, OutputRecord, RecordError, RecordIssues, VariantFilter};

const PRODUCER: &str = "variant-filter";
const CONSUMER: &str = "report-writer";

/// Run states. `Error` is only reachable before streaming starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Init,
    HeaderParsed,
    Streaming,
    Drained,
    Done,
    Error,
}

impl PipelineState {
    fn can_become(self, next: PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (self, next),
            (Init, HeaderParsed)
                | (HeaderParsed, Streaming)
                | (Streaming, Drained)
                | (Drained, Done)
                | (Init, Error)
                | (HeaderParsed, Error)
        )
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Illegal pipeline transition {from:?} -> {to:?}")]
pub struct IllegalTransition {
    pub from: PipelineState,
    pub to: PipelineState,
}

/// Tracks the run state and rejects out-of-order transitions.
#[derive(Debug)]
pub struct Lifecycle {
    state: PipelineState,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: PipelineState::Init,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn advance(&mut self, next: PipelineState) -> std::result::Result<(), IllegalTransition> {
        if !self.state.can_become(next) {
            return Err(IllegalTransition {
                from: self.state,
                to: next,
            });
        }
        log::debug!("pipeline: {:?} -> {:?}", self.state, next);
        self.state = next;
        Ok(())
    }

    /// Record a pre-flight failure. Returns false once streaming has begun,
    /// since stage failures are reported after the drain instead.
    pub fn fail(&mut self) -> bool {
        self.advance(PipelineState::Error).is_ok()
    }
}

/// Pull rare, carried variants in a region and annotate them.
#[derive(Debug, Clone)]
pub struct PullVariantsCommand {
    config: PipelineConfig,
}

impl PullVariantsCommand {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Full run: pre-flight, then stream `input` into the configured
    /// output file. The file is only created once the header reconciles.
    pub fn execute<R: BufRead + Send>(&self, input: R) -> Result<PullVariantsStats> {
        let mut lifecycle = Lifecycle::new();
        let result = self.execute_inner(&mut lifecycle, input);
        if result.is_err() && lifecycle.fail() {
            log::debug!("pipeline aborted before streaming");
        }
        result
    }

    fn execute_inner<R: BufRead + Send>(
        &self,
        lifecycle: &mut Lifecycle,
        mut input: R,
    ) -> Result<PullVariantsStats> {
        let (annotations, phenotypes) = self.load_inputs()?;

        let mut line_no = 0;
        let samples = self.reconcile(&mut input, &phenotypes, &mut line_no)?;
        lifecycle.advance(PipelineState::HeaderParsed)?;

        let path = &self.config.output;
        let file = File::create(path).map_err(|source| Error::CreateOutput {
            path: path.clone(),
            source,
        })?;
        log::info!("Writing variants to {}", path.display());

        self.stream(lifecycle, &annotations, &samples, input, line_no, file)
    }

    /// Stream with already-loaded annotations and phenotypes into any writer.
    pub fn run_streaming<R: BufRead + Send, W: Write + Send>(
        &self,
        annotations: &AnnotationStore,
        phenotypes: &PhenotypeMap,
        mut input: R,
        output: W,
    ) -> Result<PullVariantsStats> {
        let mut lifecycle = Lifecycle::new();
        let mut line_no = 0;
        let samples = match self.reconcile(&mut input, phenotypes, &mut line_no) {
            Ok(samples) => samples,
            Err(e) => {
                lifecycle.fail();
                return Err(e);
            }
        };
        lifecycle.advance(PipelineState::HeaderParsed)?;
        self.stream(&mut lifecycle, annotations, &samples, input, line_no, output)
    }

    /// Validate config, parse the region and load both side inputs.
    pub fn load_inputs(&self) -> Result<(AnnotationStore, PhenotypeMap)> {
        self.config.validate()?;
        let region = RegionSpec::parse(&self.config.region)?;
        log::info!("Target region: {}", region);

        let (annotations, _) = AnnotationStore::load(
            &self.config.annotation_path,
            &self.config.keep_columns,
            &region,
        )?;
        let phenotypes = PhenotypeMap::from_path(&self.config.phenotype_path)?;
        Ok((annotations, phenotypes))
    }

    fn reconcile<R: BufRead>(
        &self,
        input: &mut R,
        phenotypes: &PhenotypeMap,
        line_no: &mut usize,
    ) -> Result<SampleIndex> {
        let header = read_variant_header(input, line_no)?;
        let samples = SampleIndex::reconcile(&header, phenotypes, &self.config.sample_exclusions)?;
        log::info!("Reporting {} samples from the variant header", samples.len());
        Ok(samples)
    }

    fn stream<R: BufRead + Send, W: Write + Send>(
        &self,
        lifecycle: &mut Lifecycle,
        annotations: &AnnotationStore,
        samples: &SampleIndex,
        input: R,
        line_no: usize,
        output: W,
    ) -> Result<PullVariantsStats> {
        lifecycle.advance(PipelineState::Streaming)?;

        let filter = VariantFilter::new(
            self.config.maf_threshold,
            &self.config.af_field,
            annotations,
            samples,
        );
        let columns = annotations.columns();
        let placeholder = self.config.placeholder.as_str();
        let capacity = line_capacity(samples.header_columns());
        let (tx, rx) = bounded::<OutputRecord<'_>>(0);

        let (produced, written) = thread::scope(|scope| -> Result<_> {
            let producer = thread::Builder::new()
                .name(PRODUCER.to_string())
                .spawn_scoped(scope, move || produce(filter, input, line_no, capacity, tx))?;
            let consumer = thread::Builder::new()
                .name(CONSUMER.to_string())
                .spawn_scoped(scope, move || consume(rx, output, samples, columns, placeholder))?;
            Ok((producer.join(), consumer.join()))
        })?;
        lifecycle.advance(PipelineState::Drained)?;

        let produced = produced.map_err(|_| Error::StageFailed(PRODUCER))?;
        let written = written.map_err(|_| Error::StageFailed(CONSUMER))??;
        produced.issues.report();
        if let Some(err) = produced.read_error {
            return Err(err);
        }

        let stats = PullVariantsStats {
            lines_read: produced.lines_read,
            written,
            above_threshold: produced.above_threshold,
            reference_only: produced.reference_only,
            malformed: produced.issues.count(),
            annotated: produced.annotated,
            unannotated: produced.unannotated,
        };
        if stats.written > 0 && stats.annotated == 0 {
            log::warn!(
                "None of the {} written variants matched an annotation; \
                 check that the annotation key matches the variant ID column",
                stats.written
            );
        }
        log::info!("Finished pulling variants. {}", stats);
        lifecycle.advance(PipelineState::Done)?;
        Ok(stats)
    }
}

/// What the producer saw.
#[derive(Default)]
struct ProducerReport {
    lines_read: usize,
    above_threshold: usize,
    reference_only: usize,
    annotated: usize,
    unannotated: usize,
    issues: RecordIssues,
    read_error: Option<Error>,
}

fn produce<'a, R: BufRead>(
    filter: VariantFilter<'a>,
    mut input: R,
    mut line_no: usize,
    capacity: usize,
    tx: Sender<OutputRecord<'a>>,
) -> ProducerReport {
    let mut report = ProducerReport::default();
    let mut buf = Vec::with_capacity(capacity);

    loop {
        buf.clear();
        match input.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => line_no += 1,
            Err(source) => {
                report.read_error = Some(Error::Input {
                    line: line_no,
                    source,
                });
                break;
            }
        }

        let Some(line) = decode_line(&buf) else {
            report.lines_read += 1;
            report.issues.record(RecordError::InvalidUtf8 { line: line_no });
            continue;
        };
        if LineKind::of(line) != LineKind::Data {
            continue;
        }
        report.lines_read += 1;

        match filter.apply(line, line_no) {
            Ok(Filtered::Kept(record)) => {
                if record.annotation.is_some() {
                    report.annotated += 1;
                } else {
                    report.unannotated += 1;
                }
                if tx.send(record).is_err() {
                    log::debug!("report writer stopped; no longer reading input");
                    break;
                }
            }
            Ok(Filtered::AboveThreshold) => report.above_threshold += 1,
            Ok(Filtered::ReferenceOnly) => report.reference_only += 1,
            Err(e) => report.issues.record(e),
        }
    }
    report
}

/// Write everything received. The writer is flushed even when a write
/// fails, so lines already buffered reach the output.
fn consume<W: Write>(
    rx: Receiver<OutputRecord<'_>>,
    output: W,
    samples: &SampleIndex,
    columns: &[String],
    placeholder: &str,
) -> Result<usize> {
    let mut writer = ReportWriter::new(output);
    let drained = drain(&mut writer, &rx, samples, columns, placeholder);
    let flushed = writer.flush();
    let written = drained?;
    flushed?;
    Ok(written)
}

fn drain<W: Write>(
    writer: &mut ReportWriter<W>,
    rx: &Receiver<OutputRecord<'_>>,
    samples: &SampleIndex,
    columns: &[String],
    placeholder: &str,
) -> Result<usize> {
    writer.write_header(samples.labels(), columns)?;
    let mut written = 0;
    for record in rx.iter() {
        writer.write_record(&record, columns.len(), placeholder)?;
        written += 1;
    }
    Ok(written)
}

/// Statistics from pull-variants.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PullVariantsStats {
    pub lines_read: usize,
    pub written: usize,
    pub above_threshold: usize,
    pub reference_only: usize,
    pub malformed: usize,
    pub annotated: usize,
    pub unannotated: usize,
}

impl fmt::Display for PullVariantsStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Read: {}, Written: {}, Above threshold: {}, Reference only: {}, Malformed: {}, \
             Annotated: {}, Unannotated: {}",
            self.lines_read,
            self.written,
            self.above_threshold,
            self.reference_only,
            self.malformed,
            self.annotated,
            self.unannotated
        )
    }
}
