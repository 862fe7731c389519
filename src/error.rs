//! Error types shared by every command.
//!
//! Pre-flight failures (bad configuration, unreadable annotation source,
//! missing header, unknown samples) and write failures abort the run.
//! Per-record problems live in [`crate::variant::RecordError`] and never do.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::commands::pull_variants::IllegalTransition;
use crate::region::RegionError;

/// Errors that terminate a command.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Region(#[from] RegionError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to decompress the annotation file {}: {source}", .path.display())]
    Decompress {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(
        "No annotations were loaded from {}. The file may be empty, but it is more likely that \
         none of the requested columns ({}) are spelled exactly as they appear in its header, \
         or that no rows fall inside the region",
        .path.display(),
        .columns.join(",")
    )]
    NoAnnotations { path: PathBuf, columns: Vec<String> },

    #[error("Invalid phenotype file {}: {message}", .path.display())]
    Phenotype { path: PathBuf, message: String },

    #[error("No '#CHROM' header line was found in the variant stream")]
    MissingHeader,

    #[error("Variant header has {found} columns; at least {expected} are required")]
    ShortHeader { expected: usize, found: usize },

    #[error("Sample '{0}' appears more than once in the variant header")]
    DuplicateSample(String),

    #[error(
        "{} sample(s) in the variant header have no phenotype entry: {}",
        .samples.len(),
        preview(.samples)
    )]
    UnknownSamples { samples: Vec<String> },

    #[error("Column '{column}' was not found in the header of {}", .path.display())]
    MissingColumn { column: String, path: PathBuf },

    #[error("Failed to create output file {}: {source}", .path.display())]
    CreateOutput {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write output; partial output was flushed: {0}")]
    Write(#[source] io::Error),

    #[error("Failed to read the variant stream after line {line}: {source}")]
    Input {
        line: usize,
        #[source]
        source: io::Error,
    },

    #[error("The {0} stage panicked")]
    StageFailed(&'static str),

    #[error(transparent)]
    Lifecycle(#[from] IllegalTransition),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Show at most ten ids, then a count of the rest.
fn preview(ids: &[String]) -> String {
    const SHOWN: usize = 10;
    if ids.len() <= SHOWN {
        ids.join(", ")
    } else {
        format!("{}, ... and {} more", ids[..SHOWN].join(", "), ids.len() - SHOWN)
    }
}
