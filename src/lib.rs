// Clippy allows for the whole crate
#![allow(clippy::too_many_arguments)]

//! phers-parser: rare-variant extraction with annotation join
//!
//! Streams a VCF-style variant file, keeps rare variants that at least one
//! sample carries, and joins each with annotations loaded for a region.
//!
//! # Features
//!
//! - **Streaming I/O**: the variant stream is never held in memory
//! - **Two-stage pipeline**: filtering and writing run on separate threads
//!   joined by a rendezvous channel, preserving input order
//! - **Region-restricted annotations**: only rows overlapping the region
//!   are loaded from the (bgzip) annotation file
//!
//! # Example
//!
//! ```rust,no_run
//! use phers_parser::prelude::*;
//!
//! let config = PipelineConfig::new("vep.tsv.gz", "phers.tsv", "Consequence,CLIN_SIG", "chr1:100-200")
//!     .with_output("variants.txt");
//! let stdin = std::io::BufReader::new(std::io::stdin());
//! let stats = PullVariantsCommand::new(config).execute(stdin).unwrap();
//! println!("{}", stats);
//! ```

pub mod annotation;
pub mod commands;
pub mod config;
pub mod error;
pub mod genotype;
pub mod header;
pub mod phenotype;
pub mod region;
pub mod streaming;
pub mod variant;

// Re-export commonly used types
pub use annotation::{AnnotationRecord, AnnotationStore, AnnotationStoreBuilder};
pub use error::{Error, Result};
pub use region::RegionSpec;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::annotation::{AnnotationStore, AnnotationStoreBuilder};
    pub use crate::commands::{
        FindCarriersCommand, PullVariantsCommand, RunPipelineCommand, SampleVariantsCommand,
    };
    pub use crate::config::{AlleleFrequencyField, PipelineConfig};
    pub use crate::genotype::{carries_alt, GenotypeClass, GenotypeCounts};
    pub use crate::header::SampleIndex;
    pub use crate::phenotype::PhenotypeMap;
    pub use crate::region::RegionSpec;
}

#[cfg(test)]
mod tests {
    use crate::prelude::*;

    #[test]
    fn test_basic_workflow() {
        let mut builder = AnnotationStoreBuilder::new(vec!["Consequence".to_string()]);
        builder.push_row("rs1", &["missense_variant"]);
        let store = builder.finalize().unwrap();
        let phenotypes = PhenotypeMap::from_reader("S1\t0.5\n".as_bytes()).unwrap();

        let input = "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1\n\
                     chr1\t150\trs1\tA\tG\t.\tPASS\tAC=1;AN=2;AF=0.01\tGT\t0/1\n";
        let config = PipelineConfig::new("unused", "unused", "Consequence", "chr1:100-200");
        let mut out = Vec::new();
        let stats = PullVariantsCommand::new(config)
            .run_streaming(&store, &phenotypes, input.as_bytes(), &mut out)
            .unwrap();

        assert_eq!(stats.written, 1);
        assert!(String::from_utf8(out)
            .unwrap()
            .ends_with("\tS1_0.5\tConsequence\nchr1\t150\trs1\tA\tG\t.\tPASS\tAC=1;AN=2;AF=0.01\tGT\t0/1\tmissense_variant\n"));
    }

    #[test]
    fn test_region_workflow() {
        let region = RegionSpec::parse("chr1:100-200").unwrap();
        assert!(region.contains(150));
        assert!(!region.contains(250));
        assert!(GenotypeClass::of("0/1") == GenotypeClass::Het);
    }
}
