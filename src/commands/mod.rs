//! Command implementations for phers-parser.

pub mod find_carriers;
pub mod pull_variants;
pub mod run_pipeline;
pub mod sample_variants;

pub use find_carriers::{FindCarriersCommand, FindCarriersStats};
pub use pull_variants::{
    IllegalTransition, Lifecycle, PipelineState, PullVariantsCommand, PullVariantsStats,
};
pub use run_pipeline::{RunPipelineCommand, RunPipelineStats};
pub use sample_variants::{SampleVariantsCommand, SampleVariantsStats};
