//! Shared streaming utilities for all commands.
//!
//! - Line classification and memchr-based tab splitting
//! - Buffer sizing
//! - Buffered report output

pub mod buffers;
pub mod output;
pub mod parsing;

pub use output::{ReportWriter, FIXED_COLUMNS};
pub use parsing::{column_index, decode_line, split_fields, trim_line_end, LineKind};
