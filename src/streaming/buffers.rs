//! Buffer size constants for streaming reads and writes.

/// Default output buffer size (2 MB).
pub const DEFAULT_OUTPUT_BUFFER: usize = 2 * 1024 * 1024;

/// Buffer for decompressed annotation text (256 KB).
pub const ANNOTATION_INPUT_BUFFER: usize = 256 * 1024;

/// Buffer for small side files such as phenotype lists (64 KB).
pub const SMALL_INPUT_BUFFER: usize = 64 * 1024;

/// Default line buffer capacity (64 KB).
/// A VCF line carries one genotype per sample, so lines are long.
pub const DEFAULT_LINE_BUFFER: usize = 64 * 1024;

/// Initial capacity for a line of `samples` genotype calls.
#[inline]
pub const fn line_capacity(samples: usize) -> usize {
    // "0/0\t" per sample plus the fixed columns
    let estimate = samples * 4 + 512;
    if estimate > DEFAULT_LINE_BUFFER {
        estimate
    } else {
        DEFAULT_LINE_BUFFER
    }
}
