//! Line classification and tab splitting for tab-delimited genomic text.
//!
//! Both the variant stream and the annotation source use the same
//! convention: `##` lines are free-text metadata, a line with a single `#`
//! declares column names, and everything else is a data row.

use memchr::{memchr, memchr_iter, memmem};

/// What a line in a tab-delimited genomic file represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Blank,
    /// Contains `##`
    Meta,
    /// Contains a single `#`; declares column names
    Header,
    Data,
}

impl LineKind {
    /// Classify a line (without its line terminator).
    #[inline]
    pub fn of(line: &str) -> Self {
        let bytes = line.as_bytes();
        if bytes.iter().all(u8::is_ascii_whitespace) {
            LineKind::Blank
        } else if memmem::find(bytes, b"##").is_some() {
            LineKind::Meta
        } else if memchr(b'#', bytes).is_some() {
            LineKind::Header
        } else {
            LineKind::Data
        }
    }
}

/// Strip a trailing `\n` or `\r\n`.
#[inline]
pub fn trim_line_end(line: &str) -> &str {
    line.trim_end_matches(['\n', '\r'])
}

/// Split a line on tabs using memchr.
#[inline]
pub fn split_fields(line: &str) -> Vec<&str> {
    let mut fields = Vec::with_capacity(16);
    let mut start = 0;
    for tab in memchr_iter(b'\t', line.as_bytes()) {
        fields.push(&line[start..tab]);
        start = tab + 1;
    }
    fields.push(&line[start..]);
    fields
}

/// Decode a raw line read with `read_until` and strip its terminator.
/// Returns None if the line is not valid UTF-8.
#[inline]
pub fn decode_line(raw: &[u8]) -> Option<&str> {
    std::str::from_utf8(raw).ok().map(trim_line_end)
}

/// Map header column names to their index. A leading `#` on the first
/// column is dropped, so `#CHROM` is stored as `CHROM`.
pub fn column_index(header: &str) -> rustc_hash::FxHashMap<String, usize> {
    split_fields(header.trim())
        .into_iter()
        .enumerate()
        .map(|(idx, name)| {
            let name = if idx == 0 {
                name.trim_start_matches('#')
            } else {
                name
            };
            (name.to_string(), idx)
        })
        .collect()
}
