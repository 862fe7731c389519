//! Genomic region parsing and overlap tests.
//!
//! A region restricts which annotation rows are kept in memory. Positions
//! are 1-based and both bounds are inclusive.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// One problem found while parsing a region string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegionProblem {
    #[error("expected chrom, chrom:pos or chrom:start-end")]
    Shape,

    #[error("chromosome name is empty")]
    EmptyChrom,

    #[error("invalid start position '{0}'")]
    InvalidStart(String),

    #[error("invalid end position '{0}'")]
    InvalidEnd(String),

    #[error("start ({start}) must be less than end ({end})")]
    Inverted { start: u64, end: u64 },
}

/// Every problem found in a region string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid region '{region}': {}", join_problems(.problems))]
pub struct RegionError {
    pub region: String,
    pub problems: Vec<RegionProblem>,
}

fn join_problems(problems: &[RegionProblem]) -> String {
    problems
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// A chromosome interval `[start, end]`, inclusive on both ends.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegionSpec {
    pub chrom: String,
    pub start: u64,
    pub end: u64,
}

impl RegionSpec {
    /// Parse `chrom`, `chrom:pos` or `chrom:start-end`.
    ///
    /// A bare chromosome covers the whole chromosome and a single position
    /// is a point region (`start == end`). An explicit range must satisfy
    /// `start < end`; it is never silently swapped.
    pub fn parse(region: &str) -> Result<Self, RegionError> {
        let trimmed = region.trim();
        let fail = |problems: Vec<RegionProblem>| RegionError {
            region: region.to_string(),
            problems,
        };

        if trimmed.is_empty() {
            return Err(fail(vec![RegionProblem::Shape]));
        }

        let Some((chrom, span)) = trimmed.split_once(':') else {
            return Ok(Self {
                chrom: trimmed.to_string(),
                start: 0,
                end: u64::MAX,
            });
        };

        let mut problems = Vec::new();
        if chrom.is_empty() {
            problems.push(RegionProblem::EmptyChrom);
        }
        if span.is_empty() {
            problems.push(RegionProblem::Shape);
            return Err(fail(problems));
        }

        let (start, end) = match span.split_once('-') {
            Some((start, end)) => {
                let start = parse_bound(start)
                    .ok_or_else(|| RegionProblem::InvalidStart(start.to_string()));
                let end =
                    parse_bound(end).ok_or_else(|| RegionProblem::InvalidEnd(end.to_string()));
                match (start, end) {
                    (Ok(s), Ok(e)) => {
                        if s >= e {
                            problems.push(RegionProblem::Inverted { start: s, end: e });
                        }
                        (s, e)
                    }
                    (s, e) => {
                        problems.extend(s.err());
                        problems.extend(e.err());
                        (0, 0)
                    }
                }
            }
            None => match parse_bound(span) {
                Some(pos) => (pos, pos),
                None => {
                    problems.push(RegionProblem::InvalidStart(span.to_string()));
                    (0, 0)
                }
            },
        };

        if problems.is_empty() {
            Ok(Self {
                chrom: chrom.to_string(),
                start,
                end,
            })
        } else {
            Err(fail(problems))
        }
    }

    /// True if this region is a single position.
    #[inline]
    pub fn is_point(&self) -> bool {
        self.start == self.end
    }

    /// Check if a chromosome name refers to this region's chromosome.
    /// A leading `chr` is ignored on both sides.
    #[inline]
    pub fn same_chrom(&self, chrom: &str) -> bool {
        strip_chr(&self.chrom) == strip_chr(chrom)
    }

    /// `start <= pos <= end`.
    #[inline]
    pub fn contains(&self, pos: u64) -> bool {
        self.start <= pos && pos <= self.end
    }

    /// A row spanning `[start, end]` qualifies if either bound falls inside
    /// the region. A row without an end is tested on its start alone.
    #[inline]
    pub fn admits(&self, start: u64, end: Option<u64>) -> bool {
        self.contains(start) || end.is_some_and(|e| self.contains(e))
    }
}

impl FromStr for RegionSpec {
    type Err = RegionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for RegionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == 0 && self.end == u64::MAX {
            write!(f, "{}", self.chrom)
        } else if self.is_point() {
            write!(f, "{}:{}", self.chrom, self.start)
        } else {
            write!(f, "{}:{}-{}", self.chrom, self.start, self.end)
        }
    }
}

/// A location field such as `chr1:1500` or `chr1:1500-1502`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location<'a> {
    pub chrom: &'a str,
    pub start: u64,
    pub end: Option<u64>,
}

impl<'a> Location<'a> {
    /// Parse a `chrom:pos[-end]` location. Returns None if malformed.
    pub fn parse(field: &'a str) -> Option<Self> {
        let (chrom, span) = field.trim().split_once(':')?;
        if chrom.is_empty() {
            return None;
        }
        match span.split_once('-') {
            Some((start, end)) => Some(Self {
                chrom,
                start: parse_bound(start)?,
                end: Some(parse_bound(end)?),
            }),
            None => Some(Self {
                chrom,
                start: parse_bound(span)?,
                end: None,
            }),
        }
    }
}

#[inline]
fn strip_chr(chrom: &str) -> &str {
    chrom.strip_prefix("chr").unwrap_or(chrom)
}

/// Parse a coordinate, allowing `,` thousands separators.
fn parse_bound(s: &str) -> Option<u64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if s.contains(',') {
        s.replace(',', "").parse().ok()
    } else {
        s.parse().ok()
    }
}
