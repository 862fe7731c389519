//! Genotype call classification.
//!
//! [`GenotypeClass::of`] reads the GT part of a call for genotype counts.
//! Carrier tests go through [`carries_alt`], which compares the whole call
//! against the reference tokens.

use std::fmt;

/// The category of a single genotype call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenotypeClass {
    /// All alleles are reference (`0/0`, `0|0`, `0`)
    HomRef,
    /// Two or more different called alleles (`0/1`, `1/2`)
    Het,
    /// All alleles are the same non-reference allele (`1/1`, `2`)
    HomAlt,
    /// Every allele is missing (`./.`, `.`)
    NoCall,
    /// Some alleles missing, some called (`0/.`, `./1`)
    Partial,
    /// Not a parseable GT value
    Other,
}

impl GenotypeClass {
    /// Classify a call. Only the GT portion (before the first `:`) is read,
    /// so `0/1:12,9:21` classifies as `Het`.
    pub fn of(call: &str) -> Self {
        let gt = gt_part(call);
        if gt.is_empty() {
            return GenotypeClass::Other;
        }

        let mut missing = 0usize;
        let mut called = 0usize;
        let mut first_called: Option<&str> = None;
        let mut all_ref = true;
        let mut all_same = true;

        for allele in gt.split(['/', '|']) {
            if allele == "." {
                missing += 1;
                continue;
            }
            if allele.is_empty() || !allele.bytes().all(|b| b.is_ascii_digit()) {
                return GenotypeClass::Other;
            }
            called += 1;
            if !is_ref_allele(allele) {
                all_ref = false;
            }
            match first_called {
                None => first_called = Some(allele),
                Some(first) if first != allele => all_same = false,
                Some(_) => {}
            }
        }

        match (called, missing) {
            (0, _) => GenotypeClass::NoCall,
            (_, m) if m > 0 => GenotypeClass::Partial,
            _ if all_ref => GenotypeClass::HomRef,
            _ if all_same => GenotypeClass::HomAlt,
            _ => GenotypeClass::Het,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GenotypeClass::HomRef => "HOM_REF",
            GenotypeClass::Het => "HET",
            GenotypeClass::HomAlt => "HOM_ALT",
            GenotypeClass::NoCall => "NO_CALL",
            GenotypeClass::Partial => "PARTIAL",
            GenotypeClass::Other => "OTHER",
        }
    }
}

impl fmt::Display for GenotypeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Calls that count as "no alternate allele" for carrier tests.
pub const REFERENCE_CALLS: [&str; 5] = ["0/0", "./.", "0/.", "./0", "."];

/// True if the call is exactly one of [`REFERENCE_CALLS`].
///
/// The match is literal: phased (`0|0`), haploid (`0`) and FORMAT-suffixed
/// (`0/0:10`) forms are not reference calls.
#[inline]
pub fn is_reference_call(call: &str) -> bool {
    REFERENCE_CALLS.contains(&call)
}

/// Inverse of [`is_reference_call`].
#[inline]
pub fn carries_alt(call: &str) -> bool {
    !is_reference_call(call)
}

#[inline]
fn gt_part(call: &str) -> &str {
    match call.find(':') {
        Some(idx) => &call[..idx],
        None => call,
    }
}

#[inline]
fn is_ref_allele(allele: &str) -> bool {
    allele.bytes().all(|b| b == b'0')
}

/// Per-variant tally of genotype classes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GenotypeCounts {
    pub hom_ref: usize,
    pub het: usize,
    pub hom_alt: usize,
    pub no_call: usize,
    pub partial: usize,
    pub other: usize,
}

impl GenotypeCounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one call and return its class.
    #[inline]
    pub fn add(&mut self, call: &str) -> GenotypeClass {
        let class = GenotypeClass::of(call);
        match class {
            GenotypeClass::HomRef => self.hom_ref += 1,
            GenotypeClass::Het => self.het += 1,
            GenotypeClass::HomAlt => self.hom_alt += 1,
            GenotypeClass::NoCall => self.no_call += 1,
            GenotypeClass::Partial => self.partial += 1,
            GenotypeClass::Other => self.other += 1,
        }
        class
    }

    pub fn total(&self) -> usize {
        self.hom_ref + self.het + self.hom_alt + self.no_call + self.partial + self.other
    }
}
