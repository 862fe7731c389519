//! Phenotype/score file parser.
//!
//! Tab-delimited: sample id, then an optional score or case/control status.
//! Preserves sample order from the input file.

use rustc_hash::FxHashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{Error, Result};
use crate::streaming::buffers::SMALL_INPUT_BUFFER;
use crate::streaming::parsing::trim_line_end;

/// Keywords that mark the first line as a column header.
const HEADER_KEYWORDS: [&str; 3] = ["grid", "iid", "status"];

/// One sample and its rendered score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhenotypeEntry {
    pub id: String,
    pub score: Option<String>,
}

impl PhenotypeEntry {
    /// `id_score`, or the bare id when the file has no score column.
    pub fn decorated(&self) -> String {
        match &self.score {
            Some(score) => format!("{}_{}", self.id, score),
            None => self.id.clone(),
        }
    }
}

/// Sample id -> phenotype score.
#[derive(Debug, Clone, Default)]
pub struct PhenotypeMap {
    entries: Vec<PhenotypeEntry>,
    index: FxHashMap<String, usize>,
}

impl PhenotypeMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a file. An empty file is an error.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| Error::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let map = Self::from_reader(BufReader::with_capacity(SMALL_INPUT_BUFFER, file))?;
        if map.is_empty() {
            return Err(Error::Phenotype {
                path: path.to_path_buf(),
                message: "no samples found".to_string(),
            });
        }
        log::info!(
            "Read in {} samples from the phenotype file: {}",
            map.len(),
            path.display()
        );
        Ok(map)
    }

    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut map = Self::new();
        let mut first = true;

        for line in reader.lines() {
            let line = line?;
            let line = trim_line_end(&line);
            if line.trim().is_empty() {
                continue;
            }
            if std::mem::take(&mut first) && is_header(line) {
                log::debug!("Skipping phenotype header: {}", line);
                continue;
            }

            let mut fields = line.split('\t');
            let id = fields.next().unwrap_or_default().trim();
            if id.is_empty() {
                continue;
            }
            let score = fields
                .next()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(format_score);
            map.insert(id.to_string(), score);
        }

        Ok(map)
    }

    /// Insert a sample. A repeated id replaces the earlier score but keeps
    /// its original position.
    pub fn insert(&mut self, id: String, score: Option<String>) {
        if let Some(&idx) = self.index.get(&id) {
            log::warn!(
                "Sample '{}' is listed more than once in the phenotype file; using the last entry",
                id
            );
            self.entries[idx].score = score;
            return;
        }
        self.index.insert(id.clone(), self.entries.len());
        self.entries.push(PhenotypeEntry { id, score });
    }

    #[inline]
    pub fn get(&self, id: &str) -> Option<&PhenotypeEntry> {
        self.index.get(id).map(|&idx| &self.entries[idx])
    }

    #[inline]
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Sample ids in file order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.id.as_str())
    }

    pub fn entries(&self) -> &[PhenotypeEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn is_header(line: &str) -> bool {
    let lower = line.to_ascii_lowercase();
    HEADER_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Truncate decimal scores to one digit after the point.
/// Non-numeric statuses such as `case` are kept verbatim.
pub fn format_score(raw: &str) -> String {
    let Some(dot) = raw.find('.') else {
        return raw.to_string();
    };
    let mut score = raw[..=dot].to_string();
    score.extend(raw[dot + 1..].chars().next());
    score
}
