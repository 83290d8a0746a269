//! Batch-level summary statistics handed to reporting collaborators.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::models::Entry;

const TOP_N: usize = 10;
const MIN_YEAR: u16 = 1800;
const MAX_YEAR: u16 = 2100;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsSummary {
    pub total_entries: usize,
    pub year_range: Option<(u16, u16)>,
    pub unique_authors: usize,
    pub unique_journals: usize,
    /// Percentage of entries whose record carries a DOI field, one decimal.
    pub identifier_coverage: f64,
    pub top_authors: Vec<(String, usize)>,
    pub top_journals: Vec<(String, usize)>,
    pub years_histogram: BTreeMap<u16, usize>,
}

impl AnalyticsSummary {
    pub fn year_range_label(&self) -> String {
        match self.year_range {
            Some((lo, hi)) => format!("{lo}–{hi}"),
            None => "N/A".to_string(),
        }
    }
}

/// Produces the analytics block of a batch result.
pub trait BatchSummarizer: Send + Sync {
    fn summarize(&self, entries: &[Entry]) -> AnalyticsSummary;
}

/// Year histogram, author/journal frequency and identifier coverage over the
/// successful entries of a batch.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSummarizer;

impl BatchSummarizer for DefaultSummarizer {
    fn summarize(&self, entries: &[Entry]) -> AnalyticsSummary {
        summarize(entries)
    }
}

pub fn summarize(entries: &[Entry]) -> AnalyticsSummary {
    let mut years_histogram: BTreeMap<u16, usize> = BTreeMap::new();
    let mut authors: HashMap<String, usize> = HashMap::new();
    let mut journals: HashMap<String, usize> = HashMap::new();
    let mut with_doi = 0usize;

    for entry in entries.iter().filter(|e| e.is_ok()) {
        let fields = &entry.metadata.fields;

        if let Some(year) = entry.year().filter(|y| (MIN_YEAR..=MAX_YEAR).contains(y)) {
            *years_histogram.entry(year).or_default() += 1;
        }
        for author in fields.authors() {
            *authors.entry(author.to_string()).or_default() += 1;
        }
        if let Some(journal) = fields.non_empty("journal") {
            *journals.entry(journal.trim().to_string()).or_default() += 1;
        }
        if fields.non_empty("doi").is_some() {
            with_doi += 1;
        }
    }

    let year_range = match (years_histogram.keys().next(), years_histogram.keys().next_back()) {
        (Some(lo), Some(hi)) => Some((*lo, *hi)),
        _ => None,
    };

    let coverage = 100.0 * with_doi as f64 / entries.len().max(1) as f64;

    AnalyticsSummary {
        total_entries: entries.len(),
        year_range,
        unique_authors: authors.len(),
        unique_journals: journals.len(),
        identifier_coverage: (coverage * 10.0).round() / 10.0,
        top_authors: most_common(authors),
        top_journals: most_common(journals),
        years_histogram,
    }
}

fn most_common(counts: HashMap<String, usize>) -> Vec<(String, usize)> {
    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(TOP_N);
    ranked
}
