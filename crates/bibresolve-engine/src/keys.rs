//! Citation-key construction and batch-wide disambiguation.

use std::collections::HashSet;

use bibresolve_core::{FieldSet, KeyPattern};
use sha2::{Digest, Sha256};

const TITLE_CHARS: usize = 20;
const JOURNAL_CHARS: usize = 20;
const ANONYMOUS: &str = "anon";

/// Lowercase ASCII alphanumerics only.
pub fn sanitize(s: &str) -> String {
    s.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Surname of the first author: the part before the comma in
/// `Last, First`, otherwise the final word. `anon` when there is no author.
pub fn first_author_lastname(authors: &str) -> String {
    let Some(first) = authors.split(" and ").map(str::trim).find(|a| !a.is_empty()) else {
        return ANONYMOUS.to_string();
    };
    let surname = match first.split_once(',') {
        Some((last, _)) => last,
        None => first.split_whitespace().last().unwrap_or(first),
    };
    sanitize(surname)
}

fn hex_prefix(input: &str, len: usize) -> String {
    let digest = format!("{:x}", Sha256::digest(input.as_bytes()));
    digest[..len].to_string()
}

/// Base key for a record, before disambiguation. Falls back to `ref` plus
/// eight hex characters of a title+identifier hash when the pattern yields
/// nothing.
pub fn make_key(fields: &FieldSet, pattern: KeyPattern, identifier: &str) -> String {
    let author = first_author_lastname(fields.get("author").unwrap_or_default());
    let year = fields.year_digits().unwrap_or_default();

    let base = match pattern {
        KeyPattern::AuthorYear => format!("{author}{year}"),
        KeyPattern::FirstAuthorTitleYear => {
            let title: String = sanitize(fields.get("title").unwrap_or_default())
                .chars()
                .take(TITLE_CHARS)
                .collect();
            format!("{author}{title}{year}")
        }
        KeyPattern::JournalYear => {
            let journal = fields
                .get("journal")
                .or_else(|| fields.get("journaltitle"))
                .unwrap_or_default();
            let journal: String = sanitize(journal).chars().take(JOURNAL_CHARS).collect();
            format!("{journal}{year}")
        }
    };

    if !base.is_empty() {
        return base;
    }

    let doi = fields.get("doi").unwrap_or(identifier);
    let title = fields.get("title").unwrap_or_default();
    format!("ref{}", hex_prefix(&format!("{title}{doi}"), 8))
}

/// A key not in `used`: `base`, then `base` + `a`..`z`, then `base` + two
/// hex characters of its hash. If even that is taken a numeric suffix is
/// appended; the search is bounded by `used.len()`.
pub fn disambiguate(base: &str, used: &HashSet<String>) -> String {
    if !used.contains(base) {
        return base.to_string();
    }

    if let Some(key) = ('a'..='z')
        .map(|c| format!("{base}{c}"))
        .find(|k| !used.contains(k))
    {
        return key;
    }

    let hashed = format!("{base}{}", hex_prefix(base, 2));
    if !used.contains(&hashed) {
        return hashed;
    }

    (2..=used.len() + 2)
        .map(|n| format!("{hashed}{n}"))
        .find(|k| !used.contains(k))
        .unwrap_or_else(|| format!("{hashed}{}", used.len() + 3))
}

/// Keys handed out in the current batch.
#[derive(Debug, Default)]
pub struct UsedKeySet {
    keys: HashSet<String>,
}

impl UsedKeySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Disambiguate `base` and reserve the result.
    pub fn allocate(&mut self, base: &str) -> String {
        let key = disambiguate(base, &self.keys);
        self.keys.insert(key.clone());
        key
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }
}
