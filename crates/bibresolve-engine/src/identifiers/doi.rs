use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{EngineError, Result};

static DOI_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^10\.\d{4,}(?:\.\d+)*/\S+$").unwrap());

static SPLIT_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s,]+").unwrap());

const DOI_HOSTS: &[&str] = &[
    "https://doi.org/",
    "http://doi.org/",
    "https://dx.doi.org/",
    "http://dx.doi.org/",
];

const DOI_PREFIXES: &[&str] = &["doi:", "DOI:"];

const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', ')'];

/// Strip the URL host, `doi:` prefix, percent-encoding and trailing prose
/// punctuation from a pasted DOI. Does not validate.
pub fn clean_doi(raw: &str) -> String {
    let mut doi = raw.trim();

    for host in DOI_HOSTS {
        if doi.len() >= host.len()
            && doi.is_char_boundary(host.len())
            && doi[..host.len()].eq_ignore_ascii_case(host)
        {
            doi = &doi[host.len()..];
            break;
        }
    }

    for prefix in DOI_PREFIXES {
        if let Some(rest) = doi.strip_prefix(prefix) {
            doi = rest.trim();
        }
    }

    let decoded = urlencoding::decode(doi)
        .map(|d| d.into_owned())
        .unwrap_or_else(|_| doi.to_string());

    decoded
        .trim()
        .trim_end_matches(TRAILING_PUNCTUATION)
        .to_string()
}

/// Syntactic check: `10.<4+ digits>(.<digits>)*/<non-whitespace>`.
pub fn is_valid_doi(doi: &str) -> bool {
    DOI_REGEX.is_match(doi)
}

/// Split free text on whitespace and commas, cleaning every token. With
/// `validate`, tokens that are not DOIs are dropped.
pub fn parse_identifiers(text: &str, validate: bool) -> Vec<String> {
    let cleaned: Vec<String> = SPLIT_REGEX
        .split(text.trim())
        .filter(|part| !part.is_empty())
        .map(clean_doi)
        .filter(|doi| !doi.is_empty())
        .collect();

    if !validate {
        return cleaned;
    }

    let valid: Vec<String> = cleaned
        .into_iter()
        .filter(|doi| {
            let ok = is_valid_doi(doi);
            if !ok {
                warn!("invalid DOI filtered out: {doi}");
            }
            ok
        })
        .collect();
    debug!("extracted {} valid DOIs", valid.len());
    valid
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Doi {
    pub raw: String,
    /// Cleaned form, original casing; used in request URLs.
    pub value: String,
    /// Lowercased form; used for comparisons and cache keys.
    pub normalized: String,
    pub url: String,
}

impl Doi {
    pub fn parse(input: &str) -> Result<Self> {
        let value = clean_doi(input);
        if !is_valid_doi(&value) {
            return Err(EngineError::InvalidIdentifier(input.trim().to_string()));
        }
        Ok(Self::from_cleaned(input, value))
    }

    /// Clean without the syntax check. Only an empty result is rejected.
    pub fn parse_lenient(input: &str) -> Result<Self> {
        let value = clean_doi(input);
        if value.is_empty() {
            return Err(EngineError::InvalidIdentifier(input.trim().to_string()));
        }
        Ok(Self::from_cleaned(input, value))
    }

    fn from_cleaned(input: &str, value: String) -> Self {
        let normalized = value.to_lowercase();
        let url = format!("https://doi.org/{value}");

        Self {
            raw: input.to_string(),
            value,
            normalized,
            url,
        }
    }
}

impl std::fmt::Display for Doi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.value)
    }
}
