use std::fmt;

use bibresolve_core::CoreError;
use thiserror::Error;

/// Why a single source did not produce a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFailure {
    pub source: String,
    pub reason: String,
}

impl fmt::Display for SourceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source, self.reason)
    }
}

fn failure_detail(failures: &[SourceFailure]) -> String {
    if failures.is_empty() {
        return String::new();
    }
    let joined = failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ");
    format!(" ({joined})")
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid DOI: {0}")]
    InvalidIdentifier(String),

    #[error("DOI not found: {identifier}{}", failure_detail(.failures))]
    NotFound {
        identifier: String,
        failures: Vec<SourceFailure>,
    },

    #[error("rate limited by {url} after {attempts} attempts")]
    RateLimited { url: String, attempts: u32 },

    #[error("network failure for {url}: {reason}")]
    NetworkFailure { url: String, reason: String },

    #[error("{source_name} returned no BibTeX record ({url})")]
    MalformedRecord { source_name: String, url: String },

    #[error("cancelled before resolving {0}")]
    Cancelled(String),

    #[error("configuration error: {0}")]
    Config(#[from] CoreError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Short label used for per-source diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidIdentifier(_) => "invalid identifier",
            Self::NotFound { .. } => "not found",
            Self::RateLimited { .. } => "rate limited",
            Self::NetworkFailure { .. } | Self::Http(_) => "network failure",
            Self::MalformedRecord { .. } => "malformed record",
            Self::Cancelled(_) => "cancelled",
            Self::Config(_) => "configuration",
            Self::Parse(_) => "parse error",
            Self::Io(_) => "i/o error",
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_lists_every_source() {
        let err = EngineError::NotFound {
            identifier: "10.1000/x".to_string(),
            failures: vec![
                SourceFailure {
                    source: "Crossref".to_string(),
                    reason: "not found".to_string(),
                },
                SourceFailure {
                    source: "DataCite".to_string(),
                    reason: "HTTP 503".to_string(),
                },
            ],
        };
        assert_eq!(
            err.to_string(),
            "DOI not found: 10.1000/x (Crossref: not found; DataCite: HTTP 503)"
        );
        assert_eq!(err.kind(), "not found");
    }

    #[test]
    fn bare_not_found_has_no_detail() {
        let err = EngineError::NotFound {
            identifier: "http://x/works/10.1000/x".to_string(),
            failures: Vec::new(),
        };
        assert_eq!(err.to_string(), "DOI not found: http://x/works/10.1000/x");
    }
}
