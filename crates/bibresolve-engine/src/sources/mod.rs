use std::fmt;

use bibresolve_core::config::SourcesConfig;

use crate::identifiers::Doi;

pub mod crossref;

pub use crossref::{CrossrefClient, CrossrefWork};

/// Metadata services that can return a BibTeX record for a DOI, in the order
/// they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    Crossref,
    DataCite,
    DoiOrg,
}

impl Source {
    pub const ORDER: [Source; 3] = [Source::Crossref, Source::DataCite, Source::DoiOrg];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Crossref => "Crossref",
            Self::DataCite => "DataCite",
            Self::DoiOrg => "DOI.org",
        }
    }

    /// BibTeX endpoint for `doi` under the configured base URLs.
    pub fn record_url(&self, endpoints: &SourcesConfig, doi: &Doi) -> String {
        match self {
            Self::Crossref => format!(
                "{}/works/{}/transform/application/x-bibtex",
                trim_base(&endpoints.crossref_base),
                doi.value
            ),
            Self::DataCite => format!(
                "{}/application/x-bibtex/{}",
                trim_base(&endpoints.datacite_base),
                doi.value
            ),
            Self::DoiOrg => format!("{}/{}", trim_base(&endpoints.resolver_base), doi.value),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub(crate) fn trim_base(base: &str) -> &str {
    base.trim_end_matches('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_follow_templates() {
        let endpoints = SourcesConfig::default();
        let doi = Doi::parse("10.1038/Nature14539").unwrap();
        let urls: Vec<String> = Source::ORDER
            .iter()
            .map(|s| s.record_url(&endpoints, &doi))
            .collect();
        assert_eq!(
            urls,
            vec![
                "https://api.crossref.org/works/10.1038/Nature14539/transform/application/x-bibtex",
                "https://api.datacite.org/application/x-bibtex/10.1038/Nature14539",
                "https://doi.org/10.1038/Nature14539",
            ]
        );
    }

    #[test]
    fn trailing_slash_on_base_is_ignored() {
        let endpoints = SourcesConfig {
            resolver_base: "http://localhost:1234/".to_string(),
            ..Default::default()
        };
        let doi = Doi::parse("10.1000/x").unwrap();
        assert_eq!(
            Source::DoiOrg.record_url(&endpoints, &doi),
            "http://localhost:1234/10.1000/x"
        );
    }
}
