use std::sync::Arc;

use bibresolve_core::FieldSet;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::CacheStore;
use crate::error::{EngineError, Result};
use crate::http::ResilientClient;
use crate::identifiers::Doi;
use crate::sources::trim_base;

static JATS_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// Crossref JSON lookup used to fill in what the BibTeX transform leaves out.
pub struct CrossrefClient {
    http: ResilientClient,
    cache: Arc<CacheStore>,
    base_url: String,
}

impl CrossrefClient {
    pub fn new(http: ResilientClient, cache: Arc<CacheStore>, base_url: &str) -> Self {
        Self {
            http,
            cache,
            base_url: trim_base(base_url).to_string(),
        }
    }

    pub fn works_url(&self, doi: &Doi) -> String {
        format!("{}/works/{}", self.base_url, doi.value)
    }

    pub async fn fetch_work(&self, doi: &Doi) -> Result<CrossrefWork> {
        let key = format!("crossref:{}", doi.normalized);
        if let Some(cached) = self.cache.get_json::<CrossrefWork>(&key) {
            debug!("using cached Crossref data for {doi}");
            return Ok(cached);
        }

        let val: Value = self.http.fetch_json(&self.works_url(doi)).await?;
        let work = CrossrefWork::from_json(&val["message"])?;
        self.cache.set_json(&key, &work);

        Ok(work)
    }

    /// Merge Crossref data into `fields`. Failures are logged and leave only
    /// the `url` fallback behind. Returns whether `pages` was newly added.
    pub async fn enrich(&self, doi: &Doi, fields: &mut FieldSet, fetch_abstracts: bool) -> bool {
        match self.fetch_work(doi).await {
            Ok(work) => {
                let added = work.apply(doi, fields, fetch_abstracts);
                debug!("enriched {doi} with Crossref data");
                added
            }
            Err(e) => {
                warn!("Crossref enrichment failed for {doi}: {e}");
                fields.set_default("url", fallback_url(doi));
                false
            }
        }
    }
}

fn fallback_url(doi: &Doi) -> String {
    format!("http://dx.doi.org/{}", doi.value)
}

/// The parts of a Crossref `message` the record pipeline consumes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossrefWork {
    pub abstract_text: Option<String>,
    pub journal_full: Option<String>,
    pub journal_abbrev: Option<String>,
    pub issn: Option<String>,
    pub url: Option<String>,
    pub month: Option<String>,
    pub pages: Option<String>,
}

impl CrossrefWork {
    pub fn from_json(v: &Value) -> Result<Self> {
        if !v.is_object() {
            return Err(EngineError::Parse(
                "Missing message in Crossref response".to_string(),
            ));
        }

        let abstract_text = v["abstract"]
            .as_str()
            .map(|jats| JATS_TAG.replace_all(jats, "").trim().to_string())
            .filter(|s| !s.is_empty());

        let pages = ["page", "pages", "article-number"]
            .iter()
            .find_map(|field| scalar_string(&v[*field]));

        Ok(Self {
            abstract_text,
            journal_full: first_string(&v["container-title"]),
            journal_abbrev: first_string(&v["short-container-title"]),
            issn: first_string(&v["ISSN"]),
            url: v["URL"].as_str().map(str::to_string),
            month: parse_month(v),
            pages,
        })
    }

    /// Copy known values into `fields`. Returns whether `pages` was missing
    /// and is now filled.
    pub fn apply(&self, doi: &Doi, fields: &mut FieldSet, fetch_abstracts: bool) -> bool {
        if fetch_abstracts && let Some(text) = &self.abstract_text {
            fields.set("abstract", text.as_str());
        }
        if let Some(full) = &self.journal_full {
            fields.set("journal_full", full.as_str());
        }
        if let Some(abbrev) = &self.journal_abbrev {
            fields.set("journal_abbrev", abbrev.as_str());
        }
        if let Some(issn) = &self.issn {
            fields.set("issn", issn.as_str());
        }
        fields.set("url", self.url.clone().unwrap_or_else(|| fallback_url(doi)));
        if let Some(month) = &self.month {
            fields.set("month", month.as_str());
        }

        match &self.pages {
            Some(pages) if !fields.contains("pages") => {
                fields.set("pages", pages.as_str());
                true
            }
            _ => false,
        }
    }
}

/// `container-title` and friends arrive either as a list or a bare string.
fn first_string(v: &Value) -> Option<String> {
    let s = match v {
        Value::Array(items) => items.iter().find_map(Value::as_str)?,
        Value::String(s) => s.as_str(),
        _ => return None,
    };
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

fn scalar_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_month(v: &Value) -> Option<String> {
    let published = if v["published-print"].is_object() {
        &v["published-print"]
    } else {
        &v["published-online"]
    };
    let month = published["date-parts"][0][1].as_u64()?;
    let idx = usize::try_from(month).ok()?.checked_sub(1)?;
    MONTHS.get(idx).map(|m| m.to_string())
}
