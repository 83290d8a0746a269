use std::sync::Arc;

use bibresolve_core::config::SourcesConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cache::CacheStore;
use crate::error::{EngineError, Result, SourceFailure};
use crate::http::ResilientClient;
use crate::identifiers::Doi;
use crate::sources::Source;

/// Where a record came from and what was tried on the way.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionContext {
    pub url: String,
    pub sources_tried: Vec<Source>,
    pub failures: Vec<SourceFailure>,
    pub from_cache: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub record: String,
    pub source: Source,
    pub context: ResolutionContext,
}

#[derive(Debug, Serialize, Deserialize)]
struct CachedRecord {
    record: String,
    source: String,
}

/// Tries each metadata source in [`Source::ORDER`] until one yields a record.
pub struct SourceResolver {
    http: ResilientClient,
    cache: Arc<CacheStore>,
    endpoints: SourcesConfig,
}

impl SourceResolver {
    pub fn new(http: ResilientClient, cache: Arc<CacheStore>, endpoints: SourcesConfig) -> Self {
        Self {
            http,
            cache,
            endpoints,
        }
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    fn cache_key(doi: &Doi) -> String {
        format!("bibtex:{}", doi.normalized)
    }

    fn cached(&self, doi: &Doi) -> Option<Resolution> {
        let hit: CachedRecord = self.cache.get_json(&Self::cache_key(doi))?;
        let source = Source::ORDER
            .into_iter()
            .find(|s| s.name() == hit.source)?;
        debug!("using cached record for {doi} from {source}");
        Some(Resolution {
            record: hit.record,
            source,
            context: ResolutionContext {
                url: source.record_url(&self.endpoints, doi),
                from_cache: true,
                ..Default::default()
            },
        })
    }

    /// First source that returns a non-empty body containing a record marker
    /// wins. When all fail, the error carries every per-source reason.
    pub async fn resolve(&self, doi: &Doi) -> Result<Resolution> {
        if let Some(hit) = self.cached(doi) {
            return Ok(hit);
        }

        let mut context = ResolutionContext::default();
        for source in Source::ORDER {
            let url = source.record_url(&self.endpoints, doi);
            info!("trying {source} for {doi}");
            context.sources_tried.push(source);

            let reason = match self.http.fetch_bibtex(&url).await {
                Ok(body) if is_record(&body) => {
                    info!("resolved {doi} via {source}");
                    self.cache.set_json(
                        &Self::cache_key(doi),
                        &CachedRecord {
                            record: body.clone(),
                            source: source.name().to_string(),
                        },
                    );
                    context.url = url;
                    return Ok(Resolution {
                        record: body,
                        source,
                        context,
                    });
                }
                Ok(_) => EngineError::MalformedRecord {
                    source_name: source.name().to_string(),
                    url: url.clone(),
                }
                .to_string(),
                Err(EngineError::NotFound { .. }) => "not found".to_string(),
                Err(e) => e.to_string(),
            };

            warn!("{source} failed for {doi}: {reason}");
            context.failures.push(SourceFailure {
                source: source.name().to_string(),
                reason,
            });
        }

        Err(EngineError::NotFound {
            identifier: doi.value.clone(),
            failures: context.failures,
        })
    }
}

fn is_record(body: &str) -> bool {
    !body.trim().is_empty() && body.contains('@')
}
