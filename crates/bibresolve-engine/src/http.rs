use std::sync::Arc;
use std::time::Duration;

use bibresolve_core::config::NetworkConfig;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, RETRY_AFTER};
use serde::de::DeserializeOwned;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{EngineError, Result};
use crate::rate_limit::RateLimiter;

pub const ACCEPT_BIBTEX: &str = "application/x-bibtex; charset=utf-8";
pub const ACCEPT_JSON: &str = "application/json";

const USER_AGENT: &str = concat!("bibresolve/", env!("CARGO_PKG_VERSION"));

// ─── RetryPolicy ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Per-attempt request timeout.
    pub timeout: Duration,
    /// Upper bound on a server-supplied `Retry-After`.
    pub max_retry_after: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&NetworkConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(cfg: &NetworkConfig) -> Self {
        Self {
            max_retries: cfg.max_retries,
            base_delay: Duration::from_millis(cfg.base_backoff_ms),
            max_delay: Duration::from_millis(cfg.max_backoff_ms),
            timeout: Duration::from_secs(cfg.timeout_secs),
            max_retry_after: Duration::from_secs(cfg.max_retry_after_secs),
        }
    }

    /// `min(2^attempt × base, max)`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    fn retry_after(&self, headers: &HeaderMap) -> Option<Duration> {
        let secs = headers
            .get(RETRY_AFTER)?
            .to_str()
            .ok()?
            .trim()
            .parse::<u64>()
            .ok()?;
        Some(Duration::from_secs(secs).min(self.max_retry_after))
    }
}

// ─── ResilientClient ──────────────────────────────────────────────────────────

/// HTTP GET with token-bucket admission, exponential back-off and `429`
/// handling. Every attempt, retries included, costs one limiter token.
#[derive(Clone)]
pub struct ResilientClient {
    client: reqwest::Client,
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
}

impl ResilientClient {
    pub fn new(limiter: Arc<RateLimiter>, policy: RetryPolicy, contact_email: Option<&str>) -> Result<Self> {
        let user_agent = match contact_email {
            Some(email) => format!("{USER_AGENT} (mailto:{email})"),
            None => USER_AGENT.to_string(),
        };

        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .gzip(true)
            .timeout(policy.timeout)
            .build()?;

        Ok(Self {
            client,
            limiter,
            policy,
        })
    }

    pub fn from_config(cfg: &NetworkConfig) -> Result<Self> {
        let limiter = Arc::new(RateLimiter::new(
            cfg.rate_limit.requests,
            Duration::try_from_secs_f64(cfg.rate_limit.per_secs).unwrap_or(Duration::from_secs(1)),
        ));
        Self::new(limiter, RetryPolicy::from_config(cfg), cfg.contact_email.as_deref())
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// GET `url` and return the body of a `2xx` response.
    ///
    /// `404` fails at once with [`EngineError::NotFound`]. `429` waits for
    /// `Retry-After` (or the back-off delay) and surfaces as
    /// [`EngineError::RateLimited`] once retries run out. Other statuses and
    /// transport errors retry and end in [`EngineError::NetworkFailure`].
    pub async fn fetch(&self, url: &str, headers: HeaderMap) -> Result<String> {
        let mut attempt = 0u32;
        loop {
            self.limiter.wait_acquire(None).await;
            debug!("GET {url} (attempt {})", attempt + 1);

            let exhausted = attempt >= self.policy.max_retries;
            let failure = match self.client.get(url).headers(headers.clone()).send().await {
                Ok(resp) if resp.status().is_success() => match resp.text().await {
                    Ok(body) => return Ok(body),
                    Err(e) => transport_failure(url, &e, &self.policy),
                },
                Ok(resp) if resp.status() == StatusCode::NOT_FOUND => {
                    return Err(EngineError::NotFound {
                        identifier: url.to_string(),
                        failures: Vec::new(),
                    });
                }
                Ok(resp) if resp.status() == StatusCode::TOO_MANY_REQUESTS => {
                    if exhausted {
                        return Err(EngineError::RateLimited {
                            url: url.to_string(),
                            attempts: attempt + 1,
                        });
                    }
                    let wait = self
                        .policy
                        .retry_after(resp.headers())
                        .unwrap_or_else(|| self.policy.backoff_delay(attempt));
                    warn!("429 from {url}, retrying in {wait:?}");
                    sleep(wait).await;
                    attempt += 1;
                    continue;
                }
                Ok(resp) => EngineError::NetworkFailure {
                    url: url.to_string(),
                    reason: format!("HTTP {}", resp.status().as_u16()),
                },
                Err(e) => transport_failure(url, &e, &self.policy),
            };

            if exhausted {
                return Err(failure);
            }
            let wait = self.policy.backoff_delay(attempt);
            warn!("{failure}; retrying in {wait:?}");
            sleep(wait).await;
            attempt += 1;
        }
    }

    pub async fn fetch_bibtex(&self, url: &str) -> Result<String> {
        self.fetch(url, accept(ACCEPT_BIBTEX)).await
    }

    pub async fn fetch_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let text = self.fetch(url, accept(ACCEPT_JSON)).await?;
        serde_json::from_str(&text).map_err(|e| EngineError::Parse(e.to_string()))
    }
}

fn transport_failure(url: &str, err: &reqwest::Error, policy: &RetryPolicy) -> EngineError {
    let reason = if err.is_timeout() {
        format!("timed out after {:?}", policy.timeout)
    } else {
        err.to_string()
    };
    EngineError::NetworkFailure {
        url: url.to_string(),
        reason,
    }
}

pub fn accept(value: &'static str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(value));
    headers
}
