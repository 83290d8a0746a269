//! bibresolve engine: DOI resolution with source fallback, retrying rate-limited
//! HTTP, two-tier caching, record rewriting, citation keys and batch orchestration.

pub mod batch;
pub mod cache;
pub mod dedup;
pub mod error;
pub mod http;
pub mod identifiers;
pub mod keys;
pub mod rate_limit;
pub mod record;
pub mod resolver;
pub mod sources;

pub use batch::{BatchProcessor, ProgressEvent};
pub use cache::{CacheStats, CacheStore, CacheStoreStats, DiskCache, MemoryCache};
pub use dedup::{DuplicateIndex, find_duplicates};
pub use error::{EngineError, Result, SourceFailure};
pub use http::{ResilientClient, RetryPolicy};
pub use identifiers::{Doi, clean_doi, is_valid_doi, parse_identifiers};
pub use keys::{UsedKeySet, disambiguate, make_key};
pub use rate_limit::RateLimiter;
pub use resolver::{Resolution, ResolutionContext, SourceResolver};
pub use sources::{CrossrefClient, CrossrefWork, Source};
