//! bibresolve core: citation records, batch results, analytics and configuration.

pub mod analytics;
pub mod config;
pub mod error;
pub mod models;

pub use analytics::{AnalyticsSummary, BatchSummarizer, DefaultSummarizer};
pub use config::{AppConfig, ExecutionMode, KeyPattern};
pub use error::{CoreError, Result};
pub use models::*;
