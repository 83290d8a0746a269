use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Root configuration, loaded from `~/.config/bibresolve/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub processing: ProcessingConfig,
    pub network: NetworkConfig,
    pub sources: SourcesConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    pub remove_duplicates: bool,
    pub validate_identifiers: bool,
    pub normalize_authors: bool,
    pub include_abstracts: bool,
    pub fetch_abstracts: bool,
    pub use_abbrev_journal: bool,
    pub field_order: Vec<String>,
    pub key_pattern: KeyPattern,
    /// `1` runs the batch sequentially; anything larger resolves that many
    /// identifiers in parallel.
    pub concurrency: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub max_retry_after_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub requests: u32,
    pub per_secs: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub crossref_base: String,
    pub datacite_base: String,
    pub resolver_base: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub memory_enabled: bool,
    pub memory_capacity: usize,
    pub memory_ttl_secs: u64,
    pub disk_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_dir: Option<PathBuf>,
    pub disk_ttl_secs: u64,
}

/// How the base citation key is assembled from a record's fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyPattern {
    #[default]
    AuthorYear,
    FirstAuthorTitleYear,
    JournalYear,
}

impl KeyPattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorYear => "author_year",
            Self::FirstAuthorTitleYear => "first_author_title_year",
            Self::JournalYear => "journal_year",
        }
    }
}

impl FromStr for KeyPattern {
    type Err = std::convert::Infallible;

    /// Unknown pattern names fall back to `author_year`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "first_author_title_year" => Self::FirstAuthorTitleYear,
            "journal_year" => Self::JournalYear,
            _ => Self::AuthorYear,
        })
    }
}

/// Batch execution strategy derived from `processing.concurrency`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Sequential,
    Concurrent(usize),
}

pub const DEFAULT_FIELD_ORDER: &[&str] = &[
    "title",
    "author",
    "journal",
    "volume",
    "number",
    "pages",
    "year",
    "publisher",
    "DOI",
    "ISSN",
    "url",
    "month",
];

pub const MAX_CONCURRENCY: usize = 32;
pub const MAX_RETRIES: u32 = 10;

// ─── Defaults ──────────────────────────────────────────────

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            remove_duplicates: true,
            validate_identifiers: true,
            normalize_authors: true,
            include_abstracts: false,
            fetch_abstracts: false,
            use_abbrev_journal: false,
            field_order: DEFAULT_FIELD_ORDER.iter().map(|s| s.to_string()).collect(),
            key_pattern: KeyPattern::AuthorYear,
            concurrency: 1,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            max_retries: 3,
            base_backoff_ms: 1_000,
            max_backoff_ms: 16_000,
            max_retry_after_secs: 60,
            contact_email: None,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests: 10,
            per_secs: 1.0,
        }
    }
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            crossref_base: "https://api.crossref.org".to_string(),
            datacite_base: "https://api.datacite.org".to_string(),
            resolver_base: "https://doi.org".to_string(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_enabled: true,
            memory_capacity: 1_000,
            memory_ttl_secs: 3_600,
            disk_enabled: true,
            disk_dir: None,
            disk_ttl_secs: 86_400,
        }
    }
}

// ─── Validation ────────────────────────────────────────────

impl AppConfig {
    /// Rejects settings the engine cannot run with. Called once when a
    /// processor is constructed; a bad config never reaches a batch.
    pub fn validate(&self) -> Result<()> {
        let p = &self.processing;
        if !(1..=MAX_CONCURRENCY).contains(&p.concurrency) {
            return Err(CoreError::InvalidConfig(format!(
                "concurrency must be between 1 and {MAX_CONCURRENCY}, got {}",
                p.concurrency
            )));
        }
        if let Some(bad) = p.field_order.iter().find(|f| f.trim().is_empty()) {
            return Err(CoreError::InvalidConfig(format!(
                "field_order contains an empty field name: {bad:?}"
            )));
        }

        let n = &self.network;
        if n.timeout_secs == 0 {
            return Err(CoreError::InvalidConfig(
                "timeout_secs must be at least 1".to_string(),
            ));
        }
        if n.max_retries > MAX_RETRIES {
            return Err(CoreError::InvalidConfig(format!(
                "max_retries must be at most {MAX_RETRIES}, got {}",
                n.max_retries
            )));
        }
        if n.base_backoff_ms > n.max_backoff_ms {
            return Err(CoreError::InvalidConfig(format!(
                "base_backoff_ms ({}) exceeds max_backoff_ms ({})",
                n.base_backoff_ms, n.max_backoff_ms
            )));
        }
        if n.rate_limit.requests == 0 || n.rate_limit.per_secs.is_nan() || n.rate_limit.per_secs <= 0.0 {
            return Err(CoreError::InvalidConfig(
                "rate_limit needs at least one request per positive interval".to_string(),
            ));
        }

        if self.cache.memory_enabled && self.cache.memory_capacity == 0 {
            return Err(CoreError::InvalidConfig(
                "memory_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl ProcessingConfig {
    pub fn execution_mode(&self) -> ExecutionMode {
        if self.concurrency <= 1 {
            ExecutionMode::Sequential
        } else {
            ExecutionMode::Concurrent(self.concurrency)
        }
    }
}

impl CacheConfig {
    /// Directory for the persistent tier, `~/.cache/bibresolve` unless overridden.
    pub fn resolved_disk_dir(&self) -> PathBuf {
        self.disk_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("bibresolve")
        })
    }
}

// ─── Load / Save ───────────────────────────────────────────

impl AppConfig {
    /// Standard config file path: `~/.config/bibresolve/config.toml`
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("BIBRESOLVE_CONFIG") {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("bibresolve")
            .join("config.toml")
    }

    /// Load config from disk, falling back to defaults if file doesn't exist.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        Self::load_from(&path)
    }

    /// Load config from a specific path and validate it.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to the standard path.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();
        self.save_to(&path)
    }

    /// Save config to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let toml_str = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let cfg = AppConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.processing.concurrency, 1);
        assert_eq!(cfg.processing.key_pattern, KeyPattern::AuthorYear);
        assert_eq!(cfg.processing.field_order.len(), 12);
        assert_eq!(cfg.sources.resolver_base, "https://doi.org");
    }

    #[test]
    fn test_config_toml_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let mut cfg = AppConfig::default();
        cfg.processing.concurrency = 4;
        cfg.processing.key_pattern = KeyPattern::JournalYear;
        cfg.network.contact_email = Some("me@example.org".to_string());
        cfg.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.processing.concurrency, 4);
        assert_eq!(loaded.processing.key_pattern, KeyPattern::JournalYear);
        assert_eq!(loaded.network.contact_email.as_deref(), Some("me@example.org"));
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[processing]\nconcurrency = 3\n").unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.processing.concurrency, 3);
        assert!(loaded.processing.remove_duplicates);
        assert_eq!(loaded.network.max_retries, 3);
    }

    #[test]
    fn test_load_nonexistent_returns_default() {
        let cfg =
            AppConfig::load_from(Path::new("/tmp/nonexistent_bibresolve_config.toml")).unwrap();
        assert_eq!(cfg.network.timeout_secs, 10);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut cfg = AppConfig::default();
        cfg.processing.concurrency = 0;
        assert!(matches!(cfg.validate(), Err(CoreError::InvalidConfig(_))));
    }

    #[test]
    fn test_invalid_file_is_rejected_on_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[processing]\nconcurrency = 0\n").unwrap();
        assert!(AppConfig::load_from(&path).is_err());
    }

    #[test]
    fn test_execution_mode() {
        let mut p = ProcessingConfig::default();
        assert_eq!(p.execution_mode(), ExecutionMode::Sequential);
        p.concurrency = 5;
        assert_eq!(p.execution_mode(), ExecutionMode::Concurrent(5));
    }

    #[test]
    fn test_key_pattern_parse_falls_back() {
        assert_eq!("journal_year".parse::<KeyPattern>().unwrap(), KeyPattern::JournalYear);
        assert_eq!("bogus".parse::<KeyPattern>().unwrap(), KeyPattern::AuthorYear);
    }
}
