//! WolfBrowse Configuration
//!
//! This module provides configuration structures for the WolfBrowse
//! object store gateway.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Largest page size a single list call may request
pub const MAX_PAGE_LIMIT: usize = 1000;

/// Main WolfBrowse configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WolfBrowseConfig {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Object store configuration
    pub store: StoreConfig,

    /// Directory listing configuration
    #[serde(default)]
    pub listing: ListingConfig,

    /// File retrieval configuration
    #[serde(default)]
    pub files: FilesConfig,

    /// Static asset configuration
    #[serde(default)]
    pub assets: AssetsConfig,

    /// Deny-list configuration
    #[serde(default)]
    pub access: AccessConfig,

    /// Rate limit rules, one per admission bucket
    #[serde(default)]
    pub rate_limits: Vec<RateLimitConfig>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP bind address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Path segment that selects JSON listings (`/api/...`), if any
    #[serde(default)]
    pub api_prefix: Option<String>,

    /// Allow cross-origin reads of JSON listings
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
}

/// Object store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory exposed as the object store
    pub root: PathBuf,
}

/// Directory listing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingConfig {
    /// Maximum entries requested per list call
    #[serde(default = "default_page_limit")]
    pub page_limit: usize,

    /// Maximum list calls per directory request
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,

    /// Admission bucket checked before each list call
    #[serde(default = "default_list_bucket")]
    pub rate_bucket: String,
}

/// File retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesConfig {
    /// Admission bucket checked before each file request
    #[serde(default = "default_get_bucket")]
    pub rate_bucket: String,

    /// Cache-Control value attached to served files
    #[serde(default)]
    pub cache_control: Option<String>,
}

/// Static asset configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AssetsConfig {
    /// Directory holding `index.html` (built-in page when unset)
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

/// Deny-list configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AccessConfig {
    /// Key prefixes hidden from the gateway
    #[serde(default)]
    pub deny_prefixes: Vec<String>,
}

/// Fixed-window rate limit for one admission bucket
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Bucket name (matches `listing.rate_bucket` / `files.rate_bucket`)
    pub bucket: String,

    /// Requests admitted per window
    pub limit: u32,

    /// Window length in seconds
    #[serde(default = "default_period_secs")]
    pub period_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, compact)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0:8787".to_string()
}

fn default_true() -> bool {
    true
}

fn default_page_limit() -> usize {
    500
}

fn default_max_pages() -> usize {
    1000
}

fn default_list_bucket() -> String {
    "list".to_string()
}

fn default_get_bucket() -> String {
    "get".to_string()
}

fn default_period_secs() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            api_prefix: None,
            cors_enabled: true,
        }
    }
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            page_limit: default_page_limit(),
            max_pages: default_max_pages(),
            rate_bucket: default_list_bucket(),
        }
    }
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            rate_bucket: default_get_bucket(),
            cache_control: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl RateLimitConfig {
    /// Get the window length as Duration
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }
}

impl WolfBrowseConfig {
    /// Create a configuration exposing `root` with every other section defaulted
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            server: ServerConfig::default(),
            store: StoreConfig { root: root.into() },
            listing: ListingConfig::default(),
            files: FilesConfig::default(),
            assets: AssetsConfig::default(),
            access: AccessConfig::default(),
            rate_limits: Vec::new(),
            logging: LoggingConfig::default(),
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let config: WolfBrowseConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.server.bind_address.is_empty() {
            return Err(crate::Error::Config("server.bind_address cannot be empty".into()));
        }

        if let Some(prefix) = &self.server.api_prefix {
            if prefix.trim_matches('/').is_empty() {
                return Err(crate::Error::Config("server.api_prefix cannot be empty".into()));
            }
        }

        if self.store.root.as_os_str().is_empty() {
            return Err(crate::Error::Config("store.root cannot be empty".into()));
        }

        if self.listing.page_limit == 0 || self.listing.page_limit > MAX_PAGE_LIMIT {
            return Err(crate::Error::Config(format!(
                "listing.page_limit must be between 1 and {}",
                MAX_PAGE_LIMIT
            )));
        }

        if self.listing.max_pages == 0 {
            return Err(crate::Error::Config("listing.max_pages must be at least 1".into()));
        }

        let mut buckets = HashSet::new();
        for rule in &self.rate_limits {
            if rule.limit == 0 || rule.period_secs == 0 {
                return Err(crate::Error::Config(format!(
                    "rate limit for bucket {} needs a positive limit and period",
                    rule.bucket
                )));
            }
            if !buckets.insert(rule.bucket.as_str()) {
                return Err(crate::Error::Config(format!(
                    "duplicate rate limit for bucket {}",
                    rule.bucket
                )));
            }
        }

        if self.access.deny_prefixes.iter().any(|p| p.is_empty()) {
            return Err(crate::Error::Config("access.deny_prefixes cannot contain an empty prefix".into()));
        }

        Ok(())
    }

    /// Get the API path segment without surrounding separators
    pub fn api_prefix(&self) -> Option<&str> {
        self.server
            .api_prefix
            .as_deref()
            .map(|p| p.trim_matches('/'))
    }
}
