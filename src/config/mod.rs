//! Configuration management for the HomeyPro MCP server
//!
//! Everything is read from `HOMEY_*` environment variables in one place,
//! validated, and then handed to constructors. Nothing below this module reads
//! the environment.

use crate::error::{HomeyError, Result};
use crate::error_recovery::{CircuitBreakerConfig, RetryPolicy};
use crate::server::pagination::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::server::resources::ResourceKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::str::FromStr;
use std::{env, time::Duration};
use url::Url;

/// Minimum accepted API token length
const MIN_TOKEN_LENGTH: usize = 10;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServerConfig {
    /// HomeyPro connection settings
    pub homey: HomeyConfig,

    /// Cache TTL settings
    pub cache: CacheConfig,

    /// Page size bounds
    pub pagination: PaginationConfig,

    /// Retry and circuit breaker settings for upstream fetches
    pub resilience: ResilienceConfig,

    /// Tool allow/deny lists
    pub tools: ToolsConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// HomeyPro connection configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct HomeyConfig {
    /// Base URL (e.g., "http://192.168.1.100")
    pub url: Url,

    /// Personal access token
    #[serde(skip_serializing, default)]
    pub token: String,

    /// Request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Verify TLS certificates
    pub verify_ssl: bool,
}

impl std::fmt::Debug for HomeyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HomeyConfig")
            .field("url", &self.url.as_str())
            .field("token", &"<redacted>")
            .field("timeout", &self.timeout)
            .field("verify_ssl", &self.verify_ssl)
            .finish()
    }
}

impl Default for HomeyConfig {
    fn default() -> Self {
        Self {
            url: Url::parse("http://localhost").expect("static URL is valid"),
            token: String::new(),
            timeout: Duration::from_secs(30),
            verify_ssl: false,
        }
    }
}

/// Cache TTL configuration; unset values fall back to the resource defaults
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CacheConfig {
    /// Overrides every resource's default TTL
    #[serde(default, with = "humantime_serde")]
    pub default_ttl: Option<Duration>,

    #[serde(default, with = "humantime_serde")]
    pub system_overview_ttl: Option<Duration>,

    #[serde(default, with = "humantime_serde")]
    pub devices_ttl: Option<Duration>,

    #[serde(default, with = "humantime_serde")]
    pub zones_ttl: Option<Duration>,

    #[serde(default, with = "humantime_serde")]
    pub flows_ttl: Option<Duration>,
}

impl CacheConfig {
    /// Effective TTL for a resource
    pub fn ttl_for(&self, kind: ResourceKind) -> Duration {
        let specific = match kind {
            ResourceKind::SystemOverview => self.system_overview_ttl,
            ResourceKind::Devices => self.devices_ttl,
            ResourceKind::Zones => self.zones_ttl,
            ResourceKind::Flows => self.flows_ttl,
        };
        specific
            .or(self.default_ttl)
            .unwrap_or_else(|| kind.default_ttl())
    }

    fn set_ttl(&mut self, kind: ResourceKind, ttl: Duration) {
        let slot = match kind {
            ResourceKind::SystemOverview => &mut self.system_overview_ttl,
            ResourceKind::Devices => &mut self.devices_ttl,
            ResourceKind::Zones => &mut self.zones_ttl,
            ResourceKind::Flows => &mut self.flows_ttl,
        };
        *slot = Some(ttl);
    }
}

/// Page size bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationConfig {
    pub default_page_size: usize,
    pub max_page_size: usize,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
        }
    }
}

/// Upstream resilience configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceConfig {
    /// Retry policy applied to every fetch
    pub retry: RetryPolicy,

    /// Circuit breaker; `None` disables it
    pub circuit_breaker: Option<CircuitBreakerConfig>,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            circuit_breaker: Some(CircuitBreakerConfig::default()),
        }
    }
}

/// Tool allow/deny lists
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ToolsConfig {
    /// When non-empty, only these tools are exposed
    pub enabled: BTreeSet<String>,

    /// Tools to hide; ignored when `enabled` is non-empty
    pub disabled: BTreeSet<String>,
}

/// Log output format
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = HomeyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "compact" | "text" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(HomeyError::config(format!(
                "Invalid log format '{other}'. Use 'compact' or 'json'"
            ))),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level directive when RUST_LOG is unset
    pub level: String,

    /// Output format
    pub format: LogFormat,

    /// Optional daily-rotated log file
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
            file: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from `HOMEY_*` environment variables and validate it
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        let url = env::var("HOMEY_API_URL")
            .map_err(|_| HomeyError::config("HOMEY_API_URL environment variable is required"))?;
        config.homey.url = parse_url(&url)?;

        config.homey.token = env::var("HOMEY_API_TOKEN")
            .map_err(|_| HomeyError::config("HOMEY_API_TOKEN environment variable is required"))?;

        if let Some(secs) = env_parse::<f64>("HOMEY_TIMEOUT")? {
            if !secs.is_finite() || secs <= 0.0 {
                return Err(HomeyError::config(format!(
                    "Invalid HOMEY_TIMEOUT: {secs}. Must be a positive number of seconds"
                )));
            }
            config.homey.timeout = Duration::from_secs_f64(secs);
        }

        if let Ok(verify) = env::var("HOMEY_VERIFY_SSL") {
            config.homey.verify_ssl = verify.trim().eq_ignore_ascii_case("true");
        }

        if let Some(secs) = env_parse::<u64>("HOMEY_CACHE_TTL")? {
            config.cache.default_ttl = Some(Duration::from_secs(secs));
        }
        for kind in ResourceKind::ALL {
            let name = format!("HOMEY_CACHE_TTL_{}", kind.env_suffix());
            if let Some(secs) = env_parse::<u64>(&name)? {
                config.cache.set_ttl(kind, Duration::from_secs(secs));
            }
        }

        if let Some(size) = env_parse::<usize>("HOMEY_MAX_PAGE_SIZE")? {
            config.pagination.max_page_size = size;
        }
        if let Some(size) = env_parse::<usize>("HOMEY_DEFAULT_PAGE_SIZE")? {
            config.pagination.default_page_size = size;
        }

        if let Some(retries) = env_parse::<u32>("HOMEY_MAX_RETRIES")? {
            config.resilience.retry.max_retries = retries;
        }

        if let Ok(level) = env::var("HOMEY_LOG_LEVEL") {
            config.logging.level = level.trim().to_lowercase();
        }
        if let Ok(format) = env::var("HOMEY_LOG_FORMAT") {
            config.logging.format = format.parse()?;
        }
        if let Ok(file) = env::var("HOMEY_LOG_FILE") {
            if !file.trim().is_empty() {
                config.logging.file = Some(PathBuf::from(file));
            }
        }

        config.tools.enabled = parse_list(env::var("HOMEY_ENABLED_TOOLS").ok().as_deref());
        config.tools.disabled = parse_list(env::var("HOMEY_DISABLED_TOOLS").ok().as_deref());

        config.validate()?;
        Ok(config)
    }

    /// Configuration pointing at a local controller, for tests and offline use
    pub fn dev_mode() -> Self {
        let mut config = Self::default();
        config.homey.url = Url::parse("http://127.0.0.1:8080").expect("static URL is valid");
        config.homey.token = "dev-token-0123456789".to_string();
        config.resilience.circuit_breaker = None;
        config
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.homey.url.host_str().is_none() {
            return Err(HomeyError::config(format!(
                "Invalid API URL format: {}. Expected format: http://192.168.1.100",
                self.homey.url
            )));
        }

        if self.homey.token.trim().len() < MIN_TOKEN_LENGTH {
            return Err(HomeyError::config(format!(
                "API token must be provided and at least {MIN_TOKEN_LENGTH} characters long"
            )));
        }

        if self.pagination.max_page_size == 0 {
            return Err(HomeyError::config("HOMEY_MAX_PAGE_SIZE must be at least 1"));
        }
        if self.pagination.default_page_size == 0
            || self.pagination.default_page_size > self.pagination.max_page_size
        {
            return Err(HomeyError::config(format!(
                "HOMEY_DEFAULT_PAGE_SIZE must be between 1 and {}",
                self.pagination.max_page_size
            )));
        }

        Ok(())
    }
}

fn parse_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim()).map_err(|e| {
        HomeyError::config(format!(
            "Invalid API URL format: {raw} ({e}). Expected format: http://192.168.1.100"
        ))
    })?;

    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(HomeyError::config(format!(
            "Invalid API URL format: {raw}. Expected format: http://192.168.1.100"
        )));
    }

    Ok(url)
}

fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| HomeyError::config(format!("Invalid {name}: {raw} ({e})"))),
        Err(_) => Ok(None),
    }
}

fn parse_list(raw: Option<&str>) -> BTreeSet<String> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const REQUIRED: [(&str, Option<&str>); 2] = [
        ("HOMEY_API_URL", Some("http://192.168.1.100")),
        ("HOMEY_API_TOKEN", Some("abcdefghijklmnop")),
    ];

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        temp_env::with_vars(REQUIRED, || {
            let config = ServerConfig::from_env().unwrap();
            assert_eq!(config.homey.url.as_str(), "http://192.168.1.100/");
            assert_eq!(config.homey.timeout, Duration::from_secs(30));
            assert!(!config.homey.verify_ssl);
            assert_eq!(config.pagination.default_page_size, 25);
            assert_eq!(config.pagination.max_page_size, 100);
            assert_eq!(
                config.cache.ttl_for(ResourceKind::Devices),
                Duration::from_secs(30)
            );
            assert!(config.tools.enabled.is_empty());
        });
    }

    #[test]
    #[serial]
    fn test_missing_url_is_error() {
        temp_env::with_vars(
            [
                ("HOMEY_API_URL", None),
                ("HOMEY_API_TOKEN", Some("abcdefghijklmnop")),
            ],
            || {
                let err = ServerConfig::from_env().unwrap_err();
                assert!(err.to_string().contains("HOMEY_API_URL"));
            },
        );
    }

    #[test]
    #[serial]
    fn test_short_token_rejected() {
        temp_env::with_vars(
            [
                ("HOMEY_API_URL", Some("http://homey.local")),
                ("HOMEY_API_TOKEN", Some("short")),
            ],
            || {
                assert!(matches!(
                    ServerConfig::from_env(),
                    Err(HomeyError::Config(_))
                ));
            },
        );
    }

    #[test]
    #[serial]
    fn test_invalid_url_rejected() {
        temp_env::with_vars(
            [
                ("HOMEY_API_URL", Some("192.168.1.100")),
                ("HOMEY_API_TOKEN", Some("abcdefghijklmnop")),
            ],
            || {
                assert!(ServerConfig::from_env().is_err());
            },
        );
    }

    #[test]
    #[serial]
    fn test_ttl_overrides() {
        temp_env::with_vars(
            [
                ("HOMEY_API_URL", Some("http://homey.local")),
                ("HOMEY_API_TOKEN", Some("abcdefghijklmnop")),
                ("HOMEY_CACHE_TTL", Some("60")),
                ("HOMEY_CACHE_TTL_DEVICES", Some("5")),
            ],
            || {
                let config = ServerConfig::from_env().unwrap();
                assert_eq!(
                    config.cache.ttl_for(ResourceKind::Devices),
                    Duration::from_secs(5)
                );
                assert_eq!(
                    config.cache.ttl_for(ResourceKind::Zones),
                    Duration::from_secs(60)
                );
            },
        );
    }

    #[test]
    #[serial]
    fn test_page_size_bounds_validated() {
        temp_env::with_vars(
            [
                ("HOMEY_API_URL", Some("http://homey.local")),
                ("HOMEY_API_TOKEN", Some("abcdefghijklmnop")),
                ("HOMEY_MAX_PAGE_SIZE", Some("10")),
                ("HOMEY_DEFAULT_PAGE_SIZE", Some("20")),
            ],
            || {
                let err = ServerConfig::from_env().unwrap_err();
                assert!(err.to_string().contains("HOMEY_DEFAULT_PAGE_SIZE"));
            },
        );
    }

    #[test]
    #[serial]
    fn test_tool_lists_parsed() {
        temp_env::with_vars(
            [
                ("HOMEY_API_URL", Some("http://homey.local")),
                ("HOMEY_API_TOKEN", Some("abcdefghijklmnop")),
                ("HOMEY_ENABLED_TOOLS", Some(" list_devices, ,list_zones ")),
                ("HOMEY_LOG_FORMAT", Some("json")),
            ],
            || {
                let config = ServerConfig::from_env().unwrap();
                let enabled: Vec<_> = config.tools.enabled.iter().cloned().collect();
                assert_eq!(enabled, vec!["list_devices", "list_zones"]);
                assert_eq!(config.logging.format, LogFormat::Json);
            },
        );
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = ServerConfig::dev_mode();
        let rendered = format!("{:?}", config.homey);
        assert!(!rendered.contains("dev-token"));
        assert!(config.validate().is_ok());
    }
}
