use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PulseConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub query: QueryConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServiceConfig {
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct UpstreamConfig {
    pub base_url: String,
    /// Falls back to `VOICEFLOW_API_KEY` when unset.
    pub api_key: Option<String>,
    pub timeout_seconds: u64,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
    pub page_size: u32,
    pub max_pages: u32,
    /// Serve records from a local JSON file instead of the platform API.
    pub fixture_path: Option<String>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://analytics-api.voiceflow.com".to_string(),
            api_key: None,
            timeout_seconds: 30,
            max_retries: 3,
            retry_delay_ms: 800,
            page_size: 250,
            max_pages: 200,
            fixture_path: None,
        }
    }
}

impl UpstreamConfig {
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var("VOICEFLOW_API_KEY").ok())
            .filter(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_seconds: u64,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: 300,
            max_entries: 1024,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

/// Limits and thresholds applied by the query endpoints.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct QueryConfig {
    pub default_intent_limit: usize,
    pub top_questions_limit: usize,
    pub default_page_size: usize,
    pub max_page_size: usize,
    pub peak_slots: usize,
    pub gap_min_mentions: u64,
    pub gap_score_threshold: f64,
    pub gap_negative_share_threshold: f64,
    /// Longest accepted custom `start`..`end` window.
    pub max_range_days: i64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_intent_limit: 50,
            top_questions_limit: 10,
            default_page_size: 100,
            max_page_size: 500,
            peak_slots: 5,
            gap_min_mentions: 5,
            gap_score_threshold: 3.0,
            gap_negative_share_threshold: 30.0,
            max_range_days: crate::period::DEFAULT_MAX_RANGE_DAYS,
        }
    }
}

impl PulseConfig {
    /// Load from a TOML file, then apply `PULSE__SECTION__KEY` environment overrides.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("PULSE").separator("__"))
            .build()?;
        s.try_deserialize()
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::from_str(raw, FileFormat::Toml))
            .build()?;
        s.try_deserialize()
    }
}
