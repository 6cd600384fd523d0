use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Session lifetime in hours
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: i64,
    /// Origins allowed to call the API with credentials (the browser client)
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    #[serde(default)]
    pub news_api: NewsApiConfig,
}

fn default_bind_address() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_session_ttl_hours() -> i64 {
    24 * 14
}

#[derive(Debug, Deserialize, Clone)]
pub struct NewsApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Provider credential. `None` disables article fetching.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
}

fn default_base_url() -> String {
    "https://newsapi.org".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_max_page_size() -> usize {
    100
}

impl Default for NewsApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
            max_page_size: default_max_page_size(),
        }
    }
}

impl NewsApiConfig {
    /// The configured key, treating an empty or whitespace-only value as absent.
    pub fn credential(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Parse config from a TOML string (useful for testing)
    pub fn from_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Replace the file's provider key with `NEWS_API_KEY` when that variable is set.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(key) = std::env::var("NEWS_API_KEY") {
            self.news_api.api_key = Some(key);
        }
        self
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.session_ttl_hours)
    }
}
