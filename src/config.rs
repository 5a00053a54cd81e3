use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::auth::classify::StatusPolicy;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default, alias = "github")]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

// ---------------------------------------------------------------------------
// Upstream
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// Full URL to the upstream API root (e.g. `https://api.github.com` or
    /// `https://ghe.corp.example.com/api/v3`).
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Name of the environment variable that, when set and non-empty,
    /// overrides `api_url`.
    #[serde(default = "default_api_url_env")]
    pub api_url_env: String,
    /// `Accept` header sent with every commit probe.
    #[serde(default = "default_accept")]
    pub accept: String,
    /// Value of the `X-GitHub-Api-Version` header.
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Whole-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    /// TCP/TLS connect timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_url_env: default_api_url_env(),
            accept: default_accept(),
            api_version: default_api_version(),
            request_timeout: default_request_timeout(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

impl UpstreamConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_api_url_env() -> String {
    "GITHUB_API".to_string()
}

fn default_accept() -> String {
    "application/vnd.github+json".to_string()
}

fn default_api_version() -> String {
    "2022-11-28".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

fn default_connect_timeout() -> u64 {
    5
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Positive verification cache TTL in seconds.  Failures are never cached.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl: u64,
    /// How statuses outside the explicit rejection table are treated.
    #[serde(default)]
    pub status_policy: StatusPolicy,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            cache_ttl: default_cache_ttl(),
            status_policy: StatusPolicy::default(),
        }
    }
}

impl AuthConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl)
    }
}

fn default_cache_ttl() -> u64 {
    60 * 60 * 24 * 7
}

// ---------------------------------------------------------------------------
// Cache backend
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// In-process cache; entries are lost on restart.
    #[default]
    Memory,
    /// Shared KeyDB / Redis instance.
    Keydb,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub backend: CacheBackend,
    /// Capacity bound of the in-memory backend.
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,
    #[serde(default)]
    pub keydb: KeyDbConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::default(),
            max_entries: default_max_entries(),
            keydb: KeyDbConfig::default(),
        }
    }
}

fn default_max_entries() -> u64 {
    100_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeyDbConfig {
    /// Connection string (e.g. `rediss://keydb.local:6380`).
    #[serde(default)]
    pub endpoint: String,
    /// Enable TLS for the KeyDB connection.
    #[serde(default)]
    pub tls: bool,
    /// Name of the environment variable that holds the KeyDB auth token.
    #[serde(default = "default_keydb_auth_env")]
    pub auth_token_env: String,
    /// Prefix prepended to every hex-encoded verification key.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl Default for KeyDbConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            tls: false,
            auth_token_env: default_keydb_auth_env(),
            key_prefix: default_key_prefix(),
        }
    }
}

fn default_keydb_auth_env() -> String {
    "KEYDB_AUTH_TOKEN".to_string()
}

fn default_key_prefix() -> String {
    "coveritup:auth:".to_string()
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Socket address for the HTTP listener (e.g. `0.0.0.0:8080`).
    #[serde(default = "default_http_listen")]
    pub http_listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_listen: default_http_listen(),
        }
    }
}

fn default_http_listen() -> String {
    "0.0.0.0:8080".to_string()
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Load and validate a [`Config`] from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    parse_config(&contents)
        .with_context(|| format!("failed to load config file: {}", path.display()))
}

/// Parse, apply environment overrides to, and validate a YAML document.
pub fn parse_config(contents: &str) -> Result<Config> {
    // An empty document deserializes to `null`, not to an empty mapping.
    let mut config: Config = if contents.trim().is_empty() {
        Config::default()
    } else {
        serde_yaml::from_str(contents).context("failed to parse config")?
    };
    apply_env_overrides(&mut config);
    validate_config(&config)?;
    Ok(config)
}

fn apply_env_overrides(config: &mut Config) {
    if config.upstream.api_url_env.is_empty() {
        return;
    }
    if let Ok(url) = std::env::var(&config.upstream.api_url_env) {
        if !url.trim().is_empty() {
            config.upstream.api_url = url.trim().to_string();
        }
    }
}

/// Basic sanity checks that cannot be expressed purely with serde.
fn validate_config(config: &Config) -> Result<()> {
    let api_url = &config.upstream.api_url;
    anyhow::ensure!(!api_url.is_empty(), "upstream.api_url must not be empty");
    anyhow::ensure!(
        api_url.starts_with("http://") || api_url.starts_with("https://"),
        "upstream.api_url must be an http(s) URL, got {api_url}"
    );
    anyhow::ensure!(
        config.upstream.request_timeout >= 1,
        "upstream.request_timeout must be at least 1 second"
    );
    anyhow::ensure!(
        config.upstream.connect_timeout >= 1,
        "upstream.connect_timeout must be at least 1 second"
    );
    anyhow::ensure!(
        config.upstream.connect_timeout <= config.upstream.request_timeout,
        "upstream.connect_timeout must not exceed upstream.request_timeout"
    );
    anyhow::ensure!(
        config.auth.cache_ttl >= 1,
        "auth.cache_ttl must be at least 1 second"
    );
    anyhow::ensure!(
        config.cache.max_entries >= 1,
        "cache.max_entries must be at least 1"
    );
    if config.cache.backend == CacheBackend::Keydb {
        anyhow::ensure!(
            !config.cache.keydb.endpoint.is_empty(),
            "cache.keydb.endpoint is required when cache.backend is keydb"
        );
    }
    Ok(())
}
