//! Application configuration management.
//!
//! This module handles loading and saving the application configuration:
//! the API endpoint and token, cache timings, and the resource table that
//! maps each resource key to its TTL and backend method.
//!
//! Configuration is stored at `~/.config/spotter/config.json`. Missing
//! fields fall back to the reference values.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::{ApiClient, TransportMethod};
use crate::resource::{CacheSettings, ResourceRegistry};

/// Application name used for config directory paths
const APP_NAME: &str = "spotter";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding `api_base_url`
pub const ENV_API_URL: &str = "SPOTTER_API_URL";

/// Environment variable overriding `api_token`
pub const ENV_API_TOKEN: &str = "SPOTTER_API_TOKEN";

const DEFAULT_API_BASE_URL: &str = "http://localhost:3000/api";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub api_token: Option<String>,
    pub cache: CacheConfig,
    pub resources: BTreeMap<String, ResourceConfig>,
    /// Directory for a rolling log file, in addition to stderr.
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
    pub sweep_interval_secs: u64,
    pub soft_capacity: usize,
    pub pending_timeout_secs: u64,
    pub join_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceConfig {
    /// Lifetime of a cached value in milliseconds.
    pub ttl_ms: u64,
    pub method: TransportMethod,
    #[serde(default)]
    pub critical: bool,
}

impl ResourceConfig {
    pub fn new(ttl: Duration, method: TransportMethod, critical: bool) -> Self {
        Self {
            ttl_ms: ttl.as_millis() as u64,
            method,
            critical,
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        let settings = CacheSettings::default();
        Self {
            sweep_interval_secs: settings.sweep_interval.as_secs(),
            soft_capacity: settings.soft_capacity,
            pending_timeout_secs: settings.pending_timeout.as_secs(),
            join_timeout_secs: settings.join_timeout.as_secs(),
            max_retries: settings.max_retries,
            retry_delay_ms: settings.retry_delay.as_millis() as u64,
        }
    }
}

impl CacheConfig {
    /// Reject values the cache cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.sweep_interval_secs == 0 {
            bail!("cache.sweep_interval_secs must be greater than zero");
        }
        let attempts = self.max_retries.max(1);
        if Duration::from_millis(self.retry_delay_ms)
            .checked_mul(attempts)
            .is_none()
        {
            bail!(
                "cache.retry_delay_ms of {} overflows the backoff for {} attempts",
                self.retry_delay_ms,
                attempts
            );
        }
        Ok(())
    }

    pub fn settings(&self) -> CacheSettings {
        CacheSettings {
            soft_capacity: self.soft_capacity,
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
            pending_timeout: Duration::from_secs(self.pending_timeout_secs),
            join_timeout: Duration::from_secs(self.join_timeout_secs),
            max_retries: self.max_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }
}

fn minutes(n: u64) -> Duration {
    Duration::from_secs(n * 60)
}

/// Reference resource table.
fn default_resources() -> BTreeMap<String, ResourceConfig> {
    [
        ("config", ResourceConfig::new(minutes(10), TransportMethod::Config, true)),
        ("stats", ResourceConfig::new(minutes(5), TransportMethod::Stats, false)),
        ("services", ResourceConfig::new(minutes(15), TransportMethod::Services, true)),
        ("products", ResourceConfig::new(minutes(3), TransportMethod::Products, false)),
        ("plans", ResourceConfig::new(minutes(30), TransportMethod::Plans, false)),
    ]
    .into_iter()
    .map(|(key, resource)| (key.to_string(), resource))
    .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_token: None,
            cache: CacheConfig::default(),
            resources: default_resources(),
            log_dir: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Self = serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            config
                .cache
                .validate()
                .with_context(|| format!("Invalid cache settings in {}", path.display()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Apply overrides from a variable lookup (normally the process environment).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.is_empty()) {
            self.api_base_url = url;
        }
        if let Some(token) = lookup(ENV_API_TOKEN).filter(|v| !v.is_empty()) {
            self.api_token = Some(token);
        }
    }

    pub fn apply_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    pub fn api_client(&self) -> Result<ApiClient> {
        let mut api = ApiClient::new(&self.api_base_url)?;
        if let Some(ref token) = self.api_token {
            api.set_token(token.clone());
        }
        Ok(api)
    }

    /// Registry wired to `api`, one transport per configured resource.
    pub fn registry(&self, api: &ApiClient) -> ResourceRegistry {
        ResourceRegistry::from_table(&self.resources, |method| api.transport(method))
    }
}
