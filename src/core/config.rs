use anyhow::Result;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::core::error::DocpackError;

pub const DEFAULT_API_HOST: &str = "127.0.0.1";
pub const DEFAULT_API_PORT: u16 = 17990;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DocpackConfig {
    #[serde(default)]
    pub upstream: UpstreamConfig,

    #[serde(default)]
    pub polling: PollingConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub endpoint_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Hard cap on status requests per stream; 600 at one second is ten minutes.
    #[serde(default = "default_max_polls")]
    pub max_polls: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_api_host")]
    pub host: String,

    #[serde(default = "default_api_port")]
    pub port: u16,
}

/// Validated credentials for the upstream status API.
#[derive(Debug, Clone)]
pub struct UpstreamCredentials {
    pub base_url: String,
    pub api_key: String,
    pub endpoint_id: String,
}

fn default_base_url() -> String {
    "https://api.runpod.ai".to_string()
}
fn default_interval_ms() -> u64 {
    1000
}
fn default_max_polls() -> u32 {
    600
}
fn default_api_host() -> String {
    DEFAULT_API_HOST.to_string()
}
fn default_api_port() -> u16 {
    DEFAULT_API_PORT
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            endpoint_id: None,
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            max_polls: default_max_polls(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl DocpackConfig {
    /// Defaults, then `config.toml` in the data directory, then the process environment.
    pub async fn load<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let config_path = data_dir.as_ref().join("config.toml");
        let mut config = if config_path.exists() {
            let content = tokio::fs::read_to_string(&config_path).await?;
            let parsed: DocpackConfig = toml::from_str(&content)?;
            info!("Loaded config from {}", config_path.display());
            parsed
        } else {
            info!("No config.toml found, using defaults and environment.");
            DocpackConfig::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.normalize();
        Ok(config)
    }

    pub(crate) fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(key) = non_empty("RUNPOD_API_KEY") {
            self.upstream.api_key = Some(key);
        }
        if let Some(id) = non_empty("RUNPOD_ENDPOINT_ID") {
            self.upstream.endpoint_id = Some(id);
        }
        if let Some(url) = non_empty("RUNPOD_BASE_URL") {
            self.upstream.base_url = url;
        }
    }

    fn normalize(&mut self) {
        self.upstream.base_url = self.upstream.base_url.trim_end_matches('/').to_string();
        if self.polling.max_polls == 0 {
            self.polling.max_polls = 1;
        }
    }

    /// Fails with a configuration error when the upstream key or endpoint id is missing.
    pub fn upstream_credentials(&self) -> Result<UpstreamCredentials, DocpackError> {
        let api_key = self
            .upstream
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                DocpackError::Configuration("RunPod credentials not configured".to_string())
            })?;
        let endpoint_id = self
            .upstream
            .endpoint_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| {
                DocpackError::Configuration("RunPod endpoint not configured".to_string())
            })?;
        Ok(UpstreamCredentials {
            base_url: self.upstream.base_url.clone(),
            api_key,
            endpoint_id,
        })
    }
}
