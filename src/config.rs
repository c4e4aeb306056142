use crate::error::{Result, SelectorError};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Main configuration structure loaded from test_selector.toml and environment variables
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub client: ClientConfig,
    pub logging: LoggingConfig,
}

/// Backend settings for `serve`
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// Tree document to serve; the built-in tree is used when unset
    pub tree_path: Option<PathBuf>,
    pub request_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 15006)),
            tree_path: None,
            request_timeout_ms: 10_000,
        }
    }
}

/// Settings for talking to a resolution service
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:15006".to_string(),
            timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// tracing-subscriber EnvFilter directive; RUST_LOG takes precedence
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "test_selector=info,tower_http=info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file and environment variables
    /// Uses TEST_SELECTOR_CONFIG environment variable or defaults to "test_selector.toml"
    pub fn load() -> Result<Self> {
        // TS_ENV_FILE if set, otherwise ./.env
        if let Ok(env_path) = std::env::var("TS_ENV_FILE") {
            let _ = dotenvy::from_path(env_path);
        } else {
            let _ = dotenvy::from_path(".env");
        }

        let config_path = std::env::var("TEST_SELECTOR_CONFIG")
            .unwrap_or_else(|_| "test_selector.toml".to_string());

        let mut config: Config = if let Ok(content) = std::fs::read_to_string(&config_path) {
            Self::from_toml(&content)?
        } else {
            tracing::debug!("Config file {} not found, using defaults", config_path);
            Self::default()
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply TS_* environment overrides (env-first)
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(bind) = std::env::var("TS_BIND") {
            self.server.bind = bind.parse().map_err(|e| SelectorError::Config {
                message: format!("TS_BIND '{}' is not a socket address: {}", bind, e),
            })?;
            tracing::debug!("TS_BIND env override applied");
        }
        if let Ok(path) = std::env::var("TS_TREE_PATH") {
            self.server.tree_path = Some(PathBuf::from(path));
            tracing::debug!("TS_TREE_PATH env override applied");
        }
        if let Some(ms) = std::env::var("TS_REQUEST_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            self.server.request_timeout_ms = ms;
        }
        if let Ok(url) = std::env::var("TS_BASE_URL") {
            self.client.base_url = url;
            tracing::debug!("TS_BASE_URL env override applied");
        }
        if let Some(ms) = std::env::var("TS_CLIENT_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            self.client.timeout_ms = ms;
        }
        if let Ok(level) = std::env::var("TS_LOG_LEVEL") {
            self.logging.level = level;
        }
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !self.client.base_url.starts_with("http://")
            && !self.client.base_url.starts_with("https://")
        {
            return Err(SelectorError::Config {
                message: format!(
                    "client.base_url '{}' must start with http:// or https://",
                    self.client.base_url
                ),
            });
        }
        if self.client.timeout_ms == 0 || self.server.request_timeout_ms == 0 {
            return Err(SelectorError::Config {
                message: "timeouts must be greater than 0".to_string(),
            });
        }
        if let Some(path) = &self.server.tree_path
            && !path.exists()
        {
            tracing::warn!("Tree file {} does not exist yet", path.display());
        }
        Ok(())
    }
}
