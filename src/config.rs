use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::logic::log_resolver::DEFAULT_REGISTRY_REMOTE;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub remote: RemoteConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Close every mutating route
    pub read_only: bool,
    /// Reported in the `X-Api-Version` response header
    pub api_version: String,
    pub max_upload_bytes: usize,
    /// 0 disables the per-request deadline
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Remote consulted when local history is missing
    pub default_remote: String,
    pub fetch_timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    pub load_seed_data: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3001,
            read_only: false,
            api_version: env!("CARGO_PKG_VERSION").to_string(),
            max_upload_bytes: 8 * 1024 * 1024,
            request_timeout_secs: 30,
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            default_remote: DEFAULT_REGISTRY_REMOTE.to_string(),
            fetch_timeout_secs: 15,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and config file
    pub fn load() -> anyhow::Result<Self> {
        let mut config = config::Config::builder();

        // Add default configuration
        config = config.add_source(config::Config::try_from(&AppConfig::default())?);

        // Add config file if it exists
        config = config.add_source(config::File::with_name("config").required(false));

        // Environment variables, e.g. DSGATE_SERVER__READ_ONLY=true
        config = config.add_source(
            config::Environment::with_prefix("DSGATE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = config.build()?;
        let app_config: AppConfig = config.try_deserialize()?;

        Ok(app_config)
    }

    /// Get the server bind address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// Read-only settings handed to the router at startup
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub read_only: bool,
    pub api_version: String,
    pub default_remote: String,
    pub request_timeout: Option<Duration>,
    pub fetch_timeout: Duration,
    pub max_upload_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for ServerSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            read_only: config.server.read_only,
            api_version: config.server.api_version.clone(),
            default_remote: config.remote.default_remote.clone(),
            request_timeout: (config.server.request_timeout_secs > 0)
                .then(|| Duration::from_secs(config.server.request_timeout_secs)),
            fetch_timeout: Duration::from_secs(config.remote.fetch_timeout_secs),
            max_upload_bytes: config.server.max_upload_bytes,
        }
    }
}
