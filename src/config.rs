use crate::core::connection_pool::PoolSettings;
use crate::core::endpoint::{resolve_endpoints, Endpoint};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Comma/whitespace separated `host[:port]` list of mirror stores
    #[serde(default)]
    pub sibling_hosts: Option<String>,
    /// Connect timeout in milliseconds, 0 keeps the client library default
    #[serde(default)]
    pub timeout: u64,
    #[serde(default)]
    pub password: String,
    /// Default TTL in seconds, 0 never expires
    #[serde(default)]
    pub expire: u64,
    #[serde(default)]
    pub connection_pool: ConnectionPoolConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            sibling_hosts: None,
            timeout: 0,
            password: String::new(),
            expire: 0,
            connection_pool: ConnectionPoolConfig::default(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    6379
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectionPoolConfig {
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default)]
    pub min_idle: u32,
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_max_lifetime_secs")]
    pub max_lifetime_secs: u64,
}

impl Default for ConnectionPoolConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            min_idle: 0,
            idle_timeout_secs: default_idle_timeout_secs(),
            max_lifetime_secs: default_max_lifetime_secs(),
        }
    }
}

fn default_max_connections() -> u32 {
    8
}

// 5 minutes
fn default_idle_timeout_secs() -> u64 {
    300
}

// 1 hour
fn default_max_lifetime_secs() -> u64 {
    3600
}

impl ConnectionPoolConfig {
    /// Reject bounds the pool builder cannot honor
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections == 0 {
            return Err(ConfigError::ValidationError(
                "connection_pool.max_connections must be greater than zero".to_string(),
            ));
        }
        if self.min_idle > self.max_connections {
            return Err(ConfigError::ValidationError(format!(
                "connection_pool.min_idle ({}) exceeds max_connections ({})",
                self.min_idle, self.max_connections
            )));
        }
        Ok(())
    }
}

impl CacheConfig {
    /// Load configuration from a YAML file
    pub async fn from_yaml_file(path: &str) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound(path.to_string())
            } else {
                ConfigError::IoError(e.to_string())
            }
        })?;

        Self::from_yaml_str(&content)
    }

    /// Parse configuration from a YAML string (useful for testing)
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let config: CacheConfig =
            serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration for common errors
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_connection_settings()?;

        if let Some(hosts) = &self.sibling_hosts {
            resolve_endpoints(hosts, self.port)
                .map_err(|e| ConfigError::ValidationError(format!("sibling_hosts: {}", e)))?;
        }

        Ok(())
    }

    /// Checks needed before any pool is built: primary host and pool bounds
    pub fn validate_connection_settings(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "Primary host must not be empty".to_string(),
            ));
        }

        self.connection_pool.validate()
    }

    pub fn primary_endpoint(&self) -> Endpoint {
        Endpoint::new(self.host.clone(), self.port)
    }

    /// Settings shared by the primary and every mirror pool
    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            connect_timeout: (self.timeout != 0).then(|| Duration::from_millis(self.timeout)),
            credential: (!self.password.is_empty()).then(|| self.password.clone()),
            pool: self.connection_pool.clone(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("File not found: {0}")]
    FileNotFound(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
}
