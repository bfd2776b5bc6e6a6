//! Configuration management for the adapter
//!
//! Settings come from an optional TOML file, then environment variables,
//! then command-line flags (applied by the binary). Every field has a
//! default, so an empty file or no file at all is valid.
//!
//! ```toml
//! [server]
//! listen_addr = "127.0.0.1:9201"
//! log_level = "info"
//! remote_timeout_secs = 30
//!
//! [redis]
//! address = "127.0.0.1:6379"
//! pool_size = 500
//! write_timeout_secs = 60
//! ```
//!
//! The Redis password is never read from or written to the file; it comes
//! from the `REDIS_AUTH` environment variable only.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::redis::{RedisConfig, RetryPolicy};

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "REDIS_TS_ADAPTER_CONFIG";

/// Environment variable holding the Redis password
pub const REDIS_AUTH_ENV: &str = "REDIS_AUTH";

/// Environment variable overriding the listen address
pub const LISTEN_ENV: &str = "REDIS_TS_ADAPTER_LISTEN";

/// A string wrapper that prevents accidental logging of sensitive data
///
/// `Debug` and `Display` print `[REDACTED]`.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretString(String);

impl SecretString {
    /// Create a new SecretString from a regular string
    pub fn new(s: String) -> Self {
        Self(s)
    }

    /// Access the secret value
    pub fn expose_secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self::new(s.to_string())
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AdapterConfig {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerSection,

    /// Redis backend settings
    #[serde(default)]
    pub redis: RedisSection,
}

/// HTTP server settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ServerSection {
    /// Address to listen on for remote read/write requests
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Log level (error, warn, info, debug, trace) or a full filter directive
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Timeout for a whole remote read or write request, in seconds
    #[serde(default = "default_remote_timeout_secs")]
    pub remote_timeout_secs: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            log_level: default_log_level(),
            remote_timeout_secs: default_remote_timeout_secs(),
        }
    }
}

impl ServerSection {
    /// Request timeout as a [`Duration`]
    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs)
    }
}

/// Redis backend settings
///
/// Set either `address` or `sentinel_address` + `sentinel_master`. With
/// neither, no backend is configured.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RedisSection {
    /// Redis server address (`host:port`)
    #[serde(default)]
    pub address: Option<String>,

    /// Redis sentinel address (`host:port`)
    #[serde(default)]
    pub sentinel_address: Option<String>,

    /// Name of the master monitored by the sentinel
    #[serde(default)]
    pub sentinel_master: Option<String>,

    /// Password, from `REDIS_AUTH`
    #[serde(skip)]
    pub auth: Option<SecretString>,

    /// Maximum number of concurrent Redis operations
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// Timeout for establishing a connection, in seconds
    #[serde(default = "default_connection_timeout_secs")]
    pub connection_timeout_secs: u64,

    /// Timeout for one Redis round trip, in seconds
    #[serde(default = "default_write_timeout_secs")]
    pub write_timeout_secs: u64,

    /// Retries for connection-level failures
    #[serde(default)]
    pub max_retries: u32,

    /// Use TLS (`rediss://`); needs the `redis-tls` feature
    #[serde(default)]
    pub tls: bool,
}

impl Default for RedisSection {
    fn default() -> Self {
        Self {
            address: None,
            sentinel_address: None,
            sentinel_master: None,
            auth: None,
            pool_size: default_pool_size(),
            connection_timeout_secs: default_connection_timeout_secs(),
            write_timeout_secs: default_write_timeout_secs(),
            max_retries: 0,
            tls: false,
        }
    }
}

impl RedisSection {
    /// Whether any Redis backend is configured
    pub fn is_configured(&self) -> bool {
        self.address.is_some() || self.sentinel_address.is_some()
    }

    /// Build the connection settings, or `None` if no backend is configured
    ///
    /// Call [`AdapterConfig::validate`] first; an inconsistent section is
    /// reported as an error here too.
    pub fn to_redis_config(&self) -> Result<Option<RedisConfig>, String> {
        let base = match (&self.address, &self.sentinel_address, &self.sentinel_master) {
            (None, None, _) => return Ok(None),
            (Some(address), None, _) => RedisConfig::direct(address.as_str()),
            (None, Some(address), Some(master)) => {
                RedisConfig::sentinel(address.as_str(), master.as_str())
            },
            (None, Some(_), None) => {
                return Err("redis.sentinel_master is required with a sentinel address".to_string())
            },
            (Some(_), Some(_), _) => {
                return Err(
                    "redis.address and redis.sentinel_address are mutually exclusive".to_string(),
                )
            },
        };

        Ok(Some(
            base.password(self.auth.clone())
                .pool_size(self.pool_size)
                .connection_timeout(Duration::from_secs(self.connection_timeout_secs))
                .command_timeout(Duration::from_secs(self.write_timeout_secs))
                .retry_policy(RetryPolicy::with_retries(self.max_retries))
                .tls(self.tls),
        ))
    }
}

fn default_listen_addr() -> String {
    "127.0.0.1:9201".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_remote_timeout_secs() -> u64 {
    30
}

fn default_pool_size() -> u32 {
    500
}

fn default_connection_timeout_secs() -> u64 {
    5
}

fn default_write_timeout_secs() -> u64 {
    60
}

impl AdapterConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, String> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {}", path.display(), e))?;

        toml::from_str(&contents)
            .map_err(|e| format!("Failed to parse config file {}: {}", path.display(), e))
    }

    /// Load from `path`, else from `REDIS_TS_ADAPTER_CONFIG`, else defaults;
    /// then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, String> {
        let env_path = std::env::var(CONFIG_PATH_ENV).ok();
        let mut config = match path.map(Path::to_path_buf).or(env_path.map(Into::into)) {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable source
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(auth) = lookup(REDIS_AUTH_ENV).filter(|a| !a.is_empty()) {
            self.redis.auth = Some(SecretString::new(auth));
        }
        if let Some(listen) = lookup(LISTEN_ENV) {
            self.server.listen_addr = listen;
        }
        if let Some(log_level) = lookup("RUST_LOG") {
            self.server.log_level = log_level;
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        let redis = &self.redis;
        if redis.address.is_some() && redis.sentinel_address.is_some() {
            return Err(
                "redis.address and redis.sentinel_address are mutually exclusive".to_string(),
            );
        }
        if redis.sentinel_address.is_some() != redis.sentinel_master.is_some() {
            return Err(
                "redis.sentinel_address and redis.sentinel_master must be set together"
                    .to_string(),
            );
        }
        if redis.pool_size == 0 || redis.pool_size > 10_000 {
            return Err("redis.pool_size must be between 1 and 10000".to_string());
        }
        if redis.write_timeout_secs == 0 {
            return Err("redis.write_timeout_secs must be > 0".to_string());
        }
        if self.server.remote_timeout_secs == 0 {
            return Err("server.remote_timeout_secs must be > 0".to_string());
        }
        if self.server.listen_addr.is_empty() {
            return Err("server.listen_addr cannot be empty".to_string());
        }
        Ok(())
    }

    /// Validate for serving: also requires a configured backend
    pub fn validate_for_start(&self) -> Result<(), String> {
        self.validate()?;
        if !self.redis.is_configured() {
            return Err(
                "no storage configured: set redis.address or redis.sentinel_address".to_string(),
            );
        }
        Ok(())
    }

    /// Render the configuration as TOML (the password is never included)
    pub fn to_toml(&self) -> Result<String, String> {
        toml::to_string_pretty(self).map_err(|e| format!("Failed to serialize config: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AdapterConfig::default();
        assert_eq!(config.server.listen_addr, "127.0.0.1:9201");
        assert_eq!(config.server.log_level, "info");
        assert_eq!(config.server.remote_timeout(), Duration::from_secs(30));
        assert_eq!(config.redis.pool_size, 500);
        assert_eq!(config.redis.write_timeout_secs, 60);
        assert_eq!(config.redis.max_retries, 0);
        assert!(!config.redis.is_configured());
        assert!(config.validate().is_ok());
        assert!(config.validate_for_start().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[server]
listen_addr = "0.0.0.0:9300"

[redis]
address = "redis.internal:6380"
pool_size = 32
"#
        )
        .unwrap();

        let config = AdapterConfig::from_file(file.path()).unwrap();
        assert_eq!(config.server.listen_addr, "0.0.0.0:9300");
        assert_eq!(config.server.log_level, "info");
        assert_eq!(config.redis.address.as_deref(), Some("redis.internal:6380"));
        assert_eq!(config.redis.pool_size, 32);
        assert_eq!(config.redis.write_timeout_secs, 60);
        assert!(config.validate_for_start().is_ok());
    }

    #[test]
    fn test_auth_never_read_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[redis]\naddress = \"localhost:6379\"\nauth = \"filepass\"").unwrap();

        let config = AdapterConfig::from_file(file.path()).unwrap();
        assert!(config.redis.auth.is_none());
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(AdapterConfig::from_file("/nonexistent/adapter.toml").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            (REDIS_AUTH_ENV, "s3cret"),
            (LISTEN_ENV, "0.0.0.0:9999"),
            ("RUST_LOG", "debug"),
        ]
        .into_iter()
        .collect();

        let mut config = AdapterConfig::default();
        config.apply_overrides_from(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.redis.auth.as_ref().map(|a| a.expose_secret()), Some("s3cret"));
        assert_eq!(config.server.listen_addr, "0.0.0.0:9999");
        assert_eq!(config.server.log_level, "debug");
    }

    #[test]
    fn test_validation() {
        let mut config = AdapterConfig::default();
        config.redis.address = Some("a:1".to_string());
        config.redis.sentinel_address = Some("b:2".to_string());
        config.redis.sentinel_master = Some("m".to_string());
        assert!(config.validate().unwrap_err().contains("mutually exclusive"));

        let mut config = AdapterConfig::default();
        config.redis.sentinel_address = Some("b:2".to_string());
        assert!(config.validate().is_err());

        let mut config = AdapterConfig::default();
        config.redis.sentinel_master = Some("m".to_string());
        assert!(config.validate().is_err());

        let mut config = AdapterConfig::default();
        config.redis.pool_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_redis_config_conversion() {
        let mut config = AdapterConfig::default();
        assert!(config.redis.to_redis_config().unwrap().is_none());

        config.redis.sentinel_address = Some("10.0.0.1:26379".to_string());
        config.redis.sentinel_master = Some("mymaster".to_string());
        config.redis.auth = Some(SecretString::from("pw"));
        config.redis.write_timeout_secs = 5;

        let redis = config.redis.to_redis_config().unwrap().unwrap();
        assert_eq!(
            redis.target,
            crate::redis::RedisTarget::Sentinel {
                address: "10.0.0.1:26379".to_string(),
                master: "mymaster".to_string(),
            }
        );
        assert_eq!(redis.command_timeout, Duration::from_secs(5));
        assert_eq!(redis.pool_size, 500);
        assert_eq!(redis.password.as_ref().map(|p| p.expose_secret()), Some("pw"));
    }

    #[test]
    fn test_serialized_config_has_no_secret() {
        let mut config = AdapterConfig::default();
        config.redis.address = Some("localhost:6379".to_string());
        config.redis.auth = Some(SecretString::from("topsecret"));

        let rendered = config.to_toml().unwrap();
        assert!(!rendered.contains("topsecret"));
        assert!(rendered.contains("localhost:6379"));
        assert!(!format!("{:?}", config).contains("topsecret"));
    }
}
