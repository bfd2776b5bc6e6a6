//! Redis connection handling with timeout and retry logic
//!
//! A [`RedisPool`] owns one multiplexed connection (Redis pipelines requests
//! over it), caps the number of in-flight operations with a semaphore and
//! applies the command timeout to every round trip. Failed operations can be
//! retried with exponential backoff; by default they are not.
//!
//! The connection comes either straight from a server address or from a
//! sentinel that resolves the current master. The choice is made once in
//! [`RedisPool::new`] and nothing above the pool sees it.
//!
//! # Example
//!
//! ```rust,no_run
//! use redis_ts_adapter::redis::{RedisConfig, RedisPool};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RedisConfig::direct("127.0.0.1:6379")
//!     .pool_size(64)
//!     .command_timeout(Duration::from_secs(10));
//!
//! let pool = RedisPool::new(config).await?;
//! pool.ping().await?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use redis::aio::MultiplexedConnection;
use redis::sentinel::{SentinelClient, SentinelNodeConnectionInfo, SentinelServerType};
use redis::{Client, RedisConnectionInfo, RedisError};
use tokio::sync::{Mutex, RwLock, Semaphore};
use url::Url;
use tracing::{debug, info, warn};

use super::util::{backend_error, build_url, sanitize_url};
use crate::config::SecretString;
use crate::error::BackendError;

/// Where the Redis server is found
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RedisTarget {
    /// A single server at `host:port`
    Direct {
        /// Server address
        address: String,
    },
    /// The master of a sentinel-managed group
    Sentinel {
        /// Sentinel address
        address: String,
        /// Name of the monitored master
        master: String,
    },
}

impl fmt::Display for RedisTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RedisTarget::Direct { address } => write!(f, "{}", address),
            RedisTarget::Sentinel { address, master } => {
                write!(f, "sentinel {} (master {})", address, master)
            },
        }
    }
}

/// Configuration for [`RedisPool`]
#[derive(Clone, Debug)]
pub struct RedisConfig {
    /// Server or sentinel to connect to
    pub target: RedisTarget,

    /// Password for the data server
    pub password: Option<SecretString>,

    /// Maximum number of concurrent operations
    /// Default: 500
    pub pool_size: u32,

    /// Timeout for establishing a connection
    /// Default: 5 seconds
    pub connection_timeout: Duration,

    /// Timeout for one round trip (a whole pipeline counts as one)
    /// Default: 60 seconds
    pub command_timeout: Duration,

    /// Retry policy for failed operations
    pub retry_policy: RetryPolicy,

    /// Use `rediss://` connections
    /// Default: false
    pub tls_enabled: bool,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            target: RedisTarget::Direct {
                address: "127.0.0.1:6379".to_string(),
            },
            password: None,
            pool_size: 500,
            connection_timeout: Duration::from_secs(5),
            command_timeout: Duration::from_secs(60),
            retry_policy: RetryPolicy::default(),
            tls_enabled: false,
        }
    }
}

impl RedisConfig {
    /// Connect straight to `address`
    pub fn direct(address: impl Into<String>) -> Self {
        Self {
            target: RedisTarget::Direct {
                address: address.into(),
            },
            ..Default::default()
        }
    }

    /// Connect to the master that the sentinel at `address` reports for `master`
    pub fn sentinel(address: impl Into<String>, master: impl Into<String>) -> Self {
        Self {
            target: RedisTarget::Sentinel {
                address: address.into(),
                master: master.into(),
            },
            ..Default::default()
        }
    }

    /// Set the password
    pub fn password(mut self, password: Option<SecretString>) -> Self {
        self.password = password;
        self
    }

    /// Set the pool size
    pub fn pool_size(mut self, size: u32) -> Self {
        self.pool_size = size;
        self
    }

    /// Set the connection timeout
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set the command timeout
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Set the retry policy
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Enable or disable TLS
    ///
    /// Requires the `redis-tls` feature.
    pub fn tls(mut self, enabled: bool) -> Self {
        self.tls_enabled = enabled;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        match &self.target {
            RedisTarget::Direct { address } if address.is_empty() => {
                return Err("Redis address cannot be empty".to_string());
            },
            RedisTarget::Sentinel { address, master } if address.is_empty() || master.is_empty() => {
                return Err("Sentinel needs both an address and a master name".to_string());
            },
            _ => {},
        }
        if self.pool_size == 0 {
            return Err("Pool size must be greater than 0".to_string());
        }
        if self.pool_size > 10_000 {
            return Err("Pool size cannot exceed 10000".to_string());
        }
        if self.command_timeout.is_zero() {
            return Err("Command timeout must be greater than 0".to_string());
        }

        // Range-scan replies are decoded in their RESP2 shape
        let url = Url::parse(&self.url()?).map_err(|e| e.to_string())?;
        if let Some((_, protocol)) = url.query_pairs().find(|(key, _)| key == "protocol") {
            if !matches!(protocol.as_ref(), "2" | "resp2") {
                return Err(format!(
                    "Unsupported Redis protocol {:?}, only RESP2 is supported",
                    protocol
                ));
            }
        }

        #[cfg(not(feature = "redis-tls"))]
        if self.tls_enabled {
            return Err(
                "TLS is enabled but the 'redis-tls' feature is not compiled. \
                 Enable it with: cargo build --features redis-tls"
                    .to_string(),
            );
        }

        Ok(())
    }

    /// URL of the server (direct) or of the sentinel, with the password only
    /// for direct connections
    pub fn url(&self) -> Result<String, String> {
        match &self.target {
            RedisTarget::Direct { address } => build_url(
                address,
                self.password.as_ref().map(SecretString::expose_secret),
                self.tls_enabled,
            ),
            RedisTarget::Sentinel { address, .. } => build_url(address, None, self.tls_enabled),
        }
    }
}

/// Retry policy with exponential backoff
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts
    /// Default: 0
    pub max_retries: u32,

    /// Initial delay between retries
    /// Default: 100ms
    pub initial_delay: Duration,

    /// Maximum delay between retries
    /// Default: 5 seconds
    pub max_delay: Duration,

    /// Multiplier for exponential backoff
    /// Default: 2.0
    pub multiplier: f64,

    /// Add random jitter to delays
    /// Default: true
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Policy that retries up to `max_retries` times
    pub fn with_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Calculate delay for a given attempt number (0-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_delay =
            self.initial_delay.as_millis() as f64 * self.multiplier.powi(attempt as i32);

        let delay_ms = base_delay.min(self.max_delay.as_millis() as f64);

        let final_delay = if self.jitter {
            // Up to 25% jitter
            let jitter = rand::random::<f64>() * 0.25;
            delay_ms * (1.0 + jitter)
        } else {
            delay_ms
        };

        Duration::from_millis(final_delay as u64)
    }

    /// Check if we should retry after the given attempt
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

enum ConnectionSource {
    Direct(Client),
    // Discovery mutates the client's cached sentinel list
    Sentinel(Mutex<SentinelClient>),
}

impl ConnectionSource {
    fn open(config: &RedisConfig, url: &str) -> Result<Self, BackendError> {
        match &config.target {
            RedisTarget::Direct { .. } => Client::open(url)
                .map(ConnectionSource::Direct)
                .map_err(|e| backend_error(url, &e)),
            RedisTarget::Sentinel { master, .. } => {
                #[cfg(feature = "redis-tls")]
                let tls_mode = config.tls_enabled.then_some(redis::TlsMode::Secure);
                #[cfg(not(feature = "redis-tls"))]
                let tls_mode = None;

                let node_info = SentinelNodeConnectionInfo {
                    tls_mode,
                    redis_connection_info: Some(RedisConnectionInfo {
                        password: config
                            .password
                            .as_ref()
                            .map(|p| p.expose_secret().to_string()),
                        ..Default::default()
                    }),
                };
                SentinelClient::build(
                    vec![url],
                    master.clone(),
                    Some(node_info),
                    SentinelServerType::Master,
                )
                .map(|client| ConnectionSource::Sentinel(Mutex::new(client)))
                .map_err(|e| backend_error(url, &e))
            },
        }
    }

    async fn connect(&self) -> Result<MultiplexedConnection, RedisError> {
        match self {
            ConnectionSource::Direct(client) => client.get_multiplexed_async_connection().await,
            ConnectionSource::Sentinel(client) => client.lock().await.get_async_connection().await,
        }
    }
}

/// Redis connection pool
///
/// Hands out clones of a single multiplexed connection and re-establishes it
/// after a connection-level failure.
pub struct RedisPool {
    source: ConnectionSource,

    connection: RwLock<Option<MultiplexedConnection>>,

    config: RedisConfig,

    /// URL used for connecting; only ever logged through `sanitize_url`
    url: String,

    semaphore: Arc<Semaphore>,
}

impl RedisPool {
    /// Create a pool and establish the initial connection
    pub async fn new(config: RedisConfig) -> Result<Self, BackendError> {
        config.validate().map_err(BackendError::Connection)?;
        let url = config.url().map_err(BackendError::Connection)?;
        let source = ConnectionSource::open(&config, &url)?;

        let pool = Self {
            source,
            connection: RwLock::new(None),
            semaphore: Arc::new(Semaphore::new(config.pool_size as usize)),
            config,
            url,
        };

        pool.connect().await?;

        info!(
            target_addr = %pool.config.target,
            url = %sanitize_url(&pool.url),
            pool_size = pool.config.pool_size,
            "Redis connection established"
        );
        Ok(pool)
    }

    /// Establish or re-establish the connection
    async fn connect(&self) -> Result<MultiplexedConnection, BackendError> {
        let start = Instant::now();

        let conn = tokio::time::timeout(self.config.connection_timeout, self.source.connect())
            .await
            .map_err(|_| BackendError::Connection("Connection timeout".to_string()))?
            .map_err(|e| backend_error(&self.url, &e))?;

        *self.connection.write().await = Some(conn.clone());

        debug!("Redis connection established in {:?}", start.elapsed());
        Ok(conn)
    }

    async fn current(&self) -> Result<MultiplexedConnection, BackendError> {
        let conn = self.connection.read().await.clone();
        match conn {
            Some(c) => Ok(c),
            None => self.connect().await,
        }
    }

    async fn invalidate(&self) {
        *self.connection.write().await = None;
    }

    /// Execute an operation with timeout and retry logic
    ///
    /// `f` is called once per attempt with a fresh handle on the shared
    /// connection.
    pub async fn execute<F, Fut, T>(&self, f: F) -> Result<T, BackendError>
    where
        F: Fn(MultiplexedConnection) -> Fut,
        Fut: std::future::Future<Output = Result<T, RedisError>>,
    {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| BackendError::Connection("Semaphore closed".to_string()))?;

        let mut attempt = 0;
        loop {
            let conn = self.current().await?;
            let result = tokio::time::timeout(self.config.command_timeout, f(conn)).await;

            let error = match result {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => {
                    if is_connection_error(&e) {
                        self.invalidate().await;
                    }
                    if !is_retriable_error(&e) {
                        return Err(backend_error(&self.url, &e));
                    }
                    backend_error(&self.url, &e)
                },
                Err(_) => BackendError::Timeout,
            };

            if !self.config.retry_policy.should_retry(attempt) {
                return Err(error);
            }

            let delay = self.config.retry_policy.delay_for_attempt(attempt);
            warn!(
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Redis operation failed, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// Send a PING
    pub async fn ping(&self) -> Result<(), BackendError> {
        self.execute(|mut conn| async move { redis::cmd("PING").query_async::<String>(&mut conn).await })
            .await
            .map(|_| ())
    }

    /// Map a per-command error the same way `execute` maps its own
    pub(crate) fn describe_error(&self, e: &RedisError) -> BackendError {
        backend_error(&self.url, e)
    }

    /// Get the pool configuration
    pub fn config(&self) -> &RedisConfig {
        &self.config
    }
}

/// Check if an error is retriable
fn is_retriable_error(e: &RedisError) -> bool {
    e.is_connection_dropped()
        || e.is_timeout()
        || e.is_io_error()
        || matches!(e.kind(), redis::ErrorKind::BusyLoadingError)
}

/// Check if an error leaves the connection unusable
pub(super) fn is_connection_error(e: &RedisError) -> bool {
    e.is_connection_dropped() || e.is_io_error()
}
