//! Server Configuration
//!
//! Layers command-line flags on top of the file and environment settings.

use std::path::PathBuf;

use clap::Args;
use redis_ts_adapter::config::AdapterConfig;

/// Flags overriding the configuration file and environment
#[derive(Args, Debug, Default, Clone)]
pub struct Overrides {
    /// Path to configuration file (overrides REDIS_TS_ADAPTER_CONFIG)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Address to listen on for web endpoints (e.g. 0.0.0.0:9201)
    #[arg(short, long, global = true)]
    pub listen: Option<String>,

    /// Log filter (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Redis server address (host:port)
    #[arg(long, global = true)]
    pub redis_address: Option<String>,

    /// Redis sentinel address (host:port)
    #[arg(long, global = true)]
    pub redis_sentinel_address: Option<String>,

    /// Redis sentinel master name
    #[arg(long, global = true)]
    pub redis_sentinel_master: Option<String>,

    /// Maximum number of concurrent Redis operations
    #[arg(long, global = true)]
    pub redis_pool_size: Option<u32>,

    /// Timeout for one Redis round trip, in seconds
    #[arg(long, global = true)]
    pub redis_write_timeout: Option<u64>,

    /// Timeout for a whole remote read or write request, in seconds
    #[arg(long, global = true)]
    pub send_timeout: Option<u64>,
}

impl Overrides {
    /// Apply the flags that were given
    pub fn apply(&self, config: &mut AdapterConfig) {
        if let Some(listen) = &self.listen {
            config.server.listen_addr = listen.clone();
        }
        if let Some(level) = &self.log_level {
            config.server.log_level = level.clone();
        }
        if let Some(address) = &self.redis_address {
            config.redis.address = Some(address.clone());
        }
        if let Some(address) = &self.redis_sentinel_address {
            config.redis.sentinel_address = Some(address.clone());
        }
        if let Some(master) = &self.redis_sentinel_master {
            config.redis.sentinel_master = Some(master.clone());
        }
        if let Some(size) = self.redis_pool_size {
            config.redis.pool_size = size;
        }
        if let Some(secs) = self.redis_write_timeout {
            config.redis.write_timeout_secs = secs;
        }
        if let Some(secs) = self.send_timeout {
            config.server.remote_timeout_secs = secs;
        }
    }
}

/// Load configuration from file and environment, then apply the flags
///
/// Priority (highest first):
/// 1. command-line flags
/// 2. environment (`REDIS_AUTH`, `REDIS_TS_ADAPTER_LISTEN`, `RUST_LOG`)
/// 3. `--config` file, else the `REDIS_TS_ADAPTER_CONFIG` file
/// 4. defaults
pub fn load_config(overrides: &Overrides) -> Result<AdapterConfig, String> {
    let mut config = AdapterConfig::load(overrides.config.as_deref())?;
    overrides.apply(&mut config);
    Ok(config)
}
