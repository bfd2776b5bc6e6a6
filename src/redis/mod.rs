//! Redis transport
//!
//! Connects to a RedisTimeSeries server, either directly or through a
//! sentinel, and implements [`Backend`](crate::backend::Backend) on top of
//! the `TS.ADD` and `TS.MRANGE` commands.
//!
//! # Example
//!
//! ```rust,no_run
//! use redis_ts_adapter::redis::{RedisConfig, RedisTimeSeries};
//! use redis_ts_adapter::backend::Backend;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = RedisTimeSeries::connect(RedisConfig::direct("127.0.0.1:6379")).await?;
//! assert_eq!(backend.name(), "RedisTS");
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod timeseries;
pub mod util;

pub use connection::{RedisConfig, RedisPool, RedisTarget, RetryPolicy};
pub use timeseries::{RedisTimeSeries, BACKEND_NAME};
pub use util::sanitize_url;
