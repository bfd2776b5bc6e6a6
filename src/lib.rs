//! Prometheus remote storage adapter for RedisTimeSeries
//!
//! Receives Prometheus remote-write batches and remote-read queries and
//! translates them into RedisTimeSeries commands:
//! - series identity resolved into deterministic storage keys
//! - writes fanned out to every configured backend as pipelined `TS.ADD`s
//! - equality matchers compiled into `TS.MRANGE` filters
//! - range replies decoded back into series
//!
//! # Example
//!
//! ```rust
//! use redis_ts_adapter::identity::resolve;
//! use redis_ts_adapter::types::LabelSet;
//!
//! let labels: LabelSet = [("__name__", "up"), ("job", "node")].into_iter().collect();
//! assert_eq!(resolve(&labels).unwrap().key, "up{job=node}");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod types;

/// Metric identity: storage keys and storage labels for a label set
pub mod identity;

/// Write translation into single-point append commands
pub mod write;

/// Query compilation into backend filter terms
pub mod query;

/// Backend transport capability and the in-memory backend
pub mod backend;

/// Decoding of range-scan replies
pub mod read;

/// Write fan-out and single-reader reads
pub mod bridge;

/// Hooks for counting rejections and backend round trips
pub mod observer;

/// RedisTimeSeries transport (direct or sentinel)
pub mod redis;

/// Prometheus remote-storage protobuf and snappy codec
pub mod codec;

/// HTTP endpoints
pub mod server;

/// Configuration management with TOML support
pub mod config;

// Re-export main types
pub use bridge::{Bridge, BridgeBuilder, WriteReport};
pub use error::{BackendError, Error, Result};
pub use types::{Label, LabelMatcher, LabelSet, MatchOp, Query, QueryResult, Sample, TimeSeries};
