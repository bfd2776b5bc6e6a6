//! Backend transport capability
//!
//! The translation core only needs two things from a storage backend: run a
//! batch of single-point appends in one round trip, and run filtered range
//! scans. Every backend kind (direct Redis, sentinel-managed Redis, the
//! in-memory test backend) is a [`Backend`] built at startup; nothing in the
//! core branches on which one it got.
//!
//! Range-scan replies come back as [`RawValue`] trees, untouched. Giving them
//! a shape is the read assembler's job.

use async_trait::async_trait;

use crate::error::BackendError;
use crate::query::FilterTerm;
use crate::write::WriteCommand;

pub mod memory;

pub use memory::MemoryBackend;

/// Per-command outcome of a write batch
pub type CommandResult = Result<(), BackendError>;

/// A filtered range scan over `[start, end]` (milliseconds, inclusive)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeScan {
    /// Range start
    pub start: i64,
    /// Range end
    pub end: i64,
    /// Filter terms, ANDed
    pub filters: Vec<FilterTerm>,
}

/// Loosely typed backend reply
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    /// Null reply
    Nil,
    /// Integer reply
    Int(i64),
    /// Floating point reply
    Double(f64),
    /// String or bulk reply
    Text(String),
    /// Binary bulk reply that is not valid UTF-8
    Bytes(Vec<u8>),
    /// Nested array reply
    Array(Vec<RawValue>),
    /// Anything else, kept only for diagnostics
    Other(String),
}

impl RawValue {
    /// Short name of the variant, for error messages
    pub fn kind(&self) -> &'static str {
        match self {
            RawValue::Nil => "nil",
            RawValue::Int(_) => "int",
            RawValue::Double(_) => "double",
            RawValue::Text(_) => "text",
            RawValue::Bytes(_) => "bytes",
            RawValue::Array(_) => "array",
            RawValue::Other(_) => "other",
        }
    }
}

/// A time-series storage backend
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Name used in logs and metrics
    fn name(&self) -> &str;

    /// Append every command in a single round trip
    ///
    /// `Err` means the round trip itself failed and no per-command status is
    /// known. `Ok` carries one result per command, in order; backends are not
    /// atomic, so any mix of successes and failures is possible.
    async fn execute_write_batch(
        &self,
        commands: &[WriteCommand],
    ) -> Result<Vec<CommandResult>, BackendError>;

    /// Run one range scan, returning the raw reply
    async fn execute_range_query(&self, scan: &RangeScan) -> Result<RawValue, BackendError>;

    /// Run several range scans, one reply per scan in order
    ///
    /// The default issues them one after another; backends that can pipeline
    /// should override it.
    async fn execute_range_queries(
        &self,
        scans: &[RangeScan],
    ) -> Result<Vec<RawValue>, BackendError> {
        let mut replies = Vec::with_capacity(scans.len());
        for scan in scans {
            replies.push(self.execute_range_query(scan).await?);
        }
        Ok(replies)
    }

    /// Liveness probe
    async fn ping(&self) -> Result<(), BackendError> {
        Ok(())
    }
}
