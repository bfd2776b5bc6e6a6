//! RedisTimeSeries backend
//!
//! Writes go out as one `TS.ADD` per sample, all issued together on the
//! multiplexed connection so a batch still costs a single round trip:
//!
//! ```text
//! TS.ADD <key> <timestamp> <value> LABELS <name> <value> ...
//! ```
//!
//! The label list repeats the series' tags plus the metric-name label, so
//! the server can later match on either. Range scans use
//!
//! ```text
//! TS.MRANGE <start> <end> WITHLABELS FILTER <term> ...
//! ```
//!
//! and several scans of one read request share a single pipeline.
//!
//! Every `TS.ADD` gets its own reply, so an error reply (a blocked duplicate
//! timestamp, say) fails only that command. Only a connection-level failure
//! fails the batch as a whole.
//!
//! Replies are expected in RESP2 shape; RESP3 connections are refused by
//! [`RedisConfig::validate`].

use async_trait::async_trait;
use futures::future::join_all;
use redis::{Cmd, Pipeline, Value};

use super::connection::{is_connection_error, RedisConfig, RedisPool, RedisTarget};
use crate::backend::{Backend, CommandResult, RangeScan, RawValue};
use crate::error::BackendError;
use crate::write::WriteCommand;

/// Name reported for the RedisTimeSeries backend
pub const BACKEND_NAME: &str = "RedisTS";

/// [`Backend`] talking to a RedisTimeSeries server
pub struct RedisTimeSeries {
    name: String,
    pool: RedisPool,
}

impl RedisTimeSeries {
    /// Connect to the configured server or sentinel
    pub async fn connect(config: RedisConfig) -> Result<Self, BackendError> {
        let pool = RedisPool::new(config).await?;
        Ok(Self::with_pool(pool))
    }

    /// Wrap an existing pool
    pub fn with_pool(pool: RedisPool) -> Self {
        let name = match &pool.config().target {
            RedisTarget::Direct { .. } => BACKEND_NAME.to_string(),
            RedisTarget::Sentinel { master, .. } => format!("{}({})", BACKEND_NAME, master),
        };
        Self { name, pool }
    }

    /// Underlying pool
    pub fn pool(&self) -> &RedisPool {
        &self.pool
    }
}

/// Build the `TS.ADD` for one write command
pub fn add_command(command: &WriteCommand) -> Cmd {
    let mut cmd = redis::cmd("TS.ADD");
    cmd.arg(&command.key)
        .arg(command.timestamp)
        .arg(command.value)
        .arg("LABELS");
    for label in &command.labels {
        cmd.arg(&label.name).arg(&label.value);
    }
    cmd
}

/// Build the `TS.MRANGE` pipeline for a set of scans
pub fn mrange_pipeline(scans: &[RangeScan]) -> Pipeline {
    let mut pipe = redis::pipe();
    for scan in scans {
        pipe.cmd("TS.MRANGE")
            .arg(scan.start)
            .arg(scan.end)
            .arg("WITHLABELS")
            .arg("FILTER");
        for term in &scan.filters {
            pipe.arg(term.to_string());
        }
    }
    pipe
}

/// Convert a Redis reply to a [`RawValue`] without interpreting it
pub fn raw_value(value: Value) -> RawValue {
    match value {
        Value::Nil => RawValue::Nil,
        Value::Int(i) => RawValue::Int(i),
        Value::Double(d) => RawValue::Double(d),
        Value::BulkString(bytes) => match String::from_utf8(bytes) {
            Ok(s) => RawValue::Text(s),
            Err(e) => RawValue::Bytes(e.into_bytes()),
        },
        Value::SimpleString(s) => RawValue::Text(s),
        Value::Okay => RawValue::Text("OK".to_string()),
        Value::Array(items) => RawValue::Array(items.into_iter().map(raw_value).collect()),
        other => RawValue::Other(format!("{:?}", other)),
    }
}

#[async_trait]
impl Backend for RedisTimeSeries {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute_write_batch(
        &self,
        commands: &[WriteCommand],
    ) -> Result<Vec<CommandResult>, BackendError> {
        if commands.is_empty() {
            return Ok(Vec::new());
        }

        let replies = self
            .pool
            .execute(|conn| async move {
                let replies = join_all(commands.iter().map(|command| {
                    let mut conn = conn.clone();
                    async move { add_command(command).query_async::<()>(&mut conn).await }
                }))
                .await;

                let mut results = Vec::with_capacity(replies.len());
                for reply in replies {
                    match reply {
                        Err(e) if is_connection_error(&e) => return Err(e),
                        other => results.push(other),
                    }
                }
                Ok(results)
            })
            .await?;

        Ok(replies
            .into_iter()
            .map(|reply| reply.map_err(|e| self.pool.describe_error(&e)))
            .collect())
    }

    async fn execute_range_query(&self, scan: &RangeScan) -> Result<RawValue, BackendError> {
        let mut replies = self.execute_range_queries(std::slice::from_ref(scan)).await?;
        replies
            .pop()
            .ok_or_else(|| BackendError::MalformedResponse("empty pipeline reply".to_string()))
    }

    async fn execute_range_queries(
        &self,
        scans: &[RangeScan],
    ) -> Result<Vec<RawValue>, BackendError> {
        if scans.is_empty() {
            return Ok(Vec::new());
        }

        let pipe = mrange_pipeline(scans);
        let replies = self
            .pool
            .execute(|mut conn| {
                let pipe = &pipe;
                async move { pipe.query_async::<Vec<Value>>(&mut conn).await }
            })
            .await?;

        Ok(replies.into_iter().map(raw_value).collect())
    }

    async fn ping(&self) -> Result<(), BackendError> {
        self.pool.ping().await
    }
}
