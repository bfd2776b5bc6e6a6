//! Write translation
//!
//! Turns a decoded batch of series into backend write commands, one command
//! per sample. Series without a metric name and samples with non-finite
//! values are dropped where they are found; the rest of the batch is
//! unaffected and output order follows input order.

use tracing::{debug, info};

use crate::error::Rejection;
use crate::identity::resolve;
use crate::observer::BridgeObserver;
use crate::types::{Label, TimeSeries};

/// A single-point append
#[derive(Debug, Clone, PartialEq)]
pub struct WriteCommand {
    /// Series storage key
    pub key: String,
    /// Milliseconds since epoch
    pub timestamp: i64,
    /// Finite sample value
    pub value: f64,
    /// Labels stored with the series (tags plus the metric-name label)
    pub labels: Vec<Label>,
}

/// Result of translating one batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Translation {
    /// Commands to dispatch, in input order
    pub commands: Vec<WriteCommand>,
    /// Series skipped for lacking a metric name
    pub rejected_series: usize,
    /// Samples skipped for non-finite values
    pub rejected_samples: usize,
}

/// Translate a batch of series into write commands
pub fn translate(batch: &[TimeSeries]) -> Translation {
    translate_observed(batch, &crate::observer::NoopObserver)
}

/// Translate a batch, reporting each rejection to `observer`
pub fn translate_observed(batch: &[TimeSeries], observer: &dyn BridgeObserver) -> Translation {
    let mut out = Translation {
        commands: Vec::with_capacity(batch.iter().map(|s| s.samples.len()).sum()),
        ..Default::default()
    };

    for series in batch {
        let identity = match resolve(&series.labels) {
            Ok(identity) => identity,
            Err(reason) => {
                info!(
                    labels = ?series.labels,
                    "Cannot send unnamed sample to RedisTS, skipping"
                );
                observer.series_rejected(reason);
                out.rejected_series += 1;
                continue;
            },
        };

        let labels = identity.storage_labels();
        for sample in &series.samples {
            if !sample.value.is_finite() {
                debug!(
                    key = %identity.key,
                    timestamp = sample.timestamp,
                    value = sample.value,
                    "Cannot send non-finite sample to RedisTS, skipping"
                );
                observer.sample_rejected(Rejection::NonFiniteValue);
                out.rejected_samples += 1;
                continue;
            }

            out.commands.push(WriteCommand {
                key: identity.key.clone(),
                timestamp: sample.timestamp,
                value: sample.value,
                labels: labels.clone(),
            });
        }
    }

    out
}
