//! Metric identity resolution
//!
//! Maps a label set to the storage key and tag list of its series. The key has
//! the form
//!
//! ```text
//! <metric_name>{<name1>=<value1>,<name2>=<value2>,...}
//! ```
//!
//! where the metric-name label is left out of the tag list and the rendered
//! `name=value` strings are sorted byte-wise before joining. Sorting is what
//! makes the same logical series map to the same key however its labels were
//! ordered on the wire.
//!
//! # Example
//!
//! ```rust
//! use redis_ts_adapter::identity::resolve;
//! use redis_ts_adapter::types::LabelSet;
//!
//! let labels: LabelSet = [("label_2", "value_2"), ("__name__", "test_series"), ("label_1", "value_1")]
//!     .into_iter()
//!     .collect();
//! let identity = resolve(&labels).unwrap();
//! assert_eq!(identity.key, "test_series{label_1=value_1,label_2=value_2}");
//! ```

use crate::error::Rejection;
use crate::types::{Label, LabelSet, METRIC_NAME_LABEL};

/// Storage identity of a series
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesIdentity {
    /// Storage key
    pub key: String,
    /// Non-name labels, sorted by their rendered `name=value` form
    pub tags: Vec<Label>,
    /// Value of the metric-name label
    pub metric_name: String,
}

impl SeriesIdentity {
    /// Tags rendered as `name=value`, in key order
    pub fn rendered_tags(&self) -> Vec<String> {
        self.tags.iter().map(Label::to_string).collect()
    }

    /// Labels to attach to the stored series: the sorted tags followed by the
    /// metric-name label
    pub fn storage_labels(&self) -> Vec<Label> {
        let mut labels = Vec::with_capacity(self.tags.len() + 1);
        labels.extend(self.tags.iter().cloned());
        labels.push(Label::new(METRIC_NAME_LABEL, self.metric_name.clone()));
        labels
    }
}

/// Resolve the storage identity of a label set
///
/// Fails with [`Rejection::MissingMetricName`] when the set has no metric-name
/// label; callers skip the series and carry on with the batch.
pub fn resolve(labels: &LabelSet) -> Result<SeriesIdentity, Rejection> {
    let metric_name = labels
        .metric_name()
        .ok_or(Rejection::MissingMetricName)?
        .to_string();

    let mut rendered: Vec<(String, Label)> = labels
        .iter()
        .filter(|l| !l.is_metric_name())
        .map(|l| (l.to_string(), l.clone()))
        .collect();
    rendered.sort_by(|a, b| a.0.cmp(&b.0));

    let key = series_key(&metric_name, rendered.iter().map(|(r, _)| r.as_str()));
    let tags = rendered.into_iter().map(|(_, l)| l).collect();

    Ok(SeriesIdentity {
        key,
        tags,
        metric_name,
    })
}

/// Join a metric name and already-sorted rendered tags into a key
fn series_key<'a>(metric_name: &str, tags: impl Iterator<Item = &'a str>) -> String {
    let mut key = String::with_capacity(metric_name.len() + 2);
    key.push_str(metric_name);
    key.push('{');
    for (i, tag) in tags.enumerate() {
        if i > 0 {
            key.push(',');
        }
        key.push_str(tag);
    }
    key.push('}');
    key
}
