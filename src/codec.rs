//! Prometheus remote-storage wire format
//!
//! Request and response bodies are protobuf messages compressed with the
//! snappy *block* format (not the framed stream format). The message types
//! in [`prompb`] mirror the fields of Prometheus' `remote.proto` and
//! `types.proto` that the adapter uses; unknown fields are skipped on decode.

use prost::Message;

use crate::error::CodecError;
use crate::types::{Label, LabelMatcher, LabelSet, MatchOp, Query, QueryResult, Sample, TimeSeries};

/// Largest body accepted after decompression (64 MiB)
pub const MAX_DECOMPRESSED_SIZE: usize = 64 * 1024 * 1024;

/// Protobuf messages of the remote-storage protocol
pub mod prompb {
    use prost::Message;

    /// Batch of series pushed by Prometheus
    #[derive(Clone, PartialEq, Message)]
    pub struct WriteRequest {
        /// Series in the batch
        #[prost(message, repeated, tag = "1")]
        pub timeseries: Vec<TimeSeries>,
    }

    /// Labels plus samples
    #[derive(Clone, PartialEq, Message)]
    pub struct TimeSeries {
        /// Series labels
        #[prost(message, repeated, tag = "1")]
        pub labels: Vec<Label>,
        /// Samples
        #[prost(message, repeated, tag = "2")]
        pub samples: Vec<Sample>,
    }

    /// Name/value pair
    #[derive(Clone, PartialEq, Message)]
    pub struct Label {
        /// Label name
        #[prost(string, tag = "1")]
        pub name: String,
        /// Label value
        #[prost(string, tag = "2")]
        pub value: String,
    }

    /// One data point
    #[derive(Clone, PartialEq, Message)]
    pub struct Sample {
        /// Sample value
        #[prost(double, tag = "1")]
        pub value: f64,
        /// Milliseconds since the Unix epoch
        #[prost(int64, tag = "2")]
        pub timestamp: i64,
    }

    /// Queries issued by Prometheus
    #[derive(Clone, PartialEq, Message)]
    pub struct ReadRequest {
        /// Queries, answered in order
        #[prost(message, repeated, tag = "1")]
        pub queries: Vec<Query>,
    }

    /// Answers to a [`ReadRequest`]
    #[derive(Clone, PartialEq, Message)]
    pub struct ReadResponse {
        /// One result per query, in request order
        #[prost(message, repeated, tag = "1")]
        pub results: Vec<QueryResult>,
    }

    /// A range query
    #[derive(Clone, PartialEq, Message)]
    pub struct Query {
        /// Range start (inclusive, ms)
        #[prost(int64, tag = "1")]
        pub start_timestamp_ms: i64,
        /// Range end (inclusive, ms)
        #[prost(int64, tag = "2")]
        pub end_timestamp_ms: i64,
        /// Matchers, ANDed
        #[prost(message, repeated, tag = "3")]
        pub matchers: Vec<LabelMatcher>,
    }

    /// Series matched by one query
    #[derive(Clone, PartialEq, Message)]
    pub struct QueryResult {
        /// Matching series
        #[prost(message, repeated, tag = "1")]
        pub timeseries: Vec<TimeSeries>,
    }

    /// Label predicate
    #[derive(Clone, PartialEq, Message)]
    pub struct LabelMatcher {
        /// A [`MatcherType`] value
        #[prost(enumeration = "MatcherType", tag = "1")]
        pub r#type: i32,
        /// Label name
        #[prost(string, tag = "2")]
        pub name: String,
        /// Value or pattern
        #[prost(string, tag = "3")]
        pub value: String,
    }

    /// Matcher operator as numbered on the wire
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub enum MatcherType {
        /// `=`
        Eq = 0,
        /// `!=`
        Neq = 1,
        /// `=~`
        Re = 2,
        /// `!~`
        Nre = 3,
    }
}

impl From<prompb::MatcherType> for MatchOp {
    fn from(t: prompb::MatcherType) -> Self {
        match t {
            prompb::MatcherType::Eq => MatchOp::Equal,
            prompb::MatcherType::Neq => MatchOp::NotEqual,
            prompb::MatcherType::Re => MatchOp::RegexMatch,
            prompb::MatcherType::Nre => MatchOp::RegexNoMatch,
        }
    }
}

impl From<MatchOp> for prompb::MatcherType {
    fn from(op: MatchOp) -> Self {
        match op {
            MatchOp::Equal => prompb::MatcherType::Eq,
            MatchOp::NotEqual => prompb::MatcherType::Neq,
            MatchOp::RegexMatch => prompb::MatcherType::Re,
            MatchOp::RegexNoMatch => prompb::MatcherType::Nre,
        }
    }
}

fn decompress(body: &[u8]) -> Result<Vec<u8>, CodecError> {
    let len = snap::raw::decompress_len(body).map_err(|e| CodecError::Decompress(e.to_string()))?;
    if len > MAX_DECOMPRESSED_SIZE {
        return Err(CodecError::Decompress(format!(
            "decompressed size {} exceeds limit {}",
            len, MAX_DECOMPRESSED_SIZE
        )));
    }
    snap::raw::Decoder::new()
        .decompress_vec(body)
        .map_err(|e| CodecError::Decompress(e.to_string()))
}

fn compress(raw: &[u8]) -> Result<Vec<u8>, CodecError> {
    snap::raw::Encoder::new()
        .compress_vec(raw)
        .map_err(|e| CodecError::Encode(e.to_string()))
}

fn series_from_wire(ts: prompb::TimeSeries) -> TimeSeries {
    let labels: LabelSet = ts
        .labels
        .into_iter()
        .map(|l| Label::new(l.name, l.value))
        .collect();
    let samples = ts
        .samples
        .into_iter()
        .map(|s| Sample::new(s.timestamp, s.value))
        .collect();
    TimeSeries::new(labels, samples)
}

fn series_to_wire(ts: &TimeSeries) -> prompb::TimeSeries {
    prompb::TimeSeries {
        labels: ts
            .labels
            .iter()
            .map(|l| prompb::Label {
                name: l.name.clone(),
                value: l.value.clone(),
            })
            .collect(),
        samples: ts
            .samples
            .iter()
            .map(|s| prompb::Sample {
                value: s.value,
                timestamp: s.timestamp,
            })
            .collect(),
    }
}

fn matcher_from_wire(m: prompb::LabelMatcher) -> Result<LabelMatcher, CodecError> {
    let op = prompb::MatcherType::try_from(m.r#type)
        .map_err(|_| CodecError::Decode(format!("unknown matcher type {}", m.r#type)))?;
    Ok(LabelMatcher::new(op.into(), m.name, m.value))
}

/// Decode a snappy-compressed `WriteRequest` body
///
/// Duplicate label names within a series keep the last value.
pub fn decode_write_request(body: &[u8]) -> Result<Vec<TimeSeries>, CodecError> {
    let raw = decompress(body)?;
    let request =
        prompb::WriteRequest::decode(raw.as_slice()).map_err(|e| CodecError::Decode(e.to_string()))?;
    Ok(request.timeseries.into_iter().map(series_from_wire).collect())
}

/// Decode a snappy-compressed `ReadRequest` body
pub fn decode_read_request(body: &[u8]) -> Result<Vec<Query>, CodecError> {
    let raw = decompress(body)?;
    let request =
        prompb::ReadRequest::decode(raw.as_slice()).map_err(|e| CodecError::Decode(e.to_string()))?;

    request
        .queries
        .into_iter()
        .map(|q| -> Result<Query, CodecError> {
            Ok(Query {
                start_timestamp_ms: q.start_timestamp_ms,
                end_timestamp_ms: q.end_timestamp_ms,
                matchers: q
                    .matchers
                    .into_iter()
                    .map(matcher_from_wire)
                    .collect::<Result<_, _>>()?,
            })
        })
        .collect()
}

/// Encode read results as a snappy-compressed `ReadResponse` body
pub fn encode_read_response(results: &[QueryResult]) -> Result<Vec<u8>, CodecError> {
    let response = prompb::ReadResponse {
        results: results
            .iter()
            .map(|r| prompb::QueryResult {
                timeseries: r.timeseries.iter().map(series_to_wire).collect(),
            })
            .collect(),
    };
    compress(&response.encode_to_vec())
}

/// Encode series as a snappy-compressed `WriteRequest` body (client side)
pub fn encode_write_request(batch: &[TimeSeries]) -> Result<Vec<u8>, CodecError> {
    let request = prompb::WriteRequest {
        timeseries: batch.iter().map(series_to_wire).collect(),
    };
    compress(&request.encode_to_vec())
}

/// Encode queries as a snappy-compressed `ReadRequest` body (client side)
pub fn encode_read_request(queries: &[Query]) -> Result<Vec<u8>, CodecError> {
    let request = prompb::ReadRequest {
        queries: queries
            .iter()
            .map(|q| prompb::Query {
                start_timestamp_ms: q.start_timestamp_ms,
                end_timestamp_ms: q.end_timestamp_ms,
                matchers: q
                    .matchers
                    .iter()
                    .map(|m| prompb::LabelMatcher {
                        r#type: prompb::MatcherType::from(m.op) as i32,
                        name: m.name.clone(),
                        value: m.value.clone(),
                    })
                    .collect(),
            })
            .collect(),
    };
    compress(&request.encode_to_vec())
}

/// Decode a snappy-compressed `ReadResponse` body (client side)
pub fn decode_read_response(body: &[u8]) -> Result<Vec<QueryResult>, CodecError> {
    let raw = decompress(body)?;
    let response = prompb::ReadResponse::decode(raw.as_slice())
        .map_err(|e| CodecError::Decode(e.to_string()))?;
    Ok(response
        .results
        .into_iter()
        .map(|r| QueryResult {
            timeseries: r.timeseries.into_iter().map(series_from_wire).collect(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compressed(message: &impl Message) -> Vec<u8> {
        snap::raw::Encoder::new()
            .compress_vec(&message.encode_to_vec())
            .unwrap()
    }

    #[test]
    fn test_decode_write_request() {
        let body = compressed(&prompb::WriteRequest {
            timeseries: vec![prompb::TimeSeries {
                labels: vec![
                    prompb::Label {
                        name: "__name__".to_string(),
                        value: "test_series".to_string(),
                    },
                    prompb::Label {
                        name: "label_1".to_string(),
                        value: "value_1".to_string(),
                    },
                ],
                samples: vec![prompb::Sample {
                    value: 42.1,
                    timestamp: 1_000,
                }],
            }],
        });

        let batch = decode_write_request(&body).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].labels.metric_name(), Some("test_series"));
        assert_eq!(batch[0].labels.get("label_1"), Some("value_1"));
        assert_eq!(batch[0].samples, vec![Sample::new(1_000, 42.1)]);
    }

    #[test]
    fn test_decode_read_request_matchers() {
        let body = compressed(&prompb::ReadRequest {
            queries: vec![prompb::Query {
                start_timestamp_ms: 10,
                end_timestamp_ms: 20,
                matchers: vec![
                    prompb::LabelMatcher {
                        r#type: prompb::MatcherType::Eq as i32,
                        name: "job".to_string(),
                        value: "node".to_string(),
                    },
                    prompb::LabelMatcher {
                        r#type: prompb::MatcherType::Nre as i32,
                        name: "env".to_string(),
                        value: "dev.*".to_string(),
                    },
                ],
            }],
        });

        let queries = decode_read_request(&body).unwrap();
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].start_timestamp_ms, 10);
        assert_eq!(queries[0].end_timestamp_ms, 20);
        assert_eq!(queries[0].matchers[0], LabelMatcher::equal("job", "node"));
        assert_eq!(queries[0].matchers[1].op, MatchOp::RegexNoMatch);
    }

    #[test]
    fn test_unknown_matcher_type_rejected() {
        let body = compressed(&prompb::ReadRequest {
            queries: vec![prompb::Query {
                start_timestamp_ms: 0,
                end_timestamp_ms: 1,
                matchers: vec![prompb::LabelMatcher {
                    r#type: 7,
                    name: "a".to_string(),
                    value: "b".to_string(),
                }],
            }],
        });

        assert!(matches!(
            decode_read_request(&body),
            Err(CodecError::Decode(_))
        ));
    }

    #[test]
    fn test_garbage_body_rejected() {
        assert!(matches!(
            decode_write_request(b"definitely not snappy"),
            Err(CodecError::Decompress(_))
        ));

        // Valid snappy, invalid protobuf
        let body = snap::raw::Encoder::new().compress_vec(&[0xff; 8]).unwrap();
        assert!(matches!(
            decode_write_request(&body),
            Err(CodecError::Decode(_))
        ));
    }

    #[test]
    fn test_framed_snappy_rejected() {
        // The stream format starts with a chunk header the block decoder rejects
        let mut framed = Vec::new();
        {
            use std::io::Write;
            let mut writer = snap::write::FrameEncoder::new(&mut framed);
            writer
                .write_all(&prompb::WriteRequest::default().encode_to_vec())
                .unwrap();
            writer.flush().unwrap();
        }
        assert!(decode_write_request(&framed).is_err());
    }

    #[test]
    fn test_read_response_preserves_order() {
        let labels_a: LabelSet = [("__name__", "a")].into_iter().collect();
        let labels_b: LabelSet = [("__name__", "b")].into_iter().collect();
        let results = vec![
            QueryResult {
                timeseries: vec![
                    TimeSeries::new(labels_b, vec![Sample::new(2, 2.0), Sample::new(1, 1.0)]),
                    TimeSeries::new(labels_a, vec![]),
                ],
            },
            QueryResult::default(),
        ];

        let body = encode_read_response(&results).unwrap();
        let decoded = decode_read_response(&body).unwrap();
        assert_eq!(decoded, results);
    }

    #[test]
    fn test_empty_response() {
        let body = encode_read_response(&[]).unwrap();
        assert!(decode_read_response(&body).unwrap().is_empty());
    }
}
