//! Error types for the adapter

use thiserror::Error;

use crate::types::MatchOp;

/// Request-level error
///
/// Anything that reaches a caller as `Err` aborts the whole request. Per-series
/// and per-sample drops are reported as [`Rejection`]s instead and never show
/// up here.
#[derive(Error, Debug)]
pub enum Error {
    /// The backend class cannot evaluate this matcher type
    #[error("{op} matcher is not supported by the backend")]
    UnsupportedMatcher {
        /// The offending operator
        op: MatchOp,
    },

    /// Backend transport failure
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Wire codec error
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Backend transport errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    /// Could not reach or talk to the backend
    #[error("Connection error: {0}")]
    Connection(String),

    /// The backend rejected a command
    #[error("Command error: {0}")]
    Command(String),

    /// The reply did not have the expected shape
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// The command did not complete in time
    #[error("Command timeout")]
    Timeout,
}

/// Wire codec errors
#[derive(Error, Debug)]
pub enum CodecError {
    /// Snappy block decompression failed
    #[error("Decompression failed: {0}")]
    Decompress(String),

    /// Protobuf decoding failed
    #[error("Decode failed: {0}")]
    Decode(String),

    /// Encoding the response failed
    #[error("Encode failed: {0}")]
    Encode(String),
}

/// Reason a series or a single sample was skipped during write translation
///
/// Rejections are absorbed where they happen: logged, counted, and the rest of
/// the batch carries on.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The label set has no metric-name label
    #[error("series has no metric name label")]
    MissingMetricName,

    /// The sample value is NaN or infinite
    #[error("sample value is not finite")]
    NonFiniteValue,
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
