//! Error types for flag registration, buffering and reply decoding.

use thiserror::Error;

/// Boxed error returned by flag decoders.
pub type DecodeFailure = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised synchronously when registering a flag decoder.
///
/// These are caller mistakes; the parser never produces them mid-stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("flag id must be an unsigned 32-bit integer, got {0}")]
    FlagOutOfRange(String),

    #[error("flag decoder must be a function (string, number or json), got {0:?}")]
    NotADecoder(String),
}

impl ValidationError {
    /// Returns whether this is a range-class failure (bad id).
    pub fn is_range(&self) -> bool {
        matches!(self, ValidationError::FlagOutOfRange(_))
    }

    /// Returns whether this is a type-class failure (bad decoder).
    pub fn is_type(&self) -> bool {
        matches!(self, ValidationError::NotADecoder(_))
    }
}

/// Data-shape errors found while decoding the reply stream.
///
/// Reported through the parser's error channel rather than returned from
/// `write`, so later well-formed replies are still decoded.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed header {line:?}: {reason}")]
    MalformedHeader { line: String, reason: &'static str },

    #[error("value too large: {size} bytes (max {max})")]
    ValueTooLarge { size: usize, max: usize },

    #[error("missing \\r\\n after value data for key {key:?}")]
    MissingTerminator { key: String },

    #[error("failed to decode value for key {key:?} with flags {flags}: {source}")]
    Decode {
        key: String,
        flags: u32,
        #[source]
        source: DecodeFailure,
    },

    #[error("parser is not writable")]
    NotWritable,
}

impl ProtocolError {
    /// Returns whether the reply bytes were framed correctly and only the
    /// value transformation failed.
    pub fn is_decode(&self) -> bool {
        matches!(self, ProtocolError::Decode { .. })
    }
}

/// Contract violations of the frame buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BufferError {
    #[error("cannot consume {requested} bytes, only {available} buffered")]
    OutOfBounds { requested: usize, available: usize },
}
