//! # mcstream-protocol
//!
//! Streaming decoder for memcached text protocol replies.
//!
//! This crate provides:
//! - Byte-accurate buffering of arbitrarily fragmented input
//! - Header line scanning and `VALUE` data block extraction
//! - Per-flag value decoders (`string`, `number`, `json` or custom closures)
//! - The [`Parser`] state machine emitting ordered reply events
//! - YAML/environment configuration of parser options

pub mod buffer;
pub mod config;
pub mod error;
pub mod flags;
pub mod header;
pub mod parser;
pub mod reply;
pub mod value;

pub use buffer::FrameBuffer;
pub use config::{ConfigError, ParserConfig};
pub use error::{BufferError, DecodeFailure, ProtocolError, ValidationError};
pub use flags::{decoders, Decoder, FlagId, FlagRegistry};
pub use header::{Header, HeaderScanner, Scan, TERMINATOR};
pub use parser::{Parser, ParserOptions, ParserState};
pub use reply::{Event, Reply};
pub use value::{Body, BulkHeader, ValueExtractor};

/// Keyword of the reply that carries a data block.
pub const VALUE_KEYWORD: &str = "VALUE";

/// Maximum data block size accepted by default (16 MiB).
pub const DEFAULT_MAX_VALUE_SIZE: usize = 16 * 1024 * 1024;

/// Longest header line accepted by default, terminator excluded.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 2048;

/// Default number of queued events before `write` signals backpressure.
pub const DEFAULT_HIGH_WATER_MARK: usize = 1024;
