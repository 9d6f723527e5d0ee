//! # mcstream-client
//!
//! Transport boundary for memcached-stream.
//!
//! This crate provides:
//! - [`ReplyReader`]: pulls bytes from any `AsyncRead` into a parser and
//!   yields decoded replies
//! - [`ReplySink`]: an `AsyncWrite` implementation so a socket can be piped
//!   into a parser with `tokio::io::copy`

pub mod error;
pub mod reader;
pub mod sink;

pub use error::ClientError;
pub use reader::{ReplyReader, DEFAULT_READ_BUFFER_SIZE};
pub use sink::ReplySink;
