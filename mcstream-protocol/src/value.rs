//! Data block extraction for `VALUE` replies.
//!
//! ```text
//! VALUE <key> <flags> <bytes> [<cas>]\r\n
//! <data block, exactly <bytes> bytes>\r\n
//! ```
//!
//! Offsets are byte offsets, so a multi-byte character in the data block is
//! never split and never miscounted.

use crate::buffer::FrameBuffer;
use crate::error::{BufferError, ProtocolError};
use crate::flags::FlagRegistry;
use crate::header::{Header, TERMINATOR};
use crate::reply::Reply;

/// Parsed `VALUE` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkHeader {
    pub key: String,
    /// Flags field as received.
    pub flags: String,
    /// Flags field as a decoder id.
    pub flag_id: u32,
    /// Declared data block length in bytes.
    pub bytes: usize,
    pub cas: Option<String>,
    /// Byte length of the header line including its terminator.
    pub header_len: usize,
}

impl BulkHeader {
    /// Validates the arguments of a `VALUE` header.
    pub fn parse(header: Header, max_value_size: usize) -> Result<Self, ProtocolError> {
        let malformed = |header: &Header, reason| ProtocolError::MalformedHeader {
            line: format!("{} {}", header.command, header.args.join(" ")),
            reason,
        };

        if !(3..=4).contains(&header.args.len()) {
            return Err(malformed(&header, "expected 3 or 4 arguments"));
        }

        let flag_id = header.args[1]
            .parse::<u32>()
            .map_err(|_| malformed(&header, "flags is not an unsigned 32-bit integer"))?;

        let bytes = header.args[2]
            .parse::<usize>()
            .map_err(|_| malformed(&header, "length is not a non-negative integer"))?;

        let framed = header
            .len
            .checked_add(bytes)
            .and_then(|n| n.checked_add(TERMINATOR.len()));
        if bytes > max_value_size || framed.is_none() {
            return Err(ProtocolError::ValueTooLarge {
                size: bytes,
                max: max_value_size,
            });
        }

        let header_len = header.len;
        let mut args = header.args.into_iter();
        let key = args.next().unwrap_or_default();
        let flags = args.next().unwrap_or_default();
        let cas = args.nth(1);

        Ok(Self {
            key,
            flags,
            flag_id,
            bytes,
            cas,
            header_len,
        })
    }

    /// Total bytes of header, data block and trailing terminator.
    ///
    /// Cannot overflow: [`parse`](Self::parse) rejects lengths that would.
    pub fn total_len(&self) -> usize {
        self.header_len + self.bytes + TERMINATOR.len()
    }
}

/// Outcome of a data block extraction.
#[derive(Debug)]
pub enum Body {
    /// The buffer must hold `expecting` bytes before the block is complete.
    Incomplete { expecting: usize },
    /// The reply was framed and decoded; its bytes are consumed.
    Decoded(Reply),
    /// The reply was framed but could not be decoded; its bytes are
    /// consumed.
    Failed(ProtocolError),
    /// The data block was not followed by a terminator. Header and declared
    /// data are consumed; the stream is out of step until the next
    /// terminator.
    Misframed(ProtocolError),
}

/// Extracts and decodes data blocks.
#[derive(Debug, Default)]
pub struct ValueExtractor;

impl ValueExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Attempts to extract the data block announced by `header`.
    ///
    /// `buffer` must start at the header line.
    pub fn try_body(
        &self,
        buffer: &mut FrameBuffer,
        header: &BulkHeader,
        flags: &FlagRegistry,
    ) -> Result<Body, BufferError> {
        let total = header.total_len();
        if !buffer.has_at_least(total) {
            return Ok(Body::Incomplete { expecting: total });
        }

        let data_end = header.header_len + header.bytes;
        if &buffer.as_slice()[data_end..total] != TERMINATOR {
            buffer.consume(data_end)?;
            return Ok(Body::Misframed(ProtocolError::MissingTerminator {
                key: header.key.clone(),
            }));
        }

        let frame = buffer.consume(total)?;
        let data = frame.slice(header.header_len..data_end);

        let decoded = std::str::from_utf8(&data)
            .map_err(Into::into)
            .and_then(|text| (flags.resolve(header.flag_id))(text));

        match decoded {
            Ok(value) => Ok(Body::Decoded(Reply::value(
                header.key.clone(),
                header.flags.clone(),
                header.cas.clone(),
                value,
            ))),
            Err(source) => Ok(Body::Failed(ProtocolError::Decode {
                key: header.key.clone(),
                flags: header.flag_id,
                source,
            })),
        }
    }
}
