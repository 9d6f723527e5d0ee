//! Byte buffer for accumulating fragmented reads.
//!
//! All lengths are byte lengths, matching the `<bytes>` field of bulk
//! replies. Text written to the buffer is stored as its UTF-8 encoding, so a
//! multi-byte character counts for every byte it occupies.

use crate::error::BufferError;
use bytes::{Bytes, BytesMut};

/// Default initial buffer capacity (8 KiB).
pub const DEFAULT_BUFFER_CAPACITY: usize = 8 * 1024;

/// Accumulates unconsumed data and the byte threshold below which no parse
/// attempt is made.
#[derive(Debug)]
pub struct FrameBuffer {
    buffer: BytesMut,
    /// Minimum buffered length before the next scan. `0` means unknown.
    expecting: usize,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
            expecting: 0,
        }
    }

    /// Appends data to the end of the buffer.
    pub fn append(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Returns the number of bytes currently buffered.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Returns whether at least `n` bytes are buffered.
    pub fn has_at_least(&self, n: usize) -> bool {
        self.buffer.len() >= n
    }

    /// Removes and returns the first `n` bytes.
    pub fn consume(&mut self, n: usize) -> Result<Bytes, BufferError> {
        if n > self.buffer.len() {
            return Err(BufferError::OutOfBounds {
                requested: n,
                available: self.buffer.len(),
            });
        }
        Ok(self.buffer.split_to(n).freeze())
    }

    /// Returns the buffered bytes without consuming them.
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    pub fn expecting(&self) -> usize {
        self.expecting
    }

    pub fn set_expecting(&mut self, expecting: usize) {
        self.expecting = expecting;
    }

    pub fn reset_expecting(&mut self) {
        self.expecting = 0;
    }

    /// Returns whether enough bytes arrived to make a scan worthwhile.
    pub fn is_ready(&self) -> bool {
        self.expecting == 0 || self.has_at_least(self.expecting)
    }

    /// Drops all buffered data and resets the threshold.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.expecting = 0;
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
