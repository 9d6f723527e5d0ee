//! Header line scanning.
//!
//! A header is everything up to the first `\r\n` in the buffer. The scanner
//! only looks at bytes; it never consumes them, so bulk data following a
//! `VALUE` header stays in the buffer for the value extractor.

use crate::error::ProtocolError;

/// Line terminator used by the text protocol.
pub const TERMINATOR: &[u8] = b"\r\n";

/// Outcome of a scan over the buffered bytes.
#[derive(Debug)]
pub enum Scan<T> {
    /// More bytes are needed; do not rescan before `expecting` bytes exist.
    Incomplete { expecting: usize },
    /// A complete unit was found.
    Complete(T),
    /// The unit is unusable. `consumed` bytes should be dropped so parsing
    /// can resume after it.
    Malformed {
        consumed: usize,
        error: ProtocolError,
    },
    /// The unit is unusable and its end has not arrived yet. Everything up
    /// to and including the next terminator must be dropped.
    Unterminated { error: ProtocolError },
}

/// A tokenized header line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Command keyword (first token).
    pub command: String,
    /// Remaining whitespace-delimited tokens.
    pub args: Vec<String>,
    /// Byte length of the line including its terminator.
    pub len: usize,
}

impl Header {
    /// Returns whether this header announces a data block.
    pub fn is_bulk(&self) -> bool {
        self.command == crate::VALUE_KEYWORD
    }
}

/// Finds header lines without re-reading bytes it already examined.
#[derive(Debug)]
pub struct HeaderScanner {
    /// Bytes already searched without finding a terminator.
    scanned: usize,
    /// Longest accepted header line, terminator excluded.
    max_line_length: usize,
}

impl HeaderScanner {
    pub fn new() -> Self {
        Self::with_max_line_length(crate::DEFAULT_MAX_LINE_LENGTH)
    }

    pub fn with_max_line_length(max_line_length: usize) -> Self {
        Self {
            scanned: 0,
            max_line_length,
        }
    }

    pub fn max_line_length(&self) -> usize {
        self.max_line_length
    }

    /// Scans `buf` for a complete header line.
    ///
    /// `buf` must start at the same position as on the previous call unless
    /// [`reset`](Self::reset) was called in between.
    pub fn try_header(&mut self, buf: &[u8]) -> Scan<Header> {
        // A trailing '\r' from the last scan may pair with a new '\n'.
        let from = self.scanned.saturating_sub(1);

        let Some(pos) = find_terminator(buf, from) else {
            let line = buf.strip_suffix(b"\r").unwrap_or(buf);
            if line.len() > self.max_line_length {
                self.scanned = 0;
                return Scan::Unterminated {
                    error: too_long(line),
                };
            }
            self.scanned = buf.len();
            return Scan::Incomplete {
                expecting: min_terminated_len(buf),
            };
        };

        self.scanned = 0;
        let len = pos + TERMINATOR.len();

        if pos > self.max_line_length {
            return Scan::Malformed {
                consumed: len,
                error: too_long(&buf[..pos]),
            };
        }

        let line = match std::str::from_utf8(&buf[..pos]) {
            Ok(line) => line,
            Err(_) => {
                return Scan::Malformed {
                    consumed: len,
                    error: ProtocolError::MalformedHeader {
                        line: String::from_utf8_lossy(&buf[..pos]).into_owned(),
                        reason: "header is not valid UTF-8",
                    },
                }
            }
        };

        let mut tokens = line.split_ascii_whitespace().map(str::to_string);
        match tokens.next() {
            Some(command) => Scan::Complete(Header {
                command,
                args: tokens.collect(),
                len,
            }),
            None => Scan::Malformed {
                consumed: len,
                error: ProtocolError::MalformedHeader {
                    line: line.to_string(),
                    reason: "empty header line",
                },
            },
        }
    }

    /// Forgets scan progress. Call after bytes are consumed from the buffer.
    pub fn reset(&mut self) {
        self.scanned = 0;
    }
}

impl Default for HeaderScanner {
    fn default() -> Self {
        Self::new()
    }
}

fn too_long(line: &[u8]) -> ProtocolError {
    const PREVIEW: usize = 64;
    ProtocolError::MalformedHeader {
        line: String::from_utf8_lossy(&line[..line.len().min(PREVIEW)]).into_owned(),
        reason: "header line too long",
    }
}

/// Returns the offset of the first terminator at or after `from`.
pub(crate) fn find_terminator(buf: &[u8], from: usize) -> Option<usize> {
    buf.get(from..)?
        .windows(TERMINATOR.len())
        .position(|w| w == TERMINATOR)
        .map(|p| p + from)
}

/// Smallest buffer length at which a terminator could exist.
fn min_terminated_len(buf: &[u8]) -> usize {
    if buf.last() == Some(&b'\r') {
        buf.len() + 1
    } else {
        buf.len() + TERMINATOR.len()
    }
}
