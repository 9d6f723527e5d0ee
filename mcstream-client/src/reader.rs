//! Pull-based reply stream over an async byte source.

use crate::error::ClientError;
use mcstream_protocol::{Event, Parser, ParserOptions, ParserState, Reply};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Default read buffer size (8 KiB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8 * 1024;

/// Minimum read buffer size (1 KiB).
pub const MIN_READ_BUFFER_SIZE: usize = 1024;

/// Maximum read buffer size (1 MiB).
pub const MAX_READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Reads from a transport and yields decoded events in wire order.
pub struct ReplyReader<R> {
    reader: R,
    parser: Parser,
    buf: Vec<u8>,
    eof: bool,
}

impl<R: AsyncRead + Unpin> ReplyReader<R> {
    pub fn new(reader: R) -> Self {
        Self::with_options(reader, ParserOptions::default())
    }

    /// Creates a reader whose parser uses `options`. The parser is always
    /// readable, since this type consumes its pull queue.
    pub fn with_options(reader: R, options: ParserOptions) -> Self {
        Self {
            reader,
            parser: Parser::with_options(options.with_readable(true)),
            buf: vec![0u8; DEFAULT_READ_BUFFER_SIZE],
            eof: false,
        }
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        let size = size.clamp(MIN_READ_BUFFER_SIZE, MAX_READ_BUFFER_SIZE);
        self.buf.resize(size, 0);
        self
    }

    /// Returns the next event, reading from the transport as needed.
    ///
    /// Returns `Ok(None)` at end of stream. If the stream ends inside a
    /// reply, [`ClientError::Incomplete`] is returned once.
    pub async fn next_event(&mut self) -> Result<Option<Event>, ClientError> {
        loop {
            if let Some(event) = self.parser.read() {
                return Ok(Some(event));
            }
            if self.eof {
                return Ok(None);
            }

            let n = self.reader.read(&mut self.buf).await?;
            if n == 0 {
                self.eof = true;
                let buffered = self.parser.buffered();
                let mid_reply = buffered > 0 || *self.parser.state() != ParserState::Idle;
                self.parser.destroy();
                if mid_reply {
                    tracing::debug!("Stream ended inside a reply ({} bytes)", buffered);
                    return Err(ClientError::Incomplete { buffered });
                }
                tracing::debug!("Stream ended");
                return Ok(None);
            }

            tracing::trace!("Read {} bytes from transport", n);
            self.parser.write(&self.buf[..n]);
        }
    }

    /// Returns the next reply, surfacing protocol errors as
    /// [`ClientError::Protocol`]. The stream stays usable after such errors.
    pub async fn next_reply(&mut self) -> Result<Option<Reply>, ClientError> {
        match self.next_event().await? {
            Some(Event::Response(reply)) => Ok(Some(reply)),
            Some(Event::Error(err)) => Err(err.into()),
            None => Ok(None),
        }
    }

    pub fn parser(&self) -> &Parser {
        &self.parser
    }

    /// Mutable access, e.g. to register flag decoders between reads.
    /// Listeners registered here take events away from this reader.
    pub fn parser_mut(&mut self) -> &mut Parser {
        &mut self.parser
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_reads_fragmented_replies() {
        let mock = Builder::new()
            .read(b"VAL")
            .read(b"UE k 1 2 5")
            .read(b"\r\n4")
            .read(b"2\r\nEND")
            .read(b"\r\n")
            .build();

        let mut reader = ReplyReader::new(mock);
        reader.parser_mut().flag_named(1, "number").unwrap();

        let reply = reader.next_reply().await.unwrap().unwrap();
        assert_eq!(reply.key.as_deref(), Some("k"));
        assert_eq!(reply.cas.as_deref(), Some("5"));
        assert_eq!(reply.value, Some(Value::from(42)));

        let reply = reader.next_reply().await.unwrap().unwrap();
        assert_eq!(reply.command, "END");

        assert!(reader.next_reply().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_protocol_error_is_recoverable() {
        let mock = Builder::new().read(b"VALUE k x 1\r\nSTORED\r\n").build();
        let mut reader = ReplyReader::new(mock);

        let err = reader.next_reply().await.unwrap_err();
        assert!(err.is_recoverable());

        let reply = reader.next_reply().await.unwrap().unwrap();
        assert_eq!(reply.command, "STORED");
    }

    #[tokio::test]
    async fn test_eof_inside_reply() {
        let mock = Builder::new().read(b"VALUE k 0 10\r\nabc").build();
        let mut reader = ReplyReader::new(mock);

        match reader.next_event().await {
            Err(ClientError::Incomplete { buffered }) => assert_eq!(buffered, 17),
            other => panic!("unexpected {:?}", other),
        }
        assert!(reader.next_event().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_eof_while_skipping_oversized_value() {
        let mock = Builder::new().read(b"VALUE k 0 64\r\nabc").build();
        let mut reader =
            ReplyReader::with_options(mock, ParserOptions::new().with_max_value_size(8));

        let err = reader.next_reply().await.unwrap_err();
        assert!(err.is_recoverable());
        match reader.next_event().await {
            Err(ClientError::Incomplete { buffered: 0 }) => {}
            other => panic!("unexpected {:?}", other),
        }
        assert!(reader.next_event().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_forces_readable_parser() {
        let mock = Builder::new().read(b"END\r\n").build();
        let mut reader =
            ReplyReader::with_options(mock, ParserOptions::new().with_readable(false))
                .with_read_buffer_size(1);

        assert!(reader.parser().is_readable());
        let reply = reader.next_reply().await.unwrap().unwrap();
        assert_eq!(reply.command, "END");
    }
}
