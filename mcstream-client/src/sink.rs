//! `AsyncWrite` adapter so a transport can be piped into a parser.
//!
//! ```ignore
//! let (mut sink, mut events) = ReplySink::new();
//! tokio::spawn(async move { tokio::io::copy(&mut socket, &mut sink).await });
//! while let Some(event) = events.recv().await {
//!     // ...
//! }
//! ```

use mcstream_protocol::{Event, Parser, ParserOptions};
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;

/// Byte sink that decodes everything written to it and forwards the
/// resulting events over a channel.
pub struct ReplySink {
    parser: Parser,
    events: mpsc::UnboundedSender<Event>,
}

impl ReplySink {
    /// Creates a sink with a default parser and returns the receiving end
    /// of its event channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Event>) {
        Self::with_options(ParserOptions::default())
    }

    /// Creates a sink whose parser uses `options`. The parser is always
    /// readable, since the sink forwards its pull queue.
    pub fn with_options(options: ParserOptions) -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (events, rx) = mpsc::unbounded_channel();
        let parser = Parser::with_options(options.with_readable(true));
        (Self { parser, events }, rx)
    }

    pub fn parser(&self) -> &Parser {
        &self.parser
    }

    pub fn parser_mut(&mut self) -> &mut Parser {
        &mut self.parser
    }

    /// Writes `buf` to the parser and forwards the decoded events.
    fn feed(&mut self, buf: &[u8]) -> io::Result<()> {
        if self.parser.is_destroyed() || !self.parser.is_writable() {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "reply parser is not writable",
            ));
        }

        self.parser.write(buf);
        for event in self.parser.drain() {
            if self.events.send(event).is_err() {
                return Err(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "reply receiver dropped",
                ));
            }
        }
        Ok(())
    }
}

impl AsyncWrite for ReplySink {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        Poll::Ready(this.feed(buf).map(|()| buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.parser.buffered() > 0 {
            tracing::debug!(
                "Sink shut down with {} bytes of an incomplete reply",
                this.parser.buffered()
            );
        }
        this.parser.destroy();
        Poll::Ready(Ok(()))
    }
}
