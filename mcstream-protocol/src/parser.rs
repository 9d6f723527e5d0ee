//! Streaming reply parser.
//!
//! The parser is fed raw bytes through [`Parser::write`] in whatever
//! fragments the transport delivers and reports every complete reply, in
//! wire order, to its listeners and (when readable) to its pull queue.
//!
//! ```text
//! Idle ──bytes──▶ ScanningHeader ──simple header──▶ emit ──▶ Idle
//!                      │
//!                      └──VALUE header──▶ AwaitingBody ──data──▶ emit ──▶ Idle
//! ```
//!
//! Errors that leave payload bytes on the wire move the parser to
//! `Discarding` (a known byte count, e.g. an oversized value) or
//! `Resyncing` (drop through the next `\r\n`), so payload bytes are never
//! read as replies.
//!
//! Flag decoders should be registered between writes. A `&mut Parser` is
//! needed for both, so a decoder cannot change while a reply is decoded.

use crate::buffer::FrameBuffer;
use crate::config::ParserConfig;
use crate::error::{BufferError, DecodeFailure, ProtocolError, ValidationError};
use crate::flags::{FlagId, FlagRegistry};
use crate::header::{find_terminator, HeaderScanner, Scan, TERMINATOR};
use crate::reply::{Event, Reply};
use crate::value::{Body, BulkHeader, ValueExtractor};
use crate::{DEFAULT_HIGH_WATER_MARK, DEFAULT_MAX_LINE_LENGTH, DEFAULT_MAX_VALUE_SIZE};
use serde_json::Value;
use std::collections::VecDeque;
use std::fmt;

type ResponseListener = Box<dyn FnMut(&Reply) + Send>;
type ErrorListener = Box<dyn FnMut(&ProtocolError) + Send>;

/// Parser construction options.
#[derive(Debug, Clone)]
pub struct ParserOptions {
    /// Decoders merged into the parser's registry.
    pub flags: FlagRegistry,
    /// Queue events for the pull side. Ignored once a listener is
    /// registered: listeners then receive every event instead.
    pub readable: bool,
    /// Accept writes.
    pub writable: bool,
    /// Queued events at which `write` returns `false`.
    pub high_water_mark: usize,
    /// Largest accepted data block in bytes.
    pub max_value_size: usize,
    /// Longest accepted header line in bytes, terminator excluded.
    pub max_line_length: usize,
    /// Initial buffer capacity in bytes.
    pub buffer_capacity: usize,
    /// Starting byte threshold; exposed for tests of the rescan guard.
    pub initial_expecting: usize,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            flags: FlagRegistry::new(),
            readable: true,
            writable: true,
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
            max_value_size: DEFAULT_MAX_VALUE_SIZE,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            buffer_capacity: crate::buffer::DEFAULT_BUFFER_CAPACITY,
            initial_expecting: 0,
        }
    }
}

impl ParserOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds options from a loaded configuration, resolving named decoders.
    pub fn from_config(config: &ParserConfig) -> Result<Self, ValidationError> {
        let mut flags = FlagRegistry::new();
        for (id, name) in &config.flags {
            flags.register_named(*id, name)?;
        }
        Ok(Self {
            flags,
            readable: config.readable,
            writable: config.writable,
            high_water_mark: config.high_water_mark,
            max_value_size: config.max_value_size,
            max_line_length: config.max_line_length,
            buffer_capacity: config.buffer_capacity,
            initial_expecting: 0,
        })
    }

    pub fn with_flag<I, F>(mut self, id: I, decoder: F) -> Result<Self, ValidationError>
    where
        I: FlagId,
        F: Fn(&str) -> Result<Value, DecodeFailure> + Send + Sync + 'static,
    {
        self.flags.register(id, decoder)?;
        Ok(self)
    }

    pub fn with_flags(mut self, flags: &FlagRegistry) -> Self {
        self.flags.merge(flags);
        self
    }

    pub fn with_readable(mut self, readable: bool) -> Self {
        self.readable = readable;
        self
    }

    pub fn with_writable(mut self, writable: bool) -> Self {
        self.writable = writable;
        self
    }

    pub fn with_high_water_mark(mut self, events: usize) -> Self {
        self.high_water_mark = events.max(1);
        self
    }

    pub fn with_max_value_size(mut self, bytes: usize) -> Self {
        self.max_value_size = bytes;
        self
    }

    pub fn with_max_line_length(mut self, bytes: usize) -> Self {
        self.max_line_length = bytes;
        self
    }

    pub fn with_buffer_capacity(mut self, bytes: usize) -> Self {
        self.buffer_capacity = bytes;
        self
    }

    pub fn with_initial_expecting(mut self, bytes: usize) -> Self {
        self.initial_expecting = bytes;
        self
    }
}

/// Position of the parser within the reply stream.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ParserState {
    /// No partial reply buffered.
    #[default]
    Idle,
    /// Bytes buffered, header line not complete yet.
    ScanningHeader,
    /// `VALUE` header parsed, data block pending.
    AwaitingBody(BulkHeader),
    /// Dropping the rest of a rejected reply whose length is known.
    Discarding { remaining: usize },
    /// Dropping bytes through the next terminator after a framing error.
    Resyncing,
}

/// Streaming decoder for memcached text protocol replies.
pub struct Parser {
    buffer: FrameBuffer,
    scanner: HeaderScanner,
    extractor: ValueExtractor,
    flags: FlagRegistry,
    state: ParserState,
    readable: bool,
    writable: bool,
    high_water_mark: usize,
    max_value_size: usize,
    queue: VecDeque<Event>,
    response_listeners: Vec<ResponseListener>,
    error_listeners: Vec<ErrorListener>,
    destroyed: bool,
}

impl Parser {
    /// Creates a parser with default options.
    pub fn new() -> Self {
        Self::with_options(ParserOptions::default())
    }

    pub fn with_options(options: ParserOptions) -> Self {
        let mut buffer = FrameBuffer::with_capacity(options.buffer_capacity);
        buffer.set_expecting(options.initial_expecting);

        Self {
            buffer,
            scanner: HeaderScanner::with_max_line_length(options.max_line_length),
            extractor: ValueExtractor::new(),
            flags: options.flags,
            state: ParserState::Idle,
            readable: options.readable,
            writable: options.writable,
            high_water_mark: options.high_water_mark.max(1),
            max_value_size: options.max_value_size,
            queue: VecDeque::new(),
            response_listeners: Vec::new(),
            error_listeners: Vec::new(),
            destroyed: false,
        }
    }

    /// Registers a decoder for replies carrying flag `id`.
    pub fn flag<I, F>(&mut self, id: I, decoder: F) -> Result<(), ValidationError>
    where
        I: FlagId,
        F: Fn(&str) -> Result<Value, DecodeFailure> + Send + Sync + 'static,
    {
        self.flags.register(id, decoder)
    }

    /// Registers a built-in decoder (`string`, `number` or `json`) by name.
    pub fn flag_named<I: FlagId>(&mut self, id: I, name: &str) -> Result<(), ValidationError> {
        self.flags.register_named(id, name)
    }

    /// Adds a listener called for every decoded reply.
    ///
    /// Once any listener is registered, events are no longer queued for
    /// [`read`](Self::read).
    pub fn on_response(&mut self, listener: impl FnMut(&Reply) + Send + 'static) -> &mut Self {
        self.response_listeners.push(Box::new(listener));
        self
    }

    /// Adds a listener called for every protocol error. Disables queueing
    /// like [`on_response`](Self::on_response).
    pub fn on_error(
        &mut self,
        listener: impl FnMut(&ProtocolError) + Send + 'static,
    ) -> &mut Self {
        self.error_listeners.push(Box::new(listener));
        self
    }

    /// Feeds a chunk of wire data and decodes every reply it completes.
    ///
    /// Returns `false` when the caller should pause: the parser is not
    /// writable, was destroyed, or its pull queue reached the high water mark.
    pub fn write(&mut self, chunk: impl AsRef<[u8]>) -> bool {
        if self.destroyed {
            tracing::debug!("Write after destroy ignored");
            return false;
        }
        if !self.writable {
            self.emit(Event::Error(ProtocolError::NotWritable));
            return false;
        }

        let chunk = chunk.as_ref();
        self.buffer.append(chunk);
        tracing::trace!(
            "Appended {} bytes, {} buffered, expecting {}",
            chunk.len(),
            self.buffer.len(),
            self.buffer.expecting()
        );

        if let Err(e) = self.parse() {
            tracing::error!("Buffer accounting error, discarding buffered data: {}", e);
            self.buffer.clear();
            self.reset();
        }

        self.has_capacity()
    }

    /// Decodes replies until the buffer cannot yield another one.
    fn parse(&mut self) -> Result<(), BufferError> {
        while !self.buffer.is_empty() && self.buffer.is_ready() {
            let header = match std::mem::take(&mut self.state) {
                ParserState::AwaitingBody(header) => header,
                ParserState::Discarding { remaining } => {
                    let n = remaining.min(self.buffer.len());
                    self.buffer.consume(n)?;
                    if n < remaining {
                        self.state = ParserState::Discarding {
                            remaining: remaining - n,
                        };
                        return Ok(());
                    }
                    self.reset();
                    continue;
                }
                ParserState::Resyncing => {
                    if let Some(pos) = find_terminator(self.buffer.as_slice(), 0) {
                        self.buffer.consume(pos + TERMINATOR.len())?;
                        self.reset();
                        continue;
                    }
                    // A trailing '\r' may pair with the next '\n'
                    let keep = usize::from(self.buffer.as_slice().ends_with(b"\r"));
                    self.buffer.consume(self.buffer.len() - keep)?;
                    self.state = ParserState::Resyncing;
                    return Ok(());
                }
                ParserState::Idle | ParserState::ScanningHeader => {
                    match self.scanner.try_header(self.buffer.as_slice()) {
                        Scan::Incomplete { expecting } => {
                            self.buffer.set_expecting(expecting);
                            self.state = ParserState::ScanningHeader;
                            return Ok(());
                        }
                        Scan::Malformed { consumed, error } => {
                            self.buffer.consume(consumed)?;
                            self.reset();
                            self.emit(Event::Error(error));
                            continue;
                        }
                        Scan::Unterminated { error } => {
                            self.reset();
                            self.state = ParserState::Resyncing;
                            self.emit(Event::Error(error));
                            continue;
                        }
                        Scan::Complete(header) => {
                            let len = header.len;
                            if !header.is_bulk() {
                                self.buffer.consume(len)?;
                                self.reset();
                                self.emit(Event::Response(Reply::simple(
                                    header.command,
                                    header.args,
                                )));
                                continue;
                            }
                            match BulkHeader::parse(header, self.max_value_size) {
                                Ok(bulk) => bulk,
                                Err(error) => {
                                    // An oversized block is skipped without buffering it
                                    let remaining = match &error {
                                        ProtocolError::ValueTooLarge { size, .. } => len
                                            .saturating_add(*size)
                                            .saturating_add(TERMINATOR.len()),
                                        _ => len,
                                    };
                                    self.reset();
                                    self.state = ParserState::Discarding { remaining };
                                    self.emit(Event::Error(error));
                                    continue;
                                }
                            }
                        }
                    }
                }
            };

            match self
                .extractor
                .try_body(&mut self.buffer, &header, &self.flags)?
            {
                Body::Incomplete { expecting } => {
                    self.buffer.set_expecting(expecting);
                    self.state = ParserState::AwaitingBody(header);
                    return Ok(());
                }
                Body::Decoded(reply) => {
                    self.reset();
                    self.emit(Event::Response(reply));
                }
                Body::Failed(error) => {
                    self.reset();
                    self.emit(Event::Error(error));
                }
                Body::Misframed(error) => {
                    self.reset();
                    self.state = ParserState::Resyncing;
                    self.emit(Event::Error(error));
                }
            }
        }
        Ok(())
    }

    /// Returns to `Idle` after bytes were consumed.
    fn reset(&mut self) {
        self.scanner.reset();
        self.buffer.reset_expecting();
        self.state = ParserState::Idle;
    }

    fn emit(&mut self, event: Event) {
        match &event {
            Event::Response(reply) => {
                tracing::debug!("Decoded {} reply", reply.command);
                for listener in &mut self.response_listeners {
                    listener(reply);
                }
            }
            Event::Error(error) => {
                tracing::warn!("Protocol error: {}", error);
                for listener in &mut self.error_listeners {
                    listener(error);
                }
            }
        }
        if self.readable && !self.has_listeners() {
            self.queue.push_back(event);
        }
    }

    fn has_listeners(&self) -> bool {
        !self.response_listeners.is_empty() || !self.error_listeners.is_empty()
    }

    fn has_capacity(&self) -> bool {
        !self.readable || self.queue.len() < self.high_water_mark
    }

    /// Takes the oldest queued event.
    pub fn read(&mut self) -> Option<Event> {
        self.queue.pop_front()
    }

    /// Takes every queued event, oldest first.
    pub fn drain(&mut self) -> impl Iterator<Item = Event> + '_ {
        self.queue.drain(..)
    }

    /// Number of events waiting on the pull side.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Stops the parser and releases buffered data.
    ///
    /// Any partial reply is lost; later writes are ignored.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        tracing::debug!(
            "Destroying parser with {} buffered bytes",
            self.buffer.len()
        );
        self.destroyed = true;
        self.buffer.clear();
        self.queue.clear();
        self.response_listeners.clear();
        self.error_listeners.clear();
        self.reset();
    }

    /// Byte threshold the buffer must reach before the next scan.
    pub fn expecting(&self) -> usize {
        self.buffer.expecting()
    }

    /// Number of bytes received but not yet attributed to a reply.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Bytes received but not yet attributed to a reply.
    pub fn pending(&self) -> &[u8] {
        self.buffer.as_slice()
    }

    pub fn state(&self) -> &ParserState {
        &self.state
    }

    pub fn flags(&self) -> &FlagRegistry {
        &self.flags
    }

    pub fn is_readable(&self) -> bool {
        self.readable
    }

    pub fn is_writable(&self) -> bool {
        self.writable && !self.destroyed
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Parser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parser")
            .field("state", &self.state)
            .field("buffered", &self.buffer.len())
            .field("expecting", &self.buffer.expecting())
            .field("flags", &self.flags)
            .field("queued", &self.queue.len())
            .field("readable", &self.readable)
            .field("writable", &self.writable)
            .field("destroyed", &self.destroyed)
            .finish()
    }
}
