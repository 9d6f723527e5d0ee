//! memcached-stream - streaming decoder for memcached text protocol replies.
//!
//! Feed whatever the socket delivers into a [`Parser`] and receive every
//! complete reply, in order, regardless of how the bytes were fragmented.
//!
//! ```
//! use memcached_stream::{create_stream, Event};
//!
//! let mut parser = create_stream();
//! parser.flag_named(1, "number").unwrap();
//!
//! parser.write("VALUE counter 1 2\r\n4");
//! parser.write("2\r\nEND\r\n");
//!
//! let replies: Vec<_> = parser.drain().filter_map(Event::into_response).collect();
//! assert_eq!(replies[0].value, Some(serde_json::Value::from(42)));
//! assert_eq!(replies[1].command, "END");
//! ```

pub use mcstream_client::{ClientError, ReplyReader, ReplySink};
pub use mcstream_protocol::{
    decoders, ConfigError, DecodeFailure, Event, FlagId, FlagRegistry, Parser, ParserConfig,
    ParserOptions, ParserState, ProtocolError, Reply, ValidationError,
};

/// Creates a parser with default options.
pub fn create_stream() -> Parser {
    Parser::new()
}

/// Creates a parser from the configuration found via `MCSTREAM_CONFIG` and
/// `MCSTREAM_*` environment overrides.
pub fn create_stream_from_env() -> Result<Parser, ConfigError> {
    let config = ParserConfig::load()?;
    let options = ParserOptions::from_config(&config)?;
    tracing::debug!(
        "Creating parser (readable={}, writable={}, {} flag decoder(s))",
        options.readable,
        options.writable,
        options.flags.len()
    );
    Ok(Parser::with_options(options))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::sync::{Arc, Mutex};

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new("debug"))
            .with_test_writer()
            .try_init();
    }

    fn collect_commands(parser: &mut Parser) -> Arc<Mutex<Vec<String>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        parser.on_response(move |reply| sink.lock().unwrap().push(reply.command.clone()));
        seen
    }

    #[test]
    fn test_create_stream() {
        let parser = create_stream();
        assert!(parser.is_readable());
        assert!(parser.is_writable());
        assert_eq!(parser.expecting(), 0);
    }

    #[test]
    fn test_applies_options() {
        let parser = Parser::with_options(ParserOptions::new().with_readable(false));
        assert!(!parser.is_readable());
    }

    #[test]
    fn test_flag_accepts_only_unsigned_ids() {
        fn noop(_: &str) -> Result<Value, DecodeFailure> {
            Ok(Value::Null)
        }

        let mut parser = create_stream();
        for err in [
            parser.flag(-1, noop).unwrap_err(),
            parser.flag("-1", noop).unwrap_err(),
            parser.flag(4294967296u64, noop).unwrap_err(),
        ] {
            assert!(err.to_string().contains("unsigned"));
        }
        assert!(parser.flag(2, noop).is_ok());
        assert!(parser.flag(0, noop).is_ok());
        assert!(parser.flag(4294967295u32, noop).is_ok());
    }

    #[test]
    fn test_flag_accepts_only_functions() {
        let mut parser = create_stream();
        let err = parser.flag_named(1, "1").unwrap_err();
        assert!(err.to_string().contains("function"));
        assert!(parser.flag_named(1, "number").is_ok());
    }

    #[test]
    fn test_listener_sees_split_simple_reply() {
        init_tracing();
        let mut parser = create_stream();
        let seen = collect_commands(&mut parser);

        assert!(parser.write("END"));
        assert_eq!(parser.expecting(), 5);
        assert!(seen.lock().unwrap().is_empty());

        assert!(parser.write("\r\n"));
        assert_eq!(*seen.lock().unwrap(), vec!["END"]);
        assert_eq!(parser.expecting(), 0);
        assert!(parser.pending().is_empty());
    }

    #[test]
    fn test_listener_respects_threshold() {
        let mut parser = Parser::with_options(ParserOptions::new().with_initial_expecting(1000));
        let seen = collect_commands(&mut parser);
        parser.write("END\r\n");
        assert!(seen.lock().unwrap().is_empty());

        let mut parser = Parser::with_options(ParserOptions::new().with_initial_expecting(20));
        let seen = collect_commands(&mut parser);
        parser.write("KEY 12 победы\r\n");
        assert_eq!(*seen.lock().unwrap(), vec!["KEY"]);
    }

    #[test]
    fn test_value_reply_fields() {
        init_tracing();
        let mut parser = create_stream();
        parser.flag_named(1, "string").unwrap();

        let data = "VALUE füübar 1 60 9\r\nпривет мир, ";
        parser.write(data);
        assert_eq!(parser.pending(), data.as_bytes());
        assert_eq!(parser.expecting(), 85);

        parser.write("Memcached и nodejs для победы\r\n");
        let reply = parser.read().and_then(Event::into_response).unwrap();
        assert_eq!(reply.command, "VALUE");
        assert_eq!(
            reply.value,
            Some(Value::from("привет мир, Memcached и nodejs для победы"))
        );
        assert_eq!(reply.flags.as_deref(), Some("1"));
        assert_eq!(reply.cas.as_deref(), Some("9"));
        assert_eq!(reply.key.as_deref(), Some("füübar"));
        assert!(parser.pending().is_empty());
    }

    #[tokio::test]
    async fn test_reader_from_transport() {
        let mock = tokio_test::io::Builder::new()
            .read(b"VALUE f 2 26\r\n{\"foo\":\"bar\",")
            .read(b"\"bar\":121313}\r\nEND\r\n")
            .build();

        let mut reader = ReplyReader::new(mock);
        reader.parser_mut().flag_named(2, "json").unwrap();

        let reply = reader.next_reply().await.unwrap().unwrap();
        let value = reply.value.unwrap();
        assert_eq!(value["foo"], "bar");
        assert_eq!(value["bar"], 121313);

        assert_eq!(reader.next_reply().await.unwrap().unwrap().command, "END");
        assert!(reader.next_reply().await.unwrap().is_none());
    }
}
