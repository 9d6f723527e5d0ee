//! Decoded replies and parser events.

use crate::error::ProtocolError;
use serde::Serialize;
use serde_json::Value;

/// Keywords of the protocol's error replies.
const ERROR_KEYWORDS: [&str; 3] = ["ERROR", "CLIENT_ERROR", "SERVER_ERROR"];

/// One parsed reply.
///
/// Simple replies only carry `command` and `args`. `VALUE` replies also
/// carry the key, the raw flags field, the optional CAS token and the
/// decoded value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reply {
    /// Reply keyword, e.g. `END` or `VALUE`.
    pub command: String,
    /// Header tokens after the keyword. Empty for `VALUE` replies, whose
    /// tokens are split into the named fields below.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Flags field exactly as received.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flags: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cas: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl Reply {
    /// Creates a simple (single line) reply.
    pub fn simple(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            key: None,
            flags: None,
            cas: None,
            value: None,
        }
    }

    /// Creates a `VALUE` reply.
    pub fn value(
        key: impl Into<String>,
        flags: impl Into<String>,
        cas: Option<String>,
        value: Value,
    ) -> Self {
        Self {
            command: crate::VALUE_KEYWORD.to_string(),
            args: Vec::new(),
            key: Some(key.into()),
            flags: Some(flags.into()),
            cas,
            value: Some(value),
        }
    }

    pub fn is_bulk(&self) -> bool {
        self.value.is_some()
    }

    /// Returns whether the server answered with `ERROR`, `CLIENT_ERROR` or
    /// `SERVER_ERROR`.
    pub fn is_error(&self) -> bool {
        ERROR_KEYWORDS.contains(&self.command.as_str())
    }
}

/// An outcome reported by the parser, in stream order.
#[derive(Debug)]
pub enum Event {
    Response(Reply),
    Error(ProtocolError),
}

impl Event {
    pub fn as_response(&self) -> Option<&Reply> {
        match self {
            Event::Response(reply) => Some(reply),
            Event::Error(_) => None,
        }
    }

    pub fn into_response(self) -> Option<Reply> {
        match self {
            Event::Response(reply) => Some(reply),
            Event::Error(_) => None,
        }
    }

    pub fn as_error(&self) -> Option<&ProtocolError> {
        match self {
            Event::Response(_) => None,
            Event::Error(err) => Some(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_reply() {
        let reply = Reply::simple("END", Vec::new());
        assert_eq!(reply.command, "END");
        assert!(!reply.is_bulk());
        assert!(!reply.is_error());
    }

    #[test]
    fn test_error_replies() {
        let reply = Reply::simple("CLIENT_ERROR", vec!["bad".into(), "chunk".into()]);
        assert!(reply.is_error());
        assert!(Reply::simple("SERVER_ERROR", Vec::new()).is_error());
        assert!(Reply::simple("ERROR", Vec::new()).is_error());
    }

    #[test]
    fn test_value_reply_serialization() {
        let reply = Reply::value("f", "1", Some("9".to_string()), Value::from(1));
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "command": "VALUE",
                "key": "f",
                "flags": "1",
                "cas": "9",
                "value": 1
            })
        );
    }

    #[test]
    fn test_event_accessors() {
        let event = Event::Response(Reply::simple("STORED", Vec::new()));
        assert_eq!(event.as_response().unwrap().command, "STORED");
        assert!(event.as_error().is_none());

        let event = Event::Error(ProtocolError::NotWritable);
        assert!(event.as_response().is_none());
        assert!(event.as_error().is_some());
        assert!(event.into_response().is_none());
    }
}
