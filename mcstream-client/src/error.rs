//! Transport boundary error types.

use thiserror::Error;

/// Errors raised while pumping a byte source into a parser.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] mcstream_protocol::ProtocolError),

    #[error("connection closed with {buffered} bytes of an incomplete reply")]
    Incomplete { buffered: usize },
}

impl ClientError {
    /// Returns whether the stream can keep delivering replies after this
    /// error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ClientError::Protocol(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcstream_protocol::ProtocolError;

    #[test]
    fn test_client_error_display() {
        let err = ClientError::Incomplete { buffered: 12 };
        assert!(err.to_string().contains("12"));
        assert!(!err.is_recoverable());

        let err = ClientError::from(ProtocolError::NotWritable);
        assert!(err.to_string().contains("not writable"));
        assert!(err.is_recoverable());

        let err = ClientError::from(std::io::Error::from(std::io::ErrorKind::BrokenPipe));
        assert!(matches!(err, ClientError::Io(_)));
    }
}
