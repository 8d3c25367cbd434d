//! Error types for scopelib.
//!
//! All fallible operations across the library return [`Result<T>`], which
//! uses [`Error`] as the error type. Every variant falls into one of the
//! classes reported by [`Error::class()`], which is what the dispatch engine
//! uses to decide between retrying, counting, and raising an alarm.

/// The error type for all scopelib operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error (TCP socket, serial port).
    #[error("transport error: {0}")]
    Transport(String),

    /// A reply that does not match the expected grammar (preamble, block
    /// header, numeric token, keyword).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Timed out waiting for a reply from the instrument.
    #[error("timeout waiting for response")]
    Timeout,

    /// The instrument model has no command for this operation.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// A channel or keyword index outside its valid range.
    ///
    /// Raised before any formatting or I/O takes place.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The bounded request queue was full.
    #[error("request queue full")]
    QueueFull,

    /// No connection to the instrument has been established.
    #[error("not connected")]
    NotConnected,

    /// The connection to the instrument was lost unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Write/read incomplete, timed out, zero-length or oversized payload.
    TransportFailure,
    /// Reply did not match the expected grammar.
    ProtocolParseFailure,
    /// Channel or enum index out of bounds, caught before I/O.
    RangeError,
    /// Bounded push onto the request queue failed.
    QueueOverflow,
    /// Operation has no command in the instrument's table.
    Unsupported,
}

impl Error {
    /// Classify this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::Transport(_)
            | Error::Timeout
            | Error::NotConnected
            | Error::ConnectionLost
            | Error::Io(_) => ErrorClass::TransportFailure,
            Error::Protocol(_) => ErrorClass::ProtocolParseFailure,
            Error::InvalidParameter(_) => ErrorClass::RangeError,
            Error::QueueFull => ErrorClass::QueueOverflow,
            Error::Unsupported(_) => ErrorClass::Unsupported,
        }
    }

    /// Whether this error should count against connection health.
    pub fn is_transport_failure(&self) -> bool {
        self.class() == ErrorClass::TransportFailure
    }
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_transport() {
        let e = Error::Transport("connection refused".into());
        assert_eq!(e.to_string(), "transport error: connection refused");
    }

    #[test]
    fn error_display_protocol() {
        let e = Error::Protocol("bad preamble".into());
        assert_eq!(e.to_string(), "protocol error: bad preamble");
    }

    #[test]
    fn error_display_timeout() {
        assert_eq!(Error::Timeout.to_string(), "timeout waiting for response");
    }

    #[test]
    fn error_display_invalid_parameter() {
        let e = Error::InvalidParameter("channel 5 out of range".into());
        assert_eq!(e.to_string(), "invalid parameter: channel 5 out of range");
    }

    #[test]
    fn error_display_queue_full() {
        assert_eq!(Error::QueueFull.to_string(), "request queue full");
    }

    #[test]
    fn error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broken");
        let e: Error = io_err.into();
        assert!(matches!(e, Error::Io(_)));
        assert!(e.to_string().contains("pipe broken"));
    }

    #[test]
    fn class_transport_failures() {
        assert_eq!(Error::Timeout.class(), ErrorClass::TransportFailure);
        assert_eq!(Error::NotConnected.class(), ErrorClass::TransportFailure);
        assert_eq!(Error::ConnectionLost.class(), ErrorClass::TransportFailure);
        assert_eq!(
            Error::Transport("x".into()).class(),
            ErrorClass::TransportFailure
        );
        assert!(Error::Timeout.is_transport_failure());
    }

    #[test]
    fn class_other_failures() {
        assert_eq!(
            Error::Protocol("x".into()).class(),
            ErrorClass::ProtocolParseFailure
        );
        assert_eq!(
            Error::InvalidParameter("x".into()).class(),
            ErrorClass::RangeError
        );
        assert_eq!(Error::QueueFull.class(), ErrorClass::QueueOverflow);
        assert_eq!(
            Error::Unsupported("x".into()).class(),
            ErrorClass::Unsupported
        );
        assert!(!Error::Protocol("x".into()).is_transport_failure());
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}
        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
