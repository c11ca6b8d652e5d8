use std::fmt;
use std::time::Duration;

/// Error type for mediator
#[derive(Clone, PartialEq, Eq)]
pub struct Error {
    repr: ErrorRepr,
}

/// Error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No matching response arrived before the deadline.
    Timeout,
    /// The correlation id of an inbound event contradicts the registered role.
    Protocol,
    /// A value could not be encoded into a payload.
    Serialization,
    /// A payload could not be decoded into the expected type.
    Deserialization,
    /// A handler or message type could not be registered.
    Registration,
    /// The scope is not a valid target for this side.
    InvalidScope,
    /// The response listener went away before a response arrived.
    ChannelClosed,
    /// An unknown error.
    Unknown,
}

impl ErrorKind {
    /// Returns the description of the error kind.
    pub fn as_str(&self) -> &str {
        match *self {
            ErrorKind::Timeout => "request timed out",
            ErrorKind::Protocol => "protocol violation",
            ErrorKind::Serialization => "serialization failed",
            ErrorKind::Deserialization => "deserialization failed",
            ErrorKind::Registration => "invalid registration",
            ErrorKind::InvalidScope => "invalid scope",
            ErrorKind::ChannelClosed => "response channel closed",
            ErrorKind::Unknown => "unknown error",
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
enum ErrorRepr {
    /// An error with a kind.
    Kind(ErrorKind),
    /// An error with a description.
    WithDescription(ErrorKind, String),
}

impl Error {
    pub fn new<S: Into<String>>(kind: ErrorKind, description: S) -> Error {
        Error {
            repr: ErrorRepr::WithDescription(kind, description.into()),
        }
    }

    /// Error for a request on `event_name` that got no response within `timeout`.
    pub fn timeout(event_name: &str, timeout: Duration) -> Error {
        Error::new(
            ErrorKind::Timeout,
            format!(
                "message `{}` got no response within {}ms",
                event_name,
                timeout.as_millis()
            ),
        )
    }

    pub fn protocol<S: Into<String>>(description: S) -> Error {
        Error::new(ErrorKind::Protocol, description)
    }

    pub fn registration<S: Into<String>>(description: S) -> Error {
        Error::new(ErrorKind::Registration, description)
    }

    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::Kind(kind) => kind,
            ErrorRepr::WithDescription(kind, _) => kind,
        }
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Error {
        Error {
            repr: ErrorRepr::Kind(kind),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.repr {
            ErrorRepr::Kind(ref kind) => {
                write!(f, "{}", kind.as_str())
            }
            ErrorRepr::WithDescription(ref kind, ref description) => match *kind {
                ErrorKind::Unknown => {
                    write!(f, "{}", description)
                }
                _ => {
                    write!(f, "{}: {}", kind.as_str(), description)
                }
            },
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl std::error::Error for Error {}
