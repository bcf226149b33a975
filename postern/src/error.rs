//! `postern` error types.
use std::{borrow::Cow, fmt};

use crate::{
    common::unit_error,
    postgres::{ProtocolError, ServerError},
};

/// A specialized [`Result`] type for `postern` operation.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// All possible error from the `postern` library.
pub struct Error {
    kind: ErrorKind,
}

/// All possible error kind from the `postern` library.
pub enum ErrorKind {
    /// This session and the backend no longer agree on the byte stream.
    Protocol(ProtocolError),
    /// The backend reported an error for the current operation.
    Server(ServerError),
    /// The operation was refused before any bytes were sent.
    Usage(UsageError),
    /// The session was dropped before the operation completed.
    Closed(ConnectionClosed),
}

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// The server error for this operation, if that is what failed it.
    pub fn as_server(&self) -> Option<&ServerError> {
        match &self.kind {
            ErrorKind::Server(err) => Some(err),
            _ => None,
        }
    }

    pub(crate) fn is_protocol(&self) -> bool {
        matches!(self.kind, ErrorKind::Protocol(_))
    }

    pub(crate) fn usage(reason: impl Into<Cow<'static, str>>) -> Error {
        UsageError { reason: reason.into() }.into()
    }
}

macro_rules! from {
    (<$ty:ty>$pat:pat => $body:expr) => {
        impl From<$ty> for Error {
            fn from($pat: $ty) -> Self {
                Self { kind: $body }
            }
        }
    };
}

from!(<ErrorKind>e => e);
from!(<ProtocolError>e => ErrorKind::Protocol(e));
from!(<ServerError>e => ErrorKind::Server(e));
from!(<UsageError>e => ErrorKind::Usage(e));
from!(<ConnectionClosed>e => ErrorKind::Closed(e));

impl std::error::Error for Error { }

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.kind, f)
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

impl std::error::Error for ErrorKind { }

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Protocol(e) => e.fmt(f),
            Self::Server(e) => e.fmt(f),
            Self::Usage(e) => e.fmt(f),
            Self::Closed(e) => e.fmt(f),
        }
    }
}

impl fmt::Debug for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

/// An operation refused before any bytes were sent.
pub struct UsageError {
    reason: Cow<'static, str>,
}

impl std::error::Error for UsageError { }

impl fmt::Display for UsageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

impl fmt::Debug for UsageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

unit_error! {
    /// An error when the session is gone before its operation completed.
    pub struct ConnectionClosed("connection closed before the operation completed");
}
