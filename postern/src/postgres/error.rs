//! Protocol and server error.
use std::{collections::BTreeMap, fmt, str::Utf8Error};

use super::Oid;
use crate::ext::BodyExt;

/// An error when translating buffer from postgres.
///
/// A protocol error means this session and the backend no longer agree on
/// the byte stream; the connection is closed when one is recorded.
#[derive(Debug)]
pub enum ProtocolError {
    /// Unknown message identifier byte.
    UnknownMessage { msgtype: u8 },
    /// An authentication specifier this client does not negotiate.
    UnknownAuth { method: i32 },
    /// A fixed-length message whose length field disagrees.
    InvalidLength { msgtype: u8, expect: usize, found: usize },
    /// Read past the end of a message body.
    Truncated { expect: usize, found: usize },
    /// Terminating zero not found.
    MissingNul,
    /// Data remaining after the last field of a message.
    Trailing { msgtype: u8 },
    /// A wire string that is not valid utf8.
    NonUtf8(Utf8Error),
    /// Declared message length smaller than the length field itself.
    InvalidMessageLength { length: i32 },
    /// Transaction status byte outside `I`, `E`, `T`.
    InvalidTransactionStatus { found: u8 },
    /// Negative field count in a row description or data row.
    NegativeFieldCount { found: i16 },
    /// Data row column count differs from the row description.
    FieldCountMismatch { expect: usize, found: usize },
    /// A column value size that is neither `-1` nor non-negative.
    InvalidValueSize { found: i32 },
    /// A result value that does not parse for its oid.
    Convert { oid: Oid, reason: &'static str },
    /// A message that the session state cannot accept.
    InvalidState { reason: &'static str },
}

impl ProtocolError {
    pub(crate) fn unknown(msgtype: u8) -> ProtocolError {
        Self::UnknownMessage { msgtype }
    }

    pub(crate) fn unknown_auth(method: i32) -> ProtocolError {
        Self::UnknownAuth { method }
    }

    pub(crate) fn invalid_length(msgtype: u8, expect: usize, found: usize) -> ProtocolError {
        Self::InvalidLength { msgtype, expect, found }
    }

    pub(crate) fn truncated(expect: usize, found: usize) -> ProtocolError {
        Self::Truncated { expect, found }
    }

    pub(crate) fn trailing(msgtype: u8) -> ProtocolError {
        Self::Trailing { msgtype }
    }

    pub(crate) fn convert(oid: Oid, reason: &'static str) -> ProtocolError {
        Self::Convert { oid, reason }
    }

    pub(crate) fn invalid_state(reason: &'static str) -> ProtocolError {
        Self::InvalidState { reason }
    }
}

impl std::error::Error for ProtocolError { }

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownMessage { msgtype } => {
                write!(f, "unknown message identifier {:?}", *msgtype as char)
            }
            Self::UnknownAuth { method } => {
                write!(f, "unsupported authentication specifier: {method}")
            }
            Self::InvalidLength { msgtype, expect, found } => write!(
                f,
                "invalid length for message {:?}, expected {expect}, got {found}",
                *msgtype as char,
            ),
            Self::Truncated { expect, found } => {
                write!(f, "message body too short, expected {expect} or more bytes, got {found}")
            }
            Self::MissingNul => f.write_str("terminating zero not found"),
            Self::Trailing { msgtype } => {
                write!(f, "data remaining in message {:?}", *msgtype as char)
            }
            Self::NonUtf8(err) => write!(f, "non utf8 wire string: {err}"),
            Self::InvalidMessageLength { length } => {
                write!(f, "declared message length {length} is smaller than the length field")
            }
            Self::InvalidTransactionStatus { found } => {
                write!(f, "invalid transaction status {:?}", *found as char)
            }
            Self::NegativeFieldCount { found } => write!(f, "negative field count {found}"),
            Self::FieldCountMismatch { expect, found } => write!(
                f,
                "data row has {found} values, row description has {expect} fields",
            ),
            Self::InvalidValueSize { found } => write!(f, "invalid column value size {found}"),
            Self::Convert { oid, reason } => write!(f, "cannot convert value with oid {oid}: {reason}"),
            Self::InvalidState { reason } => f.write_str(reason),
        }
    }
}

/// An error reported by the backend via `ErrorResponse`.
///
/// The message body consists of one or more identified fields, followed by a zero byte
/// as a terminator. Fields can appear in any order. For each field there is the following:
///
/// - `Byte1` A code identifying the field type; if zero, this is the message terminator
///   and no string follows. Since more field types might be added in future,
///   frontends should silently ignore fields of unrecognized type.
/// - `String` The field value.
///
/// <https://www.postgresql.org/docs/current/protocol-error-fields.html>
pub struct ServerError {
    fields: BTreeMap<char, String>,
}

impl ServerError {
    pub(crate) fn parse(mut body: &[u8]) -> Result<ServerError, ProtocolError> {
        let mut fields = BTreeMap::new();
        loop {
            match body.read_slice(1)?[0] {
                0 => break,
                code => {
                    let value = body.read_nul_str()?;
                    fields.insert(code as char, value.to_owned());
                }
            }
        }
        Ok(Self { fields })
    }

    /// Field value by its identifying code.
    pub fn field(&self, code: char) -> Option<&str> {
        self.fields.get(&code).map(String::as_str)
    }

    /// Severity, e.g. `ERROR`, `FATAL`, or `PANIC`.
    pub fn severity(&self) -> Option<&str> {
        self.field('S')
    }

    /// The SQLSTATE code for the error.
    pub fn code(&self) -> Option<&str> {
        self.field('C')
    }

    /// The primary human-readable error message.
    pub fn message(&self) -> Option<&str> {
        self.field('M')
    }
}

impl std::error::Error for ServerError { }

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}: {}",
            self.severity().unwrap_or("ERROR"),
            self.code().unwrap_or("?????"),
            self.message().unwrap_or("unknown server error"),
        )
    }
}

impl fmt::Debug for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_error_response() {
        let body = b"SERROR\0C42601\0Msyntax error at or near \"nul\"\0\0";
        let err = ServerError::parse(body).unwrap();
        assert_eq!(err.severity(), Some("ERROR"));
        assert_eq!(err.code(), Some("42601"));
        assert_eq!(err.message(), Some("syntax error at or near \"nul\""));
        assert_eq!(err.field('D'), None);
    }

    #[test]
    fn parse_unterminated() {
        assert!(ServerError::parse(b"SERROR\0").is_err());
        assert!(ServerError::parse(b"SERROR").is_err());
    }
}
