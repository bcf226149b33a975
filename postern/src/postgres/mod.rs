//! Postgres Frontend and Backend Protocol
//!
//! Docs here mostly quoted from the official postgres documentation.
//!
//! ## Messaging Overview
//!
//! All communication is through a stream of messages. The first byte of a message identifies the message type,
//! and the next four bytes specify the length of the rest of the message (this length count includes itself,
//! but not the message-type byte). The remaining contents of the message are determined by the message type.
//!
//! ```text
//! | u8 |        i32        | body
//! |----|-------------------|-----
//! | 43 | 00 | 00 | 00 | 32 |  ..
//!
//! Message Type -> length -> body
//! ```
//!
//! For historical reasons, the very first message sent by the client (the startup message)
//! has no initial message-type byte.
//!
//! ## Formats and Format Codes
//!
//! Data of a particular data type might be transmitted in any of several different formats.
//! As of PostgreSQL 7.4 the only supported formats are “text” and “binary”. Text has format
//! code zero, and Binary has format code one.
//!
//! Clients can specify a format code for each transmitted parameter value and for each column
//! of a query result. This library binds parameters in the format their type calls for, and
//! requests all result columns in [`Text`][PgFormat::Text] format.
//!
//! <https://www.postgresql.org/docs/17/protocol-overview.html>

mod pg_format;
mod error;

pub mod frontend;

pub use pg_format::PgFormat;
pub use frontend::FrontendProtocol;
pub use error::{ProtocolError, ServerError};

/// Postgres object identifier.
///
/// The oid type is implemented as an unsigned four-byte integer.
///
/// <https://www.postgresql.org/docs/current/datatype-oid.html>
pub type Oid = u32;

/// Object identifiers with dedicated value conversions.
///
/// Every other oid decodes as text.
pub mod oid {
    use super::Oid;

    pub const BOOL: Oid = 16;
    /// `int8` ~18 digit integer, 8-byte storage.
    pub const INT8: Oid = 20;
    /// `int2` -32 thousand to 32 thousand, 2-byte storage.
    pub const INT2: Oid = 21;
    /// `int4` -2 billion to 2 billion integer, 4-byte storage.
    pub const INT4: Oid = 23;
    /// `text` variable-length string, no limit specified.
    pub const TEXT: Oid = 25;
    pub const OID: Oid = 26;
    /// Transaction identifier.
    pub const XID: Oid = 28;
    /// Command identifier.
    pub const CID: Oid = 29;
    /// `float4` single-precision floating point number, 4-byte storage.
    pub const FLOAT4: Oid = 700;
    /// `float8` double-precision floating point number, 8-byte storage.
    pub const FLOAT8: Oid = 701;
}
