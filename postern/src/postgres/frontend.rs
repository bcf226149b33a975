//! Postgres Frontend Messages
//!
//! <https://www.postgresql.org/docs/current/protocol-message-formats.html>
use bytes::{BufMut, BytesMut};

use crate::{
    encode::Encoded,
    ext::{BufMutExt, StrExt, UsizeExt},
};

/// Write a frontend message to `buf`.
pub fn write<F: FrontendProtocol>(msg: F, buf: &mut BytesMut) {
    // msgtype + length
    const PREFIX: usize = 1 + 4;

    let size_hint = msg.size_hint();
    buf.reserve(PREFIX + size_hint as usize);

    let offset = buf.len();
    buf.put_u8(F::MSGTYPE);
    buf.put_u32(4 + size_hint);

    msg.encode(&mut *buf);

    assert_eq!(
        buf.len() - offset,
        PREFIX + size_hint as usize,
        "Frontend message body size not equal to size hint"
    );
}

/// A type which can be encoded into postgres frontend message.
pub trait FrontendProtocol {
    /// Message type.
    const MSGTYPE: u8;

    /// Size of the main body.
    ///
    /// Note that this is **only** the size of main body as oppose of actual postgres message
    /// which include the length itself.
    fn size_hint(&self) -> u32;

    /// Write the main body of the message.
    ///
    /// The length of body written must be equal to the
    /// length returned by [`size_hint`][FrontendProtocol::size_hint].
    fn encode(self, buf: impl BufMut);
}

/// Postgres Startup frontend message.
///
/// For historical reasons, the very first message sent by the client (the [`Startup`] message)
/// has no initial message-type byte, thus [`Startup`] does not implement [`FrontendProtocol`].
///
/// To write startup message, use [`Startup::write`].
#[derive(Debug)]
pub struct Startup<'a> {
    /// The database user name to connect as. Required; there is no default.
    pub user: &'a str,
    /// The database to connect to. Defaults to the user name.
    pub database: Option<&'a str>,
    /// A name for the connecting application, reported in `pg_stat_activity`.
    pub application_name: Option<&'a str>,
}

impl Startup<'_> {
    pub fn write(self, buf: &mut BytesMut) {
        let offset = buf.len();

        // Length of message contents in bytes, including self.
        // reserve 4 bytes for length
        buf.put_u32(0);

        // Int32(196608)
        // The protocol version number.
        // The most significant 16 bits are the major version number (3 for the protocol described here).
        // The least significant 16 bits are the minor version number (0 for the protocol described here).
        buf.put_u32(196_608);

        // The protocol version number is followed by one or more pairs of parameter name and value strings.

        buf.put_nul_string("user");
        buf.put_nul_string(self.user);

        if let Some(db) = self.database {
            buf.put_nul_string("database");
            buf.put_nul_string(db);
        }

        if let Some(app) = self.application_name {
            buf.put_nul_string("application_name");
            buf.put_nul_string(app);
        }

        // Run-time parameters set at backend start time, applied as session defaults.
        //
        // The value decoder assumes text results arrive in utf8 with ISO dates.

        buf.put_nul_string("DateStyle");
        buf.put_nul_string("ISO");
        buf.put_nul_string("client_encoding");
        buf.put_nul_string("UTF8");

        // A zero byte is required as a terminator after the last name/value pair.
        buf.put_u8(b'\0');

        // write the length
        let mut written_buf = &mut buf[offset..];
        written_buf.put_u32(written_buf.len().to_u32());
    }
}

/// Identifies the message as a simple query.
pub struct Query<'a> {
    /// the query string itself
    pub sql: &'a str,
}

impl FrontendProtocol for Query<'_> {
    const MSGTYPE: u8 = b'Q';

    fn size_hint(&self) -> u32 {
        self.sql.nul_string_len()
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put_nul_string(self.sql);
    }
}

/// Identifies the message as a Parse command.
pub struct Parse<'a> {
    /// Prepared statement name (an empty string selects the unnamed prepared statement).
    pub stmt_name: &'a str,
    /// The query string to be parsed.
    pub sql: &'a str,
    /// One oid is advertised per bound parameter.
    ///
    /// Note that postgres allows prespecifying fewer types than the query has parameters;
    /// this client always prespecifies all of them, from the encoded values.
    pub params: &'a [Encoded],
}

impl FrontendProtocol for Parse<'_> {
    const MSGTYPE: u8 = b'P';

    fn size_hint(&self) -> u32 {
        self.stmt_name.nul_string_len()
            + self.sql.nul_string_len()
            + 2
            + 4 * self.params.len().to_u32()
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put_nul_string(self.stmt_name);
        buf.put_nul_string(self.sql);
        buf.put_u16(self.params.len().to_u16());
        for param in self.params {
            buf.put_u32(param.oid());
        }
    }
}

/// Identifies the message as a Bind command.
///
/// Parameters are sent in the format their [`Encoded`] value carries; all result
/// columns are requested in text format with a single result-format code.
pub struct Bind<'a> {
    /// The name of the destination portal (an empty string selects the unnamed portal).
    pub portal_name: &'a str,
    /// The name of the source prepared statement (an empty string selects the unnamed prepared statement).
    pub stmt_name: &'a str,
    /// The parameter values, one per query placeholder.
    pub params: &'a [Encoded],
}

impl FrontendProtocol for Bind<'_> {
    const MSGTYPE: u8 = b'B';

    fn size_hint(&self) -> u32 {
        let params: u32 = self
            .params
            .iter()
            .map(|param| 4 + param.payload().map_or(0, <[u8]>::len).to_u32())
            .sum();
        self.portal_name.nul_string_len()
            + self.stmt_name.nul_string_len()
            + 2
            + 2 * self.params.len().to_u32()
            + 2
            + params
            + 2
            + 2
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put_nul_string(self.portal_name);
        buf.put_nul_string(self.stmt_name);

        // The number of parameter format codes, then one format code per parameter.
        buf.put_u16(self.params.len().to_u16());
        for param in self.params {
            buf.put_u16(param.format().format_code());
        }

        // Int32 The length of the parameter value, in bytes (this count does not include itself).
        // Can be zero. As a special case, -1 indicates a NULL parameter value.
        // No value bytes follow in the NULL case.
        buf.put_u16(self.params.len().to_u16());
        for param in self.params {
            buf.put_i32(param.size());
            if let Some(payload) = param.payload() {
                buf.put(payload);
            }
        }

        // A single result-column format code, applied to all result columns: text.
        buf.put_u16(1);
        buf.put_u16(0);
    }
}

/// Identifies the message as a Describe command.
pub struct Describe<'a> {
    /// 'S' to describe a prepared statement; or 'P' to describe a portal.
    pub kind: u8,
    /// The name of the prepared statement or portal to describe
    /// (an empty string selects the unnamed prepared statement or portal).
    pub name: &'a str,
}

impl FrontendProtocol for Describe<'_> {
    const MSGTYPE: u8 = b'D';

    fn size_hint(&self) -> u32 {
        1 + self.name.nul_string_len()
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put_u8(self.kind);
        buf.put_nul_string(self.name);
    }
}

/// Identifies the message as an Execute command.
pub struct Execute<'a> {
    /// The name of the portal to execute (an empty string selects the unnamed portal).
    pub portal_name: &'a str,
    /// Maximum number of rows to return, if portal contains a query that returns rows
    /// (ignored otherwise). Zero denotes “no limit”.
    pub max_row: u32,
}

impl FrontendProtocol for Execute<'_> {
    const MSGTYPE: u8 = b'E';

    fn size_hint(&self) -> u32 {
        self.portal_name.nul_string_len() + 4
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put_nul_string(self.portal_name);
        buf.put_u32(self.max_row);
    }
}

/// Identifies the message as a Flush command.
pub struct Flush;

impl FrontendProtocol for Flush {
    const MSGTYPE: u8 = b'H';

    fn size_hint(&self) -> u32 { 0 }

    fn encode(self, _: impl BufMut) { }
}

/// Identifies the message as a Sync command.
pub struct Sync;

impl FrontendProtocol for Sync {
    const MSGTYPE: u8 = b'S';

    fn size_hint(&self) -> u32 { 0 }

    fn encode(self, _: impl BufMut) { }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn startup_layout() {
        let mut buf = BytesMut::new();
        Startup { user: "u", database: None, application_name: None }.write(&mut buf);

        let mut expected = Vec::new();
        expected.extend_from_slice(&[0, 0, 0, 0x33, 0, 3, 0, 0]);
        expected.extend_from_slice(b"user\0u\0DateStyle\0ISO\0client_encoding\0UTF8\0\0");
        assert_eq!(&buf[..], &expected[..]);
    }

    #[test]
    fn startup_optional_parameters() {
        let mut buf = BytesMut::new();
        Startup { user: "u", database: Some("db"), application_name: Some("app") }.write(&mut buf);

        let len = u32::from_be_bytes(buf[..4].try_into().unwrap());
        assert_eq!(len as usize, buf.len());
        let body = &buf[8..];
        assert_eq!(
            body,
            &b"user\0u\0database\0db\0application_name\0app\0\
               DateStyle\0ISO\0client_encoding\0UTF8\0\0"[..],
        );
    }

    #[test]
    fn simple_query_layout() {
        let mut buf = BytesMut::new();
        write(Query { sql: "SELECT 1" }, &mut buf);
        assert_eq!(&buf[..], b"Q\x00\x00\x00\x0dSELECT 1\x00");
    }

    #[test]
    fn fixed_messages() {
        let mut buf = BytesMut::new();
        write(Describe { kind: b'P', name: "" }, &mut buf);
        write(Execute { portal_name: "", max_row: 0 }, &mut buf);
        write(Flush, &mut buf);
        write(Sync, &mut buf);
        assert_eq!(
            &buf[..],
            b"D\x00\x00\x00\x06P\x00\
              E\x00\x00\x00\x09\x00\x00\x00\x00\x00\
              H\x00\x00\x00\x04\
              S\x00\x00\x00\x04",
        );
    }
}
