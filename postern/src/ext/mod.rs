use bytes::{Buf, BufMut};

use crate::postgres::ProtocolError;

/// Integer signess in postgres docs is awful.
pub(crate) trait UsizeExt {
    /// Length is `usize` in rust, while sometime postgres want `u32`,
    /// this will panic when overflow instead of wrapping.
    fn to_u32(self) -> u32;
    /// Length is `usize` in rust, while sometime postgres want `u16`,
    /// this will panic when overflow instead of wrapping.
    fn to_u16(self) -> u16;
}

/// Nul string operation.
pub(crate) trait StrExt {
    /// String length plus nul (1).
    fn nul_string_len(&self) -> u32;
}

/// Nul string operation in [`BufMut`].
pub(crate) trait BufMutExt {
    /// Write string and nul termination.
    fn put_nul_string(&mut self, string: &str);
}

/// Checked reads over a message body cursor.
///
/// The cursor is a `&[u8]` advanced in place. Reads past the end of the
/// body fail with [`ProtocolError`] instead of panicking, since the body
/// length comes from the wire.
pub(crate) trait BodyExt<'a> {
    /// Read a big-endian `i16`.
    fn read_i16(&mut self) -> Result<i16, ProtocolError>;

    /// Read a big-endian `i32`.
    fn read_i32(&mut self) -> Result<i32, ProtocolError>;

    /// Read a big-endian `u32`.
    fn read_u32(&mut self) -> Result<u32, ProtocolError>;

    /// Read a nul terminated utf8 string, excluding the nul.
    fn read_nul_str(&mut self) -> Result<&'a str, ProtocolError>;

    /// Read `n` raw bytes.
    fn read_slice(&mut self, n: usize) -> Result<&'a [u8], ProtocolError>;
}

impl UsizeExt for usize {
    fn to_u32(self) -> u32 {
        self.try_into().expect("message size too large for protocol")
    }

    fn to_u16(self) -> u16 {
        self.try_into().expect("message size too large for protocol")
    }
}

impl StrExt for str {
    fn nul_string_len(&self) -> u32 {
        self.len().to_u32() + 1/* nul */
    }
}

impl<B: BufMut> BufMutExt for B {
    fn put_nul_string(&mut self, string: &str) {
        self.put(string.as_bytes());
        self.put_u8(b'\0');
    }
}

impl<'a> BodyExt<'a> for &'a [u8] {
    fn read_i16(&mut self) -> Result<i16, ProtocolError> {
        if self.len() < size_of::<i16>() {
            return Err(ProtocolError::truncated(size_of::<i16>(), self.len()));
        }
        Ok(self.get_i16())
    }

    fn read_i32(&mut self) -> Result<i32, ProtocolError> {
        if self.len() < size_of::<i32>() {
            return Err(ProtocolError::truncated(size_of::<i32>(), self.len()));
        }
        Ok(self.get_i32())
    }

    fn read_u32(&mut self) -> Result<u32, ProtocolError> {
        if self.len() < size_of::<u32>() {
            return Err(ProtocolError::truncated(size_of::<u32>(), self.len()));
        }
        Ok(self.get_u32())
    }

    fn read_nul_str(&mut self) -> Result<&'a str, ProtocolError> {
        let end = self
            .iter()
            .position(|e| matches!(e, b'\0'))
            .ok_or(ProtocolError::MissingNul)?;
        let (str, tail) = self.split_at(end);
        *self = &tail[1..]; // nul
        std::str::from_utf8(str).map_err(ProtocolError::NonUtf8)
    }

    fn read_slice(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        if self.len() < n {
            return Err(ProtocolError::truncated(n, self.len()));
        }
        let (head, tail) = self.split_at(n);
        *self = tail;
        Ok(head)
    }
}
