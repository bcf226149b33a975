//! Query parameter encoding.
use bytes::Bytes;
use std::fmt;

use crate::postgres::{Oid, PgFormat, oid};

/// Value that can be encoded to be bound to a query parameter.
pub trait Encode {
    /// Encode the value.
    fn encode(&self) -> Encoded;
}

/// Postgres encoded bind parameter.
///
/// Carries the wire payload together with the parameter oid and
/// [format][PgFormat]. A missing payload is the `NULL` parameter,
/// transmitted as size `-1` with no value bytes.
pub struct Encoded {
    oid: Oid,
    format: PgFormat,
    payload: Option<Bytes>,
}

impl Encoded {
    /// Create [`Encoded`] `NULL`.
    ///
    /// An unspecified parameter type defaults to text.
    pub fn null() -> Encoded {
        Encoded {
            oid: oid::TEXT,
            format: PgFormat::Text,
            payload: None,
        }
    }

    /// Create [`Encoded`] text from any displayable value.
    pub fn text(value: impl fmt::Display) -> Encoded {
        Encoded {
            oid: oid::TEXT,
            format: PgFormat::Text,
            payload: Some(value.to_string().into_bytes().into()),
        }
    }

    /// Returns this parameter oid.
    pub fn oid(&self) -> Oid {
        self.oid
    }

    /// Returns this parameter transmission format.
    pub fn format(&self) -> PgFormat {
        self.format
    }

    /// Returns `true` for the `NULL` parameter.
    pub fn is_null(&self) -> bool {
        self.payload.is_none()
    }

    /// The length of the parameter value, in bytes (this count does not include itself).
    ///
    /// Can be zero. As a special case, -1 indicates a NULL parameter value.
    /// No value bytes follow in the NULL case.
    pub(crate) fn size(&self) -> i32 {
        match &self.payload {
            Some(payload) => payload.len() as i32,
            None => -1,
        }
    }

    pub(crate) fn payload(&self) -> Option<&[u8]> {
        self.payload.as_deref()
    }
}

impl fmt::Debug for Encoded {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("Encoded")
            .field(match &self.payload {
                Some(payload) => payload,
                None => &"NULL",
            })
            .field(&self.oid)
            .finish()
    }
}

impl Encode for i16 {
    fn encode(&self) -> Encoded {
        i32::from(*self).encode()
    }
}

impl Encode for i32 {
    fn encode(&self) -> Encoded {
        Encoded {
            oid: oid::INT4,
            format: PgFormat::Binary,
            payload: Some(Bytes::copy_from_slice(&self.to_be_bytes())),
        }
    }
}

impl Encode for i64 {
    /// Values within `int4` range bind as `int4`.
    fn encode(&self) -> Encoded {
        match i32::try_from(*self) {
            Ok(val) => val.encode(),
            Err(_) => Encoded {
                oid: oid::INT8,
                format: PgFormat::Binary,
                payload: Some(Bytes::copy_from_slice(&self.to_be_bytes())),
            },
        }
    }
}

impl Encode for i128 {
    /// Values beyond `int8` range fall back to their decimal text form.
    fn encode(&self) -> Encoded {
        match i64::try_from(*self) {
            Ok(val) => val.encode(),
            Err(_) => Encoded {
                oid: oid::TEXT,
                format: PgFormat::Text,
                payload: Some(Bytes::copy_from_slice(
                    itoa::Buffer::new().format(*self).as_bytes(),
                )),
            },
        }
    }
}

impl Encode for bool {
    fn encode(&self) -> Encoded {
        Encoded {
            oid: oid::BOOL,
            format: PgFormat::Text,
            payload: Some(Bytes::from_static(match self {
                true => b"t",
                false => b"f",
            })),
        }
    }
}

impl Encode for f32 {
    fn encode(&self) -> Encoded {
        f64::from(*self).encode()
    }
}

impl Encode for f64 {
    fn encode(&self) -> Encoded {
        Encoded {
            oid: oid::FLOAT8,
            format: PgFormat::Binary,
            payload: Some(Bytes::copy_from_slice(&self.to_be_bytes())),
        }
    }
}

impl Encode for str {
    fn encode(&self) -> Encoded {
        Encoded {
            oid: oid::TEXT,
            format: PgFormat::Text,
            payload: Some(Bytes::copy_from_slice(self.as_bytes())),
        }
    }
}

impl Encode for String {
    fn encode(&self) -> Encoded {
        self.as_str().encode()
    }
}

impl<T: Encode + ?Sized> Encode for &T {
    fn encode(&self) -> Encoded {
        T::encode(self)
    }
}

impl<T: Encode> Encode for Option<T> {
    fn encode(&self) -> Encoded {
        match self {
            Some(val) => val.encode(),
            None => Encoded::null(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn integer_oid_by_range() {
        assert_eq!(42i64.encode().oid(), oid::INT4);
        assert_eq!(i64::from(i32::MAX).encode().oid(), oid::INT4);
        assert_eq!(i64::from(i32::MIN).encode().oid(), oid::INT4);
        assert_eq!((i64::from(i32::MAX) + 1).encode().oid(), oid::INT8);
        assert_eq!((i64::from(i32::MIN) - 1).encode().oid(), oid::INT8);
        assert_eq!(i128::from(i64::MAX).encode().oid(), oid::INT8);
        assert_eq!((i128::from(i64::MAX) + 1).encode().oid(), oid::TEXT);
    }

    #[test]
    fn int4_wire_form() {
        let param = 42.encode();
        assert_eq!(param.format().format_code(), 1);
        assert_eq!(param.size(), 4);
        assert_eq!(param.payload(), Some(&[0, 0, 0, 0x2a][..]));
    }

    #[test]
    fn int8_wire_form() {
        let param = (i64::from(i32::MAX) + 1).encode();
        assert_eq!(param.size(), 8);
        assert_eq!(param.payload(), Some(&[0, 0, 0, 0, 0x80, 0, 0, 0][..]));
    }

    #[test]
    fn oversized_integer_is_decimal_text() {
        let param = (i128::from(i64::MAX) + 1).encode();
        assert_eq!(param.format().format_code(), 0);
        assert_eq!(param.payload(), Some(b"9223372036854775808".as_slice()));
    }

    #[test]
    fn bool_is_single_text_byte() {
        assert_eq!(true.encode().payload(), Some(b"t".as_slice()));
        assert_eq!(false.encode().payload(), Some(b"f".as_slice()));
        assert_eq!(true.encode().format().format_code(), 0);
        assert_eq!(true.encode().size(), 1);
    }

    #[test]
    fn float_is_binary_ieee754() {
        let param = 1.5f64.encode();
        assert_eq!(param.oid(), oid::FLOAT8);
        assert_eq!(param.payload(), Some(&1.5f64.to_be_bytes()[..]));
    }

    #[test]
    fn null_defaults_to_text() {
        let param = Encoded::null();
        assert_eq!(param.oid(), oid::TEXT);
        assert_eq!(param.size(), -1);
        assert_eq!(param.payload(), None);
        assert_eq!(None::<i32>.encode().size(), -1);
    }

    #[test]
    fn display_fallback() {
        let param = Encoded::text('x');
        assert_eq!(param.oid(), oid::TEXT);
        assert_eq!(param.payload(), Some(b"x".as_slice()));
    }
}
