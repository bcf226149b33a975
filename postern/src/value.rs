//! Result value decoding.
use crate::postgres::{Oid, ProtocolError, oid};

/// A single decoded result column value.
///
/// Results always arrive in text format (the Bind message requests format
/// code zero for every result column), so decoding parses the text
/// representation for the numeric oids and falls back to utf8 text for
/// everything else.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    /// Decode the text representation of a value with the given oid.
    pub(crate) fn decode(oid: Oid, raw: &[u8]) -> Result<Value, ProtocolError> {
        match oid {
            oid::INT2 | oid::INT4 | oid::INT8 | oid::OID | oid::XID | oid::CID => {
                let val = std::str::from_utf8(raw)
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .ok_or(ProtocolError::convert(oid, "invalid integer value"))?;
                Ok(Value::Int(val))
            }
            oid::FLOAT4 | oid::FLOAT8 => {
                let val = std::str::from_utf8(raw)
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .ok_or(ProtocolError::convert(oid, "invalid floating point value"))?;
                Ok(Value::Float(val))
            }
            oid::BOOL => match raw {
                b"t" => Ok(Value::Bool(true)),
                b"f" => Ok(Value::Bool(false)),
                [_] => Err(ProtocolError::convert(oid, "invalid bool value")),
                _ => Err(ProtocolError::convert(oid, "invalid length for bool value")),
            },
            _ => {
                let text = std::str::from_utf8(raw).map_err(ProtocolError::NonUtf8)?;
                Ok(Value::Text(text.to_owned()))
            }
        }
    }

    /// Returns `true` for the `NULL` value.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(val) => Some(*val),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(val) => Some(*val),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(val) => Some(*val),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(val) => Some(val),
            _ => None,
        }
    }
}
