//! Core types for sqlbatch

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr, VariantNames};

use crate::argument::{parse_integer_literal, parse_real_literal};
use crate::{Result, SqlBatchError};

/// A database value, one of SQLite's five storage classes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// NULL value
    Null,
    /// 64-bit signed integer
    Integer(i64),
    /// 64-bit floating point
    Real(f64),
    /// UTF-8 string
    Text(String),
    /// Binary data
    Blob(Vec<u8>),
}

impl Value {
    /// Check if the value is NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Try to get as a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to get as f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Real(v) => Some(*v),
            Value::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Try to get as raw bytes
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Blob(b) => Some(b),
            _ => None,
        }
    }

    /// The argument type tag that produces this value
    pub fn argument_type(&self) -> ArgumentType {
        match self {
            Value::Null => ArgumentType::Null,
            Value::Integer(_) => ArgumentType::Integer,
            Value::Real(_) => ArgumentType::Real,
            Value::Text(_) => ArgumentType::Text,
            Value::Blob(_) => ArgumentType::Blob,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Real(v) => write!(f, "{}", v),
            Value::Text(v) => write!(f, "{}", v),
            Value::Blob(v) => write!(f, "X'{}'", hex::encode_upper(v)),
        }
    }
}

/// Declared type of a bound argument, spelled as the lowercase tag after `:`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    IntoStaticStr,
    VariantNames,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ArgumentType {
    Null,
    Integer,
    Real,
    Text,
    Blob,
}

impl ArgumentType {
    /// Convert the literal part of an argument spec into a value of this type.
    ///
    /// `null` ignores the literal, `text` and `blob` keep it byte for byte,
    /// numeric types must parse completely.
    pub fn coerce(self, literal: &str) -> Result<Value> {
        let value_error = |source| SqlBatchError::ArgumentValue {
            literal: literal.to_string(),
            ty: self,
            source,
        };

        Ok(match self {
            ArgumentType::Null => Value::Null,
            ArgumentType::Integer => Value::Integer(parse_integer_literal(literal).map_err(value_error)?),
            ArgumentType::Real => Value::Real(parse_real_literal(literal).map_err(value_error)?),
            ArgumentType::Text => Value::Text(literal.to_string()),
            ArgumentType::Blob => Value::Blob(literal.as_bytes().to_vec()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_argument_type_tags() {
        assert_eq!(
            ArgumentType::VARIANTS,
            &["null", "integer", "real", "text", "blob"]
        );
        assert_eq!("real".parse::<ArgumentType>().ok(), Some(ArgumentType::Real));
        assert!("INTEGER".parse::<ArgumentType>().is_err());
        assert!("date".parse::<ArgumentType>().is_err());
        assert_eq!(ArgumentType::Blob.to_string(), "blob");
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Null.to_string(), "NULL");
        assert_eq!(Value::Integer(-42).to_string(), "-42");
        assert_eq!(Value::Real(2.5).to_string(), "2.5");
        assert_eq!(Value::Text("hello".into()).to_string(), "hello");
        assert_eq!(Value::Blob(vec![0xde, 0xad, 0x01]).to_string(), "X'DEAD01'");
    }

    #[test]
    fn test_coerce_keeps_text_and_blob_verbatim() {
        assert_eq!(
            ArgumentType::Text.coerce(" 42 ").ok(),
            Some(Value::Text(" 42 ".into()))
        );
        assert_eq!(
            ArgumentType::Blob.coerce("ab\u{e9}").ok(),
            Some(Value::Blob(vec![b'a', b'b', 0xc3, 0xa9]))
        );
        assert_eq!(ArgumentType::Null.coerce("whatever").ok(), Some(Value::Null));
    }

    #[test]
    fn test_coerce_reports_type_and_literal() {
        let err = ArgumentType::Integer.coerce("12abc").unwrap_err();
        match err {
            SqlBatchError::ArgumentValue { literal, ty, .. } => {
                assert_eq!(literal, "12abc");
                assert_eq!(ty, ArgumentType::Integer);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_value_accessors() {
        assert!(Value::Null.is_null());
        assert_eq!(Value::Integer(7).as_i64(), Some(7));
        assert_eq!(Value::Integer(7).as_f64(), Some(7.0));
        assert_eq!(Value::Text("x".into()).as_str(), Some("x"));
        assert_eq!(Value::Blob(vec![1]).as_bytes(), Some(&[1u8][..]));
        assert_eq!(Value::Real(1.5).argument_type(), ArgumentType::Real);
    }
}
