//! Typed argument specs
//!
//! An argument spec has the shape `[name "="] value [":" type]`:
//!
//! ```text
//! 10                 positional text "10"
//! 10:integer         positional integer 10
//! count=0x10:integer named integer 16
//! null               positional NULL
//! ```
//!
//! Unnamed arguments bind by their ordinal position within the call.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{ArgumentType, LiteralError, Result, SqlBatchError, Value};

/// A named-or-positional, explicitly typed statement parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundArgument {
    name: Option<String>,
    value: Value,
}

impl BoundArgument {
    /// Create an argument bound by ordinal position
    pub fn positional(value: Value) -> Self {
        Self { name: None, value }
    }

    /// Create an argument bound by parameter name. An empty name is positional.
    pub fn named(name: impl Into<String>, value: Value) -> Self {
        let name = name.into();
        Self {
            name: (!name.is_empty()).then_some(name),
            value,
        }
    }

    /// Parse one argument spec.
    ///
    /// The name is everything before the first `=`, the type tag everything
    /// after the first `:` of the remainder. Without a tag the literal `null`
    /// is NULL and anything else is text, even when it looks numeric.
    pub fn parse(raw: &str) -> Result<Self> {
        let (name, rest) = raw.split_once('=').unwrap_or(("", raw));

        let (literal, ty) = match rest.split_once(':') {
            Some((literal, tag)) => {
                let ty = tag
                    .parse::<ArgumentType>()
                    .map_err(|_| SqlBatchError::UnknownArgumentType(tag.to_string()))?;
                (literal, ty)
            }
            None if rest == "null" => (rest, ArgumentType::Null),
            None => (rest, ArgumentType::Text),
        };

        let value = ty.coerce(literal)?;
        Ok(Self::named(name, value))
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn is_positional(&self) -> bool {
        self.name.is_none()
    }
}

impl FromStr for BoundArgument {
    type Err = SqlBatchError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for BoundArgument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.name {
            write!(f, "{}=", name)?;
        }
        match &self.value {
            Value::Null => write!(f, "null"),
            Value::Blob(bytes) => write!(f, "{}:blob", String::from_utf8_lossy(bytes)),
            other => write!(f, "{}:{}", other, other.argument_type()),
        }
    }
}

/// Parse a signed 64-bit integer, inferring the base from its prefix:
/// `0x` hex, `0o` or a bare leading `0` octal, `0b` binary, decimal otherwise.
///
/// `_` may separate digits (`1_000`, `0x_ff`). Values outside the i64 range
/// are rejected, never wrapped.
pub fn parse_integer_literal(literal: &str) -> std::result::Result<i64, LiteralError> {
    let (sign, unsigned) = match literal.as_bytes().first() {
        Some(b'+') => ("+", &literal[1..]),
        Some(b'-') => ("-", &literal[1..]),
        _ => ("", literal),
    };

    if unsigned.contains('_') && !separators_ok(unsigned) {
        return Err(LiteralError::Separator);
    }

    let (radix, digits) = split_radix(unsigned);
    let digits: String = digits.chars().filter(|c| *c != '_').collect();

    // always spell the sign so a second one after the prefix ("0x-5") is an invalid digit
    let sign = if sign.is_empty() { "+" } else { sign };
    Ok(i64::from_str_radix(&format!("{sign}{digits}"), radix)?)
}

/// Parse a 64-bit float: decimal (`1.5e3`), hexadecimal with a binary
/// exponent (`0x1.8p3`), `inf`/`infinity` or `nan`.
///
/// `_` may separate digits as for integers. Overflow to infinity is only
/// accepted when the literal spells infinity.
pub fn parse_real_literal(literal: &str) -> std::result::Result<f64, LiteralError> {
    let (negative, unsigned) = match literal.as_bytes().first() {
        Some(b'+') => (false, &literal[1..]),
        Some(b'-') => (true, &literal[1..]),
        _ => (false, literal),
    };

    if unsigned.contains('_') && !separators_ok(unsigned) {
        return Err(LiteralError::Separator);
    }
    let unsigned: String = unsigned.chars().filter(|c| *c != '_').collect();

    let magnitude = if let Some(body) = unsigned.strip_prefix("0x").or_else(|| unsigned.strip_prefix("0X")) {
        parse_hex_float(body)?
    } else {
        // a second sign after the first one is a syntax error
        let value: f64 = format!("+{unsigned}").parse()?;
        if value.is_infinite() && !unsigned.to_ascii_lowercase().starts_with("inf") {
            return Err(LiteralError::OutOfRange);
        }
        value
    };

    Ok(if negative { -magnitude } else { magnitude })
}

/// Hex digits with an optional point, then a mandatory `p` exponent.
fn parse_hex_float(body: &str) -> std::result::Result<f64, LiteralError> {
    let (mantissa, exponent) = body.split_once(['p', 'P']).ok_or(LiteralError::HexFloat)?;
    let exponent = parse_binary_exponent(exponent)?;

    let mut bits: u64 = 0;
    let mut shift: i64 = 0;
    let mut inexact = false;
    let mut any_digit = false;
    let mut after_point = false;
    for c in mantissa.chars() {
        if c == '.' && !after_point {
            after_point = true;
            continue;
        }
        let digit = c.to_digit(16).ok_or(LiteralError::HexFloat)?;
        any_digit = true;
        if bits >> 60 == 0 {
            bits = bits << 4 | u64::from(digit);
            if after_point {
                shift -= 4;
            }
        } else {
            // past 60 significant bits only whether anything was dropped matters for rounding
            inexact |= digit != 0;
            if !after_point {
                shift += 4;
            }
        }
    }
    if !any_digit {
        return Err(LiteralError::HexFloat);
    }
    if inexact {
        bits |= 1;
    }

    let value = scale_by_power_of_two(bits as f64, exponent + shift);
    if value.is_infinite() {
        return Err(LiteralError::OutOfRange);
    }
    Ok(value)
}

/// Decimal exponent with optional sign. Saturates far outside the f64 range.
fn parse_binary_exponent(text: &str) -> std::result::Result<i64, LiteralError> {
    let (negative, digits) = match text.as_bytes().first() {
        Some(b'+') => (false, &text[1..]),
        Some(b'-') => (true, &text[1..]),
        _ => (false, text),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(LiteralError::HexFloat);
    }
    let magnitude = digits
        .bytes()
        .fold(0i64, |acc, b| (acc * 10 + i64::from(b - b'0')).min(100_000));
    Ok(if negative { -magnitude } else { magnitude })
}

fn scale_by_power_of_two(mut value: f64, mut exponent: i64) -> f64 {
    // 2^±1000 are exact normal numbers; step with them until powi can finish
    while exponent > 1000 && value.is_finite() {
        value *= 2f64.powi(1000);
        exponent -= 1000;
    }
    while exponent < -1000 && value != 0.0 {
        value *= 2f64.powi(-1000);
        exponent += 1000;
    }
    value * 2f64.powi(exponent.clamp(-2000, 2000) as i32)
}

fn split_radix(unsigned: &str) -> (u32, &str) {
    let prefix = unsigned.get(..2).map(str::to_ascii_lowercase);
    match prefix.as_deref() {
        Some("0x") => (16, &unsigned[2..]),
        Some("0o") => (8, &unsigned[2..]),
        Some("0b") => (2, &unsigned[2..]),
        _ if unsigned.len() > 1 && unsigned.starts_with('0') => (8, &unsigned[1..]),
        _ => (10, unsigned),
    }
}

/// An underscore must follow a digit or base prefix and be followed by a digit.
fn separators_ok(unsigned: &str) -> bool {
    #[derive(PartialEq)]
    enum Saw {
        Start,
        Digit,
        Underscore,
        Other,
    }

    let bytes = unsigned.as_bytes();
    let mut saw = Saw::Start;
    let mut i = 0;
    let mut hex = false;

    if bytes.len() >= 2 && bytes[0] == b'0' {
        let marker = bytes[1].to_ascii_lowercase();
        if matches!(marker, b'b' | b'o' | b'x') {
            i = 2;
            saw = Saw::Digit;
            hex = marker == b'x';
        }
    }

    for &b in &bytes[i..] {
        if b.is_ascii_digit() || (hex && b.is_ascii_hexdigit()) {
            saw = Saw::Digit;
        } else if b == b'_' {
            if saw != Saw::Digit {
                return false;
            }
            saw = Saw::Underscore;
        } else {
            if saw == Saw::Underscore {
                return false;
            }
            saw = Saw::Other;
        }
    }

    saw != Saw::Underscore
}
