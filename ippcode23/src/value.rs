use std::fmt;

use crate::error::Error;

/// Runtime value of an IPPcode23 variable.
///
/// Every case is scalar (IPPcode23 has no heap-allocated compound types),
/// so this type derives `Clone` freely unlike a refcounted/heap-backed
/// value type would.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Str(String),
    Bool(bool),
    Nil,
    /// A variable has been declared (`DEFVAR`) but never assigned.
    Uninitialized,
}

/// The four declarable value types plus the pseudo-type of an
/// uninitialized variable, used by `TYPE` and by error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Int,
    Str,
    Bool,
    Nil,
}

impl Value {
    /// Textual type tag, as written by `TYPE` and reported in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Str(_) => "string",
            Self::Bool(_) => "bool",
            Self::Nil => "nil",
            Self::Uninitialized => "",
        }
    }

    pub fn value_type(&self) -> Option<ValueType> {
        match self {
            Self::Int(_) => Some(ValueType::Int),
            Self::Str(_) => Some(ValueType::Str),
            Self::Bool(_) => Some(ValueType::Bool),
            Self::Nil => Some(ValueType::Nil),
            Self::Uninitialized => None,
        }
    }

    /// Parses a literal's declared-type + text pair into a concrete `Value`.
    ///
    /// `text` for `string` literals must already have `\ddd` escapes
    /// decoded (done once, during XML loading).
    pub fn from_literal(type_tag: &str, text: &str) -> Result<Self, Error> {
        match type_tag {
            "int" => text
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| Error::OperandType(format!("invalid int literal {text:?}"))),
            "string" => Ok(Value::Str(text.to_owned())),
            "bool" => match text.to_ascii_lowercase().as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(Error::OperandType(format!("invalid bool literal {text:?}"))),
            },
            "nil" => {
                if text == "nil" {
                    Ok(Value::Nil)
                } else {
                    Err(Error::OperandType(format!("invalid nil literal {text:?}")))
                }
            }
            other => Err(Error::OperandType(format!("unknown literal type {other:?}"))),
        }
    }

    /// Decodes `\ddd` (three decimal digits) escapes left to right.
    ///
    /// Idempotent on strings containing no backslash.
    pub fn decode_string_escapes(raw: &str) -> String {
        let mut out = String::with_capacity(raw.len());
        let bytes = raw.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'\\' && i + 3 < bytes.len() && bytes[i + 1..i + 4].iter().all(u8::is_ascii_digit) {
                let digits = std::str::from_utf8(&bytes[i + 1..i + 4]).expect("ascii digits are valid utf8");
                let code: u32 = digits.parse().expect("three ascii digits parse as u32");
                if let Some(c) = char::from_u32(code) {
                    out.push(c);
                }
                i += 4;
            } else {
                // Advance by one *character*, not one byte, to stay UTF-8 safe.
                let ch = raw[i..].chars().next().expect("i is a char boundary");
                out.push(ch);
                i += ch.len_utf8();
            }
        }
        out
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Str(s) => write!(f, "{s}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Nil => write!(f, ""),
            Self::Uninitialized => write!(f, ""),
        }
    }
}
