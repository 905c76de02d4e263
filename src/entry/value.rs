//! Typed payloads
//!
//! `Value` is the closed set of payload kinds the store understands. Each
//! variant maps to exactly one `ValueType` tag on disk.

use std::fmt;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{CaskError, Result};

/// One-byte tag describing how a payload is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum ValueType {
    /// `i64`, 8 bytes big-endian
    Int = 1,
    /// `f64` bit pattern, 8 bytes big-endian
    Float = 2,
    /// single byte, 0 or 1
    Bool = 3,
    /// UTF-8 text
    Str = 4,
    /// opaque bytes
    Bytes = 5,
    /// bincode-encoded serde value
    Structured = 6,
}

impl ValueType {
    /// The tag byte written to disk
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Payload width for fixed-width kinds
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            ValueType::Int | ValueType::Float => Some(8),
            ValueType::Bool => Some(1),
            ValueType::Str | ValueType::Bytes | ValueType::Structured => None,
        }
    }
}

impl TryFrom<u8> for ValueType {
    type Error = CaskError;

    fn try_from(tag: u8) -> Result<Self> {
        match tag {
            1 => Ok(ValueType::Int),
            2 => Ok(ValueType::Float),
            3 => Ok(ValueType::Bool),
            4 => Ok(ValueType::Str),
            5 => Ok(ValueType::Bytes),
            6 => Ok(ValueType::Structured),
            other => Err(CaskError::UnsupportedType(format!("unknown type tag {}", other))),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::Bool => "bool",
            ValueType::Str => "str",
            ValueType::Bytes => "bytes",
            ValueType::Structured => "structured",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Value
// =============================================================================

/// A typed key or value payload
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Bytes(Bytes),
    /// Already-encoded structured payload, see [`Value::structured`]
    Structured(Bytes),
}

impl Value {
    /// Tag for this payload
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Int(_) => ValueType::Int,
            Value::Float(_) => ValueType::Float,
            Value::Bool(_) => ValueType::Bool,
            Value::Str(_) => ValueType::Str,
            Value::Bytes(_) => ValueType::Bytes,
            Value::Structured(_) => ValueType::Structured,
        }
    }

    /// Encode the payload bytes (no header)
    pub fn encode(&self) -> Bytes {
        match self {
            Value::Int(v) => Bytes::copy_from_slice(&v.to_be_bytes()),
            Value::Float(v) => Bytes::copy_from_slice(&v.to_bits().to_be_bytes()),
            Value::Bool(v) => Bytes::copy_from_slice(&[*v as u8]),
            Value::Str(s) => Bytes::copy_from_slice(s.as_bytes()),
            Value::Bytes(b) | Value::Structured(b) => b.clone(),
        }
    }

    /// Interpret `bytes` as a payload of kind `kind`
    pub fn decode(kind: ValueType, bytes: &[u8]) -> Result<Value> {
        if let Some(width) = kind.fixed_width() {
            if bytes.len() != width {
                return Err(CaskError::CorruptEntry(format!(
                    "{} payload must be {} bytes, got {}",
                    kind,
                    width,
                    bytes.len()
                )));
            }
        }

        let value = match kind {
            ValueType::Int => Value::Int(i64::from_be_bytes(fixed8(bytes)?)),
            ValueType::Float => Value::Float(f64::from_bits(u64::from_be_bytes(fixed8(bytes)?))),
            ValueType::Bool => match bytes[0] {
                0 => Value::Bool(false),
                1 => Value::Bool(true),
                other => {
                    return Err(CaskError::CorruptEntry(format!(
                        "bool payload must be 0 or 1, got {}",
                        other
                    )))
                }
            },
            ValueType::Str => {
                let text = std::str::from_utf8(bytes).map_err(|e| {
                    CaskError::CorruptEntry(format!("str payload is not UTF-8: {}", e))
                })?;
                Value::Str(text.to_string())
            }
            ValueType::Bytes => Value::Bytes(Bytes::copy_from_slice(bytes)),
            ValueType::Structured => Value::Structured(Bytes::copy_from_slice(bytes)),
        };
        Ok(value)
    }

    /// Encode any serde value as a structured payload
    pub fn structured<T: Serialize>(value: &T) -> Result<Value> {
        let bytes = bincode::serialize(value)?;
        Ok(Value::Structured(Bytes::from(bytes)))
    }

    /// Decode a structured payload back into `T`
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        match self {
            Value::Structured(bytes) => Ok(bincode::deserialize(bytes)?),
            other => Err(CaskError::UnsupportedType(format!(
                "expected structured value, found {}",
                other.value_type()
            ))),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

fn fixed8(bytes: &[u8]) -> Result<[u8; 8]> {
    bytes
        .try_into()
        .map_err(|_| CaskError::CorruptEntry(format!("expected 8 bytes, got {}", bytes.len())))
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Str(s) => f.write_str(s),
            Value::Bytes(b) => {
                f.write_str("0x")?;
                for byte in b.iter() {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
            Value::Structured(b) => write!(f, "<structured {} bytes>", b.len()),
        }
    }
}

// -----------------------------------------------------------------------------
// Conversions
// -----------------------------------------------------------------------------

macro_rules! impl_from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::Int(i64::from(v))
                }
            }
        )*
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl TryFrom<u64> for Value {
    type Error = CaskError;

    fn try_from(v: u64) -> Result<Self> {
        i64::try_from(v)
            .map(Value::Int)
            .map_err(|_| CaskError::InvalidValue(format!("{} does not fit in an int payload", v)))
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(Bytes::copy_from_slice(v))
    }
}

impl<const N: usize> From<&[u8; N]> for Value {
    fn from(v: &[u8; N]) -> Self {
        Value::Bytes(Bytes::copy_from_slice(v))
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(Bytes::from(v))
    }
}

impl From<Bytes> for Value {
    fn from(v: Bytes) -> Self {
        Value::Bytes(v)
    }
}

// =============================================================================
// Key
// =============================================================================

/// Index key: the encoded payload together with its tag
///
/// Two keys are equal only if both tag and bytes match, so `Int(1)` and
/// `Str("1")` never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key {
    kind: ValueType,
    bytes: Bytes,
}

impl Key {
    pub fn new(kind: ValueType, bytes: impl Into<Bytes>) -> Self {
        Self {
            kind,
            bytes: bytes.into(),
        }
    }

    pub fn kind(&self) -> ValueType {
        self.kind
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Encoded length in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Decode back into a typed value
    pub fn to_value(&self) -> Result<Value> {
        Value::decode(self.kind, &self.bytes)
    }
}

impl From<Value> for Key {
    fn from(value: Value) -> Self {
        Key::from(&value)
    }
}

impl From<&Value> for Key {
    fn from(value: &Value) -> Self {
        Key {
            kind: value.value_type(),
            bytes: value.encode(),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_value() {
            Ok(value) => write!(f, "{}", value),
            Err(_) => write!(f, "<{} {} bytes>", self.kind, self.bytes.len()),
        }
    }
}
