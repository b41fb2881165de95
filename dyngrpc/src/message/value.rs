//! Scalar field values and type-directed conversion.
//!
//! [`Value`] is the owned runtime representation of a single scalar field.
//! [`coerce`] normalizes any integer-like, float-like or textual input into
//! the variant canonical for a field's declared scalar type, so the wire
//! codec only ever sees values that match their declaration.

use crate::descriptor::{FieldDescriptor, ScalarType};
use crate::message::MessageError;
use bytes::Bytes;

/// A single scalar field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    F64(f64),
    F32(f32),
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    Bool(bool),
    String(String),
    Bytes(Bytes),
}

impl Value {
    /// A short name for the value's kind, used in conversion errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::F64(_) => "f64",
            Value::F32(_) => "f32",
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::U32(_) => "u32",
            Value::U64(_) => "u64",
            Value::Bool(_) => "bool",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::F64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Value::F32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::I32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Value::U32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::U64(v) => Some(*v),
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
            Value::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Value::Bytes(v) => Some(v),
            _ => None,
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::F64(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::F32(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::I32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::I64(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::U32(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::U64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
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

/// Converts `value` into the variant canonical for the field's declared
/// scalar type. Integer-like values convert across widths with range checks,
/// numeric strings parse, boolean text coerces. Incompatible inputs fail
/// with [`MessageError::Conversion`].
pub(crate) fn coerce(field: &FieldDescriptor, value: Value) -> Result<Value, MessageError> {
    let kind = value.kind();
    let coerced = match field.scalar() {
        ScalarType::Double => to_float(&value).map(Value::F64),
        ScalarType::Float => to_float(&value).map(|v| Value::F32(v as f32)),
        ScalarType::Int32 | ScalarType::Sint32 | ScalarType::Sfixed32 => to_int(&value)
            .and_then(|v| i32::try_from(v).ok())
            .map(Value::I32),
        ScalarType::Int64 | ScalarType::Sint64 | ScalarType::Sfixed64 => to_int(&value)
            .and_then(|v| i64::try_from(v).ok())
            .map(Value::I64),
        ScalarType::Uint32 | ScalarType::Fixed32 => to_int(&value)
            .and_then(|v| u32::try_from(v).ok())
            .map(Value::U32),
        ScalarType::Uint64 | ScalarType::Fixed64 => to_int(&value)
            .and_then(|v| u64::try_from(v).ok())
            .map(Value::U64),
        ScalarType::Bool => match &value {
            Value::Bool(b) => Some(Value::Bool(*b)),
            Value::String(s) => s.trim().parse::<bool>().ok().map(Value::Bool),
            _ => None,
        },
        ScalarType::String => match value {
            Value::String(s) => Some(Value::String(s)),
            Value::Bool(v) => Some(Value::String(v.to_string())),
            Value::F64(v) => Some(Value::String(v.to_string())),
            Value::F32(v) => Some(Value::String(v.to_string())),
            Value::I32(v) => Some(Value::String(v.to_string())),
            Value::I64(v) => Some(Value::String(v.to_string())),
            Value::U32(v) => Some(Value::String(v.to_string())),
            Value::U64(v) => Some(Value::String(v.to_string())),
            Value::Bytes(_) => None,
        },
        ScalarType::Bytes => match value {
            Value::Bytes(b) => Some(Value::Bytes(b)),
            Value::String(s) => Some(Value::Bytes(Bytes::from(s.into_bytes()))),
            _ => None,
        },
    };

    coerced.ok_or_else(|| MessageError::Conversion {
        field: field.name().to_string(),
        detail: format!("cannot convert {kind} value to {}", field.scalar()),
    })
}

/// Converts a JSON value into the field's declared scalar representation.
/// Arrays and objects are rejected (nested/repeated fields are unsupported).
pub(crate) fn from_json(
    field: &FieldDescriptor,
    json: &serde_json::Value,
) -> Result<Value, MessageError> {
    let raw = match json {
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(v) = n.as_i64() {
                Value::I64(v)
            } else if let Some(v) = n.as_u64() {
                Value::U64(v)
            } else {
                Value::F64(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        serde_json::Value::String(s) => Value::String(s.clone()),
        _ => {
            return Err(MessageError::Conversion {
                field: field.name().to_string(),
                detail: "JSON arrays and objects are not supported for scalar fields".to_string(),
            });
        }
    };
    coerce(field, raw)
}

/// Renders a field value as JSON. Bytes render as UTF-8 text, which is lossy
/// for non-UTF-8 payloads.
pub(crate) fn to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::F64(v) => float_to_json(*v),
        Value::F32(v) => float_to_json(f64::from(*v)),
        Value::I32(v) => serde_json::Value::from(*v),
        Value::I64(v) => serde_json::Value::from(*v),
        Value::U32(v) => serde_json::Value::from(*v),
        Value::U64(v) => serde_json::Value::from(*v),
        Value::Bool(v) => serde_json::Value::from(*v),
        Value::String(v) => serde_json::Value::from(v.clone()),
        Value::Bytes(v) => serde_json::Value::from(String::from_utf8_lossy(v).into_owned()),
    }
}

fn float_to_json(v: f64) -> serde_json::Value {
    // Non-finite floats have no JSON number representation; fall back to text.
    serde_json::Number::from_f64(v)
        .map(serde_json::Value::Number)
        .unwrap_or_else(|| serde_json::Value::String(v.to_string()))
}

fn to_int(value: &Value) -> Option<i128> {
    match value {
        Value::I32(v) => Some(i128::from(*v)),
        Value::I64(v) => Some(i128::from(*v)),
        Value::U32(v) => Some(i128::from(*v)),
        Value::U64(v) => Some(i128::from(*v)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn to_float(value: &Value) -> Option<f64> {
    match value {
        Value::F64(v) => Some(*v),
        Value::F32(v) => Some(f64::from(*v)),
        Value::I32(v) => Some(f64::from(*v)),
        Value::I64(v) => Some(*v as f64),
        Value::U32(v) => Some(f64::from(*v)),
        Value::U64(v) => Some(*v as f64),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(scalar: ScalarType) -> FieldDescriptor {
        FieldDescriptor::new("value", 1, scalar)
    }

    #[test]
    fn widens_and_narrows_integers_with_range_checks() {
        let v = coerce(&field(ScalarType::Int64), Value::I32(-7)).unwrap();
        assert_eq!(v, Value::I64(-7));

        let v = coerce(&field(ScalarType::Int32), Value::I64(42)).unwrap();
        assert_eq!(v, Value::I32(42));

        let err = coerce(&field(ScalarType::Int32), Value::I64(i64::MAX)).unwrap_err();
        assert!(matches!(err, MessageError::Conversion { .. }));

        let err = coerce(&field(ScalarType::Uint32), Value::I32(-1)).unwrap_err();
        assert!(matches!(err, MessageError::Conversion { .. }));
    }

    #[test]
    fn parses_numeric_and_boolean_text() {
        let v = coerce(&field(ScalarType::Int32), Value::from("42")).unwrap();
        assert_eq!(v, Value::I32(42));

        let v = coerce(&field(ScalarType::Double), Value::from("2.5")).unwrap();
        assert_eq!(v, Value::F64(2.5));

        let v = coerce(&field(ScalarType::Bool), Value::from("true")).unwrap();
        assert_eq!(v, Value::Bool(true));

        let err = coerce(&field(ScalarType::Int32), Value::from("not a number")).unwrap_err();
        assert!(matches!(err, MessageError::Conversion { .. }));
    }

    #[test]
    fn text_converts_to_bytes_via_utf8() {
        let v = coerce(&field(ScalarType::Bytes), Value::from("abc")).unwrap();
        assert_eq!(v, Value::Bytes(Bytes::from_static(b"abc")));
    }

    #[test]
    fn json_numbers_follow_the_declared_scalar() {
        let v = from_json(&field(ScalarType::Uint64), &serde_json::json!(18u64)).unwrap();
        assert_eq!(v, Value::U64(18));

        let v = from_json(&field(ScalarType::Float), &serde_json::json!(1.5)).unwrap();
        assert_eq!(v, Value::F32(1.5));

        let err = from_json(&field(ScalarType::Int32), &serde_json::json!([1, 2])).unwrap_err();
        assert!(matches!(err, MessageError::Conversion { .. }));
    }
}
