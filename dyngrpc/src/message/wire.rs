//! Scalar wire codec.
//!
//! Encodes and decodes single `(tag, value)` pairs in the protobuf binary
//! wire format, restricted to scalar fields: varint (with zigzag for the
//! `sint*` types), 32/64-bit fixed width and length-delimited. The low-level
//! primitives (varints, keys, unknown-field skipping) come from
//! [`prost::encoding`].

use crate::descriptor::{FieldDescriptor, ScalarType};
use crate::message::MessageError;
use crate::message::value::Value;
use bytes::{Buf, BufMut};
use prost::encoding::{self, WireType};

/// The wire type used to encode a scalar field.
pub(crate) fn wire_type(scalar: ScalarType) -> WireType {
    match scalar {
        ScalarType::Double | ScalarType::Fixed64 | ScalarType::Sfixed64 => WireType::SixtyFourBit,
        ScalarType::Float | ScalarType::Fixed32 | ScalarType::Sfixed32 => WireType::ThirtyTwoBit,
        ScalarType::String | ScalarType::Bytes => WireType::LengthDelimited,
        _ => WireType::Varint,
    }
}

/// Writes one field as a `(key, payload)` pair. Values that do not match the
/// declared scalar are skipped entirely; `set_field` stores canonical
/// variants, so a mismatch cannot occur for messages built through the
/// public API.
pub(crate) fn encode_field<B: BufMut>(field: &FieldDescriptor, value: &Value, buf: &mut B) {
    let number = field.number();
    let wire = wire_type(field.scalar());
    match (field.scalar(), value) {
        (ScalarType::Double, Value::F64(v)) => {
            encoding::encode_key(number, wire, buf);
            buf.put_f64_le(*v);
        }
        (ScalarType::Float, Value::F32(v)) => {
            encoding::encode_key(number, wire, buf);
            buf.put_f32_le(*v);
        }
        (ScalarType::Int32, Value::I32(v)) => {
            encoding::encode_key(number, wire, buf);
            // Negative int32 values sign-extend to ten varint bytes.
            encoding::encode_varint(*v as i64 as u64, buf);
        }
        (ScalarType::Int64, Value::I64(v)) => {
            encoding::encode_key(number, wire, buf);
            encoding::encode_varint(*v as u64, buf);
        }
        (ScalarType::Uint32, Value::U32(v)) => {
            encoding::encode_key(number, wire, buf);
            encoding::encode_varint(u64::from(*v), buf);
        }
        (ScalarType::Uint64, Value::U64(v)) => {
            encoding::encode_key(number, wire, buf);
            encoding::encode_varint(*v, buf);
        }
        (ScalarType::Sint32, Value::I32(v)) => {
            encoding::encode_key(number, wire, buf);
            encoding::encode_varint(u64::from(((v << 1) ^ (v >> 31)) as u32), buf);
        }
        (ScalarType::Sint64, Value::I64(v)) => {
            encoding::encode_key(number, wire, buf);
            encoding::encode_varint(((v << 1) ^ (v >> 63)) as u64, buf);
        }
        (ScalarType::Fixed32, Value::U32(v)) => {
            encoding::encode_key(number, wire, buf);
            buf.put_u32_le(*v);
        }
        (ScalarType::Fixed64, Value::U64(v)) => {
            encoding::encode_key(number, wire, buf);
            buf.put_u64_le(*v);
        }
        (ScalarType::Sfixed32, Value::I32(v)) => {
            encoding::encode_key(number, wire, buf);
            buf.put_i32_le(*v);
        }
        (ScalarType::Sfixed64, Value::I64(v)) => {
            encoding::encode_key(number, wire, buf);
            buf.put_i64_le(*v);
        }
        (ScalarType::Bool, Value::Bool(v)) => {
            encoding::encode_key(number, wire, buf);
            encoding::encode_varint(u64::from(*v), buf);
        }
        (ScalarType::String, Value::String(v)) => {
            encoding::encode_key(number, wire, buf);
            encoding::encode_varint(v.len() as u64, buf);
            buf.put_slice(v.as_bytes());
        }
        (ScalarType::Bytes, Value::Bytes(v)) => {
            encoding::encode_key(number, wire, buf);
            encoding::encode_varint(v.len() as u64, buf);
            buf.put_slice(v);
        }
        _ => {}
    }
}

/// Reads one field payload, whose key has already been consumed. Truncated
/// or malformed input fails with [`MessageError::WireFormat`] and the caller
/// must abandon the whole message.
pub(crate) fn decode_field<B: Buf>(
    field: &FieldDescriptor,
    wire: WireType,
    buf: &mut B,
) -> Result<Value, MessageError> {
    let expected = wire_type(field.scalar());
    if wire != expected {
        return Err(MessageError::WireFormat(format!(
            "field '{}' declared as {} but encoded with wire type {:?}",
            field.name(),
            field.scalar(),
            wire
        )));
    }

    let value = match field.scalar() {
        ScalarType::Double => Value::F64(get_fixed(buf, 8, Buf::get_f64_le, field)?),
        ScalarType::Float => Value::F32(get_fixed(buf, 4, Buf::get_f32_le, field)?),
        ScalarType::Int32 => Value::I32(get_varint(buf, field)? as i32),
        ScalarType::Int64 => Value::I64(get_varint(buf, field)? as i64),
        ScalarType::Uint32 => Value::U32(get_varint(buf, field)? as u32),
        ScalarType::Uint64 => Value::U64(get_varint(buf, field)?),
        ScalarType::Sint32 => {
            let v = get_varint(buf, field)? as u32;
            Value::I32(((v >> 1) as i32) ^ -((v & 1) as i32))
        }
        ScalarType::Sint64 => {
            let v = get_varint(buf, field)?;
            Value::I64(((v >> 1) as i64) ^ -((v & 1) as i64))
        }
        ScalarType::Fixed32 => Value::U32(get_fixed(buf, 4, Buf::get_u32_le, field)?),
        ScalarType::Fixed64 => Value::U64(get_fixed(buf, 8, Buf::get_u64_le, field)?),
        ScalarType::Sfixed32 => Value::I32(get_fixed(buf, 4, Buf::get_i32_le, field)?),
        ScalarType::Sfixed64 => Value::I64(get_fixed(buf, 8, Buf::get_i64_le, field)?),
        ScalarType::Bool => Value::Bool(get_varint(buf, field)? != 0),
        ScalarType::String => {
            let bytes = get_length_delimited(buf, field)?;
            let text = String::from_utf8(bytes.to_vec()).map_err(|_| {
                MessageError::WireFormat(format!(
                    "field '{}' contains invalid UTF-8 string data",
                    field.name()
                ))
            })?;
            Value::String(text)
        }
        ScalarType::Bytes => Value::Bytes(get_length_delimited(buf, field)?),
    };
    Ok(value)
}

fn get_varint<B: Buf>(buf: &mut B, field: &FieldDescriptor) -> Result<u64, MessageError> {
    encoding::decode_varint(buf).map_err(|err| {
        MessageError::WireFormat(format!("invalid varint for field '{}': {err}", field.name()))
    })
}

fn get_fixed<B: Buf, T>(
    buf: &mut B,
    width: usize,
    read: impl FnOnce(&mut B) -> T,
    field: &FieldDescriptor,
) -> Result<T, MessageError> {
    if buf.remaining() < width {
        return Err(MessageError::WireFormat(format!(
            "truncated {width}-byte value for field '{}'",
            field.name()
        )));
    }
    Ok(read(buf))
}

fn get_length_delimited<B: Buf>(
    buf: &mut B,
    field: &FieldDescriptor,
) -> Result<bytes::Bytes, MessageError> {
    let len = get_varint(buf, field)? as usize;
    if buf.remaining() < len {
        return Err(MessageError::WireFormat(format!(
            "length-delimited field '{}' claims {len} bytes but only {} remain",
            field.name(),
            buf.remaining()
        )));
    }
    Ok(buf.copy_to_bytes(len))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(scalar: ScalarType, number: u32) -> FieldDescriptor {
        FieldDescriptor::new("value", number, scalar)
    }

    fn round_trip(scalar: ScalarType, value: Value) -> Value {
        let field = field(scalar, 1);
        let mut buf = Vec::new();
        encode_field(&field, &value, &mut buf);
        let mut slice = buf.as_slice();
        let (number, wire) = encoding::decode_key(&mut slice).unwrap();
        assert_eq!(number, 1);
        let decoded = decode_field(&field, wire, &mut slice).unwrap();
        assert!(!slice.has_remaining());
        decoded
    }

    #[test]
    fn known_varint_encoding() {
        // Field 1, value 150: the canonical protobuf wire example.
        let mut buf = Vec::new();
        encode_field(&field(ScalarType::Int32, 1), &Value::I32(150), &mut buf);
        assert_eq!(buf, vec![0x08, 0x96, 0x01]);
    }

    #[test]
    fn zigzag_encodes_small_negatives_compactly() {
        let mut buf = Vec::new();
        encode_field(&field(ScalarType::Sint32, 1), &Value::I32(-1), &mut buf);
        assert_eq!(buf, vec![0x08, 0x01]);

        let mut buf = Vec::new();
        encode_field(&field(ScalarType::Sint32, 1), &Value::I32(1), &mut buf);
        assert_eq!(buf, vec![0x08, 0x02]);
    }

    #[test]
    fn negative_int32_uses_ten_varint_bytes() {
        let mut buf = Vec::new();
        encode_field(&field(ScalarType::Int32, 1), &Value::I32(-2), &mut buf);
        assert_eq!(buf.len(), 1 + 10);
        assert_eq!(round_trip(ScalarType::Int32, Value::I32(-2)), Value::I32(-2));
    }

    #[test]
    fn round_trips_every_scalar_type() {
        let cases = [
            (ScalarType::Double, Value::F64(-2.75)),
            (ScalarType::Float, Value::F32(0.5)),
            (ScalarType::Int32, Value::I32(-42)),
            (ScalarType::Int64, Value::I64(i64::MIN)),
            (ScalarType::Uint32, Value::U32(u32::MAX)),
            (ScalarType::Uint64, Value::U64(u64::MAX)),
            (ScalarType::Sint32, Value::I32(i32::MIN)),
            (ScalarType::Sint64, Value::I64(-1)),
            (ScalarType::Fixed32, Value::U32(7)),
            (ScalarType::Fixed64, Value::U64(1 << 60)),
            (ScalarType::Sfixed32, Value::I32(-7)),
            (ScalarType::Sfixed64, Value::I64(-(1 << 60))),
            (ScalarType::Bool, Value::Bool(true)),
            (ScalarType::String, Value::String("héllo".to_string())),
            (ScalarType::Bytes, Value::Bytes(bytes::Bytes::from_static(&[0, 159, 146, 150]))),
        ];
        for (scalar, value) in cases {
            assert_eq!(round_trip(scalar, value.clone()), value, "scalar {scalar}");
        }
    }

    #[test]
    fn truncated_input_is_a_wire_format_error() {
        let field = field(ScalarType::Fixed64, 1);
        let mut slice: &[u8] = &[0x01, 0x02];
        let err = decode_field(&field, WireType::SixtyFourBit, &mut slice).unwrap_err();
        assert!(matches!(err, MessageError::WireFormat(_)));

        // A varint that never terminates.
        let field = FieldDescriptor::new("value", 1, ScalarType::Int32);
        let mut slice: &[u8] = &[0xFF, 0xFF, 0xFF];
        let err = decode_field(&field, WireType::Varint, &mut slice).unwrap_err();
        assert!(matches!(err, MessageError::WireFormat(_)));
    }

    #[test]
    fn wire_type_mismatch_is_rejected() {
        let field = field(ScalarType::String, 1);
        let mut slice: &[u8] = &[0x05];
        let err = decode_field(&field, WireType::Varint, &mut slice).unwrap_err();
        assert!(matches!(err, MessageError::WireFormat(_)));
    }
}
