//! # Dynamic Messages
//!
//! [`DynamicMessage`] is a mutable field container bound to a
//! [`MessageDescriptor`]. It plays the role that generated prost structs play
//! in a statically typed client: it serializes to and from the protobuf
//! binary wire format and to and from flat JSON objects, without any
//! compile-time knowledge of the schema.
//!
//! ## Known limitations
//!
//! * Only scalar fields are supported; nested messages, repeated fields,
//!   maps and enums cannot be represented.
//! * Unknown fields encountered during decode are skipped, not preserved,
//!   so a decode/encode round trip drops them.
//! * Bytes fields convert to and from UTF-8 text for JSON interchange, which
//!   is lossy for non-UTF-8 payloads.

pub mod value;
pub(crate) mod wire;

pub use value::Value;

use crate::descriptor::{FieldDescriptor, MessageDescriptor};
use bytes::{Buf, BufMut};
use prost::encoding::{self, DecodeContext};
use std::collections::BTreeMap;

/// Errors raised while building, converting or (de)serializing a message.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("field '{field}' not found in message '{message}'")]
    UnknownField { message: String, field: String },
    #[error("cannot convert value for field '{field}': {detail}")]
    Conversion { field: String, detail: String },
    #[error("malformed wire data: {0}")]
    WireFormat(String),
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("expected a JSON object for message '{0}'")]
    NotAnObject(String),
}

/// A schema-bound container of scalar field values.
///
/// Field storage is keyed by field number in a `BTreeMap`, so wire output is
/// emitted in field-number order and is stable across runs.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicMessage {
    descriptor: MessageDescriptor,
    fields: BTreeMap<u32, Value>,
}

impl DynamicMessage {
    /// Creates an empty message bound to `descriptor`.
    pub fn new(descriptor: MessageDescriptor) -> Self {
        Self {
            descriptor,
            fields: BTreeMap::new(),
        }
    }

    pub fn descriptor(&self) -> &MessageDescriptor {
        &self.descriptor
    }

    /// Sets a field by name, coercing `value` to the field's declared scalar
    /// type. Overwrites any prior value. Returns `&mut Self` so calls chain.
    ///
    /// Fails with [`MessageError::UnknownField`] if the name is not declared
    /// in the descriptor, or [`MessageError::Conversion`] if the value cannot
    /// be represented as the declared type.
    pub fn set_field(
        &mut self,
        name: &str,
        value: impl Into<Value>,
    ) -> Result<&mut Self, MessageError> {
        let field = self
            .descriptor
            .get_field_by_name(name)
            .ok_or_else(|| self.unknown_field(name))?;
        let value = value::coerce(field, value.into())?;
        let number = field.number();
        self.fields.insert(number, value);
        Ok(self)
    }

    /// Reads a field by name. Returns `Ok(None)` for declared-but-unset
    /// fields; there is no presence bit beyond map membership.
    pub fn get_field(&self, name: &str) -> Result<Option<&Value>, MessageError> {
        let field = self
            .descriptor
            .get_field_by_name(name)
            .ok_or_else(|| self.unknown_field(name))?;
        Ok(self.fields.get(&field.number()))
    }

    /// Iterates over set fields in field-number order.
    pub fn fields(&self) -> impl Iterator<Item = (&FieldDescriptor, &Value)> {
        self.fields
            .iter()
            .filter_map(move |(number, value)| {
                self.descriptor
                    .get_field_by_number(*number)
                    .map(|field| (field, value))
            })
    }

    /// Copies every set field of `other` into `self`, overwriting values that
    /// are set on both sides. Messages bound to a different descriptor are
    /// ignored.
    pub fn merge_from(&mut self, other: &DynamicMessage) {
        if self.descriptor != other.descriptor {
            return;
        }
        for (number, value) in &other.fields {
            self.fields.insert(*number, value.clone());
        }
    }

    /// Serializes the message to the binary wire format.
    pub fn encode_to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode_raw(&mut buf);
        buf
    }

    /// Writes the message's `(tag, value)` pairs into `buf`, in field-number
    /// order.
    pub fn encode_raw<B: BufMut>(&self, buf: &mut B) {
        for (number, value) in &self.fields {
            if let Some(field) = self.descriptor.get_field_by_number(*number) {
                wire::encode_field(field, value, buf);
            }
        }
    }

    /// Decodes a message from the binary wire format. Unknown field numbers
    /// are skipped by their wire type; any malformed data aborts the whole
    /// decode without returning a partial message.
    pub fn decode<B: Buf>(descriptor: MessageDescriptor, buf: &mut B) -> Result<Self, MessageError> {
        let mut message = Self::new(descriptor);
        message.merge(buf)?;
        Ok(message)
    }

    /// Decodes wire data into `self`, overwriting fields that reappear.
    pub fn merge<B: Buf>(&mut self, buf: &mut B) -> Result<(), MessageError> {
        while buf.has_remaining() {
            let (number, wire_type) = encoding::decode_key(buf)
                .map_err(|err| MessageError::WireFormat(format!("invalid field key: {err}")))?;
            match self.descriptor.get_field_by_number(number) {
                Some(field) => {
                    let value = wire::decode_field(field, wire_type, buf)?;
                    self.fields.insert(number, value);
                }
                None => {
                    encoding::skip_field(wire_type, number, buf, DecodeContext::default())
                        .map_err(|err| {
                            MessageError::WireFormat(format!(
                                "cannot skip unknown field {number}: {err}"
                            ))
                        })?;
                }
            }
        }
        Ok(())
    }

    /// Renders the message as a flat JSON object with camelCase keys.
    pub fn to_json(&self) -> String {
        self.to_json_value().to_string()
    }

    /// Renders the message as a [`serde_json::Value`] object.
    pub fn to_json_value(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (field, value) in self.fields() {
            map.insert(field.json_name().to_string(), value::to_json(value));
        }
        serde_json::Value::Object(map)
    }

    /// Builds a message from JSON text. Top-level properties are matched
    /// against declared field names (either the declared name or its
    /// camelCase form); unmatched properties and nulls are ignored.
    pub fn from_json(descriptor: MessageDescriptor, json: &str) -> Result<Self, MessageError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        Self::from_json_value(descriptor, &value)
    }

    /// Builds a message from an already-parsed JSON value.
    pub fn from_json_value(
        descriptor: MessageDescriptor,
        json: &serde_json::Value,
    ) -> Result<Self, MessageError> {
        let serde_json::Value::Object(map) = json else {
            return Err(MessageError::NotAnObject(descriptor.full_name().to_string()));
        };
        let mut message = Self::new(descriptor);
        for (key, property) in map {
            if property.is_null() {
                continue;
            }
            let field = message
                .descriptor
                .get_field_by_name(key)
                .or_else(|| message.descriptor.get_field_by_json_name(key));
            let Some(field) = field else {
                continue;
            };
            let value = value::from_json(field, property)?;
            message.fields.insert(field.number(), value);
        }
        Ok(message)
    }

    fn unknown_field(&self, name: &str) -> MessageError {
        MessageError::UnknownField {
            message: self.descriptor.full_name().to_string(),
            field: name.to_string(),
        }
    }
}
