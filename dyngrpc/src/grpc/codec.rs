//! # Dynamic Message Codec
//!
//! Implements `tonic::codec::Codec` so that `tonic` can transport
//! [`DynamicMessage`] values directly, bypassing the need for generated Rust
//! structs. The codec holds the request and response descriptors and encodes
//! or decodes against them.

use crate::descriptor::MessageDescriptor;
use crate::message::DynamicMessage;
use tonic::{
    Status,
    codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder},
};

/// A codec that bridges [`DynamicMessage`] and the Protobuf binary format.
pub struct DynamicCodec {
    /// Schema for the request message.
    req_desc: MessageDescriptor,
    /// Schema for the response message.
    res_desc: MessageDescriptor,
}

impl DynamicCodec {
    pub fn new(req_desc: MessageDescriptor, res_desc: MessageDescriptor) -> Self {
        Self { req_desc, res_desc }
    }
}

impl Codec for DynamicCodec {
    type Encode = DynamicMessage;
    type Decode = DynamicMessage;

    type Encoder = DynamicEncoder;
    type Decoder = DynamicDecoder;

    fn encoder(&mut self) -> Self::Encoder {
        DynamicEncoder(self.req_desc.clone())
    }

    fn decoder(&mut self) -> Self::Decoder {
        DynamicDecoder(self.res_desc.clone())
    }
}

/// Encodes an outgoing message, after checking it is bound to the method's
/// declared request type.
pub struct DynamicEncoder(MessageDescriptor);

impl Encoder for DynamicEncoder {
    type Item = DynamicMessage;
    type Error = Status;

    fn encode(&mut self, item: Self::Item, dst: &mut EncodeBuf<'_>) -> Result<(), Self::Error> {
        if item.descriptor() != &self.0 {
            return Err(Status::invalid_argument(format!(
                "message '{}' does not match the method's request type '{}'",
                item.descriptor().full_name(),
                self.0.full_name()
            )));
        }
        item.encode_raw(dst);
        Ok(())
    }
}

/// Decodes incoming bytes into a message bound to the method's response type.
pub struct DynamicDecoder(MessageDescriptor);

impl Decoder for DynamicDecoder {
    type Item = DynamicMessage;
    type Error = Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<Self::Item>, Self::Error> {
        let mut message = DynamicMessage::new(self.0.clone());
        message
            .merge(src)
            .map_err(|e| Status::internal(format!("failed to decode response bytes: {e}")))?;
        Ok(Some(message))
    }
}
