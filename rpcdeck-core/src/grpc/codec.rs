//! # Dynamic Protobuf Codec
//!
//! This module implements `tonic::codec::Codec` to enable `tonic` to transport
//! `prost_reflect::DynamicMessage` directly, bypassing the need for generated Rust structs.
//!
//! ## How it works
//!
//! 1. **Encoder**: Serializes an already-built `DynamicMessage` into the gRPC byte buffer.
//!    Validation against the input schema happens earlier, when the message is built.
//!
//! 2. **Decoder**:
//!    - Reads raw bytes from the wire.
//!    - Decodes them into a `DynamicMessage` using the output `MessageDescriptor`.
//!    - Reports the decoded message (or the undecodable bytes) to the call's telemetry.
use crate::telemetry::{CallContext, Payload, RpcStats, Telemetry};
use prost::Message;
use prost::bytes::Buf;
use prost_reflect::{DynamicMessage, MessageDescriptor};
use tonic::{
    Status,
    codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder},
};

/// Where decoded payloads are reported.
#[derive(Clone, Debug)]
pub struct PayloadTap {
    telemetry: Telemetry,
    ctx: CallContext,
}

impl PayloadTap {
    pub fn new(telemetry: Telemetry, ctx: CallContext) -> Self {
        Self { telemetry, ctx }
    }

    fn report(&self, payload: Payload) {
        self.telemetry
            .emit(&self.ctx, RpcStats::InPayload { payload });
    }
}

/// A Codec that writes and reads `DynamicMessage`s.
///
/// It holds the descriptor of the response message, allowing it to decode responses
/// dynamically.
pub struct DynamicCodec {
    /// Schema for the output message.
    res_desc: MessageDescriptor,
    tap: PayloadTap,
}

impl DynamicCodec {
    pub fn new(res_desc: MessageDescriptor, tap: PayloadTap) -> Self {
        Self { res_desc, tap }
    }
}

impl Codec for DynamicCodec {
    type Encode = DynamicMessage;
    type Decode = DynamicMessage;

    type Encoder = DynamicEncoder;
    type Decoder = DynamicDecoder;

    fn encoder(&mut self) -> Self::Encoder {
        DynamicEncoder
    }

    fn decoder(&mut self) -> Self::Decoder {
        DynamicDecoder {
            desc: self.res_desc.clone(),
            tap: self.tap.clone(),
        }
    }
}

pub struct DynamicEncoder;

impl Encoder for DynamicEncoder {
    type Item = DynamicMessage;
    type Error = Status;

    fn encode(&mut self, item: Self::Item, dst: &mut EncodeBuf<'_>) -> Result<(), Self::Error> {
        item.encode_raw(dst);
        Ok(())
    }
}

pub struct DynamicDecoder {
    desc: MessageDescriptor,
    tap: PayloadTap,
}

impl Decoder for DynamicDecoder {
    type Item = DynamicMessage;
    type Error = Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<Self::Item>, Self::Error> {
        let bytes = src.copy_to_bytes(src.remaining());

        match DynamicMessage::decode(self.desc.clone(), bytes.clone()) {
            Ok(message) => {
                self.tap.report(Payload::Dynamic(message.clone()));
                Ok(Some(message))
            }
            Err(err) => {
                self.tap.report(Payload::Encoded(bytes));
                Err(Status::internal(format!(
                    "Failed to decode Protobuf bytes as '{}': {}",
                    self.desc.full_name(),
                    err
                )))
            }
        }
    }
}
