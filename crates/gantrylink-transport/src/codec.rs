use bytes::BytesMut;
use gantrylink_frame::{decode_wire_frame, encode_wire_frame, RawCanFrame, MAX_CAN_PAYLOAD};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::TransportError;

/// `tokio_util` codec for the bridge wire framing.
#[derive(Debug, Clone)]
pub struct BridgeCodec {
    max_payload: usize,
}

impl BridgeCodec {
    pub fn new(max_payload: usize) -> Self {
        Self { max_payload }
    }
}

impl Default for BridgeCodec {
    fn default() -> Self {
        Self::new(MAX_CAN_PAYLOAD)
    }
}

impl Decoder for BridgeCodec {
    type Item = RawCanFrame;
    type Error = TransportError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        decode_wire_frame(src, self.max_payload).map_err(Into::into)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => Err(TransportError::Closed),
        }
    }
}

impl Encoder<RawCanFrame> for BridgeCodec {
    type Error = TransportError;

    fn encode(&mut self, item: RawCanFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_wire_frame(&item, self.max_payload, dst).map_err(Into::into)
    }
}
