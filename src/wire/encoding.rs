use async_trait::async_trait;
use prost::Message;

use super::{proto, BytesBus, MessageBus, MessagingError, SendOptions};
use crate::{
    messages::{ConversionError, VectorMessage},
    types::Address,
};

/// Frames carry their length as a big-endian `u16`.
pub const MAX_FRAME_LEN: usize = u16::MAX as usize;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("frame shorter than its length prefix")]
    Truncated,
    #[error("{0} trailing bytes after frame")]
    TrailingBytes(usize),
    #[error(transparent)]
    Protobuf(#[from] prost::DecodeError),
    #[error(transparent)]
    Conversion(#[from] ConversionError),
}

/// Encodes [VectorMessage]s as length prefixed protobuf frames and hands them
/// to a [BytesBus].
#[derive(Debug)]
pub struct ProtoBufEncodingLayer<B: BytesBus> {
    pub bus: B,
}

impl<B: BytesBus> ProtoBufEncodingLayer<B> {
    pub fn new(bus: B) -> Self {
        ProtoBufEncodingLayer { bus }
    }
}

/// Encodes `msg` as a protobuf frame behind a big-endian `u16` length.
pub fn encode_frame(msg: &VectorMessage) -> Result<Vec<u8>, MessagingError> {
    // A u16 for the length (2 bytes) instead of prost's LEB128 length
    // delimiter, the peer reads exactly two bytes before each frame.
    let envelope = proto::Envelope::from(msg);
    let len = envelope.encoded_len();
    if len > MAX_FRAME_LEN {
        return Err(MessagingError::FrameTooLarge(len));
    }

    let mut buf = Vec::with_capacity(2 + len);
    buf.extend_from_slice(&(len as u16).to_be_bytes());
    envelope
        .encode(&mut buf)
        .map_err(|e| MessagingError::Encode(e.to_string()))?;
    Ok(buf)
}

/// Decodes exactly one frame as produced by [encode_frame].
pub fn decode_frame(frame: &[u8]) -> Result<VectorMessage, DecodeError> {
    if frame.len() < 2 {
        return Err(DecodeError::Truncated);
    }
    let len = u16::from_be_bytes([frame[0], frame[1]]) as usize;
    let body = &frame[2..];
    if body.len() < len {
        return Err(DecodeError::Truncated);
    }
    if body.len() > len {
        return Err(DecodeError::TrailingBytes(body.len() - len));
    }

    let envelope = proto::Envelope::decode(body)?;
    Ok(VectorMessage::try_from(envelope)?)
}

#[async_trait]
impl<B: BytesBus> MessageBus for ProtoBufEncodingLayer<B> {
    async fn send(
        &self,
        to: &Address,
        msg: &VectorMessage,
        options: SendOptions,
    ) -> Result<(), MessagingError> {
        let buf = encode_frame(msg)?;

        let mut attempt = 0;
        loop {
            let res = match tokio::time::timeout(options.timeout, self.bus.send_bytes(to, &buf))
                .await
            {
                Ok(res) => res,
                Err(_) => Err(MessagingError::Timeout(*to)),
            };
            match res {
                Ok(()) => return Ok(()),
                Err(e) if attempt >= options.num_retries => return Err(e),
                Err(e) => {
                    attempt += 1;
                    tracing::debug!(peer = %to, attempt, error = %e, "resending frame");
                }
            }
        }
    }
}
