//! Beacon payload codec
//!
//! A beacon is read in one GATT transaction, so there is no framing: the
//! payload is a bare protobuf `PeerAnnounce`, bounded by
//! [`limits::MAX_ANNOUNCE_SIZE`] to stay within a single characteristic read.

use bytes::{Bytes, BytesMut};
use prost::Message;
use thiserror::Error;

use crate::announce::PeerAnnounce;
use crate::limits;

/// Errors that can occur during beacon encoding/decoding
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Announce too large: {0} bytes (max: {max})", max = limits::MAX_ANNOUNCE_SIZE)]
    AnnounceTooLarge(usize),

    #[error("Empty payload")]
    EmptyPayload,

    #[error("Protobuf decode error: {0}")]
    DecodeError(#[from] prost::DecodeError),

    #[error("Protobuf encode error: {0}")]
    EncodeError(#[from] prost::EncodeError),
}

/// Encode an announce into a beacon payload
pub fn encode_announce(announce: &PeerAnnounce) -> Result<Bytes, CodecError> {
    let msg_len = announce.encoded_len();

    if msg_len > limits::MAX_ANNOUNCE_SIZE {
        return Err(CodecError::AnnounceTooLarge(msg_len));
    }

    let mut buf = BytesMut::with_capacity(msg_len);
    announce.encode(&mut buf)?;
    Ok(buf.freeze())
}

/// Decode a beacon payload read from a peer
pub fn decode_announce(payload: &[u8]) -> Result<PeerAnnounce, CodecError> {
    if payload.is_empty() {
        return Err(CodecError::EmptyPayload);
    }
    if payload.len() > limits::MAX_ANNOUNCE_SIZE {
        return Err(CodecError::AnnounceTooLarge(payload.len()));
    }

    Ok(PeerAnnounce::decode(payload)?)
}
