//! Message encoding and decoding for the sync wire protocol.
//!
//! # Wire Format
//!
//! ```text
//! [LZ4 compressed: [tag: u8][SBOR payload]]
//! ```
//!
//! The tag byte selects the variant of the closed
//! [`SyncMessage`] sum; the payload is the SBOR encoding of that
//! variant's struct. Both directions validate structural invariants,
//! so a frame that decodes is always a well-formed message.
//!
//! The codec is stateless and total over the declared variant set:
//! every `SyncMessage` encodes, and every unknown tag is rejected.

use fastsync_messages::{
    BlockRequest, BlockResponse, InvalidMessage, NoBlockResponse, StatusRequest, StatusResponse,
    SyncMessage,
};
use sbor::prelude::{BasicDecode, BasicEncode};
use thiserror::Error;
use tracing::trace;

/// Wire tag for each message variant.
const TAG_BLOCK_REQUEST: u8 = 1;
const TAG_BLOCK_RESPONSE: u8 = 2;
const TAG_NO_BLOCK_RESPONSE: u8 = 3;
const TAG_STATUS_REQUEST: u8 = 4;
const TAG_STATUS_RESPONSE: u8 = 5;

/// Errors that can occur during message encoding/decoding.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("message too short")]
    MessageTooShort,

    #[error("SBOR encode error: {0}")]
    SborEncode(String),

    #[error("SBOR decode error: {0}")]
    SborDecode(String),

    #[error("decompression error: {0}")]
    Decompress(String),

    #[error("unknown blockchain message (tag {0})")]
    UnknownMessage(u8),

    #[error(transparent)]
    Invalid(#[from] InvalidMessage),
}

fn sbor_encode<T: BasicEncode>(value: &T) -> Result<Vec<u8>, CodecError> {
    sbor::basic_encode(value).map_err(|e| CodecError::SborEncode(format!("{:?}", e)))
}

fn sbor_decode<T: BasicDecode>(payload: &[u8]) -> Result<T, CodecError> {
    sbor::basic_decode(payload).map_err(|e| CodecError::SborDecode(format!("{:?}", e)))
}

/// Encode a message to wire format.
///
/// Validates, SBOR-encodes the variant payload, prepends the variant
/// tag, then LZ4-compresses the frame.
pub fn encode_message(message: &SyncMessage) -> Result<Vec<u8>, CodecError> {
    message.validate_basic()?;

    let (tag, payload) = match message {
        SyncMessage::BlockRequest(m) => (TAG_BLOCK_REQUEST, sbor_encode(m)?),
        SyncMessage::BlockResponse(m) => (TAG_BLOCK_RESPONSE, sbor_encode(m)?),
        SyncMessage::NoBlockResponse(m) => (TAG_NO_BLOCK_RESPONSE, sbor_encode(m)?),
        SyncMessage::StatusRequest(m) => (TAG_STATUS_REQUEST, sbor_encode(m)?),
        SyncMessage::StatusResponse(m) => (TAG_STATUS_RESPONSE, sbor_encode(m)?),
    };

    let mut frame = Vec::with_capacity(1 + payload.len());
    frame.push(tag);
    frame.extend_from_slice(&payload);

    trace!(kind = message.kind(), bytes = frame.len(), "encoded message");
    // LZ4 block format with a prepended size header so decompression
    // can pre-allocate the output buffer.
    Ok(lz4_flex::compress_prepend_size(&frame))
}

/// Decode a message from wire format.
///
/// LZ4-decompresses, reads the variant tag, SBOR-decodes the payload,
/// then validates structural invariants.
pub fn decode_message(data: &[u8]) -> Result<SyncMessage, CodecError> {
    if data.is_empty() {
        return Err(CodecError::MessageTooShort);
    }

    let frame = lz4_flex::decompress_size_prepended(data)
        .map_err(|e| CodecError::Decompress(e.to_string()))?;

    let Some((&tag, payload)) = frame.split_first() else {
        return Err(CodecError::MessageTooShort);
    };

    let message = match tag {
        TAG_BLOCK_REQUEST => SyncMessage::BlockRequest(sbor_decode::<BlockRequest>(payload)?),
        TAG_BLOCK_RESPONSE => SyncMessage::BlockResponse(sbor_decode::<BlockResponse>(payload)?),
        TAG_NO_BLOCK_RESPONSE => {
            SyncMessage::NoBlockResponse(sbor_decode::<NoBlockResponse>(payload)?)
        }
        TAG_STATUS_REQUEST => SyncMessage::StatusRequest(sbor_decode::<StatusRequest>(payload)?),
        TAG_STATUS_RESPONSE => SyncMessage::StatusResponse(sbor_decode::<StatusResponse>(payload)?),
        unknown => return Err(CodecError::UnknownMessage(unknown)),
    };

    message.validate_basic()?;
    Ok(message)
}
