//! Wire message taxonomy for block synchronization.
//!
//! The protocol speaks exactly five messages, collected in the closed
//! sum [`SyncMessage`]. Structural validation lives next to each
//! variant; the wire codec in `fastsync-network` rejects anything that
//! fails it with `InvalidMessage` before the pool ever sees the bytes.

mod request;
mod response;

pub use request::{BlockRequest, StatusRequest};
pub use response::{BlockResponse, NoBlockResponse, StatusResponse};

use thiserror::Error;

/// A message failed structural validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidMessage {
    /// Heights on the wire are strictly positive.
    #[error("{kind} carries a non-positive height")]
    NonPositiveHeight { kind: &'static str },
}

/// The closed set of block-synchronization messages.
///
/// Status encoding is symmetric in both directions: a `StatusRequest`
/// stays a `StatusRequest` across encode/decode, likewise
/// `StatusResponse`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncMessage {
    /// Request for the block at a height.
    BlockRequest(BlockRequest),
    /// The block itself.
    BlockResponse(BlockResponse),
    /// Responder does not have the block.
    NoBlockResponse(NoBlockResponse),
    /// Sender announces its height, inviting a response.
    StatusRequest(StatusRequest),
    /// Responder's current height.
    StatusResponse(StatusResponse),
}

impl SyncMessage {
    /// Low-cardinality label for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncMessage::BlockRequest(_) => "block.request",
            SyncMessage::BlockResponse(_) => "block.response",
            SyncMessage::NoBlockResponse(_) => "no_block.response",
            SyncMessage::StatusRequest(_) => "status.request",
            SyncMessage::StatusResponse(_) => "status.response",
        }
    }

    /// Check the structural invariants of the carried variant.
    pub fn validate_basic(&self) -> Result<(), InvalidMessage> {
        match self {
            SyncMessage::BlockRequest(m) => m.validate_basic(),
            SyncMessage::BlockResponse(m) => m.validate_basic(),
            SyncMessage::NoBlockResponse(m) => m.validate_basic(),
            SyncMessage::StatusRequest(m) => m.validate_basic(),
            SyncMessage::StatusResponse(m) => m.validate_basic(),
        }
    }
}

impl From<BlockRequest> for SyncMessage {
    fn from(m: BlockRequest) -> Self {
        SyncMessage::BlockRequest(m)
    }
}

impl From<BlockResponse> for SyncMessage {
    fn from(m: BlockResponse) -> Self {
        SyncMessage::BlockResponse(m)
    }
}

impl From<NoBlockResponse> for SyncMessage {
    fn from(m: NoBlockResponse) -> Self {
        SyncMessage::NoBlockResponse(m)
    }
}

impl From<StatusRequest> for SyncMessage {
    fn from(m: StatusRequest) -> Self {
        SyncMessage::StatusRequest(m)
    }
}

impl From<StatusResponse> for SyncMessage {
    fn from(m: StatusResponse) -> Self {
        SyncMessage::StatusResponse(m)
    }
}
