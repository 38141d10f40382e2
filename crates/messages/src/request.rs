//! Request messages sent to peers.

use crate::InvalidMessage;
use fastsync_types::BlockHeight;
use sbor::prelude::BasicSbor;

/// Request for the sealed block at the given height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, BasicSbor)]
pub struct BlockRequest {
    /// Height of the block being requested.
    pub height: BlockHeight,
}

impl BlockRequest {
    /// Create a new block request.
    pub fn new(height: BlockHeight) -> Self {
        Self { height }
    }

    /// Check structural invariants.
    pub fn validate_basic(&self) -> Result<(), InvalidMessage> {
        if self.height.0 == 0 {
            return Err(InvalidMessage::NonPositiveHeight {
                kind: "block.request",
            });
        }
        Ok(())
    }
}

/// Announcement of the sender's current height, inviting a
/// [`StatusResponse`](crate::StatusResponse).
#[derive(Debug, Clone, Copy, PartialEq, Eq, BasicSbor)]
pub struct StatusRequest {
    /// The sender's current height.
    pub height: BlockHeight,
}

impl StatusRequest {
    /// Create a new status request.
    pub fn new(height: BlockHeight) -> Self {
        Self { height }
    }

    /// Check structural invariants.
    pub fn validate_basic(&self) -> Result<(), InvalidMessage> {
        if self.height.0 == 0 {
            return Err(InvalidMessage::NonPositiveHeight {
                kind: "status.request",
            });
        }
        Ok(())
    }
}
