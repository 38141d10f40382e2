//! Response messages received from peers.

use crate::InvalidMessage;
use fastsync_types::{Block, BlockHeight};
use sbor::prelude::BasicSbor;

/// Response to a [`BlockRequest`](crate::BlockRequest) carrying the
/// full sealed block.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct BlockResponse {
    /// The requested block.
    pub block: Block,
}

impl BlockResponse {
    /// Create a new block response.
    pub fn new(block: Block) -> Self {
        Self { block }
    }

    /// Check structural invariants.
    pub fn validate_basic(&self) -> Result<(), InvalidMessage> {
        if self.block.header.height.0 == 0 {
            return Err(InvalidMessage::NonPositiveHeight {
                kind: "block.response",
            });
        }
        Ok(())
    }
}

/// Responder does not have the block at the requested height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, BasicSbor)]
pub struct NoBlockResponse {
    /// Height that was requested.
    pub height: BlockHeight,
}

impl NoBlockResponse {
    /// Create a new no-block response.
    pub fn new(height: BlockHeight) -> Self {
        Self { height }
    }

    /// Check structural invariants.
    pub fn validate_basic(&self) -> Result<(), InvalidMessage> {
        if self.height.0 == 0 {
            return Err(InvalidMessage::NonPositiveHeight {
                kind: "no_block.response",
            });
        }
        Ok(())
    }
}

/// Responder's current height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, BasicSbor)]
pub struct StatusResponse {
    /// The responder's current height.
    pub height: BlockHeight,
}

impl StatusResponse {
    /// Create a new status response.
    pub fn new(height: BlockHeight) -> Self {
        Self { height }
    }

    /// Check structural invariants.
    pub fn validate_basic(&self) -> Result<(), InvalidMessage> {
        if self.height.0 == 0 {
            return Err(InvalidMessage::NonPositiveHeight {
                kind: "status.response",
            });
        }
        Ok(())
    }
}
