//! Block and BlockHeader types.

use crate::{BlockHeight, Hash};
use sbor::prelude::*;

/// Block header: the part of a block the pool and executor key on.
///
/// The sync pool only ever reads `height`; everything else travels
/// through untouched for the executor to verify.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct BlockHeader {
    /// Block height in the chain.
    pub height: BlockHeight,

    /// Hash of parent block.
    pub parent_hash: Hash,

    /// Unix timestamp (milliseconds) when the block was sealed.
    pub timestamp: u64,

    /// Merkle-style commitment over the transaction hashes.
    pub transaction_root: Hash,
}

impl BlockHeader {
    /// Compute hash of this block header.
    pub fn hash(&self) -> Hash {
        let bytes = basic_encode(self).expect("BlockHeader serialization should never fail");
        Hash::digest(&bytes)
    }
}

/// Complete sealed block as transferred during sync.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct Block {
    /// Consensus metadata.
    pub header: BlockHeader,

    /// Hashes of the transactions included in this block.
    pub transactions: Vec<Hash>,
}

impl Block {
    /// Block height shorthand.
    pub fn height(&self) -> BlockHeight {
        self.header.height
    }

    /// Compute hash of this block (header hash).
    pub fn hash(&self) -> Hash {
        self.header.hash()
    }
}
