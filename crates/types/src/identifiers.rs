//! Newtype identifiers used throughout the sync pool.

use sbor::prelude::*;
use std::fmt;

/// Height of a block in the chain.
///
/// Heights on the wire are strictly positive; `0` never identifies a
/// real block and fails structural validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, BasicSbor)]
#[sbor(transparent)]
pub struct BlockHeight(pub u64);

impl BlockHeight {
    /// The height immediately above this one.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for BlockHeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identifier for a connected peer.
///
/// Assigned by the transport, collision-free within a session. Ordered
/// so that iteration over peer maps is deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BasicSbor)]
#[sbor(transparent)]
pub struct PeerId(pub u64);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
