//! Core types for the fastsync block-synchronization pool.
//!
//! - [`Hash`]: Blake3 32-byte digest newtype
//! - [`BlockHeight`], [`PeerId`]: ordered identifier newtypes
//! - [`Block`], [`BlockHeader`]: the sealed block as transferred during sync

mod block;
mod hash;
mod identifiers;

pub use block::{Block, BlockHeader};
pub use hash::{Hash, ParseHashError};
pub use identifiers::{BlockHeight, PeerId};
