//! Error taxonomy for the block-synchronization pool.
//!
//! Errors are categorized as peer-attributable or not. Peer-attributable
//! errors remove the offending peer and reschedule its heights; the rest
//! are surfaced to the caller or retried on the next tick.

use fastsync_network::CodecError;
use fastsync_types::{BlockHeight, PeerId};
use thiserror::Error;

/// Everything that can go wrong inside the pool and its seams.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Peer advertised a height below the current sync target; not added.
    #[error("peer {peer} height {height} below sync height {floor}")]
    PeerTooShort {
        peer: PeerId,
        height: BlockHeight,
        floor: BlockHeight,
    },

    /// Peer regressed its advertised height. Protocol violation.
    #[error("peer {peer} lowered its height from {from} to {to}")]
    PeerLowersHeight {
        peer: PeerId,
        from: BlockHeight,
        to: BlockHeight,
    },

    /// Block from an unknown peer, the wrong peer, or an unsolicited height.
    #[error("bad data from peer {peer} at height {height}")]
    BadDataFromPeer { peer: PeerId, height: BlockHeight },

    /// Peer answered that it has no block at a height it advertised.
    #[error("peer {peer} has no block at height {height}")]
    NoBlockAtHeight { peer: PeerId, height: BlockHeight },

    /// Peer receive rate fell below the configured floor.
    #[error("peer {peer} receive rate {rate:.0} B/s below floor")]
    SlowPeer { peer: PeerId, rate: f64 },

    /// The oldest pending request to the peer exceeded its deadline.
    #[error("peer {peer} timed out waiting for height {height}")]
    PeerTimedOut { peer: PeerId, height: BlockHeight },

    /// The transport lost the peer mid-dispatch.
    #[error("transport has no peer {peer}")]
    NilPeer { peer: PeerId },

    /// Transport backpressure; retried on the next tick.
    #[error("send queue full for peer {peer}")]
    SendQueueFull { peer: PeerId },

    /// Queried height has not been delivered yet.
    #[error("no block at height {height}")]
    MissingBlock { height: BlockHeight },

    /// The codec rejected a wire message.
    #[error(transparent)]
    InvalidMessage(#[from] CodecError),
}

impl SyncError {
    /// Whether this error is attributable to a specific peer.
    ///
    /// Peer-attributable errors remove the peer and reschedule its
    /// heights. `SendQueueFull` is retried, `MissingBlock` and
    /// `InvalidMessage` are surfaced upward, `PeerTooShort` rejects
    /// admission without removal.
    pub fn is_peer_fault(&self) -> bool {
        matches!(
            self,
            Self::PeerLowersHeight { .. }
                | Self::BadDataFromPeer { .. }
                | Self::NoBlockAtHeight { .. }
                | Self::SlowPeer { .. }
                | Self::PeerTimedOut { .. }
                | Self::NilPeer { .. }
        )
    }

    /// Low-cardinality label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::PeerTooShort { .. } => "peer_too_short",
            Self::PeerLowersHeight { .. } => "peer_lowers_height",
            Self::BadDataFromPeer { .. } => "bad_data",
            Self::NoBlockAtHeight { .. } => "no_block_at_height",
            Self::SlowPeer { .. } => "slow_peer",
            Self::PeerTimedOut { .. } => "peer_timed_out",
            Self::NilPeer { .. } => "nil_peer",
            Self::SendQueueFull { .. } => "send_queue_full",
            Self::MissingBlock { .. } => "missing_block",
            Self::InvalidMessage(_) => "invalid_message",
        }
    }
}
