//! Capability seam between the pool and the transport.
//!
//! The pool never opens connections or moves bytes. It holds a
//! [`Reactor`], a small capability interface the transport implements,
//! and the transport feeds decoded messages back as
//! [`SyncEvent`](crate::SyncEvent)s on the driver's queue.

use crate::SyncError;
use fastsync_types::{BlockHeight, PeerId};
use thiserror::Error;

/// A non-blocking send failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    /// The transport no longer knows this peer.
    #[error("transport has no peer {0}")]
    NilPeer(PeerId),

    /// The peer's outbound queue is full.
    #[error("send queue full for peer {0}")]
    QueueFull(PeerId),
}

impl From<SendError> for SyncError {
    fn from(err: SendError) -> Self {
        match err {
            SendError::NilPeer(peer) => SyncError::NilPeer { peer },
            SendError::QueueFull(peer) => SyncError::SendQueueFull { peer },
        }
    }
}

/// Outbound surface the pool drives.
///
/// Both methods MUST be non-blocking: `send_block_request` either
/// enqueues onto the peer's send queue or reports why it could not;
/// `send_peer_error` is fire-and-forget. Implementations own all I/O
/// concurrency below this seam.
pub trait Reactor {
    /// Enqueue a block request to a peer.
    fn send_block_request(&mut self, peer: PeerId, height: BlockHeight) -> Result<(), SendError>;

    /// Report a peer-attributable error to the transport (typically so
    /// it can disconnect or down-score the peer).
    fn send_peer_error(&mut self, error: &SyncError, peer: PeerId);
}
