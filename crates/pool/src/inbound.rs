//! Inbound glue: wire bytes → pool events.
//!
//! The transport hands every received frame here. Responses become
//! [`SyncEvent`]s for the driver's queue; requests (a peer asking *us*
//! for a block or a status) are classified for the serving side, which
//! is the node's concern rather than the pool's.

use crate::{SyncError, SyncEvent};
use fastsync_messages::SyncMessage;
use fastsync_network::codec;
use fastsync_types::{BlockHeight, PeerId};
use std::sync::Arc;
use tracing::trace;

/// A decoded inbound frame, classified by who should handle it.
#[derive(Debug)]
pub enum Inbound {
    /// Feed this to the FSM.
    Event(SyncEvent),
    /// The peer wants the block at `height`; answer from the store.
    BlockRequested { peer: PeerId, height: BlockHeight },
    /// The peer announced `height` and wants our status back.
    StatusRequested { peer: PeerId, height: BlockHeight },
}

/// Decode one wire frame from `peer`.
///
/// Codec rejections surface as [`SyncError::InvalidMessage`]; they are
/// non-fatal and the caller decides whether to log or drop.
pub fn inbound_from_wire(peer: PeerId, bytes: &[u8]) -> Result<Inbound, SyncError> {
    let message = codec::decode_message(bytes)?;
    trace!(%peer, kind = message.kind(), bytes = bytes.len(), "inbound message");

    Ok(match message {
        SyncMessage::BlockRequest(m) => Inbound::BlockRequested {
            peer,
            height: m.height,
        },
        SyncMessage::StatusRequest(m) => Inbound::StatusRequested {
            peer,
            height: m.height,
        },
        SyncMessage::BlockResponse(m) => Inbound::Event(SyncEvent::BlockResponse {
            peer,
            block: Arc::new(m.block),
            // Wire size feeds the peer's throughput estimate.
            size: bytes.len(),
        }),
        SyncMessage::NoBlockResponse(m) => Inbound::Event(SyncEvent::NoBlockResponse {
            peer,
            height: m.height,
        }),
        SyncMessage::StatusResponse(m) => Inbound::Event(SyncEvent::StatusResponse {
            peer,
            height: m.height,
        }),
    })
}
