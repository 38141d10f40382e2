//! Test fixtures: a scripted reactor and pool invariant checks.
//!
//! Public so integration tests and downstream crates can drive the pool
//! without a real transport.

use crate::{BlockPool, Reactor, SendError, SyncError};
use fastsync_types::{Block, BlockHeader, BlockHeight, Hash, PeerId};
use std::collections::BTreeMap;
use std::sync::Arc;

/// What the scripted reactor should do with a send to a given peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Ok,
    NilPeer,
    QueueFull,
}

/// Reactor that records outbound traffic and can be scripted to refuse
/// sends per peer.
#[derive(Debug, Default)]
pub struct ScriptedReactor {
    /// Every successfully enqueued block request, in order.
    pub requests: Vec<(PeerId, BlockHeight)>,
    /// Every reported peer error as `(peer, error label)`.
    pub errors: Vec<(PeerId, &'static str)>,
    /// Per-peer send behavior; unlisted peers accept.
    pub refusals: BTreeMap<PeerId, SendOutcome>,
}

impl Reactor for ScriptedReactor {
    fn send_block_request(&mut self, peer: PeerId, height: BlockHeight) -> Result<(), SendError> {
        match self.refusals.get(&peer).copied().unwrap_or(SendOutcome::Ok) {
            SendOutcome::Ok => {
                self.requests.push((peer, height));
                Ok(())
            }
            SendOutcome::NilPeer => Err(SendError::NilPeer(peer)),
            SendOutcome::QueueFull => Err(SendError::QueueFull(peer)),
        }
    }

    fn send_peer_error(&mut self, error: &SyncError, peer: PeerId) {
        self.errors.push((peer, error.label()));
    }
}

/// Build a minimal sealed block at `height`.
pub fn make_block(height: u64) -> Arc<Block> {
    Arc::new(Block {
        header: BlockHeader {
            height: BlockHeight(height),
            parent_hash: Hash::digest(&height.wrapping_sub(1).to_le_bytes()),
            timestamp: 1_700_000_000_000 + height,
            transaction_root: Hash::ZERO,
        },
        transactions: vec![Hash::digest(&height.to_le_bytes())],
    })
}

/// Assert every structural invariant the pool promises after each event.
///
/// # Panics
///
/// Panics with a description of the violated invariant.
pub fn assert_pool_invariants<R: Reactor>(pool: &BlockPool<R>) {
    let planned = pool.planned_heights();
    let assigned = pool.assigned_heights();
    let max = pool.max_peer_height();

    // Assigned heights map to live peers that actually hold them.
    for &(height, peer_id) in &assigned {
        let peer = pool
            .peer(peer_id)
            .unwrap_or_else(|| panic!("height {height} assigned to dead peer {peer_id}"));
        let held = peer.pending_heights().contains(&height)
            || peer.delivered_heights().contains(&height);
        assert!(held, "peer {peer_id} does not hold assigned height {height}");
    }

    for peer_id in pool.peer_ids() {
        let peer = pool.peer(peer_id).expect("listed peer exists");

        // Per-peer in-flight cap.
        assert!(
            peer.num_pending() <= pool.config().max_requests_per_peer,
            "peer {peer_id} exceeds per-peer request cap"
        );

        // Pending and delivered are disjoint.
        for height in peer.pending_heights() {
            assert!(
                !peer.delivered_heights().contains(&height),
                "peer {peer_id} has height {height} both pending and delivered"
            );
        }

        // A peer never holds a height above what it advertised.
        for height in peer.assigned_heights() {
            assert!(
                height <= peer.height(),
                "peer {peer_id} holds height {height} above its advertised {}",
                peer.height()
            );
        }
    }

    // Nothing scheduled beyond the tallest peer.
    for &height in &planned {
        assert!(height <= max, "planned height {height} exceeds max {max}");
    }
    for &(height, _) in &assigned {
        assert!(height <= max, "assigned height {height} exceeds max {max}");
    }

    // Planned and assigned never overlap.
    for &(height, _) in &assigned {
        assert!(
            !planned.contains(&height),
            "height {height} both planned and assigned"
        );
    }

    // Max peer height is exactly the max over peers (0 when empty).
    let expected_max = pool
        .peer_ids()
        .iter()
        .filter_map(|&id| pool.peer(id))
        .map(|p| p.height())
        .max()
        .unwrap_or(BlockHeight(0));
    assert_eq!(max, expected_max, "stale max_peer_height");
}
