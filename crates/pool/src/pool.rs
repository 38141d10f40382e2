//! The block pool: peer registry, request scheduler, and ordered
//! delivery index.
//!
//! One logical writer (the FSM) drives every method; no operation
//! yields, so each call is atomic with respect to every other. The pool
//! talks to the outside world only through its [`Reactor`].

use crate::peer::PeerRecord;
use crate::reactor::{Reactor, SendError};
use crate::{SyncConfig, SyncError};
use fastsync_types::{Block, BlockHeight, PeerId};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A delivered block together with the peer that sent it.
#[derive(Debug, Clone)]
pub struct BlockAndPeer {
    pub block: Arc<Block>,
    pub peer: PeerId,
}

/// Registry of peers and the schedule of block requests across them.
pub struct BlockPool<R: Reactor> {
    config: SyncConfig,
    /// Peers that have sent a usable status, keyed by id. `BTreeMap` so
    /// dispatch scans peers in a deterministic order.
    peers: BTreeMap<PeerId, PeerRecord>,
    /// Height → the peer a request was assigned to (answered or not).
    blocks: BTreeMap<BlockHeight, PeerId>,
    /// Heights selected for dispatch but not yet assigned to a peer.
    planned_requests: BTreeSet<BlockHeight>,
    /// Smallest height not yet considered for planning.
    next_request_height: BlockHeight,
    /// Next height the executor will consume.
    height: BlockHeight,
    /// Max advertised height across peers; 0 when there are none.
    max_peer_height: BlockHeight,
    reactor: R,
}

impl<R: Reactor> BlockPool<R> {
    /// Create a pool that will sync starting at `start_height`.
    pub fn new(start_height: BlockHeight, config: SyncConfig, reactor: R) -> Self {
        Self {
            config,
            peers: BTreeMap::new(),
            blocks: BTreeMap::new(),
            planned_requests: BTreeSet::new(),
            next_request_height: start_height,
            height: start_height,
            max_peer_height: BlockHeight(0),
            reactor,
        }
    }

    // ── Accessors ──

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Next height the executor will consume.
    pub fn height(&self) -> BlockHeight {
        self.height
    }

    pub fn max_peer_height(&self) -> BlockHeight {
        self.max_peer_height
    }

    pub fn next_request_height(&self) -> BlockHeight {
        self.next_request_height
    }

    pub fn num_peers(&self) -> usize {
        self.peers.len()
    }

    pub fn peer_ids(&self) -> Vec<PeerId> {
        self.peers.keys().copied().collect()
    }

    pub fn peer(&self, id: PeerId) -> Option<&PeerRecord> {
        self.peers.get(&id)
    }

    /// Heights currently assigned to a peer, with the assignee.
    pub fn assigned_heights(&self) -> Vec<(BlockHeight, PeerId)> {
        self.blocks.iter().map(|(&h, &p)| (h, p)).collect()
    }

    pub fn num_assigned(&self) -> usize {
        self.blocks.len()
    }

    /// Heights awaiting assignment, ascending.
    pub fn planned_heights(&self) -> Vec<BlockHeight> {
        self.planned_requests.iter().copied().collect()
    }

    pub fn reactor(&self) -> &R {
        &self.reactor
    }

    pub fn reactor_mut(&mut self) -> &mut R {
        &mut self.reactor
    }

    /// Whether the pool has caught up to the tallest peer.
    pub fn reached_max_height(&self) -> bool {
        self.height >= self.max_peer_height
    }

    /// Whether the scheduler has room for more assigned requests.
    pub fn needs_blocks(&self) -> bool {
        self.blocks.len() < self.config.max_in_flight
    }

    // ── Peer admission and removal ──

    /// Add a new peer or raise an existing peer's height.
    pub fn update_peer(
        &mut self,
        peer_id: PeerId,
        height: BlockHeight,
        now: Duration,
    ) -> Result<(), SyncError> {
        match self.peers.get_mut(&peer_id) {
            None => {
                if height < self.height {
                    debug!(peer = %peer_id, %height, floor = %self.height, "peer too short, not added");
                    return Err(SyncError::PeerTooShort {
                        peer: peer_id,
                        height,
                        floor: self.height,
                    });
                }
                self.peers
                    .insert(peer_id, PeerRecord::new(peer_id, height, now));
                info!(peer = %peer_id, %height, num_peers = self.peers.len(), "added peer");
            }
            Some(peer) => {
                if height < peer.height() {
                    let err = SyncError::PeerLowersHeight {
                        peer: peer_id,
                        from: peer.height(),
                        to: height,
                    };
                    self.remove_peer(peer_id, Some(&err));
                    return Err(err);
                }
                peer.set_height(height);
            }
        }

        self.update_max_peer_height();
        Ok(())
    }

    /// Remove a peer, rescheduling every height it was responsible for.
    ///
    /// `reason` is for logging only; short peers are removed with `None`.
    pub fn remove_peer(&mut self, peer_id: PeerId, reason: Option<&SyncError>) {
        let Some(mut peer) = self.peers.remove(&peer_id) else {
            return;
        };
        match reason {
            Some(err) => info!(peer = %peer_id, error = %err, "removing peer"),
            None => info!(peer = %peer_id, height = %peer.height(), "removing short peer"),
        }

        for height in peer.assigned_heights() {
            debug!(peer = %peer_id, %height, "rescheduling request");
            self.planned_requests.insert(height);
            self.blocks.remove(&height);
        }
        peer.cleanup();

        let old_max = self.max_peer_height;
        if peer.height() == old_max {
            self.update_max_peer_height();
        }

        // Losing the tallest peer shrinks the horizon: drop plans above
        // it and pull the planning cursor back.
        if self.max_peer_height < old_max {
            let max = self.max_peer_height;
            self.planned_requests.retain(|&h| h <= max);
            let clamp = BlockHeight(max.0 + 1).max(self.height);
            if self.next_request_height > clamp {
                self.next_request_height = clamp;
            }
        }
    }

    /// Report a peer-attributable error to the transport and remove the
    /// peer.
    pub fn fail_peer(&mut self, err: &SyncError, peer_id: PeerId) {
        self.reactor.send_peer_error(err, peer_id);
        self.remove_peer(peer_id, Some(err));
    }

    fn update_max_peer_height(&mut self) {
        self.max_peer_height = self
            .peers
            .values()
            .map(|p| p.height())
            .max()
            .unwrap_or(BlockHeight(0));
    }

    fn remove_short_peers(&mut self) {
        let short: Vec<PeerId> = self
            .peers
            .values()
            .filter(|p| p.height() < self.height)
            .map(|p| p.id())
            .collect();
        for peer_id in short {
            self.remove_peer(peer_id, None);
        }
    }

    /// Drop short peers, then peers failing the throughput floor.
    fn remove_bad_peers(&mut self, now: Duration) {
        self.remove_short_peers();

        let slow: Vec<SyncError> = self
            .peers
            .values()
            .filter_map(|p| p.check_rate(&self.config, now).err())
            .collect();
        for err in slow {
            if let SyncError::SlowPeer { peer, .. } = &err {
                let peer = *peer;
                warn!(%peer, error = %err, "peer below rate floor");
                self.fail_peer(&err, peer);
            }
        }
    }

    /// Peers whose oldest pending request has blown its deadline,
    /// with the height they are late on.
    pub fn timed_out_peers(&self, now: Duration) -> Vec<(PeerId, BlockHeight)> {
        self.peers
            .values()
            .filter(|p| p.timed_out(now))
            .filter_map(|p| p.oldest_pending().map(|h| (p.id(), h)))
            .collect()
    }

    // ── Planning and dispatch ──

    /// Plan and dispatch requests until the in-flight cap is reached or
    /// no peer can serve the next height.
    pub fn make_next_requests(&mut self, now: Duration) {
        let heights = self.make_request_batch(now);
        if !heights.is_empty() {
            debug!(count = heights.len(), first = %heights[0], "dispatching planned requests");
        }

        for height in heights {
            if !self.send_request(height, now) {
                // No peer can serve this height; the same holds for
                // every taller one in the batch.
                return;
            }
            self.planned_requests.remove(&height);
        }
    }

    /// Top up `planned_requests` to the in-flight cap and return the
    /// batch sorted ascending.
    fn make_request_batch(&mut self, now: Duration) -> Vec<BlockHeight> {
        self.remove_bad_peers(now);

        while self.planned_requests.len() + self.blocks.len() < self.config.max_in_flight {
            if self.next_request_height > self.max_peer_height {
                break;
            }
            self.planned_requests.insert(self.next_request_height);
            self.next_request_height = self.next_request_height.next();
        }

        self.planned_requests.iter().copied().collect()
    }

    /// Assign the request for `height` to the first peer with spare
    /// capacity that is tall enough.
    fn send_request(&mut self, height: BlockHeight, now: Duration) -> bool {
        let candidates: Vec<PeerId> = self.peers.keys().copied().collect();

        for peer_id in candidates {
            let Some(peer) = self.peers.get(&peer_id) else {
                continue;
            };
            if peer.num_pending() >= self.config.max_requests_per_peer {
                continue;
            }
            if peer.height() < height {
                continue;
            }

            match self.reactor.send_block_request(peer_id, height) {
                Err(SendError::NilPeer(_)) => {
                    let err = SyncError::NilPeer { peer: peer_id };
                    warn!(peer = %peer_id, %height, "transport lost peer, removing");
                    self.remove_peer(peer_id, Some(&err));
                    continue;
                }
                Err(SendError::QueueFull(_)) => {
                    debug!(peer = %peer_id, %height, "peer send queue full, skipping");
                    continue;
                }
                Ok(()) => {
                    debug!(peer = %peer_id, %height, "assigned request to peer");
                    self.blocks.insert(height, peer_id);
                    let timeout = self.config.peer_timeout;
                    if let Some(peer) = self.peers.get_mut(&peer_id) {
                        peer.request_sent(height, now, timeout);
                    }
                    return true;
                }
            }
        }

        warn!(%height, "no peer able to serve request");
        false
    }

    // ── Block arrival ──

    /// Accept a block from `peer_id`, verifying it is the peer the
    /// height was assigned to.
    pub fn add_block(
        &mut self,
        peer_id: PeerId,
        block: Arc<Block>,
        size: usize,
        now: Duration,
    ) -> Result<(), SyncError> {
        let height = block.height();

        if !self.peers.contains_key(&peer_id) {
            warn!(peer = %peer_id, %height, "block from unknown peer");
            return Err(SyncError::BadDataFromPeer {
                peer: peer_id,
                height,
            });
        }
        if let Some(&expected) = self.blocks.get(&height) {
            if expected != peer_id {
                warn!(
                    peer = %peer_id,
                    expected_peer = %expected,
                    %height,
                    "block received from wrong peer"
                );
                return Err(SyncError::BadDataFromPeer {
                    peer: peer_id,
                    height,
                });
            }
        }

        let timeout = self.config.peer_timeout;
        match self.peers.get_mut(&peer_id) {
            Some(peer) => peer.add_block(block, size, now, timeout),
            None => Err(SyncError::BadDataFromPeer {
                peer: peer_id,
                height,
            }),
        }
    }

    // ── Ordered delivery ──

    /// The delivered block and its peer at `height`.
    pub fn block_and_peer_at_height(&self, height: BlockHeight) -> Result<BlockAndPeer, SyncError> {
        let peer_id = self
            .blocks
            .get(&height)
            .copied()
            .ok_or(SyncError::MissingBlock { height })?;
        let peer = self
            .peers
            .get(&peer_id)
            .ok_or(SyncError::MissingBlock { height })?;
        let block = peer.block_at_height(height)?;
        Ok(BlockAndPeer {
            block,
            peer: peer_id,
        })
    }

    /// The blocks (and delivery peers) at heights H and H+1.
    ///
    /// Both lookups are returned so the caller sees the first error
    /// without losing the tuple that did resolve.
    pub fn first_two_blocks_and_peers(
        &self,
    ) -> (
        Result<BlockAndPeer, SyncError>,
        Result<BlockAndPeer, SyncError>,
    ) {
        (
            self.block_and_peer_at_height(self.height),
            self.block_and_peer_at_height(self.height.next()),
        )
    }

    /// Remove whichever peers delivered the blocks at H and H+1.
    ///
    /// Called when the executor rejects the pair; each delivering peer
    /// is charged with bad data and reported to the transport.
    pub fn invalidate_first_two_blocks(&mut self) {
        let (first, second) = self.first_two_blocks_and_peers();
        let mut removed = None;
        for entry in [first.ok(), second.ok()].into_iter().flatten() {
            // One peer may have delivered both heights; charge it once.
            if removed == Some(entry.peer) {
                continue;
            }
            let err = SyncError::BadDataFromPeer {
                peer: entry.peer,
                height: entry.block.height(),
            };
            self.fail_peer(&err, entry.peer);
            removed = Some(entry.peer);
        }
    }

    /// Remove the peer assigned at H if it has not delivered there;
    /// otherwise the peer at H+1 under the same condition. At most one
    /// peer is removed.
    ///
    /// Called when the executor has been unable to advance for a while:
    /// whoever is sitting on the head of the chain is the suspect.
    pub fn remove_peer_at_current_heights(&mut self) {
        for height in [self.height, self.height.next()] {
            let Some(&peer_id) = self.blocks.get(&height) else {
                continue;
            };
            let undelivered = self
                .peers
                .get(&peer_id)
                .is_some_and(|p| !p.has_block_at(height));
            if undelivered {
                let err = SyncError::MissingBlock { height };
                info!(peer = %peer_id, %height, "removing peer stalled at current heights");
                self.remove_peer(peer_id, Some(&err));
                return;
            }
        }
    }

    /// Consume the block at the pool height and advance.
    pub fn processed_current_height_block(&mut self) {
        let current = self.height;
        if let Some(&peer_id) = self.blocks.get(&current) {
            if let Some(peer) = self.peers.get_mut(&peer_id) {
                peer.remove_block(current);
            }
        }
        self.blocks.remove(&current);
        debug!(height = %current, "consumed block");
        self.height = current.next();
        self.remove_short_peers();
    }

    /// Disarm every peer deadline and release per-peer state.
    pub fn cleanup(&mut self) {
        for peer in self.peers.values_mut() {
            peer.cleanup();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{assert_pool_invariants, make_block, ScriptedReactor, SendOutcome};

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn pool_with(
        start: u64,
        max_in_flight: usize,
        max_per_peer: usize,
    ) -> BlockPool<ScriptedReactor> {
        let config = SyncConfig {
            max_in_flight,
            max_requests_per_peer: max_per_peer,
            ..Default::default()
        };
        BlockPool::new(BlockHeight(start), config, ScriptedReactor::default())
    }

    #[test]
    fn test_update_peer_admits_and_tracks_max() {
        let mut pool = pool_with(1, 10, 20);
        pool.update_peer(PeerId(1), BlockHeight(5), secs(0)).unwrap();
        pool.update_peer(PeerId(2), BlockHeight(9), secs(0)).unwrap();
        assert_eq!(pool.num_peers(), 2);
        assert_eq!(pool.max_peer_height(), BlockHeight(9));
        assert_pool_invariants(&pool);
    }

    #[test]
    fn test_update_peer_rejects_short_unknown_peer() {
        let mut pool = pool_with(10, 10, 20);
        let err = pool.update_peer(PeerId(1), BlockHeight(4), secs(0));
        assert!(matches!(err, Err(SyncError::PeerTooShort { .. })));
        assert_eq!(pool.num_peers(), 0);
        assert_eq!(pool.max_peer_height(), BlockHeight(0));
    }

    #[test]
    fn test_update_peer_height_regression_removes_peer() {
        let mut pool = pool_with(1, 10, 20);
        pool.update_peer(PeerId(1), BlockHeight(10), secs(0)).unwrap();
        pool.update_peer(PeerId(2), BlockHeight(6), secs(0)).unwrap();
        pool.make_next_requests(secs(1));
        let assigned_to_1: Vec<BlockHeight> = pool
            .assigned_heights()
            .into_iter()
            .filter(|(_, p)| *p == PeerId(1))
            .map(|(h, _)| h)
            .collect();
        assert!(!assigned_to_1.is_empty());

        let err = pool.update_peer(PeerId(1), BlockHeight(7), secs(2));
        assert!(matches!(err, Err(SyncError::PeerLowersHeight { .. })));
        assert_eq!(pool.num_peers(), 1);
        assert_eq!(pool.max_peer_height(), BlockHeight(6));

        // Heights the removed peer held are planned again (above the
        // new max they are dropped instead).
        for height in assigned_to_1 {
            if height <= BlockHeight(6) {
                assert!(pool.planned_heights().contains(&height));
            } else {
                assert!(!pool.planned_heights().contains(&height));
            }
        }
        assert_pool_invariants(&pool);
    }

    #[test]
    fn test_happy_path_plan_dispatch_deliver_process() {
        let mut pool = pool_with(1, 10, 20);
        pool.update_peer(PeerId(1), BlockHeight(5), secs(0)).unwrap();

        pool.make_next_requests(secs(1));
        assert_eq!(pool.num_assigned(), 5);
        assert!(pool.planned_heights().is_empty());
        assert_eq!(pool.reactor().requests.len(), 5);
        assert_pool_invariants(&pool);

        for h in 1..=5u64 {
            pool.add_block(PeerId(1), make_block(h), 1024, secs(2)).unwrap();
        }
        for _ in 1..=5 {
            let (first, _) = pool.first_two_blocks_and_peers();
            assert!(first.is_ok());
            pool.processed_current_height_block();
            assert_pool_invariants(&pool);
        }

        assert_eq!(pool.height(), BlockHeight(6));
        // The peer is now short and was dropped.
        assert_eq!(pool.num_peers(), 0);
        assert!(pool.reached_max_height());
    }

    #[test]
    fn test_tallest_peer_loss_clamps_planning() {
        let mut pool = pool_with(1, 30, 20);
        pool.update_peer(PeerId(1), BlockHeight(20), secs(0)).unwrap();
        pool.update_peer(PeerId(2), BlockHeight(8), secs(0)).unwrap();

        // Keep dispatch from assigning anything so the plan stays put.
        pool.reactor_mut()
            .refusals
            .insert(PeerId(1), SendOutcome::QueueFull);
        pool.reactor_mut()
            .refusals
            .insert(PeerId(2), SendOutcome::QueueFull);
        pool.make_next_requests(secs(1));
        assert_eq!(pool.planned_heights().len(), 20);

        pool.remove_peer(PeerId(1), None);

        assert_eq!(pool.max_peer_height(), BlockHeight(8));
        assert!(pool
            .planned_heights()
            .iter()
            .all(|&h| h <= BlockHeight(8)));
        assert!(pool.next_request_height() <= BlockHeight(9));
        assert_pool_invariants(&pool);
    }

    #[test]
    fn test_reschedule_conservation_law() {
        let mut pool = pool_with(1, 30, 20);
        pool.update_peer(PeerId(1), BlockHeight(20), secs(0)).unwrap();
        pool.update_peer(PeerId(2), BlockHeight(20), secs(0)).unwrap();
        pool.make_next_requests(secs(1));

        let mut before: Vec<BlockHeight> = pool.planned_heights();
        before.extend(pool.assigned_heights().iter().map(|(h, _)| *h));
        before.sort();

        pool.remove_peer(PeerId(1), None);

        // Same tallest height remains, so nothing may be lost.
        let mut after: Vec<BlockHeight> = pool.planned_heights();
        after.extend(pool.assigned_heights().iter().map(|(h, _)| *h));
        after.sort();

        assert_eq!(before, after);
        assert_pool_invariants(&pool);
    }

    #[test]
    fn test_cross_peer_contention_rejected() {
        let mut pool = pool_with(1, 10, 20);
        pool.update_peer(PeerId(1), BlockHeight(10), secs(0)).unwrap();
        pool.make_next_requests(secs(1));
        assert_eq!(pool.assigned_heights()[4], (BlockHeight(5), PeerId(1)));

        // A second peer shows up and answers a height assigned to the first.
        pool.update_peer(PeerId(3), BlockHeight(10), secs(1)).unwrap();
        let err = pool.add_block(PeerId(3), make_block(5), 1024, secs(2));
        assert!(matches!(err, Err(SyncError::BadDataFromPeer { .. })));

        // Assignment unchanged, sender not removed by this alone.
        assert_eq!(pool.assigned_heights()[4], (BlockHeight(5), PeerId(1)));
        assert!(pool.peer(PeerId(3)).is_some());
        assert_pool_invariants(&pool);
    }

    #[test]
    fn test_add_block_from_unknown_peer() {
        let mut pool = pool_with(1, 10, 20);
        let err = pool.add_block(PeerId(9), make_block(1), 10, secs(0));
        assert!(matches!(err, Err(SyncError::BadDataFromPeer { .. })));
    }

    #[test]
    fn test_send_queue_full_short_circuits_dispatch() {
        let mut pool = pool_with(1, 3, 20);
        pool.update_peer(PeerId(1), BlockHeight(10), secs(0)).unwrap();
        pool.reactor_mut()
            .refusals
            .insert(PeerId(1), SendOutcome::QueueFull);

        pool.make_next_requests(secs(1));

        assert_eq!(
            pool.planned_heights(),
            vec![BlockHeight(1), BlockHeight(2), BlockHeight(3)]
        );
        assert_eq!(pool.num_assigned(), 0);
        assert!(pool.reactor().requests.is_empty());
        assert_pool_invariants(&pool);
    }

    #[test]
    fn test_nil_peer_removes_and_falls_through() {
        let mut pool = pool_with(1, 5, 20);
        pool.update_peer(PeerId(1), BlockHeight(10), secs(0)).unwrap();
        pool.update_peer(PeerId(2), BlockHeight(10), secs(0)).unwrap();
        pool.reactor_mut()
            .refusals
            .insert(PeerId(1), SendOutcome::NilPeer);

        pool.make_next_requests(secs(1));

        // Peer 1 was dropped mid-dispatch; peer 2 got every request.
        assert!(pool.peer(PeerId(1)).is_none());
        assert_eq!(pool.num_assigned(), 5);
        assert!(pool.reactor().requests.iter().all(|(p, _)| *p == PeerId(2)));
        assert_pool_invariants(&pool);
    }

    #[test]
    fn test_per_peer_cap_spreads_requests() {
        let mut pool = pool_with(1, 6, 3);
        pool.update_peer(PeerId(1), BlockHeight(10), secs(0)).unwrap();
        pool.update_peer(PeerId(2), BlockHeight(10), secs(0)).unwrap();

        pool.make_next_requests(secs(1));

        let to_1 = pool
            .assigned_heights()
            .iter()
            .filter(|(_, p)| *p == PeerId(1))
            .count();
        let to_2 = pool
            .assigned_heights()
            .iter()
            .filter(|(_, p)| *p == PeerId(2))
            .count();
        assert_eq!(to_1, 3);
        assert_eq!(to_2, 3);
        assert_pool_invariants(&pool);
    }

    #[test]
    fn test_stall_at_head_removes_undelivered_peer() {
        let mut pool = pool_with(10, 10, 1);
        pool.update_peer(PeerId(1), BlockHeight(20), secs(0)).unwrap();
        pool.update_peer(PeerId(2), BlockHeight(20), secs(0)).unwrap();

        // max_requests_per_peer = 1 forces 10 → peer 1, 11 → peer 2.
        pool.make_next_requests(secs(1));
        assert_eq!(
            pool.assigned_heights(),
            vec![
                (BlockHeight(10), PeerId(1)),
                (BlockHeight(11), PeerId(2))
            ]
        );

        // Peer 2 delivers 11; peer 1 sits on 10.
        pool.add_block(PeerId(2), make_block(11), 1024, secs(2)).unwrap();

        pool.remove_peer_at_current_heights();

        assert!(pool.peer(PeerId(1)).is_none());
        assert!(pool.peer(PeerId(2)).is_some());
        assert!(pool.planned_heights().contains(&BlockHeight(10)));
        assert_pool_invariants(&pool);
    }

    #[test]
    fn test_stall_at_head_checks_second_height() {
        let mut pool = pool_with(10, 10, 1);
        pool.update_peer(PeerId(1), BlockHeight(20), secs(0)).unwrap();
        pool.update_peer(PeerId(2), BlockHeight(20), secs(0)).unwrap();
        pool.make_next_requests(secs(1));

        // H delivered, H+1 missing: the H+1 peer goes.
        pool.add_block(PeerId(1), make_block(10), 1024, secs(2)).unwrap();
        pool.remove_peer_at_current_heights();

        assert!(pool.peer(PeerId(1)).is_some());
        assert!(pool.peer(PeerId(2)).is_none());
        assert_pool_invariants(&pool);
    }

    #[test]
    fn test_invalidate_first_two_blocks() {
        let mut pool = pool_with(10, 10, 1);
        pool.update_peer(PeerId(1), BlockHeight(20), secs(0)).unwrap();
        pool.update_peer(PeerId(2), BlockHeight(20), secs(0)).unwrap();
        pool.make_next_requests(secs(1));
        pool.add_block(PeerId(1), make_block(10), 1024, secs(2)).unwrap();
        pool.add_block(PeerId(2), make_block(11), 1024, secs(2)).unwrap();

        pool.invalidate_first_two_blocks();

        assert_eq!(pool.num_peers(), 0);
        // Both delivering peers were reported to the transport.
        let reported: Vec<PeerId> = pool.reactor().errors.iter().map(|(p, _)| *p).collect();
        assert!(reported.contains(&PeerId(1)));
        assert!(reported.contains(&PeerId(2)));
        assert_pool_invariants(&pool);
    }

    #[test]
    fn test_first_two_returns_both_lookups() {
        let mut pool = pool_with(10, 10, 1);
        pool.update_peer(PeerId(1), BlockHeight(20), secs(0)).unwrap();
        pool.update_peer(PeerId(2), BlockHeight(20), secs(0)).unwrap();
        pool.make_next_requests(secs(1));

        // Only H+1 delivered: first errs, second resolves anyway.
        pool.add_block(PeerId(2), make_block(11), 1024, secs(2)).unwrap();
        let (first, second) = pool.first_two_blocks_and_peers();
        assert!(matches!(first, Err(SyncError::MissingBlock { .. })));
        let second = second.unwrap();
        assert_eq!(second.block.height(), BlockHeight(11));
        assert_eq!(second.peer, PeerId(2));
    }

    #[test]
    fn test_timed_out_peers_sweep() {
        let mut pool = pool_with(1, 4, 20);
        pool.update_peer(PeerId(1), BlockHeight(10), secs(0)).unwrap();
        pool.make_next_requests(secs(1));

        assert!(pool.timed_out_peers(secs(2)).is_empty());
        let late = pool.timed_out_peers(secs(30));
        assert_eq!(late.len(), 1);
        assert_eq!(late[0], (PeerId(1), BlockHeight(1)));
    }

    #[test]
    fn test_slow_peer_is_reported_and_removed_during_planning() {
        let mut pool = pool_with(1, 4, 20);
        pool.update_peer(PeerId(1), BlockHeight(10), secs(0)).unwrap();
        pool.make_next_requests(secs(1));

        // Well past grace and deadline with nothing delivered: planning
        // sweeps the peer out as slow before making new requests.
        pool.make_next_requests(secs(60));

        assert!(pool.peer(PeerId(1)).is_none());
        assert_eq!(pool.reactor().errors, vec![(PeerId(1), "slow_peer")]);
        assert_pool_invariants(&pool);
    }

    #[test]
    fn test_planning_caps_at_max_in_flight() {
        let mut pool = pool_with(1, 4, 20);
        pool.update_peer(PeerId(1), BlockHeight(100), secs(0)).unwrap();
        pool.make_next_requests(secs(1));
        assert_eq!(pool.num_assigned(), 4);
        assert!(!pool.needs_blocks());
        assert_eq!(pool.next_request_height(), BlockHeight(5));
        assert_pool_invariants(&pool);
    }

    #[test]
    fn test_planning_never_exceeds_max_peer_height() {
        let mut pool = pool_with(1, 50, 20);
        pool.update_peer(PeerId(1), BlockHeight(3), secs(0)).unwrap();
        pool.make_next_requests(secs(1));
        assert_eq!(pool.num_assigned(), 3);
        assert_eq!(pool.next_request_height(), BlockHeight(4));
        assert_pool_invariants(&pool);
    }

    #[test]
    fn test_processed_block_advances_and_drops_short_peers() {
        let mut pool = pool_with(1, 10, 20);
        pool.update_peer(PeerId(1), BlockHeight(1), secs(0)).unwrap();
        pool.update_peer(PeerId(2), BlockHeight(5), secs(0)).unwrap();
        pool.make_next_requests(secs(1));
        pool.add_block(PeerId(1), make_block(1), 512, secs(2)).unwrap();

        pool.processed_current_height_block();

        assert_eq!(pool.height(), BlockHeight(2));
        // Peer 1 (height 1) is now short.
        assert!(pool.peer(PeerId(1)).is_none());
        assert!(pool.peer(PeerId(2)).is_some());
        assert_pool_invariants(&pool);
    }

    #[test]
    fn test_cleanup_disarms_all_deadlines() {
        let mut pool = pool_with(1, 10, 20);
        pool.update_peer(PeerId(1), BlockHeight(5), secs(0)).unwrap();
        pool.make_next_requests(secs(1));
        assert!(!pool.timed_out_peers(secs(30)).is_empty());

        pool.cleanup();
        assert!(pool.timed_out_peers(secs(30)).is_empty());
    }
}
