//! Per-peer accounting for the block pool.
//!
//! A [`PeerRecord`] tracks what has been asked of one peer and what it
//! has delivered, estimates its throughput, and carries the single
//! deadline that covers its oldest outstanding request. All time is
//! logical (`Duration` since an epoch the caller picks), so the record
//! is deterministic under test.

use crate::{SyncConfig, SyncError};
use fastsync_types::{Block, BlockHeight, PeerId};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// Smallest elapsed interval used for a rate sample. Deliveries closer
/// together than this are clamped so a burst doesn't divide by ~zero.
const MIN_SAMPLE_INTERVAL: Duration = Duration::from_millis(1);

/// State for a single peer known to the pool.
#[derive(Debug)]
pub struct PeerRecord {
    id: PeerId,
    /// Largest height the peer has advertised. Never decreases; the
    /// pool removes a peer that tries.
    height: BlockHeight,
    /// Requests sent but not yet answered: height → send time.
    pending: BTreeMap<BlockHeight, Duration>,
    /// Blocks received but not yet consumed: height → (block, wire size).
    delivered: BTreeMap<BlockHeight, (Arc<Block>, usize)>,
    /// Exponentially smoothed receive rate in bytes/sec.
    recv_rate: f64,
    /// Time of the most recent delivery.
    last_recv: Option<Duration>,
    /// When the peer was first admitted (grace-period anchor).
    first_seen: Duration,
    /// Deadline for the oldest pending request. Armed iff `pending` is
    /// non-empty.
    deadline: Option<Duration>,
}

impl PeerRecord {
    /// EMA smoothing factor for the receive rate. A new sample carries
    /// 10% weight; history carries the rest.
    pub const RATE_ALPHA: f64 = 0.1;

    /// Create a record for a peer first seen at `now` advertising `height`.
    pub fn new(id: PeerId, height: BlockHeight, now: Duration) -> Self {
        Self {
            id,
            height,
            pending: BTreeMap::new(),
            delivered: BTreeMap::new(),
            recv_rate: 0.0,
            last_recv: None,
            first_seen: now,
            deadline: None,
        }
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn height(&self) -> BlockHeight {
        self.height
    }

    /// Raise the advertised height. Lowering is the pool's error path
    /// and never reaches the record.
    pub fn set_height(&mut self, height: BlockHeight) {
        debug_assert!(height >= self.height);
        self.height = height;
    }

    pub fn num_pending(&self) -> usize {
        self.pending.len()
    }

    pub fn num_delivered(&self) -> usize {
        self.delivered.len()
    }

    /// Current throughput estimate in bytes/sec.
    pub fn recv_rate(&self) -> f64 {
        self.recv_rate
    }

    /// Heights of requests awaiting an answer, ascending.
    pub fn pending_heights(&self) -> Vec<BlockHeight> {
        self.pending.keys().copied().collect()
    }

    /// Heights of delivered-but-unconsumed blocks, ascending.
    pub fn delivered_heights(&self) -> Vec<BlockHeight> {
        self.delivered.keys().copied().collect()
    }

    /// Every height assigned to this peer, pending or delivered.
    pub fn assigned_heights(&self) -> Vec<BlockHeight> {
        self.pending
            .keys()
            .chain(self.delivered.keys())
            .copied()
            .collect()
    }

    /// Oldest height with an outstanding request.
    pub fn oldest_pending(&self) -> Option<BlockHeight> {
        self.pending.keys().next().copied()
    }

    /// Whether the block at `height` has been delivered.
    pub fn has_block_at(&self, height: BlockHeight) -> bool {
        self.delivered.contains_key(&height)
    }

    /// Record that a request for `height` was just sent.
    ///
    /// The caller guarantees `height` is not already assigned to this
    /// peer and that the per-peer cap has room. Arms the deadline if it
    /// was disarmed.
    pub fn request_sent(&mut self, height: BlockHeight, now: Duration, timeout: Duration) {
        debug_assert!(!self.pending.contains_key(&height));
        debug_assert!(!self.delivered.contains_key(&height));
        self.pending.insert(height, now);
        if self.deadline.is_none() {
            self.deadline = Some(now + timeout);
        }
    }

    /// Move a block from pending to delivered and fold its size into
    /// the rate estimate.
    ///
    /// Fails with `BadDataFromPeer` if the height was not pending.
    pub fn add_block(
        &mut self,
        block: Arc<Block>,
        size: usize,
        now: Duration,
        timeout: Duration,
    ) -> Result<(), SyncError> {
        let height = block.height();
        if self.pending.remove(&height).is_none() {
            return Err(SyncError::BadDataFromPeer {
                peer: self.id,
                height,
            });
        }

        let since = self.last_recv.unwrap_or(self.first_seen);
        let elapsed = now.saturating_sub(since).max(MIN_SAMPLE_INTERVAL);
        let instantaneous = size as f64 / elapsed.as_secs_f64();
        self.recv_rate = if self.last_recv.is_none() {
            instantaneous
        } else {
            Self::RATE_ALPHA * instantaneous + (1.0 - Self::RATE_ALPHA) * self.recv_rate
        };
        self.last_recv = Some(now);

        trace!(
            peer = %self.id,
            %height,
            size,
            rate = self.recv_rate as u64,
            "block delivered"
        );

        self.delivered.insert(height, (block, size));

        // The deadline now covers the new oldest outstanding request.
        self.deadline = if self.pending.is_empty() {
            None
        } else {
            Some(now + timeout)
        };

        Ok(())
    }

    /// Erase `height` from both pending and delivered.
    pub fn remove_block(&mut self, height: BlockHeight) {
        self.pending.remove(&height);
        self.delivered.remove(&height);
        if self.pending.is_empty() {
            self.deadline = None;
        }
    }

    /// The delivered block at `height`, if any.
    pub fn block_at_height(&self, height: BlockHeight) -> Result<Arc<Block>, SyncError> {
        self.delivered
            .get(&height)
            .map(|(block, _)| Arc::clone(block))
            .ok_or(SyncError::MissingBlock { height })
    }

    /// Enforce the throughput floor.
    ///
    /// A peer is slow only when the grace window has elapsed, its rate
    /// is below the floor, and at least one pending request has blown
    /// its deadline. A quiet peer with nothing outstanding is fine.
    pub fn check_rate(&self, config: &SyncConfig, now: Duration) -> Result<(), SyncError> {
        if now.saturating_sub(self.first_seen) < config.rate_grace_period {
            return Ok(());
        }
        if self.recv_rate >= config.min_recv_rate {
            return Ok(());
        }
        let overdue = !self.pending.is_empty() && self.deadline.is_some_and(|d| now > d);
        if !overdue {
            return Ok(());
        }
        Err(SyncError::SlowPeer {
            peer: self.id,
            rate: self.recv_rate,
        })
    }

    /// Whether the oldest pending request has exceeded its deadline.
    pub fn timed_out(&self, now: Duration) -> bool {
        !self.pending.is_empty() && self.deadline.is_some_and(|d| now >= d)
    }

    /// Disarm the deadline and release all per-height state.
    pub fn cleanup(&mut self) {
        self.deadline = None;
        self.pending.clear();
        self.delivered.clear();
    }
}
