//! Synchronization FSM: the single writer that drives the pool.
//!
//! Pure synchronous state machine. Consumes [`SyncEvent`]s from one
//! ordered queue and mutates the [`BlockPool`]; all outbound I/O goes
//! through the pool's [`Reactor`](crate::Reactor). Timers never touch
//! state directly. Deadlines are swept on [`SyncEvent::Tick`], which
//! the driver posts like any other event.
//!
//! # Usage
//!
//! ```text
//! Driver ──► SyncFsm::handle(SyncEvent, now) ──► pool mutation + reactor sends
//! ```

use crate::pool::{BlockAndPeer, BlockPool};
use crate::reactor::Reactor;
use crate::{SyncConfig, SyncError};
use fastsync_types::{Block, BlockHeight, PeerId};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Current phase of the sync session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// No peers tall enough to sync from.
    Waiting,
    /// Actively requesting and consuming blocks.
    Syncing,
    /// Caught up to the max known peer height.
    Finished,
}

impl SyncState {
    /// Returns a string representation for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Waiting => "waiting",
            SyncState::Syncing => "syncing",
            SyncState::Finished => "finished",
        }
    }
}

/// All inputs to the synchronization FSM.
///
/// Events are passive data describing something that happened; the FSM
/// decides what to do with them.
#[derive(Debug)]
pub enum SyncEvent {
    /// Periodic tick: sweep deadlines, top up requests, detect stalls.
    Tick,
    /// A peer announced its current height.
    StatusResponse { peer: PeerId, height: BlockHeight },
    /// A peer delivered a block. `size` is the wire size in bytes.
    BlockResponse {
        peer: PeerId,
        block: Arc<Block>,
        size: usize,
    },
    /// A peer does not have the block it advertised.
    NoBlockResponse { peer: PeerId, height: BlockHeight },
    /// The executor consumed the block at the pool height.
    BlockProcessed,
    /// The executor rejected the blocks at H / H+1.
    BlockVerificationFailed,
    /// The transport or a timer attributed an error to a peer.
    PeerError { peer: PeerId, error: SyncError },
}

/// Sync status snapshot for external APIs.
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    /// Current phase.
    pub state: SyncState,
    /// Next height the executor will consume.
    pub height: u64,
    /// Max advertised height across peers.
    pub max_peer_height: u64,
    /// Number of live peers.
    pub num_peers: usize,
    /// Requests assigned to peers and not yet consumed.
    pub requests_in_flight: usize,
    /// Heights planned but not yet assigned.
    pub planned_requests: usize,
}

/// The synchronization state machine.
pub struct SyncFsm<R: Reactor> {
    pool: BlockPool<R>,
    state: SyncState,
    /// Ticks since the executor last advanced.
    ticks_without_progress: u32,
    /// Stall episodes since the executor last advanced.
    consecutive_stalls: u32,
}

impl<R: Reactor> SyncFsm<R> {
    /// Create an FSM that will sync starting at `start_height`.
    pub fn new(start_height: BlockHeight, config: SyncConfig, reactor: R) -> Self {
        Self {
            pool: BlockPool::new(start_height, config, reactor),
            state: SyncState::Waiting,
            ticks_without_progress: 0,
            consecutive_stalls: 0,
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn pool(&self) -> &BlockPool<R> {
        &self.pool
    }

    /// Mutable pool access for embedders (and tests) that need to reach
    /// the reactor.
    pub fn pool_mut(&mut self) -> &mut BlockPool<R> {
        &mut self.pool
    }

    /// The executor's pull surface: blocks at H and H+1.
    pub fn first_two_blocks_and_peers(
        &self,
    ) -> (
        Result<BlockAndPeer, SyncError>,
        Result<BlockAndPeer, SyncError>,
    ) {
        self.pool.first_two_blocks_and_peers()
    }

    /// Snapshot for external APIs.
    pub fn status(&self) -> SyncStatus {
        SyncStatus {
            state: self.state,
            height: self.pool.height().0,
            max_peer_height: self.pool.max_peer_height().0,
            num_peers: self.pool.num_peers(),
            requests_in_flight: self.pool.num_assigned(),
            planned_requests: self.pool.planned_heights().len(),
        }
    }

    /// Process one event. Runs to completion; never yields.
    pub fn handle(&mut self, event: SyncEvent, now: Duration) {
        match event {
            SyncEvent::Tick => self.on_tick(now),
            SyncEvent::StatusResponse { peer, height } => {
                self.on_status_response(peer, height, now)
            }
            SyncEvent::BlockResponse { peer, block, size } => {
                self.on_block_response(peer, block, size, now)
            }
            SyncEvent::NoBlockResponse { peer, height } => self.on_no_block_response(peer, height),
            SyncEvent::BlockProcessed => self.on_block_processed(),
            SyncEvent::BlockVerificationFailed => self.on_verification_failed(),
            SyncEvent::PeerError { peer, error } => self.on_peer_error(peer, error),
        }
    }

    /// Release all pool state (shutdown path).
    pub fn cleanup(&mut self) {
        self.pool.cleanup();
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Event Handlers
    // ═══════════════════════════════════════════════════════════════════════

    fn on_tick(&mut self, now: Duration) {
        if self.state != SyncState::Syncing {
            return;
        }

        // Deadline sweep: report and drop peers sitting on an expired
        // request. Their heights go back into the plan below.
        for (peer, height) in self.pool.timed_out_peers(now) {
            let err = SyncError::PeerTimedOut { peer, height };
            warn!(%peer, %height, "peer timed out");
            self.pool.fail_peer(&err, peer);
        }

        if self.pool.needs_blocks() {
            self.pool.make_next_requests(now);
        }

        self.ticks_without_progress += 1;
        if self.ticks_without_progress >= self.pool.config().stall_threshold_ticks {
            self.ticks_without_progress = 0;
            self.consecutive_stalls += 1;
            if self.consecutive_stalls >= 2 {
                warn!(
                    height = %self.pool.height(),
                    "second consecutive stall, invalidating head blocks"
                );
                self.pool.invalidate_first_two_blocks();
                self.consecutive_stalls = 0;
            } else {
                warn!(
                    height = %self.pool.height(),
                    "no progress, removing peer at current heights"
                );
                self.pool.remove_peer_at_current_heights();
            }
        }

        self.check_peer_supply();
    }

    fn on_status_response(&mut self, peer: PeerId, height: BlockHeight, now: Duration) {
        if self.state == SyncState::Finished {
            trace!(%peer, %height, "status after finish, ignored");
            return;
        }

        match self.pool.update_peer(peer, height, now) {
            Ok(()) => {
                if self.state == SyncState::Waiting && self.pool.num_peers() > 0 {
                    info!(%peer, %height, "usable peer available, syncing");
                    self.state = SyncState::Syncing;
                }
            }
            Err(err) => {
                debug!(%peer, %height, error = %err, "status rejected");
                self.check_peer_supply();
            }
        }
    }

    fn on_block_response(&mut self, peer: PeerId, block: Arc<Block>, size: usize, now: Duration) {
        if self.state != SyncState::Syncing {
            trace!(%peer, state = self.state.as_str(), "block response ignored");
            return;
        }

        let height = block.height();
        if let Err(err) = self.pool.add_block(peer, block, size, now) {
            // Bad data alone does not remove the sender; the transport
            // is told nothing and the assignment stands.
            warn!(%peer, %height, error = %err, "rejected block response");
        }
    }

    fn on_no_block_response(&mut self, peer: PeerId, height: BlockHeight) {
        if self.state != SyncState::Syncing {
            return;
        }
        let err = SyncError::NoBlockAtHeight { peer, height };
        self.pool.remove_peer(peer, Some(&err));
        self.check_peer_supply();
    }

    fn on_block_processed(&mut self) {
        if self.state != SyncState::Syncing {
            return;
        }

        self.pool.processed_current_height_block();
        self.ticks_without_progress = 0;
        self.consecutive_stalls = 0;

        if self.pool.reached_max_height() {
            info!(height = %self.pool.height(), "caught up to max peer height");
            self.state = SyncState::Finished;
        } else {
            self.check_peer_supply();
        }
    }

    fn on_verification_failed(&mut self) {
        if self.state != SyncState::Syncing {
            return;
        }
        warn!(height = %self.pool.height(), "executor rejected head blocks");
        self.pool.invalidate_first_two_blocks();
        self.check_peer_supply();
    }

    fn on_peer_error(&mut self, peer: PeerId, error: SyncError) {
        if self.state == SyncState::Finished {
            return;
        }
        self.pool.remove_peer(peer, Some(&error));
        self.check_peer_supply();
    }

    /// Losing the last peer drops the FSM back to Waiting.
    fn check_peer_supply(&mut self) {
        if self.state == SyncState::Syncing && self.pool.num_peers() == 0 {
            info!("no peers left, waiting");
            self.state = SyncState::Waiting;
            self.ticks_without_progress = 0;
            self.consecutive_stalls = 0;
        }
    }
}
