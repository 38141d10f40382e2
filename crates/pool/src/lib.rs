//! Block-synchronization pool.
//!
//! Retrieves a contiguous range of sealed blocks from untrusted peers
//! and delivers them in strict height order to a downstream executor.
//! The architecture is a single-writer event loop:
//!
//! ```text
//! transport ──► inbound ──► SyncHandle ─┐
//! timers ───────────────────────────────┤──► SyncDriver ──► SyncFsm ──► BlockPool
//! executor ──────────────────────────────┘                    │
//!                                              Reactor ◄──────┘
//! ```
//!
//! - [`BlockPool`]: peer registry, request scheduler, ordered delivery
//! - [`SyncFsm`]: the event-driven state machine that owns the pool
//! - [`SyncDriver`]/[`SyncHandle`]: the MPSC queue and its consumer
//! - [`Reactor`]: capability seam the transport implements
//! - [`inbound_from_wire`]: wire bytes → classified events

mod config;
mod driver;
mod error;
mod fsm;
mod inbound;
mod peer;
mod pool;
mod reactor;

pub mod test_helpers;

pub use config::SyncConfig;
pub use driver::{SyncDriver, SyncHandle};
pub use error::SyncError;
pub use fsm::{SyncEvent, SyncFsm, SyncState, SyncStatus};
pub use inbound::{inbound_from_wire, Inbound};
pub use peer::PeerRecord;
pub use pool::{BlockAndPeer, BlockPool};
pub use reactor::{Reactor, SendError};
