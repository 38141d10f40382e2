//! Event-queue driver for the synchronization FSM.
//!
//! Multi-producer, single-consumer: transport ingress, timer sources,
//! and the executor all hold a [`SyncHandle`]; exactly one thread runs
//! [`SyncDriver::run`] and is the sole writer of pool state. Ticks are
//! synthesized whenever the queue is quiet for one tick interval, so no
//! separate timer thread is needed.

use crate::{Reactor, SyncEvent, SyncFsm};
use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};
use tracing::{debug, info};

enum Envelope {
    Event(SyncEvent),
    Shutdown,
}

/// Clone-able sender half of the driver's event queue.
#[derive(Clone)]
pub struct SyncHandle {
    tx: Sender<Envelope>,
}

impl SyncHandle {
    /// Enqueue an event. Returns `false` if the driver is gone.
    pub fn send(&self, event: SyncEvent) -> bool {
        self.tx.send(Envelope::Event(event)).is_ok()
    }

    /// Ask the driver to drain, clean up, and exit.
    pub fn shutdown(&self) {
        let _ = self.tx.send(Envelope::Shutdown);
    }
}

/// Owns the FSM and consumes its event queue.
pub struct SyncDriver<R: Reactor> {
    fsm: SyncFsm<R>,
    rx: Receiver<Envelope>,
    tick_interval: Duration,
    started: Instant,
}

impl<R: Reactor> SyncDriver<R> {
    /// Wrap an FSM in a driver and hand back the queue's sender.
    pub fn new(fsm: SyncFsm<R>) -> (Self, SyncHandle) {
        let (tx, rx) = unbounded();
        let tick_interval = fsm.pool().config().tick_interval;
        (
            Self {
                fsm,
                rx,
                tick_interval,
                started: Instant::now(),
            },
            SyncHandle { tx },
        )
    }

    /// Run until shutdown or all handles are dropped, then return the
    /// FSM for final inspection.
    pub fn run(mut self) -> SyncFsm<R> {
        info!(tick = ?self.tick_interval, "sync driver started");

        loop {
            match self.rx.recv_timeout(self.tick_interval) {
                Ok(Envelope::Event(event)) => {
                    let now = self.started.elapsed();
                    self.fsm.handle(event, now);
                }
                Err(RecvTimeoutError::Timeout) => {
                    let now = self.started.elapsed();
                    self.fsm.handle(SyncEvent::Tick, now);
                }
                Ok(Envelope::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        // Drain events that raced the shutdown, then release peer state.
        let mut drained = 0usize;
        while let Ok(envelope) = self.rx.try_recv() {
            if let Envelope::Event(event) = envelope {
                self.fsm.handle(event, self.started.elapsed());
                drained += 1;
            }
        }
        if drained > 0 {
            debug!(drained, "processed events queued behind shutdown");
        }

        self.fsm.cleanup();
        info!(state = self.fsm.state().as_str(), "sync driver stopped");
        self.fsm
    }
}
