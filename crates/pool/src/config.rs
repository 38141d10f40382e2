//! Configuration for the block-synchronization pool.

use std::time::Duration;

/// Tunable constants for the pool, the FSM, and the driver.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Global cap on assigned plus planned requests.
    pub max_in_flight: usize,

    /// Per-peer cap on in-flight block requests.
    pub max_requests_per_peer: usize,

    /// Throughput floor (bytes/sec) below which a peer is slow.
    pub min_recv_rate: f64,

    /// Deadline for the oldest pending request to a peer.
    pub peer_timeout: Duration,

    /// How long a peer is observed before rate enforcement kicks in.
    pub rate_grace_period: Duration,

    /// Ticks without executor progress before the head peer is removed.
    pub stall_threshold_ticks: u32,

    /// Driver tick cadence.
    pub tick_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 64,
            max_requests_per_peer: 20,
            min_recv_rate: 7680.0,
            peer_timeout: Duration::from_secs(15),
            rate_grace_period: Duration::from_secs(10),
            stall_threshold_ticks: 5,
            tick_interval: Duration::from_secs(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.max_in_flight, 64);
        assert_eq!(config.max_requests_per_peer, 20);
        assert_eq!(config.peer_timeout, Duration::from_secs(15));
        assert_eq!(config.stall_threshold_ticks, 5);
    }
}
