//! Broadcast counters and relay snapshots

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated while broadcasting
///
/// Broadcasts update these without holding the registry lock.
#[derive(Debug, Default)]
pub struct RelayMetrics {
    broadcasts: AtomicU64,
    deliveries: AtomicU64,
    suppressed: AtomicU64,
    write_failures: AtomicU64,
}

impl RelayMetrics {
    pub(crate) fn record_broadcast(&self) {
        self.broadcasts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivery(&self) {
        self.deliveries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_suppressed(&self) {
        self.suppressed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot the counters together with the table sizes
    pub fn snapshot(&self, connections: usize, listeners: usize) -> RelayStats {
        RelayStats {
            connections,
            listeners,
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            suppressed: self.suppressed.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time statistics for one relay instance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Connections tracked in this relay's client map
    pub connections: usize,
    /// Entries in this relay's listener table
    pub listeners: usize,
    /// Broadcast passes run
    pub broadcasts: u64,
    /// Envelopes accepted by connections
    pub deliveries: u64,
    /// Broadcast passes aborted by a suppression predicate
    pub suppressed: u64,
    /// Envelopes a connection refused
    pub write_failures: u64,
}
