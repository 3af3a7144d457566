//! Bus counters and their serializable snapshot

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::notify::DispatchStats;

/// Live counters, updated without locking
#[derive(Debug, Default)]
pub(crate) struct BusCounters {
    pub sent: AtomicU64,
    pub delivered: AtomicU64,
    pub rule_failures: AtomicU64,
    pub evicted: AtomicU64,
}

impl BusCounters {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

/// Snapshot returned by `MessageBus::stats`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BusStats {
    /// Messages accepted by `send`
    pub messages_sent: u64,

    /// Per-recipient enqueues (a broadcast counts once per recipient)
    pub messages_delivered: u64,

    /// Routing rule failures plus failed or dropped subscriber notifications
    pub failed_deliveries: u64,

    /// Messages evicted from full recipient queues
    pub messages_evicted: u64,

    /// Current depth of every known recipient queue
    pub queue_sizes: BTreeMap<String, usize>,

    /// Number of known recipients
    pub total_agents: usize,

    /// Number of registered subscriber callbacks
    pub subscribers: usize,

    /// Number of installed routing rules
    pub routing_rules: usize,

    /// Whether the bus accepts messages
    pub running: bool,

    /// Notification dispatcher counters
    pub notifications: DispatchStats,
}
