//! Monitoring
//!
//! Agents report status changes, reasoning notes, task progress, message
//! traffic and errors as [`MonitorEvent`]s. Delivery is best-effort: a
//! monitor must never block or fail the caller.

pub mod broadcast;
pub mod events;

use std::sync::Arc;

pub use broadcast::{BroadcastMonitor, MonitorReceiver, MONITOR_CHANNEL_SIZE};
pub use events::{EventKind, MonitorEvent};

/// Sink for monitor events
pub trait Monitor: Send + Sync {
    /// Publish one event; must not block
    fn publish(&self, event: MonitorEvent);
}

/// Shared monitor handle
pub type SharedMonitor = Arc<dyn Monitor>;

/// Monitor that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMonitor;

impl Monitor for NoopMonitor {
    fn publish(&self, _event: MonitorEvent) {}
}
