//! Broadcast-channel monitor

use tokio::sync::broadcast;

use super::events::MonitorEvent;
use super::Monitor;

/// Default buffer size for the monitor broadcast channel
pub const MONITOR_CHANNEL_SIZE: usize = 256;

/// Receiver half handed to monitor consumers
pub type MonitorReceiver = broadcast::Receiver<MonitorEvent>;

/// Fans events out to every subscribed receiver
///
/// Publishing with no receivers, or to lagging receivers, never fails; slow
/// consumers lose the oldest events.
#[derive(Debug, Clone)]
pub struct BroadcastMonitor {
    tx: broadcast::Sender<MonitorEvent>,
}

impl BroadcastMonitor {
    pub fn new() -> Self {
        Self::with_capacity(MONITOR_CHANNEL_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// New receiver; sees only events published after this call
    pub fn subscribe(&self) -> MonitorReceiver {
        self.tx.subscribe()
    }

    /// Number of connected receivers
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for BroadcastMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl Monitor for BroadcastMonitor {
    fn publish(&self, event: MonitorEvent) {
        // No receivers is fine
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::EventKind;

    #[tokio::test]
    async fn test_publish_reaches_all_receivers() {
        let monitor = BroadcastMonitor::new();
        let mut rx1 = monitor.subscribe();
        let mut rx2 = monitor.subscribe();

        monitor.publish(MonitorEvent::thinking("r1", "looking things up"));

        let e1 = rx1.recv().await.unwrap();
        let e2 = rx2.recv().await.unwrap();
        assert_eq!(e1.kind, EventKind::Thinking);
        assert_eq!(e1, e2);
    }

    #[tokio::test]
    async fn test_publish_without_receivers() {
        let monitor = BroadcastMonitor::with_capacity(4);
        assert_eq!(monitor.receiver_count(), 0);
        monitor.publish(MonitorEvent::error("r1", "nobody listening"));
    }

    #[tokio::test]
    async fn test_lagging_receiver() {
        let monitor = BroadcastMonitor::with_capacity(2);
        let mut rx = monitor.subscribe();
        for i in 0..5 {
            monitor.publish(MonitorEvent::thinking("r1", format!("step {}", i)));
        }

        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(3))
        ));
        let next = rx.recv().await.unwrap();
        assert_eq!(next.data["thought"], "step 3");
    }
}
