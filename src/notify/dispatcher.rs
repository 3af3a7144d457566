//! Dispatcher - bounded fan-out of subscriber notifications
//!
//! Notifications are queued on a bounded mpsc channel and executed by a fixed
//! pool of worker tasks. Callers never wait for callbacks:
//! - `dispatch` is synchronous and never blocks; a full queue drops the
//!   notification and counts it
//! - a failing or panicking callback is logged and counted, other
//!   notifications are unaffected
//! - `shutdown` cancels the workers (including callbacks in flight) and waits
//!   for them to exit

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::DispatchConfig;

use super::subscribers::Callback;

/// One queued callback invocation
struct Job<E> {
    topic: String,
    callback: Callback<E>,
    event: E,
}

#[derive(Default)]
struct DispatchCounters {
    dispatched: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
    cancelled: AtomicU64,
}

/// Snapshot of dispatcher counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchStats {
    /// Notifications accepted onto the queue
    pub dispatched: u64,
    /// Callbacks that returned Ok
    pub completed: u64,
    /// Callbacks that returned an error or panicked
    pub failed: u64,
    /// Notifications rejected because the queue was full or closed
    pub dropped: u64,
    /// Callbacks interrupted by shutdown
    pub cancelled: u64,
    /// Notifications currently queued
    pub pending: usize,
}

/// Worker pool running subscriber callbacks
pub struct Dispatcher<E> {
    name: &'static str,
    tx: mpsc::Sender<Job<E>>,
    cancel: CancellationToken,
    workers: TaskTracker,
    counters: Arc<DispatchCounters>,
}

impl<E: Send + 'static> Dispatcher<E> {
    /// Spawn the worker pool
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(name: &'static str, config: &DispatchConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let cancel = CancellationToken::new();
        let counters = Arc::new(DispatchCounters::default());
        let workers = TaskTracker::new();

        for worker in 0..config.workers.max(1) {
            workers.spawn(worker_loop(
                name,
                worker,
                rx.clone(),
                cancel.clone(),
                counters.clone(),
            ));
        }
        workers.close();

        tracing::debug!(dispatcher = name, workers = config.workers, capacity = config.capacity, "Dispatcher started");

        Self {
            name,
            tx,
            cancel,
            workers,
            counters,
        }
    }

    /// Queue one callback invocation; returns false if it was dropped
    pub fn dispatch(&self, topic: &str, callback: Callback<E>, event: E) -> bool {
        let job = Job {
            topic: topic.to_string(),
            callback,
            event,
        };
        match self.tx.try_send(job) {
            Ok(()) => {
                self.counters.dispatched.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(job)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(dispatcher = self.name, topic = %job.topic, "Notification queue full, dropping notification");
                false
            }
            Err(TrySendError::Closed(job)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(dispatcher = self.name, topic = %job.topic, "Dispatcher closed, dropping notification");
                false
            }
        }
    }

    /// Cancel outstanding notifications and wait for every worker to exit
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.workers.wait().await;
        tracing::debug!(dispatcher = self.name, "Dispatcher stopped");
    }

    /// Whether `shutdown` has been requested
    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Counter snapshot
    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            dispatched: self.counters.dispatched.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            cancelled: self.counters.cancelled.load(Ordering::Relaxed),
            pending: self.tx.max_capacity() - self.tx.capacity(),
        }
    }
}

impl<E> Drop for Dispatcher<E> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl<E> std::fmt::Debug for Dispatcher<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("name", &self.name)
            .field("workers", &self.workers.len())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

async fn worker_loop<E: Send + 'static>(
    name: &'static str,
    worker: usize,
    rx: Arc<Mutex<mpsc::Receiver<Job<E>>>>,
    cancel: CancellationToken,
    counters: Arc<DispatchCounters>,
) {
    loop {
        let next = {
            let mut rx = rx.lock().await;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                job = rx.recv() => job,
            }
        };

        let Some(job) = next else {
            break;
        };

        let call = AssertUnwindSafe((job.callback)(job.event)).catch_unwind();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                counters.cancelled.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(dispatcher = name, worker, topic = %job.topic, "Notification cancelled");
                break;
            }
            outcome = call => match outcome {
                Ok(Ok(())) => {
                    counters.completed.fetch_add(1, Ordering::Relaxed);
                }
                Ok(Err(e)) => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(dispatcher = name, topic = %job.topic, error = %e, "Subscriber callback failed");
                }
                Err(_) => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(dispatcher = name, topic = %job.topic, "Subscriber callback panicked");
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::subscribers::callback;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::Notify;

    fn config(workers: usize, capacity: usize) -> DispatchConfig {
        DispatchConfig::default()
            .with_workers(workers)
            .with_capacity(capacity)
    }

    async fn wait_until(mut check: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_runs_callbacks() {
        let dispatcher = Dispatcher::start("test", &config(2, 16));
        let hits = Arc::new(AtomicUsize::new(0));

        let hits_cb = hits.clone();
        let cb = callback(move |n: usize| {
            let hits = hits_cb.clone();
            async move {
                hits.fetch_add(n, Ordering::SeqCst);
                Ok(())
            }
        });

        for _ in 0..5 {
            assert!(dispatcher.dispatch("t", cb.clone(), 2));
        }

        wait_until(|| hits.load(Ordering::SeqCst) == 10).await;
        wait_until(|| dispatcher.stats().completed == 5).await;
        assert_eq!(dispatcher.stats().dispatched, 5);
        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let dispatcher = Dispatcher::start("test", &config(1, 16));
        let ok_hits = Arc::new(AtomicUsize::new(0));

        let failing = callback(|_: ()| async { anyhow::bail!("boom") });
        let panicking = callback(|_: ()| async { panic!("callback panic") });
        let ok_hits_cb = ok_hits.clone();
        let ok = callback(move |_: ()| {
            let hits = ok_hits_cb.clone();
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        dispatcher.dispatch("t", failing, ());
        dispatcher.dispatch("t", panicking, ());
        dispatcher.dispatch("t", ok, ());

        wait_until(|| ok_hits.load(Ordering::SeqCst) == 1).await;
        let stats = dispatcher.stats();
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.completed, 1);
        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_full_queue_drops() {
        let dispatcher = Dispatcher::start("test", &config(1, 1));
        let gate = Arc::new(Notify::new());
        let started = Arc::new(AtomicUsize::new(0));

        let gate_cb = gate.clone();
        let started_cb = started.clone();
        let blocking = callback(move |_: ()| {
            let gate = gate_cb.clone();
            let started = started_cb.clone();
            async move {
                started.fetch_add(1, Ordering::SeqCst);
                gate.notified().await;
                Ok(())
            }
        });

        // First job occupies the only worker, second fills the queue
        assert!(dispatcher.dispatch("t", blocking.clone(), ()));
        wait_until(|| started.load(Ordering::SeqCst) == 1).await;
        assert!(dispatcher.dispatch("t", blocking.clone(), ()));
        assert!(!dispatcher.dispatch("t", blocking, ()));

        let stats = dispatcher.stats();
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.pending, 1);

        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_cancels_in_flight() {
        let dispatcher = Dispatcher::start("test", &config(1, 4));
        let started = Arc::new(AtomicUsize::new(0));

        let started_cb = started.clone();
        let forever = callback(move |_: ()| {
            let started = started_cb.clone();
            async move {
                started.fetch_add(1, Ordering::SeqCst);
                std::future::pending::<()>().await;
                Ok(())
            }
        });

        dispatcher.dispatch("t", forever, ());
        wait_until(|| started.load(Ordering::SeqCst) == 1).await;

        tokio::time::timeout(Duration::from_secs(2), dispatcher.shutdown())
            .await
            .expect("shutdown should not hang");
        assert_eq!(dispatcher.stats().cancelled, 1);
        assert!(dispatcher.is_shut_down());
    }
}
