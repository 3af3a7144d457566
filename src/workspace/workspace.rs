//! Workspace - shared key/value store with per-key locking
//!
//! Every operation on a key runs under that key's lock, so writes to one key
//! are serialized and the change log preserves their order. Operations on
//! different keys never wait for each other.
//!
//! Change notifications go through a bounded [`Dispatcher`]; writers never wait
//! for subscribers.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};

use crate::bus::BoundedQueue;
use crate::config::MeshConfig;
use crate::core::{AgentStatus, MeshError, MeshResult};
use crate::notify::{callback, Callback, DispatchStats, Dispatcher, SubscriberList, SubscriptionId};

use super::change::{ChangeOp, ChangeRecord, Entry, EntryMetadata, WriteOutcome};
use super::status::{status_key, AgentStatusRecord, STATUS_KEY_PREFIX};

/// Subscription topic that receives changes to every key
pub const WILDCARD: &str = "*";

#[derive(Debug, Default)]
struct WorkspaceCounters {
    reads: AtomicU64,
    writes: AtomicU64,
    updates: AtomicU64,
    deletes: AtomicU64,
    clears: AtomicU64,
}

/// Snapshot returned by [`Workspace::stats`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceStats {
    /// `get` / `get_with_metadata` calls
    pub reads: u64,
    /// `set` calls that created a key
    pub writes: u64,
    /// `set` calls that overwrote a key
    pub updates: u64,
    /// `delete` calls that removed a key
    pub deletes: u64,
    /// `clear` calls
    pub clears: u64,
    pub total_keys: usize,
    pub history_size: usize,
    /// Number of per-key locks currently held in the lock map
    pub lock_count: usize,
    pub subscribers: usize,
    pub notifications: DispatchStats,
}

/// Serializable export of every entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceSnapshot {
    pub entries: BTreeMap<String, Entry>,
    pub taken_at: DateTime<Utc>,
}

struct WorkspaceInner {
    entries: RwLock<BTreeMap<String, Entry>>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    history: Mutex<BoundedQueue<ChangeRecord>>,
    subscribers: RwLock<SubscriberList<ChangeRecord>>,
    dispatcher: Dispatcher<ChangeRecord>,
    counters: WorkspaceCounters,
}

/// Shared key/value store
#[derive(Clone)]
pub struct Workspace {
    inner: Arc<WorkspaceInner>,
}

impl Workspace {
    /// Create an empty workspace
    ///
    /// Spawns the notification workers, so it must be called from within a
    /// tokio runtime.
    pub fn new(config: &MeshConfig) -> Self {
        Self {
            inner: Arc::new(WorkspaceInner {
                entries: RwLock::new(BTreeMap::new()),
                locks: Mutex::new(HashMap::new()),
                history: Mutex::new(BoundedQueue::new(config.workspace.history_capacity)),
                subscribers: RwLock::new(SubscriberList::new()),
                dispatcher: Dispatcher::start("workspace", &config.dispatch),
                counters: WorkspaceCounters::default(),
            }),
        }
    }

    /// Cancel outstanding change notifications and wait for the workers
    pub async fn shutdown(&self) {
        self.inner.dispatcher.shutdown().await;
    }

    async fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.inner.locks.lock().await;
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Forget the lock of an absent key once `lock` is its only outside holder
    async fn release_lock(&self, key: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.inner.locks.lock().await;
        // One reference lives in the map, the other is `lock`
        if Arc::strong_count(&lock) == 2 && !self.inner.entries.read().await.contains_key(key) {
            locks.remove(key);
        }
    }

    /// Append to the log and fan out to subscribers; caller holds the key lock
    async fn record(&self, change: ChangeRecord) {
        self.inner.history.lock().await.push(change.clone());

        let callbacks = {
            let subscribers = self.inner.subscribers.read().await;
            let mut callbacks = subscribers.for_topic(&change.key);
            if change.key != WILDCARD {
                callbacks.extend(subscribers.for_topic(WILDCARD));
            }
            callbacks
        };
        for cb in callbacks {
            self.inner.dispatcher.dispatch(&change.key, cb, change.clone());
        }
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Store `value` under `key`, remembering the previous value
    pub async fn set(
        &self,
        key: &str,
        value: Value,
        writer: &str,
    ) -> MeshResult<WriteOutcome> {
        if key.trim().is_empty() {
            tracing::error!(writer = %writer, "Rejected workspace write with empty key");
            return Err(MeshError::InvalidKey(key.to_string()));
        }

        let lock = self.key_lock(key).await;
        let _guard = lock.lock().await;

        let previous = {
            let mut entries = self.inner.entries.write().await;
            let previous = entries.get(key).map(|e| e.value.clone());
            entries.insert(
                key.to_string(),
                Entry {
                    value: value.clone(),
                    metadata: EntryMetadata {
                        writer: writer.to_string(),
                        timestamp: Utc::now(),
                        previous_value: previous.clone(),
                    },
                },
            );
            previous
        };

        let outcome = if previous.is_some() {
            self.inner.counters.updates.fetch_add(1, Ordering::Relaxed);
            WriteOutcome::Updated
        } else {
            self.inner.counters.writes.fetch_add(1, Ordering::Relaxed);
            WriteOutcome::Created
        };

        self.record(ChangeRecord::new(key, ChangeOp::Set, writer, previous, Some(value)))
            .await;

        tracing::debug!(key = %key, writer = %writer, outcome = ?outcome, "Workspace set");
        Ok(outcome)
    }

    /// Remove `key`; returns false (and logs nothing to history) if it was absent
    pub async fn delete(&self, key: &str, writer: &str) -> bool {
        let lock = self.key_lock(key).await;
        let removed = {
            let _guard = lock.lock().await;
            let removed = self.inner.entries.write().await.remove(key);
            if let Some(entry) = removed {
                self.inner.counters.deletes.fetch_add(1, Ordering::Relaxed);
                self.record(ChangeRecord::new(key, ChangeOp::Delete, writer, Some(entry.value), None))
                    .await;
                true
            } else {
                false
            }
        };
        self.release_lock(key, lock).await;

        if removed {
            tracing::debug!(key = %key, writer = %writer, "Workspace delete");
        }
        removed
    }

    /// Remove every key, emitting one `clear` record per removed key
    pub async fn clear(&self, writer: &str) -> usize {
        let keys = self.keys().await;
        let mut removed = 0;

        for key in keys {
            let lock = self.key_lock(&key).await;
            {
                let _guard = lock.lock().await;
                let entry = self.inner.entries.write().await.remove(&key);
                if let Some(entry) = entry {
                    removed += 1;
                    self.record(ChangeRecord::new(&key, ChangeOp::Clear, writer, Some(entry.value), None))
                        .await;
                }
            }
            self.release_lock(&key, lock).await;
        }

        self.inner.counters.clears.fetch_add(1, Ordering::Relaxed);
        tracing::info!(writer = %writer, removed, "Workspace cleared");
        removed
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Current value of `key`
    pub async fn get(&self, key: &str) -> Option<Value> {
        self.get_with_metadata(key).await.map(|entry| entry.value)
    }

    /// Current value of `key` with its last-write metadata
    pub async fn get_with_metadata(&self, key: &str) -> Option<Entry> {
        let lock = self.key_lock(key).await;
        let entry = {
            let _guard = lock.lock().await;
            self.inner.counters.reads.fetch_add(1, Ordering::Relaxed);
            self.inner.entries.read().await.get(key).cloned()
        };
        if entry.is_none() {
            self.release_lock(key, lock).await;
        }
        entry
    }

    /// Whether `key` is present
    pub async fn exists(&self, key: &str) -> bool {
        self.inner.entries.read().await.contains_key(key)
    }

    /// Sorted snapshot of every key
    pub async fn keys(&self) -> Vec<String> {
        self.inner.entries.read().await.keys().cloned().collect()
    }

    /// Snapshot of every value, in key order
    pub async fn values(&self) -> Vec<Value> {
        self.inner
            .entries
            .read()
            .await
            .values()
            .map(|e| e.value.clone())
            .collect()
    }

    /// Snapshot of every key/value pair, in key order
    pub async fn items(&self) -> Vec<(String, Value)> {
        self.inner
            .entries
            .read()
            .await
            .iter()
            .map(|(k, e)| (k.clone(), e.value.clone()))
            .collect()
    }

    /// Number of keys
    pub async fn size(&self) -> usize {
        self.inner.entries.read().await.len()
    }

    /// Entries whose last writer is `writer`
    pub async fn get_by_agent(&self, writer: &str) -> BTreeMap<String, Value> {
        self.inner
            .entries
            .read()
            .await
            .iter()
            .filter(|(_, e)| e.metadata.writer == writer)
            .map(|(k, e)| (k.clone(), e.value.clone()))
            .collect()
    }

    /// Keys whose last writer is `writer`
    pub async fn get_keys_by_agent(&self, writer: &str) -> Vec<String> {
        self.inner
            .entries
            .read()
            .await
            .iter()
            .filter(|(_, e)| e.metadata.writer == writer)
            .map(|(k, _)| k.clone())
            .collect()
    }

    // =========================================================================
    // Agent status
    // =========================================================================

    /// Write the status record of `agent_id`
    pub async fn update_agent_status(
        &self,
        agent_id: &str,
        status: AgentStatus,
        detail: Option<String>,
    ) -> MeshResult<WriteOutcome> {
        let record = AgentStatusRecord::new(agent_id, status, detail);
        let value = serde_json::to_value(&record)?;
        self.set(&status_key(agent_id), value, agent_id).await
    }

    /// Last status record written for `agent_id`
    pub async fn get_agent_status(&self, agent_id: &str) -> Option<AgentStatusRecord> {
        let value = self.get(&status_key(agent_id)).await?;
        parse_status(&status_key(agent_id), value)
    }

    /// Every status record, keyed by agent id
    pub async fn get_all_agent_statuses(&self) -> BTreeMap<String, AgentStatusRecord> {
        let items = self.items().await;
        items
            .into_iter()
            .filter(|(key, _)| key.starts_with(STATUS_KEY_PREFIX))
            .filter_map(|(key, value)| parse_status(&key, value))
            .map(|record| (record.agent_id.clone(), record))
            .collect()
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Invoke `f` on every change to `key`
    pub async fn subscribe<F, Fut>(&self, key: &str, f: F) -> SubscriptionId
    where
        F: Fn(ChangeRecord) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.subscribe_callback(key, callback(f)).await
    }

    /// Invoke `f` on every change to any key
    pub async fn subscribe_all<F, Fut>(&self, f: F) -> SubscriptionId
    where
        F: Fn(ChangeRecord) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.subscribe_callback(WILDCARD, callback(f)).await
    }

    /// Register a pre-built callback for `key` (or [`WILDCARD`])
    pub async fn subscribe_callback(&self, key: &str, cb: Callback<ChangeRecord>) -> SubscriptionId {
        let id = self.inner.subscribers.write().await.add(key, cb);
        tracing::debug!(key = %key, subscription = %id, "Workspace subscription added");
        id
    }

    /// Remove a subscription; returns false if it did not exist
    pub async fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.subscribers.write().await.remove(id)
    }

    // =========================================================================
    // History, stats, snapshots
    // =========================================================================

    /// Newest `limit` change records, oldest first
    pub async fn change_history(&self, limit: usize) -> Vec<ChangeRecord> {
        self.inner.history.lock().await.tail(limit)
    }

    /// Counter snapshot
    pub async fn stats(&self) -> WorkspaceStats {
        let counters = &self.inner.counters;
        WorkspaceStats {
            reads: counters.reads.load(Ordering::Relaxed),
            writes: counters.writes.load(Ordering::Relaxed),
            updates: counters.updates.load(Ordering::Relaxed),
            deletes: counters.deletes.load(Ordering::Relaxed),
            clears: counters.clears.load(Ordering::Relaxed),
            total_keys: self.size().await,
            history_size: self.inner.history.lock().await.len(),
            lock_count: self.inner.locks.lock().await.len(),
            subscribers: self.inner.subscribers.read().await.len(),
            notifications: self.inner.dispatcher.stats(),
        }
    }

    /// Export every entry with its metadata
    pub async fn snapshot(&self) -> WorkspaceSnapshot {
        WorkspaceSnapshot {
            entries: self.inner.entries.read().await.clone(),
            taken_at: Utc::now(),
        }
    }

    /// Replay every entry of `snapshot` through `set`, returning how many were written
    pub async fn import(&self, snapshot: WorkspaceSnapshot, writer: &str) -> MeshResult<usize> {
        let mut imported = 0;
        for (key, entry) in snapshot.entries {
            self.set(&key, entry.value, writer).await?;
            imported += 1;
        }
        tracing::info!(writer = %writer, imported, "Workspace snapshot imported");
        Ok(imported)
    }
}

fn parse_status(key: &str, value: Value) -> Option<AgentStatusRecord> {
    match serde_json::from_value(value) {
        Ok(record) => Some(record),
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "Malformed agent status record");
            None
        }
    }
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("dispatcher", &self.inner.dispatcher)
            .finish()
    }
}
