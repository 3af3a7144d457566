//! MessageBus - Routes messages to per-recipient queues
//!
//! The `MessageBus` is responsible for:
//! - Validating and stamping outgoing messages
//! - Keeping a bounded history of everything sent
//! - Routing: broadcast fan-out, routing rules, or direct enqueue
//! - Notifying recipient subscribers through the bounded dispatcher
//!
//! The bus is cheap to clone; all clones share the same queues.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use futures::FutureExt;
use tokio::sync::{Mutex, RwLock};

use crate::config::{BusConfig, DispatchConfig, MeshConfig};
use crate::core::{MeshError, MeshResult, Message, MessageId};
use crate::notify::{callback, Callback, Dispatcher, SubscriberList, SubscriptionId};

use super::queue::BoundedQueue;
use super::routing::RoutingRule;
use super::stats::{BusCounters, BusStats};

struct BusInner {
    config: BusConfig,
    dispatch_config: DispatchConfig,
    queues: Mutex<HashMap<String, BoundedQueue<Message>>>,
    history: Mutex<BoundedQueue<Message>>,
    subscribers: RwLock<SubscriberList<Message>>,
    rules: RwLock<HashMap<String, RoutingRule>>,
    dispatcher: RwLock<Option<Arc<Dispatcher<Message>>>>,
    running: AtomicBool,
    counters: BusCounters,
}

/// In-process message bus
#[derive(Clone)]
pub struct MessageBus {
    inner: Arc<BusInner>,
}

impl MessageBus {
    /// Create a stopped bus; call [`start`](Self::start) before sending
    pub fn new(config: &MeshConfig) -> Self {
        Self {
            inner: Arc::new(BusInner {
                config: config.bus.clone(),
                dispatch_config: config.dispatch.clone(),
                queues: Mutex::new(HashMap::new()),
                history: Mutex::new(BoundedQueue::new(config.bus.history_capacity)),
                subscribers: RwLock::new(SubscriberList::new()),
                rules: RwLock::new(HashMap::new()),
                dispatcher: RwLock::new(None),
                running: AtomicBool::new(false),
                counters: BusCounters::default(),
            }),
        }
    }

    /// Start accepting messages and spawn the notification workers
    pub async fn start(&self) {
        let mut dispatcher = self.inner.dispatcher.write().await;
        let needs_pool = dispatcher.as_ref().map_or(true, |d| d.is_shut_down());
        if needs_pool {
            *dispatcher = Some(Arc::new(Dispatcher::start(
                "bus",
                &self.inner.dispatch_config,
            )));
        }
        self.inner.running.store(true, Ordering::SeqCst);
        tracing::info!("Message bus started");
    }

    /// Stop accepting messages, cancel outstanding notifications and wait for them
    pub async fn stop(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
        let dispatcher = self.inner.dispatcher.read().await.clone();
        if let Some(dispatcher) = dispatcher {
            dispatcher.shutdown().await;
        }
        tracing::info!("Message bus stopped");
    }

    /// Whether the bus accepts `send` and `drain`
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    fn ensure_running(&self) -> MeshResult<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(MeshError::BusNotRunning)
        }
    }

    // =========================================================================
    // Sending
    // =========================================================================

    /// Validate, stamp, record and route a message
    ///
    /// Returns the message id. Delivery problems (failing rules or subscribers)
    /// are logged and counted, never returned.
    pub async fn send(&self, mut message: Message) -> MeshResult<MessageId> {
        self.ensure_running()?;
        message.validate()?;
        message.stamp();
        let id = message.id_str().to_string();

        tracing::debug!(
            message_id = %id,
            sender = %message.sender,
            recipient = %message.recipient,
            intent = %message.intent,
            "Sending message"
        );

        self.inner.history.lock().await.push(message.clone());
        self.route(message).await;
        BusCounters::incr(&self.inner.counters.sent);

        Ok(id)
    }

    async fn route(&self, message: Message) {
        if message.is_broadcast() {
            self.broadcast(message).await;
            return;
        }

        let rule = self.inner.rules.read().await.get(&message.recipient).cloned();
        match rule {
            Some(rule) => self.apply_rule(rule, message).await,
            None => {
                let recipient = message.recipient.clone();
                self.enqueue(&recipient, message).await;
            }
        }
    }

    async fn broadcast(&self, message: Message) {
        let recipients: Vec<String> = {
            let queues = self.inner.queues.lock().await;
            queues
                .keys()
                .filter(|name| **name != message.sender)
                .cloned()
                .collect()
        };

        tracing::debug!(sender = %message.sender, recipients = recipients.len(), "Broadcasting message");

        let deliveries = recipients.iter().map(|recipient| {
            let copy = message.clone();
            async move {
                let outcome = AssertUnwindSafe(self.enqueue(recipient, copy))
                    .catch_unwind()
                    .await;
                if outcome.is_err() {
                    BusCounters::incr(&self.inner.counters.rule_failures);
                    tracing::error!(recipient = %recipient, "Broadcast delivery failed");
                }
            }
        });
        join_all(deliveries).await;
    }

    async fn apply_rule(&self, rule: RoutingRule, message: Message) {
        let recipient = message.recipient.clone();
        let outcome = AssertUnwindSafe(rule(message, self.clone()))
            .catch_unwind()
            .await;

        let reason = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e.to_string(),
            Err(_) => "routing rule panicked".to_string(),
        };
        BusCounters::incr(&self.inner.counters.rule_failures);
        let err = MeshError::DeliveryFailure { recipient, reason };
        tracing::error!(error = %err, "Routing rule failed");
    }

    /// Default delivery: enqueue for `recipient` and notify its subscribers
    ///
    /// Bypasses routing rules, so rules can use it to redirect. Fails with
    /// `BusNotRunning` once the bus has been stopped.
    pub async fn deliver(&self, recipient: &str, message: Message) -> MeshResult<()> {
        self.ensure_running()?;
        self.enqueue(recipient, message).await;
        Ok(())
    }

    async fn enqueue(&self, recipient: &str, message: Message) {
        let evicted = {
            let mut queues = self.inner.queues.lock().await;
            queues
                .entry(recipient.to_string())
                .or_insert_with(|| BoundedQueue::new(self.inner.config.queue_capacity))
                .push(message.clone())
        };

        if let Some(old) = evicted {
            BusCounters::incr(&self.inner.counters.evicted);
            tracing::warn!(recipient = %recipient, evicted_id = %old.id_str(), "Queue full, evicted oldest message");
        }

        let callbacks = self.inner.subscribers.read().await.for_topic(recipient);
        if !callbacks.is_empty() {
            let dispatcher = self.inner.dispatcher.read().await.clone();
            match dispatcher {
                Some(dispatcher) => {
                    for cb in callbacks {
                        dispatcher.dispatch(recipient, cb, message.clone());
                    }
                }
                None => {
                    tracing::debug!(recipient = %recipient, "No dispatcher, skipping notifications");
                }
            }
        }

        BusCounters::incr(&self.inner.counters.delivered);
        tracing::debug!(recipient = %recipient, message_id = %message.id_str(), "Message delivered");
    }

    // =========================================================================
    // Receiving
    // =========================================================================

    /// Remove and return every queued message for `recipient`, oldest first
    pub async fn drain(&self, recipient: &str) -> MeshResult<Vec<Message>> {
        self.ensure_running()?;
        let mut queues = self.inner.queues.lock().await;
        let queue = queues
            .entry(recipient.to_string())
            .or_insert_with(|| BoundedQueue::new(self.inner.config.queue_capacity));
        Ok(queue.drain_all())
    }

    /// Copy of the queued messages for `recipient` without removing them
    pub async fn peek(&self, recipient: &str) -> Vec<Message> {
        let mut queues = self.inner.queues.lock().await;
        queues
            .entry(recipient.to_string())
            .or_insert_with(|| BoundedQueue::new(self.inner.config.queue_capacity))
            .snapshot()
    }

    /// Make `recipient` known so it receives broadcasts
    pub async fn register(&self, recipient: &str) {
        let mut queues = self.inner.queues.lock().await;
        queues
            .entry(recipient.to_string())
            .or_insert_with(|| BoundedQueue::new(self.inner.config.queue_capacity));
    }

    /// Names of every known recipient, sorted
    pub async fn known_recipients(&self) -> Vec<String> {
        let queues = self.inner.queues.lock().await;
        let mut names: Vec<String> = queues.keys().cloned().collect();
        names.sort();
        names
    }

    /// Drop every queued message for `recipient`
    pub async fn clear_queue(&self, recipient: &str) -> usize {
        let mut queues = self.inner.queues.lock().await;
        let cleared = queues.get_mut(recipient).map(|q| q.clear()).unwrap_or(0);
        tracing::info!(recipient = %recipient, cleared, "Cleared message queue");
        cleared
    }

    /// Number of messages queued for `recipient`
    pub async fn queue_size(&self, recipient: &str) -> usize {
        let queues = self.inner.queues.lock().await;
        queues.get(recipient).map(|q| q.len()).unwrap_or(0)
    }

    /// Newest `limit` messages from the send history, oldest first
    pub async fn history(&self, limit: usize) -> Vec<Message> {
        self.inner.history.lock().await.tail(limit)
    }

    // =========================================================================
    // Subscriptions and routing rules
    // =========================================================================

    /// Invoke `f` on every future delivery to `recipient`
    pub async fn subscribe<F, Fut>(&self, recipient: &str, f: F) -> SubscriptionId
    where
        F: Fn(Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.subscribe_callback(recipient, callback(f)).await
    }

    /// Register a pre-built callback
    pub async fn subscribe_callback(&self, recipient: &str, cb: Callback<Message>) -> SubscriptionId {
        let id = self.inner.subscribers.write().await.add(recipient, cb);
        tracing::info!(recipient = %recipient, subscription = %id, "Subscribed callback");
        id
    }

    /// Remove a subscription; returns false if it did not exist
    pub async fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.inner.subscribers.write().await;
        let removed = subscribers.remove(id);
        tracing::debug!(removed, recipients = subscribers.topic_count(), "Bus subscription removed");
        removed
    }

    /// Install (or replace) the routing rule for `recipient`
    pub async fn add_routing_rule(&self, recipient: &str, rule: RoutingRule) {
        self.inner
            .rules
            .write()
            .await
            .insert(recipient.to_string(), rule);
        tracing::info!(recipient = %recipient, "Added routing rule");
    }

    /// Remove the routing rule for `recipient`
    pub async fn remove_routing_rule(&self, recipient: &str) -> bool {
        self.inner.rules.write().await.remove(recipient).is_some()
    }

    // =========================================================================
    // Stats
    // =========================================================================

    /// Counter and queue snapshot
    pub async fn stats(&self) -> BusStats {
        let queue_sizes = {
            let queues = self.inner.queues.lock().await;
            queues
                .iter()
                .map(|(name, q)| (name.clone(), q.len()))
                .collect::<std::collections::BTreeMap<_, _>>()
        };
        let notifications = self
            .inner
            .dispatcher
            .read()
            .await
            .as_ref()
            .map(|d| d.stats())
            .unwrap_or_default();
        let counters = &self.inner.counters;

        BusStats {
            messages_sent: BusCounters::get(&counters.sent),
            messages_delivered: BusCounters::get(&counters.delivered),
            failed_deliveries: BusCounters::get(&counters.rule_failures)
                + notifications.failed
                + notifications.dropped,
            messages_evicted: BusCounters::get(&counters.evicted),
            total_agents: queue_sizes.len(),
            queue_sizes,
            subscribers: self.inner.subscribers.read().await.len(),
            routing_rules: self.inner.rules.read().await.len(),
            running: self.is_running(),
            notifications,
        }
    }
}

impl std::fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBus")
            .field("running", &self.is_running())
            .field("queue_capacity", &self.inner.config.queue_capacity)
            .finish()
    }
}
