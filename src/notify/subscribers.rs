//! Subscriber callbacks and the per-topic lists that hold them
//!
//! Both the bus (topic = recipient) and the workspace (topic = key, plus a
//! wildcard topic) keep their subscribers in a [`SubscriberList`].

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Type-erased async callback invoked with one event
pub type Callback<E> = Arc<dyn Fn(E) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Wrap an async closure as a [`Callback`]
pub fn callback<E, F, Fut>(f: F) -> Callback<E>
where
    E: 'static,
    F: Fn(E) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |event: E| f(event).boxed())
}

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Create a fresh id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Callbacks grouped by topic
pub struct SubscriberList<E> {
    topics: HashMap<String, Vec<(SubscriptionId, Callback<E>)>>,
}

impl<E> SubscriberList<E> {
    /// Create an empty list
    pub fn new() -> Self {
        Self {
            topics: HashMap::new(),
        }
    }

    /// Register a callback for `topic`
    pub fn add(&mut self, topic: impl Into<String>, callback: Callback<E>) -> SubscriptionId {
        let id = SubscriptionId::new();
        self.topics
            .entry(topic.into())
            .or_default()
            .push((id, callback));
        id
    }

    /// Remove a callback by id; returns false if it was not registered
    pub fn remove(&mut self, id: SubscriptionId) -> bool {
        let mut emptied = None;
        let mut removed = false;
        for (topic, subs) in self.topics.iter_mut() {
            if let Some(pos) = subs.iter().position(|(sub_id, _)| *sub_id == id) {
                subs.remove(pos);
                removed = true;
                if subs.is_empty() {
                    emptied = Some(topic.clone());
                }
                break;
            }
        }
        if let Some(topic) = emptied {
            self.topics.remove(&topic);
        }
        removed
    }

    /// Callbacks registered for `topic`, in registration order
    pub fn for_topic(&self, topic: &str) -> Vec<Callback<E>> {
        self.topics
            .get(topic)
            .map(|subs| subs.iter().map(|(_, cb)| cb.clone()).collect())
            .unwrap_or_default()
    }

    /// Total number of registered callbacks
    pub fn len(&self) -> usize {
        self.topics.values().map(Vec::len).sum()
    }

    /// Check if no callbacks are registered
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// Number of topics with at least one callback
    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }
}

impl<E> Default for SubscriberList<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for SubscriberList<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (topic, subs) in &self.topics {
            map.entry(topic, &subs.len());
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Callback<u32> {
        callback(|_n: u32| async { Ok(()) })
    }

    #[test]
    fn test_add_and_lookup() {
        let mut list = SubscriberList::new();
        list.add("a", noop());
        list.add("a", noop());
        list.add("b", noop());

        assert_eq!(list.len(), 3);
        assert_eq!(list.topic_count(), 2);
        assert_eq!(list.for_topic("a").len(), 2);
        assert!(list.for_topic("missing").is_empty());
    }

    #[test]
    fn test_remove_drops_empty_topic() {
        let mut list = SubscriberList::new();
        let id = list.add("a", noop());

        assert!(list.remove(id));
        assert_eq!(list.topic_count(), 0);
        assert!(list.is_empty());
        assert!(!list.remove(id));
    }

    #[tokio::test]
    async fn test_callback_runs() {
        let cb = callback(|n: u32| async move {
            if n == 0 {
                anyhow::bail!("zero");
            }
            Ok(())
        });
        assert!(cb(1).await.is_ok());
        assert!(cb(0).await.is_err());
    }
}
