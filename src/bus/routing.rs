//! Routing rules - per-recipient overrides of default delivery
//!
//! A rule receives the message and a handle to the bus. It may drop the
//! message, rewrite it, or hand it to [`MessageBus::deliver`] under another
//! recipient name.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::core::Message;

use super::bus::MessageBus;

/// Type-erased routing rule
pub type RoutingRule = Arc<dyn Fn(Message, MessageBus) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Wrap an async closure as a [`RoutingRule`]
pub fn routing_rule<F, Fut>(f: F) -> RoutingRule
where
    F: Fn(Message, MessageBus) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |message: Message, bus: MessageBus| f(message, bus).boxed())
}

/// Rule that delivers every message for one recipient to another
pub fn redirect(target: impl Into<String>) -> RoutingRule {
    let target: String = target.into();
    routing_rule(move |message, bus| {
        let target = target.clone();
        async move {
            bus.deliver(&target, message).await?;
            Ok::<_, anyhow::Error>(())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MeshConfig;
    use crate::core::Content;

    #[tokio::test]
    async fn test_redirect_rule() {
        let bus = MessageBus::new(&MeshConfig::default());
        bus.start().await;
        bus.add_routing_rule("old-name", redirect("new-name")).await;

        bus.send(Message::new("human", "old-name", "user", "ping", Content::Empty))
            .await
            .unwrap();

        assert!(bus.peek("old-name").await.is_empty());
        let moved = bus.drain("new-name").await.unwrap();
        assert_eq!(moved.len(), 1);
        assert_eq!(moved[0].recipient, "old-name");
        bus.stop().await;
    }

    #[tokio::test]
    async fn test_transforming_rule() {
        let bus = MessageBus::new(&MeshConfig::default());
        bus.start().await;
        bus.add_routing_rule(
            "shouty",
            routing_rule(|mut message: Message, bus: MessageBus| async move {
                if let Content::Text(text) = &message.content {
                    message.content = Content::text(text.to_uppercase());
                }
                bus.deliver("shouty", message).await?;
                Ok::<_, anyhow::Error>(())
            }),
        )
        .await;

        bus.send(Message::new("human", "shouty", "user", "say", Content::text("hi")))
            .await
            .unwrap();

        let messages = bus.drain("shouty").await.unwrap();
        assert_eq!(messages[0].content, Content::text("HI"));
        bus.stop().await;
    }

    #[tokio::test]
    async fn test_deliver_requires_running_bus() {
        let bus = MessageBus::new(&MeshConfig::default());
        let message = Message::new("human", "bot", "user", "ping", Content::Empty);
        assert!(matches!(
            bus.deliver("bot", message.clone()).await,
            Err(crate::core::MeshError::BusNotRunning)
        ));
        assert_eq!(bus.queue_size("bot").await, 0);

        bus.start().await;
        bus.deliver("bot", message).await.unwrap();
        assert_eq!(bus.queue_size("bot").await, 1);
        bus.stop().await;
    }
}
