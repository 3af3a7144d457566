//! Subscriber notification
//!
//! This module provides the fan-out machinery shared by the bus and the workspace:
//! - `SubscriberList` - Callbacks grouped by topic, removable by `SubscriptionId`
//! - `Dispatcher` - Bounded worker pool that runs callbacks without blocking the caller
//!
//! Callbacks are fire-and-forget: the code that triggers a notification never
//! waits for it and never sees its failure.

pub mod dispatcher;
pub mod subscribers;

pub use dispatcher::{DispatchStats, Dispatcher};
pub use subscribers::{callback, Callback, SubscriberList, SubscriptionId};
