//! Message bus
//!
//! Point-to-point and broadcast delivery between agents:
//! - `MessageBus` - Per-recipient bounded queues plus send history
//! - `RoutingRule` - Per-recipient overrides of default delivery
//! - `BoundedQueue` - Drop-oldest ring buffer shared with the workspace

#[allow(clippy::module_inception)]
pub mod bus;
pub mod queue;
pub mod routing;
pub mod stats;

pub use bus::MessageBus;
pub use queue::BoundedQueue;
pub use routing::{redirect, routing_rule, RoutingRule};
pub use stats::BusStats;
