//! Event subscriptions: registry, engine, and the access-check gate.

pub mod access_check;
pub mod engine;
pub mod registry;

pub use access_check::{AccessCheckQueue, PendingAccessCheck};
pub use engine::SubscriptionEngine;
pub use registry::{Subscription, SubscriptionRegistry};
