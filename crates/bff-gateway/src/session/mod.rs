//! Peer sessions: state, registry, namespaces and the per-session services.

pub mod namespace;
pub mod registry;
pub mod rooms;
pub mod state;
pub mod subscriptions;

pub use namespace::TopicNamespace;
pub use registry::SessionRegistry;
pub use rooms::RoomChannel;
pub use state::{Session, SubscriptionKind};
pub use subscriptions::SubscriptionManager;
