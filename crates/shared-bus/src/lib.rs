//! # Shared Bus - Topic Bus for Peer Messaging
//!
//! Thin abstraction over a publish/subscribe broker, used by the gateway to
//! relay peer and system messages.
//!
//! ```text
//! ┌──────────────┐                          ┌──────────────┐
//! │   Session A  │   publish(subject)       │   Session B  │
//! │              │ ──────┐                  │              │
//! └──────────────┘       │                  └──────────────┘
//!                        ▼                          ↑
//!                  ┌──────────────┐   Channel<T>    │
//!                  │  Topic Bus   │ ────────────────┘
//!                  │              │  subscribe(pattern)
//!                  └──────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - **At-most-once:** no acknowledgement, persistence or replay
//! - **Validated topics:** malformed topics never reach the broker
//! - **Non-blocking delivery:** full subscriber buffers drop the newest message

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod bus;
pub mod channel;
pub mod topic;

// Re-export main types
pub use bus::{BusError, BusMessage, BusSubscription, Delivery, InMemoryTopicBus, TopicBus};
pub use channel::{Channel, PushOutcome};
pub use topic::{TopicError, TopicPattern, WILDCARD};

/// Messages buffered per subscription before overflow drops kick in.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 50;
