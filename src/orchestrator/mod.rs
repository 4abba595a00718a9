//! Reminder orchestration modules.
//!
//! Covers the live subscriber representation, the per-subscriber reminder
//! state machine, and the store that keeps both in step with durable
//! records.

pub mod reminder_engine;
pub mod subscriber;
pub mod subscriber_store;

pub use reminder_engine::{ReminderEngine, ReminderSettings};
pub use subscriber::{ReminderPhase, Subscriber};
pub use subscriber_store::SubscriberStore;
