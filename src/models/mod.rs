//! Domain model module declarations.

pub mod subscriber;

pub use subscriber::{Contact, DailyTime, SubscriberRecord};
