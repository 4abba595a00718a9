//! Slack transport: outbound pushes and replies, inbound direct messages.

pub mod client;
pub mod events;
