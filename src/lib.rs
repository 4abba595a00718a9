#![forbid(unsafe_code)]

//! `daily-nudge`: a daily reminder bot.
//!
//! Each subscriber picks a local time of day. At that time the bot pushes a
//! reminder, escalates on a fixed interval until the subscriber confirms,
//! and tells the subscriber's registered contacts how the day went.

pub mod clock;
pub mod config;
pub mod delivery;
pub mod errors;
pub mod http;
pub mod intent;
pub mod models;
pub mod orchestrator;
pub mod persistence;
pub mod slack;
pub mod timer;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
