//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Durable record store failure (`SQLite` I/O or malformed record).
    Db(String),
    /// Slack API or Socket Mode failure.
    Slack(String),
    /// Outbound message delivery failed or timed out.
    Delivery(String),
    /// Requested subscriber does not exist.
    NotFound(String),
    /// Subscriber generation was superseded or deleted concurrently.
    Closed(String),
    /// Input rejected before any state change (e.g. out-of-range time).
    Validation(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Db(msg) => write!(f, "db: {msg}"),
            Self::Slack(msg) => write!(f, "slack: {msg}"),
            Self::Delivery(msg) => write!(f, "delivery: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Closed(msg) => write!(f, "closed: {msg}"),
            Self::Validation(msg) => write!(f, "validation: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::Db(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Db(format!("record encoding: {err}"))
    }
}
