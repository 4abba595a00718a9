//! Global configuration parsing, validation, and credential loading.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::FixedOffset;
use serde::Deserialize;
use tracing::warn;

use crate::{AppError, Result};

/// Largest accepted distance from UTC, in minutes.
const MAX_UTC_OFFSET_MINUTES: i32 = 18 * 60;

/// Nested Slack configuration for Socket Mode connectivity.
///
/// Tokens are loaded at runtime via OS keychain or environment variables,
/// not from the TOML config file.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SlackConfig {
    /// App-level token used for Socket Mode (populated at runtime).
    #[serde(skip)]
    pub app_token: String,
    /// Bot user token used for posting messages (populated at runtime).
    #[serde(skip)]
    pub bot_token: String,
}

/// Reminder cadence and message wording.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ReminderConfig {
    /// Gap between escalating reminders.
    #[serde(default = "default_snooze_interval")]
    pub snooze_interval_seconds: u64,
    /// Escalation budget per daily cycle.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Upper bound on a single outbound push.
    #[serde(default = "default_delivery_timeout")]
    pub delivery_timeout_seconds: u64,
    /// Reminder body; followed by `urgency_mark` repeated once per push.
    #[serde(default = "default_reminder_text")]
    pub reminder_text: String,
    /// Suffix repeated to raise urgency with each escalation.
    #[serde(default = "default_urgency_mark")]
    pub urgency_mark: String,
    /// Sent to each contact on confirmation. `{name}` is substituted.
    #[serde(default = "default_done_text")]
    pub done_text: String,
    /// Sent to each contact when the budget is exhausted. `{name}` is substituted.
    #[serde(default = "default_not_done_text")]
    pub not_done_text: String,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            snooze_interval_seconds: default_snooze_interval(),
            max_retries: default_max_retries(),
            delivery_timeout_seconds: default_delivery_timeout(),
            reminder_text: default_reminder_text(),
            urgency_mark: default_urgency_mark(),
            done_text: default_done_text(),
            not_done_text: default_not_done_text(),
        }
    }
}

impl ReminderConfig {
    /// Escalation interval as a [`Duration`].
    #[must_use]
    pub fn snooze_interval(&self) -> Duration {
        Duration::from_secs(self.snooze_interval_seconds)
    }

    /// Per-push delivery timeout as a [`Duration`].
    #[must_use]
    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_secs(self.delivery_timeout_seconds)
    }
}

fn default_snooze_interval() -> u64 {
    600
}

fn default_max_retries() -> u32 {
    10
}

fn default_delivery_timeout() -> u64 {
    10
}

fn default_reminder_text() -> String {
    "Did you take it".into()
}

fn default_urgency_mark() -> String {
    "?".into()
}

fn default_done_text() -> String {
    "{name} just took it!".into()
}

fn default_not_done_text() -> String {
    "{name} hasn't taken it yet today".into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("daily-nudge.db")
}

fn default_http_port() -> u16 {
    8080
}

fn default_utc_offset_minutes() -> i32 {
    540
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// `SQLite` database file holding subscriber records.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// HTTP port for the health endpoint; 0 disables it.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Offset of the single local zone all daily times are expressed in.
    #[serde(default = "default_utc_offset_minutes")]
    pub utc_offset_minutes: i32,
    /// Slack connectivity settings.
    #[serde(default)]
    pub slack: SlackConfig,
    /// Reminder cadence and wording.
    #[serde(default)]
    pub reminder: ReminderConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load Slack credentials from OS keychain with env-var fallback.
    ///
    /// Missing credentials are not an error: the bot then runs in
    /// local-only mode and logs pushes instead of sending them.
    pub async fn load_credentials(&mut self) {
        self.slack.app_token = load_credential("slack_app_token", "SLACK_APP_TOKEN")
            .await
            .unwrap_or_default();
        self.slack.bot_token = load_credential("slack_bot_token", "SLACK_BOT_TOKEN")
            .await
            .unwrap_or_default();
    }

    /// The configured local zone.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the offset is out of range.
    pub fn local_zone(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).ok_or_else(|| {
            AppError::Config(format!(
                "utc_offset_minutes out of range: {}",
                self.utc_offset_minutes
            ))
        })
    }

    fn validate(&self) -> Result<()> {
        if !(-MAX_UTC_OFFSET_MINUTES..=MAX_UTC_OFFSET_MINUTES).contains(&self.utc_offset_minutes) {
            return Err(AppError::Config(format!(
                "utc_offset_minutes must be within ±{MAX_UTC_OFFSET_MINUTES}"
            )));
        }

        if self.reminder.snooze_interval_seconds == 0 {
            return Err(AppError::Config(
                "reminder.snooze_interval_seconds must be greater than zero".into(),
            ));
        }

        if self.reminder.max_retries == 0 {
            return Err(AppError::Config(
                "reminder.max_retries must be greater than zero".into(),
            ));
        }

        if self.reminder.delivery_timeout_seconds == 0 {
            return Err(AppError::Config(
                "reminder.delivery_timeout_seconds must be greater than zero".into(),
            ));
        }

        if self.db_path.as_os_str().is_empty() {
            return Err(AppError::Config("db_path must not be empty".into()));
        }

        Ok(())
    }
}

/// Load a single credential from OS keychain with env-var fallback.
async fn load_credential(keyring_key: &str, env_key: &str) -> Result<String> {
    let key = keyring_key.to_owned();

    // keyring is synchronous I/O.
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new("daily-nudge", &key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Config(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.is_empty() => return Ok(value),
        Ok(_) => {
            warn!(key = keyring_key, "keychain entry is empty, trying env var");
        }
        Err(err) => {
            warn!(
                key = keyring_key,
                ?err,
                "keychain lookup failed, trying env var"
            );
        }
    }

    env::var(env_key).map_err(|_| {
        AppError::Config(format!(
            "credential {keyring_key} not found in keychain or {env_key} env var"
        ))
    })
}
