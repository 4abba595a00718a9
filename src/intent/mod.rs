//! Inbound text commands.
//!
//! Free text from a chat message is mapped onto a closed [`Intent`] set
//! before it reaches the subscriber store. The store never sees raw text.

pub mod handler;

use std::sync::LazyLock;

use regex::Regex;

pub use handler::IntentHandler;

/// Prefix of a contact code, followed by the subscriber id it names.
pub const CONTACT_PREFIX: &str = "contact:";

static TIME_KANJI: LazyLock<Option<Regex>> =
    LazyLock::new(|| compile(r"(\d{1,2})\s*時\s*(\d{1,2})\s*分"));
static TIME_COLON: LazyLock<Option<Regex>> =
    LazyLock::new(|| compile(r"(\d{1,2})\s*[:：]\s*(\d{1,2})"));
static DELETE: LazyLock<Option<Regex>> =
    LazyLock::new(|| compile(r"(?i)\b(delete|stop|unsubscribe)\b|削除|解除"));
static DONE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    compile(r"(?i)\b(done|yes|yep|ok|okay|took it|taken)\b|飲んだ|のんだ|はい|うん|おっけ|オッケ")
});

/// An invalid pattern is logged and never matches.
fn compile(pattern: &str) -> Option<Regex> {
    Regex::new(pattern)
        .map_err(|err| tracing::error!(%err, pattern, "invalid intent pattern"))
        .ok()
}

fn is_match(re: &LazyLock<Option<Regex>>, text: &str) -> bool {
    re.as_ref().is_some_and(|re| re.is_match(text))
}

/// What a subscriber asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Create or reset the daily reminder time.
    SetTime {
        /// Hour as typed; range-checked by the store.
        hour: u32,
        /// Minute as typed; range-checked by the store.
        minute: u32,
    },
    /// Acknowledge today's reminder.
    Confirm,
    /// Remove the subscription.
    Delete,
    /// Ask for the configured time.
    Query,
    /// Start adding the subscriber named by a contact code.
    RegisterContactRequest {
        /// Id of the person to notify.
        contact_id: String,
    },
    /// Finish a pending contact registration with a display name.
    RegisterContactName {
        /// Name the contact will see in notifications.
        name: String,
    },
    /// Ask for one's own contact code.
    ShowContactCode,
    /// Drop every registered contact.
    ClearContacts,
    /// Anything else.
    Unknown(String),
}

impl Intent {
    /// Classify `text`.
    ///
    /// [`Intent::RegisterContactName`] is never produced here: whether a
    /// message is a display name depends on subscriber state, so
    /// [`IntentHandler`] decides that before parsing.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim();
        let lowered = trimmed.to_lowercase();

        if matches!(lowered.as_str(), "my code" | "my contact code" | "通知番号教えて") {
            return Self::ShowContactCode;
        }
        if let Some(rest) = trimmed.strip_prefix(CONTACT_PREFIX) {
            let contact_id = rest.trim();
            if !contact_id.is_empty() {
                return Self::RegisterContactRequest {
                    contact_id: contact_id.to_owned(),
                };
            }
        }
        if matches!(lowered.as_str(), "clear contacts" | "通知削除") {
            return Self::ClearContacts;
        }
        if matches!(lowered.as_str(), "settings" | "status" | "設定教えて") {
            return Self::Query;
        }
        if is_match(&DELETE, trimmed) {
            return Self::Delete;
        }
        if let Some((hour, minute)) = parse_time(trimmed) {
            return Self::SetTime { hour, minute };
        }
        if is_match(&DONE, trimmed) {
            return Self::Confirm;
        }
        Self::Unknown(trimmed.to_owned())
    }
}

fn parse_time(text: &str) -> Option<(u32, u32)> {
    let captures = |re: &LazyLock<Option<Regex>>| re.as_ref().and_then(|re| re.captures(text));
    let caps = captures(&TIME_KANJI).or_else(|| captures(&TIME_COLON))?;
    let hour = caps.get(1)?.as_str().parse().ok()?;
    let minute = caps.get(2)?.as_str().parse().ok()?;
    Some((hour, minute))
}
