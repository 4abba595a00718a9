//! Durable subscriber record and daily trigger arithmetic.
//!
//! Only the fields that survive a restart live here. Escalation state,
//! the pending-contact marker, and the generation token are held by the
//! live [`Subscriber`](crate::orchestrator::subscriber::Subscriber).

use chrono::{DateTime, FixedOffset, NaiveTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::{AppError, Result};

/// A validated local time of day, minute precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyTime(NaiveTime);

impl DailyTime {
    /// Build a daily time.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` unless `hour` is in `0..=23` and
    /// `minute` is in `0..=59`.
    pub fn new(hour: u32, minute: u32) -> Result<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0)
            .map(Self)
            .ok_or_else(|| AppError::Validation(format!("invalid time {hour}:{minute}")))
    }

    /// Hour of day, `0..=23`.
    #[must_use]
    pub fn hour(self) -> u32 {
        self.0.hour()
    }

    /// Minute of hour, `0..=59`.
    #[must_use]
    pub fn minute(self) -> u32 {
        self.0.minute()
    }

    /// First occurrence of this time in `zone` strictly after `now`.
    ///
    /// A time equal to `now` rolls to the next day, so feeding the result
    /// back in yields exactly 24 hours later.
    #[must_use]
    pub fn next_trigger(self, now: DateTime<Utc>, zone: FixedOffset) -> DateTime<Utc> {
        let local_now = now.with_timezone(&zone);
        let today = local_now.date_naive().and_time(self.0);
        let candidate = Utc.from_utc_datetime(&(today - local_offset(zone)));
        if candidate <= now {
            candidate + chrono::Duration::days(1)
        } else {
            candidate
        }
    }
}

fn local_offset(zone: FixedOffset) -> chrono::Duration {
    chrono::Duration::seconds(i64::from(zone.local_minus_utc()))
}

/// A third party told when the subscriber confirms or gives up.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Contact {
    /// Delivery target of the contact.
    pub id: String,
    /// Name the subscriber asked to be shown as.
    pub name: String,
}

/// Serialized form stored under `subscriber_<id>`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SubscriberRecord {
    /// Stable external identifier.
    pub id: String,
    /// Trigger hour.
    pub hour: u32,
    /// Trigger minute.
    pub minute: u32,
    /// Notification targets, unique by `id`.
    #[serde(default)]
    pub contacts: Vec<Contact>,
}

impl SubscriberRecord {
    /// Build a record with no contacts.
    #[must_use]
    pub fn new(id: impl Into<String>, time: DailyTime) -> Self {
        Self {
            id: id.into(),
            hour: time.hour(),
            minute: time.minute(),
            contacts: Vec::new(),
        }
    }

    /// The validated trigger time.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` if the stored fields are out of range.
    pub fn daily_time(&self) -> Result<DailyTime> {
        DailyTime::new(self.hour, self.minute)
    }

    /// Encode in the current (JSON) layout.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if serialization fails.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a value written in the current layout.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the value is not a well-formed record or
    /// carries an out-of-range time.
    pub fn decode(raw: &str) -> Result<Self> {
        let record: Self = serde_json::from_str(raw)?;
        record
            .daily_time()
            .map_err(|err| AppError::Db(format!("record {}: {err}", record.id)))?;
        Ok(record)
    }

    /// Decode a legacy `hour:minute` value stored before contacts existed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the value is not two colon-separated
    /// integers in range.
    pub fn decode_legacy(id: &str, raw: &str) -> Result<Self> {
        let (hour, minute) = raw
            .trim()
            .split_once(':')
            .ok_or_else(|| AppError::Db(format!("legacy record {id}: missing ':' in {raw:?}")))?;
        let hour: u32 = hour
            .parse()
            .map_err(|err| AppError::Db(format!("legacy record {id}: parse hour: {err}")))?;
        let minute: u32 = minute
            .parse()
            .map_err(|err| AppError::Db(format!("legacy record {id}: parse minute: {err}")))?;
        let time = DailyTime::new(hour, minute)
            .map_err(|err| AppError::Db(format!("legacy record {id}: {err}")))?;
        Ok(Self::new(id, time))
    }
}
