//! Live, in-memory subscriber.
//!
//! A [`Subscriber`] is one generation of a person's configuration. Its
//! durable part (id, time, contacts) mirrors a
//! [`SubscriberRecord`]; the escalation counter and the pending-contact
//! marker are ephemeral and reset on every restart.
//!
//! Two locks, both scoped to this subscriber:
//! - `profile` (sync) guards contacts and the pending-contact marker and is
//!   never held across an await.
//! - `reminder` (async) guards escalation state and is held across the
//!   delivery call that accompanies each transition, so a confirmation
//!   cannot interleave with a push in flight.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;

use crate::models::{Contact, DailyTime, SubscriberRecord};
use crate::Result;

/// Where a subscriber is in today's reminder cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderPhase {
    /// No reminder outstanding, or the last one was confirmed.
    Idle,
    /// Reminded at least once today, no confirmation yet.
    AwaitingConfirmation,
    /// Escalation budget spent and contacts told; waits for tomorrow or a late confirmation.
    Exhausted,
}

/// Escalation state guarded by the subscriber's async lock.
#[derive(Debug, Default)]
pub(crate) struct ReminderState {
    /// Pushes sent since the last daily trigger; 0 when idle or confirmed.
    pub(crate) escalation_count: u32,
    pub(crate) exhausted: bool,
    /// Incremented by every daily trigger; escalation timers carry the
    /// cycle that armed them.
    pub(crate) cycle: u64,
}

impl ReminderState {
    pub(crate) fn phase(&self) -> ReminderPhase {
        if self.escalation_count == 0 {
            ReminderPhase::Idle
        } else if self.exhausted {
            ReminderPhase::Exhausted
        } else {
            ReminderPhase::AwaitingConfirmation
        }
    }
}

#[derive(Debug, Default)]
struct Profile {
    contacts: Vec<Contact>,
    pending_contact_id: Option<String>,
}

/// One generation of a subscriber's configuration plus its live state.
#[derive(Debug)]
pub struct Subscriber {
    id: String,
    time: DailyTime,
    generation: CancellationToken,
    profile: Mutex<Profile>,
    reminder: tokio::sync::Mutex<ReminderState>,
}

impl Subscriber {
    /// Start a new generation with a fresh cancellation token.
    #[must_use]
    pub fn new(id: impl Into<String>, time: DailyTime, contacts: Vec<Contact>) -> Self {
        Self {
            id: id.into(),
            time,
            generation: CancellationToken::new(),
            profile: Mutex::new(Profile {
                contacts,
                pending_contact_id: None,
            }),
            reminder: tokio::sync::Mutex::new(ReminderState::default()),
        }
    }

    /// Rebuild a subscriber from its durable record.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` if the stored time is out of range.
    pub fn from_record(record: SubscriberRecord) -> Result<Self> {
        let time = record.daily_time()?;
        Ok(Self::new(record.id, time, record.contacts))
    }

    /// Stable external identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Daily trigger time.
    #[must_use]
    pub fn time(&self) -> DailyTime {
        self.time
    }

    /// Token shared by every timer armed for this generation.
    #[must_use]
    pub fn generation(&self) -> &CancellationToken {
        &self.generation
    }

    /// Whether this generation has been superseded or deleted.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.generation.is_cancelled()
    }

    /// Invalidate this generation; pending timers will never start.
    pub fn close(&self) {
        self.generation.cancel();
    }

    /// Durable snapshot of this subscriber.
    #[must_use]
    pub fn record(&self) -> SubscriberRecord {
        self.record_with(self.contacts())
    }

    pub(crate) fn record_with(&self, contacts: Vec<Contact>) -> SubscriberRecord {
        SubscriberRecord {
            id: self.id.clone(),
            hour: self.time.hour(),
            minute: self.time.minute(),
            contacts,
        }
    }

    /// Current contacts, in registration order.
    #[must_use]
    pub fn contacts(&self) -> Vec<Contact> {
        self.profile().contacts.clone()
    }

    /// Contact id awaiting a display name, if any.
    #[must_use]
    pub fn pending_contact_id(&self) -> Option<String> {
        self.profile().pending_contact_id.clone()
    }

    /// Remember `contact_id` until the subscriber sends a display name.
    pub fn set_pending_contact(&self, contact_id: impl Into<String>) {
        self.profile().pending_contact_id = Some(contact_id.into());
    }

    /// Contacts as they would be after naming the pending contact `name`.
    ///
    /// Returns `None` when no contact is pending. An existing contact with
    /// the same id is renamed rather than duplicated.
    pub(crate) fn contacts_with_pending_named(&self, name: &str) -> Option<Vec<Contact>> {
        let profile = self.profile();
        let pending = profile.pending_contact_id.as_ref()?;
        let mut contacts = profile.contacts.clone();
        if let Some(existing) = contacts.iter_mut().find(|c| &c.id == pending) {
            existing.name = name.to_owned();
        } else {
            contacts.push(Contact {
                id: pending.clone(),
                name: name.to_owned(),
            });
        }
        Some(contacts)
    }

    /// Install `contacts` and clear the pending-contact marker.
    pub(crate) fn commit_contacts(&self, contacts: Vec<Contact>) {
        let mut profile = self.profile();
        profile.contacts = contacts;
        profile.pending_contact_id = None;
    }

    /// Pushes sent since the last daily trigger.
    pub async fn escalation_count(&self) -> u32 {
        self.reminder.lock().await.escalation_count
    }

    /// Current reminder phase.
    pub async fn phase(&self) -> ReminderPhase {
        self.reminder.lock().await.phase()
    }

    pub(crate) async fn lock_reminder(&self) -> tokio::sync::MutexGuard<'_, ReminderState> {
        self.reminder.lock().await
    }

    fn profile(&self) -> MutexGuard<'_, Profile> {
        self.profile.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
