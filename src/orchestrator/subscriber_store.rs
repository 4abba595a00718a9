//! Reconciles durable subscriber records with live reminder schedules.
//!
//! Ordering rules:
//! - Every mutation persists first and only then touches the live map or
//!   timers, so a crash in between is repaired by the next [`load`].
//! - Mutations are serialized by `writes`, an async lock held across
//!   durable I/O. The map itself sits behind a separate sync lock that is
//!   held only for the lookup or swap, so [`get`] never waits on storage.
//!
//! [`load`]: SubscriberStore::load
//! [`get`]: SubscriberStore::get

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{info, info_span, Instrument};

use crate::models::{Contact, DailyTime, SubscriberRecord};
use crate::persistence::record_store::{subscriber_key, RecordStore, SUBSCRIBER_PREFIX};
use crate::{AppError, Result};

use super::reminder_engine::ReminderEngine;
use super::subscriber::Subscriber;

/// Authority over the set of live subscribers.
pub struct SubscriberStore {
    records: Arc<dyn RecordStore>,
    engine: Arc<ReminderEngine>,
    live: Mutex<HashMap<String, Arc<Subscriber>>>,
    writes: tokio::sync::Mutex<()>,
}

impl SubscriberStore {
    /// Create an empty store; call [`load`](Self::load) to populate it.
    #[must_use]
    pub fn new(records: Arc<dyn RecordStore>, engine: Arc<ReminderEngine>) -> Self {
        Self {
            records,
            engine,
            live: Mutex::new(HashMap::new()),
            writes: tokio::sync::Mutex::new(()),
        }
    }

    /// The engine driving this store's schedules.
    #[must_use]
    pub fn engine(&self) -> &Arc<ReminderEngine> {
        &self.engine
    }

    /// Replace the live set with every durable record and arm each one.
    ///
    /// Returns the number of subscribers loaded.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the store is unreachable or any record is
    /// malformed or stored under another subscriber's key. The live set is
    /// left untouched in that case.
    pub async fn load(&self) -> Result<usize> {
        self.load_all().instrument(info_span!("load_subscribers")).await
    }

    async fn load_all(&self) -> Result<usize> {
        let _writes = self.writes.lock().await;

        let mut loaded = HashMap::new();
        for (key, value) in self.records.list_all().await? {
            if !key.starts_with(SUBSCRIBER_PREFIX) {
                continue;
            }
            let record = SubscriberRecord::decode(&value)
                .map_err(|err| AppError::Db(format!("{key}: {err}")))?;
            if key.strip_prefix(SUBSCRIBER_PREFIX) != Some(record.id.as_str()) {
                return Err(AppError::Db(format!(
                    "{key}: record id {} does not match its key",
                    record.id
                )));
            }
            let sub = Subscriber::from_record(record)
                .map_err(|err| AppError::Db(format!("{key}: {err}")))?;
            loaded.insert(sub.id().to_owned(), Arc::new(sub));
        }

        let previous = std::mem::replace(&mut *self.live(), loaded.clone());
        for sub in previous.values() {
            sub.close();
        }
        for sub in loaded.values() {
            self.engine.arm(sub);
        }

        info!(count = loaded.len(), "subscribers loaded");
        Ok(loaded.len())
    }

    /// Set (or reset) a subscriber's daily time, starting a new generation.
    ///
    /// Contacts carry over from the previous generation; escalation state
    /// does not.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` for an out-of-range time (nothing is
    /// changed) or `AppError::Db` if persisting fails (the previous
    /// generation stays live).
    pub async fn create_or_replace(
        &self,
        id: &str,
        hour: u32,
        minute: u32,
    ) -> Result<Arc<Subscriber>> {
        let time = DailyTime::new(hour, minute)?;
        let _writes = self.writes.lock().await;

        let previous = self.live().get(id).cloned();
        let contacts = previous
            .as_ref()
            .map(|prev| prev.contacts())
            .unwrap_or_default();
        let sub = Arc::new(Subscriber::new(id, time, contacts));

        self.persist(&sub.record()).await?;

        if let Some(prev) = self.live().insert(id.to_owned(), Arc::clone(&sub)) {
            prev.close();
        }
        let deadline = self.engine.arm(&sub);
        info!(subscriber_id = id, hour, minute, %deadline, "subscriber scheduled");
        Ok(sub)
    }

    /// Look up a live subscriber without touching durable storage.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if `id` has no live subscriber.
    pub fn get(&self, id: &str) -> Result<Arc<Subscriber>> {
        self.live()
            .get(id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("subscriber {id}")))
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live().len()
    }

    /// Whether no subscriber is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live().is_empty()
    }

    /// Remove a subscriber and silence all of its timers.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if `id` is unknown, or `AppError::Db`
    /// if the durable removal fails (the subscriber stays live).
    pub async fn delete(&self, id: &str) -> Result<()> {
        let _writes = self.writes.lock().await;
        let sub = self.get(id)?;

        self.records.delete(&subscriber_key(id)).await?;

        sub.close();
        self.live().remove(id);
        info!(subscriber_id = id, "subscriber deleted");
        Ok(())
    }

    /// Persist the current durable fields of a live subscriber.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Closed` if the subscriber's generation was
    /// superseded or deleted, or `AppError::Db` if persisting fails.
    pub async fn update(&self, sub: &Subscriber) -> Result<()> {
        self.update_contacts(sub, sub.contacts()).await
    }

    /// Acknowledge `id`'s outstanding reminder and tell its contacts.
    ///
    /// Returns whether a reminder was outstanding.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if `id` is unknown.
    pub async fn confirm_and_fan_out(&self, id: &str) -> Result<bool> {
        let sub = self.get(id)?;
        Ok(self.engine.confirm(&sub).await)
    }

    /// Start registering `contact_id` as a contact of `id`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if `id` is unknown.
    pub fn register_contact_request(&self, id: &str, contact_id: &str) -> Result<()> {
        let sub = self.get(id)?;
        sub.set_pending_contact(contact_id);
        info!(subscriber_id = id, contact_id, "contact registration started");
        Ok(())
    }

    /// Complete a pending contact registration with the display `name`.
    ///
    /// Returns `false` when no registration is pending.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if `id` is unknown, `AppError::Closed`
    /// if the generation moved on, or `AppError::Db` if persisting fails.
    /// On error the pending registration is kept.
    pub async fn register_contact_name(&self, id: &str, name: &str) -> Result<bool> {
        let sub = self.get(id)?;
        let _writes = self.writes.lock().await;
        let Some(contacts) = sub.contacts_with_pending_named(name) else {
            return Ok(false);
        };
        self.persist_live(&sub, contacts).await?;
        info!(subscriber_id = id, "contact registered");
        Ok(true)
    }

    /// Remove every contact of `id`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if `id` is unknown, `AppError::Closed`
    /// if the generation moved on, or `AppError::Db` if persisting fails.
    pub async fn clear_contacts(&self, id: &str) -> Result<()> {
        let sub = self.get(id)?;
        self.update_contacts(&sub, Vec::new()).await?;
        info!(subscriber_id = id, "contacts cleared");
        Ok(())
    }

    async fn update_contacts(&self, sub: &Subscriber, contacts: Vec<Contact>) -> Result<()> {
        let _writes = self.writes.lock().await;
        self.persist_live(sub, contacts).await
    }

    /// Persist `contacts` for `sub`, then install them. Caller holds `writes`.
    async fn persist_live(&self, sub: &Subscriber, contacts: Vec<Contact>) -> Result<()> {
        if sub.is_closed() {
            return Err(AppError::Closed(format!("subscriber {}", sub.id())));
        }
        self.persist(&sub.record_with(contacts.clone())).await?;
        sub.commit_contacts(contacts);
        Ok(())
    }

    async fn persist(&self, record: &SubscriberRecord) -> Result<()> {
        let value = record.encode()?;
        self.records.set(&subscriber_key(&record.id), &value).await
    }

    fn live(&self) -> MutexGuard<'_, HashMap<String, Arc<Subscriber>>> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
