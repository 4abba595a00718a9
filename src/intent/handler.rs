//! Applies an [`Intent`] to the subscriber store and words the reply.
//!
//! Not-found and validation failures become ordinary replies. Storage and
//! race failures are logged and answered with a generic failure line.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::orchestrator::SubscriberStore;
use crate::AppError;

use super::{Intent, CONTACT_PREFIX};

const NO_SUBSCRIPTION: &str = "No reminder is set.";
const SET_TIME_FIRST: &str = "Set a reminder time first, for example 9:00.";

/// Turns inbound messages into store operations.
#[derive(Clone)]
pub struct IntentHandler {
    store: Arc<SubscriberStore>,
}

impl IntentHandler {
    /// Wrap the store that intents are applied to.
    #[must_use]
    pub fn new(store: Arc<SubscriberStore>) -> Self {
        Self { store }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<SubscriberStore> {
        &self.store
    }

    /// Handle one message from `sender` and return the reply text.
    ///
    /// While a contact registration is pending, the message is taken as the
    /// display name regardless of what it says.
    pub async fn handle_text(&self, sender: &str, text: &str) -> String {
        let pending = self
            .store
            .get(sender)
            .ok()
            .and_then(|sub| sub.pending_contact_id());
        let intent = if pending.is_some() {
            Intent::RegisterContactName {
                name: text.trim().to_owned(),
            }
        } else {
            Intent::parse(text)
        };
        info!(subscriber_id = sender, ?intent, "intent received");
        self.apply(sender, intent, text).await
    }

    /// Apply `intent` on behalf of `sender`; `raw` is echoed where
    /// nothing else applies.
    pub async fn apply(&self, sender: &str, intent: Intent, raw: &str) -> String {
        match intent {
            Intent::SetTime { hour, minute } => {
                match self.store.create_or_replace(sender, hour, minute).await {
                    Ok(_) => format!("Got it. I'll remind you every day at {hour}:{minute:02}."),
                    Err(AppError::Validation(_)) => {
                        "That time doesn't look right. Try something like 9:00.".into()
                    }
                    Err(err) => failure(sender, &err, "Could not set the time."),
                }
            }
            Intent::Confirm => match self.store.confirm_and_fan_out(sender).await {
                Ok(true) => "Well done!".into(),
                Ok(false) => raw.trim().to_owned(),
                Err(AppError::NotFound(_)) => SET_TIME_FIRST.into(),
                Err(err) => failure(sender, &err, "Could not record that."),
            },
            Intent::Delete => match self.store.delete(sender).await {
                Ok(()) => "Reminder deleted. Bye!".into(),
                Err(AppError::NotFound(_)) => NO_SUBSCRIPTION.into(),
                Err(err) => failure(sender, &err, "Could not delete the reminder."),
            },
            Intent::Query => match self.store.get(sender) {
                Ok(sub) => {
                    let time = sub.time();
                    format!("Your reminder is set for {}:{:02}.", time.hour(), time.minute())
                }
                Err(_) => NO_SUBSCRIPTION.into(),
            },
            Intent::RegisterContactRequest { contact_id } => {
                match self.store.register_contact_request(sender, &contact_id) {
                    Ok(()) => {
                        "Tell me your nickname! Your contact will see that name.".into()
                    }
                    Err(AppError::NotFound(_)) => {
                        "Set a reminder time before adding contacts.".into()
                    }
                    Err(err) => failure(sender, &err, "Could not start adding the contact."),
                }
            }
            Intent::RegisterContactName { name } => {
                match self.store.register_contact_name(sender, &name).await {
                    Ok(true) => "From now on I'll let this person know too.".into(),
                    Ok(false) => raw.trim().to_owned(),
                    Err(AppError::NotFound(_)) => SET_TIME_FIRST.into(),
                    Err(err) => failure(sender, &err, "Could not save the contact."),
                }
            }
            Intent::ShowContactCode => format!("{CONTACT_PREFIX}{sender}"),
            Intent::ClearContacts => match self.store.clear_contacts(sender).await {
                Ok(()) => "All contacts removed.".into(),
                Err(AppError::NotFound(_)) => NO_SUBSCRIPTION.into(),
                Err(err) => failure(sender, &err, "Could not remove the contacts."),
            },
            Intent::Unknown(text) => {
                if self.store.get(sender).is_err() {
                    SET_TIME_FIRST.into()
                } else {
                    text
                }
            }
        }
    }
}

fn failure(sender: &str, err: &AppError, reply: &str) -> String {
    match err {
        AppError::Closed(_) => {
            warn!(subscriber_id = sender, %err, "subscriber changed mid-operation");
            "Your settings changed meanwhile. Please try again.".into()
        }
        _ => {
            error!(subscriber_id = sender, %err, "intent failed");
            reply.to_owned()
        }
    }
}
