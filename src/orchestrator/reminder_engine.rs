//! Per-subscriber reminder state machine.
//!
//! ```text
//!            daily trigger                 escalation (count < max)
//!   Idle ───────────────────▶ Awaiting ◀──────────────────────┐
//!    ▲                           │  └─────────────────────────┘
//!    │ confirm                   │ escalation (count == max)
//!    │                           ▼
//!    └─────────────────────── Exhausted
//! ```
//!
//! Every timer is registered on the shared [`TimerMultiplexer`] under the
//! subscriber's generation token, so superseding or deleting a subscriber
//! silences its whole pending chain at once.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::GlobalConfig;
use crate::delivery::PushChannel;
use crate::timer::TimerMultiplexer;
use crate::{AppError, Result};

use super::subscriber::Subscriber;

/// Cadence and wording of reminders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderSettings {
    /// Gap between escalating reminders.
    pub snooze_interval: chrono::Duration,
    /// Escalation budget per daily cycle.
    pub max_retries: u32,
    /// Local zone in which daily times are interpreted.
    pub zone: FixedOffset,
    /// Reminder body.
    pub reminder_text: String,
    /// Suffix repeated once per push sent today.
    pub urgency_mark: String,
    /// Contact message on confirmation; `{name}` is substituted.
    pub done_text: String,
    /// Contact message on exhaustion; `{name}` is substituted.
    pub not_done_text: String,
}

impl ReminderSettings {
    /// Derive settings from the global configuration.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the zone or interval is out of range.
    pub fn from_config(config: &GlobalConfig) -> Result<Self> {
        let reminder = &config.reminder;
        let snooze_interval = chrono::Duration::from_std(reminder.snooze_interval())
            .map_err(|_| AppError::Config("snooze_interval_seconds too large".into()))?;
        Ok(Self {
            snooze_interval,
            max_retries: reminder.max_retries,
            zone: config.local_zone()?,
            reminder_text: reminder.reminder_text.clone(),
            urgency_mark: reminder.urgency_mark.clone(),
            done_text: reminder.done_text.clone(),
            not_done_text: reminder.not_done_text.clone(),
        })
    }

    /// Reminder wording for the `count`-th push of the day.
    #[must_use]
    pub fn reminder_message(&self, count: u32) -> String {
        let marks = usize::try_from(count).unwrap_or(usize::MAX).max(1);
        format!("{}{}", self.reminder_text, self.urgency_mark.repeat(marks))
    }
}

fn render(template: &str, name: &str) -> String {
    template.replace("{name}", name)
}

/// Drives every subscriber's daily trigger and escalation chain.
pub struct ReminderEngine {
    timers: TimerMultiplexer,
    channel: Arc<dyn PushChannel>,
    clock: Arc<dyn Clock>,
    settings: ReminderSettings,
}

impl ReminderEngine {
    /// Build an engine on top of a running multiplexer.
    #[must_use]
    pub fn new(
        timers: TimerMultiplexer,
        channel: Arc<dyn PushChannel>,
        clock: Arc<dyn Clock>,
        settings: ReminderSettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            timers,
            channel,
            clock,
            settings,
        })
    }

    /// The multiplexer timers are registered on.
    #[must_use]
    pub fn timers(&self) -> &TimerMultiplexer {
        &self.timers
    }

    /// Active settings.
    #[must_use]
    pub fn settings(&self) -> &ReminderSettings {
        &self.settings
    }

    /// Arm the next daily trigger for `sub` and return its deadline.
    pub fn arm(self: &Arc<Self>, sub: &Arc<Subscriber>) -> DateTime<Utc> {
        let deadline = sub.time().next_trigger(self.clock.now(), self.settings.zone);
        self.schedule_daily(sub, deadline);
        debug!(subscriber_id = sub.id(), %deadline, "daily trigger armed");
        deadline
    }

    /// Acknowledge the outstanding reminder, if any.
    ///
    /// Returns whether a reminder was outstanding. Only then are contacts
    /// told; a confirmation with nothing outstanding changes nothing.
    pub async fn confirm(&self, sub: &Subscriber) -> bool {
        let mut state = sub.lock_reminder().await;
        let was_outstanding = state.escalation_count != 0;
        state.escalation_count = 0;
        state.exhausted = false;

        if was_outstanding {
            info!(subscriber_id = sub.id(), "reminder confirmed");
            self.fan_out(sub, &self.settings.done_text).await;
        } else {
            debug!(subscriber_id = sub.id(), "confirmation with nothing outstanding");
        }
        was_outstanding
    }

    fn schedule_daily(self: &Arc<Self>, sub: &Arc<Subscriber>, deadline: DateTime<Utc>) {
        let engine = Arc::clone(self);
        let target = Arc::clone(sub);
        self.timers.schedule(sub.generation(), deadline, async move {
            engine.fire_daily(target, deadline).await;
        });
    }

    fn schedule_escalation(
        self: &Arc<Self>,
        sub: &Arc<Subscriber>,
        deadline: DateTime<Utc>,
        cycle: u64,
    ) {
        let engine = Arc::clone(self);
        let target = Arc::clone(sub);
        self.timers.schedule(sub.generation(), deadline, async move {
            engine.fire_escalation(target, deadline, cycle).await;
        });
    }

    async fn fire_daily(self: Arc<Self>, sub: Arc<Subscriber>, deadline: DateTime<Utc>) {
        // Tomorrow's trigger is armed before anything can fail.
        let from = deadline.max(self.clock.now());
        let next = sub.time().next_trigger(from, self.settings.zone);
        self.schedule_daily(&sub, next);

        let mut state = sub.lock_reminder().await;
        if sub.is_closed() {
            debug!(subscriber_id = sub.id(), "daily trigger for closed generation");
            return;
        }

        state.cycle += 1;
        state.escalation_count = 1;
        state.exhausted = false;
        let cycle = state.cycle;

        let text = self.settings.reminder_message(1);
        if let Err(err) = self.channel.push(sub.id(), &text).await {
            state.escalation_count = 0;
            warn!(subscriber_id = sub.id(), %err, "first reminder not delivered");
            return;
        }
        drop(state);

        info!(subscriber_id = sub.id(), %deadline, %next, "daily reminder sent");
        self.schedule_escalation(&sub, deadline + self.settings.snooze_interval, cycle);
    }

    async fn fire_escalation(
        self: Arc<Self>,
        sub: Arc<Subscriber>,
        deadline: DateTime<Utc>,
        cycle: u64,
    ) {
        let mut state = sub.lock_reminder().await;
        if sub.is_closed() || state.cycle != cycle || state.escalation_count == 0 || state.exhausted
        {
            debug!(subscriber_id = sub.id(), cycle, "stale escalation skipped");
            return;
        }

        if state.escalation_count >= self.settings.max_retries {
            state.exhausted = true;
            warn!(
                subscriber_id = sub.id(),
                escalation_count = state.escalation_count,
                "escalation budget exhausted"
            );
            self.fan_out(&sub, &self.settings.not_done_text).await;
            return;
        }

        state.escalation_count += 1;
        let count = state.escalation_count;
        let text = self.settings.reminder_message(count);
        if let Err(err) = self.channel.push(sub.id(), &text).await {
            warn!(subscriber_id = sub.id(), escalation_count = count, %err, "escalation not delivered");
        } else {
            info!(subscriber_id = sub.id(), escalation_count = count, "escalation sent");
        }
        drop(state);

        self.schedule_escalation(&sub, deadline + self.settings.snooze_interval, cycle);
    }

    async fn fan_out(&self, sub: &Subscriber, template: &str) {
        for contact in sub.contacts() {
            let text = render(template, &contact.name);
            if let Err(err) = self.channel.push(&contact.id, &text).await {
                warn!(
                    subscriber_id = sub.id(),
                    contact_id = %contact.id,
                    %err,
                    "contact notification not delivered"
                );
            }
        }
    }
}
