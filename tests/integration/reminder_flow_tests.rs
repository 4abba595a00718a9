//! End-to-end reminder scenarios on paused tokio time.
//!
//! Every test starts at 08:59 local (UTC+9) on the same day and
//! configures subscriber `u1` for 09:00 unless stated otherwise.

use daily_nudge::orchestrator::ReminderPhase;

use super::test_helpers::{local, settings, Harness};

#[tokio::test(start_paused = true)]
async fn first_reminder_fires_at_configured_time() {
    let h = Harness::start_at(local(8, 59, 0), settings(10));
    h.store.create_or_replace("u1", 9, 0).await.unwrap();

    h.advance_to(local(8, 59, 59)).await;
    assert!(h.channel.sent().is_empty());

    h.advance_to(local(9, 0, 1)).await;
    assert_eq!(h.channel.sent_to("u1"), vec!["Did you take it?"]);

    let sub = h.store.get("u1").unwrap();
    assert_eq!(sub.escalation_count().await, 1);
    assert_eq!(sub.phase().await, ReminderPhase::AwaitingConfirmation);
}

#[tokio::test(start_paused = true)]
async fn unconfirmed_reminder_escalates_every_snooze_interval() {
    let h = Harness::start_at(local(8, 59, 0), settings(10));
    h.store.create_or_replace("u1", 9, 0).await.unwrap();

    h.advance_to(local(9, 10, 1)).await;
    assert_eq!(
        h.channel.sent_to("u1"),
        vec!["Did you take it?", "Did you take it??"]
    );

    h.advance_to(local(9, 20, 1)).await;
    assert_eq!(h.channel.sent_to("u1").len(), 3);
    assert_eq!(h.channel.sent_to("u1")[2], "Did you take it???");
    assert_eq!(h.store.get("u1").unwrap().escalation_count().await, 3);
}

#[tokio::test(start_paused = true)]
async fn exhaustion_notifies_each_contact_once_and_stops() {
    let h = Harness::start_at(local(8, 59, 0), settings(3));
    h.store.create_or_replace("u1", 9, 0).await.unwrap();
    h.add_contact("u1", "c1", "Aki").await;
    h.add_contact("u1", "c2", "Ren").await;

    // Pushes at 09:00, 09:10, 09:20; budget spent at 09:30.
    h.advance_to(local(9, 30, 1)).await;
    assert_eq!(h.channel.sent_to("u1").len(), 3);
    assert_eq!(h.channel.sent_to("c1"), vec!["Aki hasn't taken it yet today"]);
    assert_eq!(h.channel.sent_to("c2"), vec!["Ren hasn't taken it yet today"]);

    let sub = h.store.get("u1").unwrap();
    assert_eq!(sub.phase().await, ReminderPhase::Exhausted);
    assert!(sub.escalation_count().await <= 3);

    h.advance_to(local(11, 0, 0)).await;
    assert_eq!(h.channel.sent_to("u1").len(), 3);
    assert_eq!(h.channel.sent_to("c1").len(), 1);
    assert_eq!(h.timers.pending_len(), 1, "only tomorrow's trigger remains");
}

#[tokio::test(start_paused = true)]
async fn next_day_trigger_starts_a_fresh_cycle_after_exhaustion() {
    let h = Harness::start_at(local(8, 59, 0), settings(2));
    h.store.create_or_replace("u1", 9, 0).await.unwrap();

    h.advance_to(local(9, 30, 0)).await;
    assert_eq!(h.channel.sent_to("u1").len(), 2);

    h.advance_to(local(9, 0, 1) + chrono::Duration::days(1)).await;
    let sent = h.channel.sent_to("u1");
    assert_eq!(sent.len(), 3);
    assert_eq!(sent[2], "Did you take it?");
    assert_eq!(
        h.store.get("u1").unwrap().phase().await,
        ReminderPhase::AwaitingConfirmation
    );
}

#[tokio::test(start_paused = true)]
async fn confirmation_fans_out_done_and_silences_escalation() {
    let h = Harness::start_at(local(8, 59, 0), settings(10));
    h.store.create_or_replace("u1", 9, 0).await.unwrap();
    h.add_contact("u1", "c1", "Aki").await;

    h.advance_to(local(9, 5, 0)).await;
    assert!(h.store.confirm_and_fan_out("u1").await.unwrap());
    assert_eq!(h.channel.sent_to("c1"), vec!["Aki just took it!"]);

    // A second confirmation right away changes nothing.
    assert!(!h.store.confirm_and_fan_out("u1").await.unwrap());
    assert_eq!(h.channel.sent_to("c1").len(), 1);

    h.advance_to(local(9, 40, 0)).await;
    assert_eq!(h.channel.sent_to("u1"), vec!["Did you take it?"]);
    assert_eq!(h.store.get("u1").unwrap().phase().await, ReminderPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn confirmation_with_nothing_outstanding_is_a_no_op() {
    let h = Harness::start_at(local(8, 0, 0), settings(10));
    h.store.create_or_replace("u1", 9, 0).await.unwrap();
    h.add_contact("u1", "c1", "Aki").await;

    assert!(!h.store.confirm_and_fan_out("u1").await.unwrap());
    assert!(h.channel.sent().is_empty());
    assert_eq!(h.store.get("u1").unwrap().escalation_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn late_confirmation_after_exhaustion_still_counts() {
    let h = Harness::start_at(local(8, 59, 0), settings(1));
    h.store.create_or_replace("u1", 9, 0).await.unwrap();
    h.add_contact("u1", "c1", "Aki").await;

    h.advance_to(local(9, 10, 1)).await;
    assert_eq!(h.channel.sent_to("c1"), vec!["Aki hasn't taken it yet today"]);

    h.advance_to(local(12, 0, 0)).await;
    assert!(h.store.confirm_and_fan_out("u1").await.unwrap());
    assert_eq!(
        h.channel.sent_to("c1"),
        vec!["Aki hasn't taken it yet today", "Aki just took it!"]
    );
    assert_eq!(h.store.get("u1").unwrap().phase().await, ReminderPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn reconfiguring_cancels_the_old_escalation_chain() {
    let h = Harness::start_at(local(8, 59, 0), settings(10));
    let old = h.store.create_or_replace("u1", 9, 0).await.unwrap();

    h.advance_to(local(9, 5, 0)).await;
    assert_eq!(h.channel.sent_to("u1").len(), 1);

    let new = h.store.create_or_replace("u1", 9, 30).await.unwrap();
    assert!(old.is_closed());
    assert!(!new.is_closed());
    assert_eq!(new.escalation_count().await, 0);

    // The old 09:10 escalation must not fire nor touch the new generation.
    h.advance_to(local(9, 29, 0)).await;
    assert_eq!(h.channel.sent_to("u1").len(), 1);
    assert_eq!(new.escalation_count().await, 0);

    h.advance_to(local(9, 30, 1)).await;
    assert_eq!(
        h.channel.sent_to("u1"),
        vec!["Did you take it?", "Did you take it?"]
    );
    assert_eq!(new.escalation_count().await, 1);
}

#[tokio::test(start_paused = true)]
async fn delete_silences_every_pending_timer() {
    let h = Harness::start_at(local(8, 59, 0), settings(10));
    h.store.create_or_replace("u1", 9, 0).await.unwrap();

    h.advance_to(local(9, 5, 0)).await;
    h.store.delete("u1").await.unwrap();

    h.advance_to(local(9, 0, 0) + chrono::Duration::days(1)).await;
    assert_eq!(h.channel.sent_to("u1").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_first_push_rolls_back_and_skips_escalation() {
    let h = Harness::start_at(local(8, 59, 0), settings(10));
    h.store.create_or_replace("u1", 9, 0).await.unwrap();
    h.channel.fail_for("u1");

    h.advance_to(local(9, 0, 1)).await;
    let sub = h.store.get("u1").unwrap();
    assert_eq!(sub.escalation_count().await, 0);
    assert_eq!(h.channel.attempts(), vec!["u1".to_owned()]);

    h.channel.heal("u1");
    h.advance_to(local(9, 30, 0)).await;
    assert_eq!(h.channel.attempts().len(), 1, "no escalation after rollback");

    // Tomorrow's trigger was armed regardless.
    h.advance_to(local(9, 0, 1) + chrono::Duration::days(1)).await;
    assert_eq!(h.channel.sent_to("u1"), vec!["Did you take it?"]);
}

#[tokio::test(start_paused = true)]
async fn failed_escalation_push_keeps_the_chain_going() {
    let h = Harness::start_at(local(8, 59, 0), settings(10));
    h.store.create_or_replace("u1", 9, 0).await.unwrap();

    h.advance_to(local(9, 0, 1)).await;
    h.channel.fail_for("u1");
    h.advance_to(local(9, 10, 1)).await;
    h.channel.heal("u1");
    h.advance_to(local(9, 20, 1)).await;

    assert_eq!(
        h.channel.sent_to("u1"),
        vec!["Did you take it?", "Did you take it???"]
    );
    assert_eq!(h.store.get("u1").unwrap().escalation_count().await, 3);
}

#[tokio::test(start_paused = true)]
async fn contact_delivery_failure_does_not_block_other_contacts() {
    let h = Harness::start_at(local(8, 59, 0), settings(10));
    h.store.create_or_replace("u1", 9, 0).await.unwrap();
    h.add_contact("u1", "c1", "Aki").await;
    h.add_contact("u1", "c2", "Ren").await;
    h.channel.fail_for("c1");

    h.advance_to(local(9, 1, 0)).await;
    assert!(h.store.confirm_and_fan_out("u1").await.unwrap());
    assert!(h.channel.sent_to("c1").is_empty());
    assert_eq!(h.channel.sent_to("c2"), vec!["Ren just took it!"]);
}

#[tokio::test(start_paused = true)]
async fn stuck_delivery_for_one_subscriber_does_not_block_another() {
    let h = Harness::start_at(local(8, 59, 0), settings(10));
    h.store.create_or_replace("u1", 9, 0).await.unwrap();
    h.store.create_or_replace("u2", 9, 0).await.unwrap();
    h.add_contact("u2", "c2", "Ren").await;
    h.channel.stall_for("u1");

    h.advance_to(local(9, 0, 1)).await;
    assert!(h.channel.sent_to("u1").is_empty());
    assert_eq!(h.channel.sent_to("u2"), vec!["Did you take it?"]);

    assert!(h.store.confirm_and_fan_out("u2").await.unwrap());
    assert_eq!(h.channel.sent_to("c2"), vec!["Ren just took it!"]);
    h.store.create_or_replace("u2", 21, 0).await.unwrap();

    // The stuck subscriber can still be reconfigured.
    let old = h.store.get("u1").unwrap();
    let new = h.store.create_or_replace("u1", 10, 0).await.unwrap();
    assert!(old.is_closed());
    assert_eq!(new.time().hour(), 10);
}
