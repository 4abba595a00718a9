//! Text-in, reply-out behavior of the intent handler.

use daily_nudge::intent::{Intent, IntentHandler};

use super::test_helpers::{local, settings, Harness};

fn handler(h: &Harness) -> IntentHandler {
    IntentHandler::new(h.store.clone())
}

#[tokio::test(start_paused = true)]
async fn setting_and_querying_a_time() {
    let h = Harness::start_at(local(8, 0, 0), settings(10));
    let bot = handler(&h);

    let reply = bot.handle_text("u1", "9:05").await;
    assert!(reply.contains("9:05"), "{reply}");
    assert!(h.store.get("u1").is_ok());

    let reply = bot.handle_text("u1", "status").await;
    assert_eq!(reply, "Your reminder is set for 9:05.");
}

#[tokio::test(start_paused = true)]
async fn out_of_range_time_gets_a_friendly_reply() {
    let h = Harness::start_at(local(8, 0, 0), settings(10));
    let reply = handler(&h).handle_text("u1", "25:00").await;

    assert!(reply.contains("doesn't look right"), "{reply}");
    assert!(h.store.is_empty());
}

#[tokio::test(start_paused = true)]
async fn unknown_subscriber_is_asked_to_set_a_time() {
    let h = Harness::start_at(local(8, 0, 0), settings(10));
    let bot = handler(&h);

    assert!(bot.handle_text("u1", "hello").await.starts_with("Set a reminder time first"));
    assert!(bot.handle_text("u1", "done").await.starts_with("Set a reminder time first"));
    assert_eq!(bot.handle_text("u1", "delete").await, "No reminder is set.");
    assert_eq!(bot.handle_text("u1", "settings").await, "No reminder is set.");
}

#[tokio::test(start_paused = true)]
async fn unknown_text_is_echoed_for_subscribers() {
    let h = Harness::start_at(local(8, 0, 0), settings(10));
    let bot = handler(&h);
    bot.handle_text("u1", "9:00").await;

    assert_eq!(bot.handle_text("u1", "  good morning ").await, "good morning");
    // Nothing outstanding, so a confirmation is echoed as well.
    assert_eq!(bot.handle_text("u1", "ok").await, "ok");
}

#[tokio::test(start_paused = true)]
async fn contact_registration_flow() {
    let h = Harness::start_at(local(8, 59, 0), settings(10));
    let bot = handler(&h);
    bot.handle_text("u1", "9:00").await;
    bot.handle_text("c1", "21:00").await;

    let code = bot.handle_text("c1", "my code").await;
    assert_eq!(code, "contact:c1");

    let prompt = bot.handle_text("u1", &code).await;
    assert!(prompt.contains("nickname"), "{prompt}");
    assert_eq!(
        h.store.get("u1").unwrap().pending_contact_id().as_deref(),
        Some("c1")
    );

    // The next message is the display name even if it looks like a command.
    let reply = bot.handle_text("u1", "delete").await;
    assert!(reply.contains("let this person know"), "{reply}");
    assert!(h.store.get("u1").is_ok());
    assert_eq!(h.store.get("u1").unwrap().contacts()[0].name, "delete");

    h.advance_to(local(9, 1, 0)).await;
    assert_eq!(bot.handle_text("u1", "took it").await, "Well done!");
    assert_eq!(h.channel.sent_to("c1"), vec!["delete just took it!"]);

    assert_eq!(bot.handle_text("u1", "clear contacts").await, "All contacts removed.");
    assert!(h.store.get("u1").unwrap().contacts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn contact_request_needs_a_subscription() {
    let h = Harness::start_at(local(8, 0, 0), settings(10));
    let reply = handler(&h).handle_text("u1", "contact:c1").await;
    assert!(reply.contains("before adding contacts"), "{reply}");
}

#[tokio::test(start_paused = true)]
async fn delete_intent_removes_the_subscription() {
    let h = Harness::start_at(local(8, 0, 0), settings(10));
    let bot = handler(&h);
    bot.handle_text("u1", "9:00").await;

    let reply = bot.apply("u1", Intent::Delete, "unsubscribe").await;
    assert_eq!(reply, "Reminder deleted. Bye!");
    assert!(h.store.is_empty());
}

#[tokio::test(start_paused = true)]
async fn storage_failure_is_reported_without_detail() {
    let h = Harness::start_at(local(8, 0, 0), settings(10));
    let bot = handler(&h);
    h.records.set_failing(true);

    let reply = bot.handle_text("u1", "9:00").await;
    assert_eq!(reply, "Could not set the time.");
    assert!(h.store.is_empty());
}
