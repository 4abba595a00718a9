//! Inbound Slack message dispatch.
//!
//! Direct messages arrive as push events over Socket Mode. Each one is
//! handed to the [`IntentHandler`] and the reply is queued back to the
//! channel it came from. Bot messages and message subtypes (edits,
//! joins, deletions) are ignored.

use std::sync::Arc;

use slack_morphism::prelude::{
    SlackClient, SlackClientEventsUserState, SlackClientHyperHttpsConnector,
    SlackEventCallbackBody, SlackMessageEvent, SlackPushEventCallback,
};
use tracing::{debug, warn};

use crate::intent::IntentHandler;
use crate::slack::client::{SlackMessage, SlackService};

/// Shared state injected into the Socket Mode listener.
pub struct InboundState {
    /// Applies parsed intents.
    pub handler: IntentHandler,
    /// Reply path.
    pub slack: Arc<SlackService>,
}

/// Handle push events delivered via Socket Mode.
///
/// # Errors
///
/// Never fails; problems are logged so Slack does not redeliver.
pub async fn handle_push_event(
    event: SlackPushEventCallback,
    _client: Arc<SlackClient<SlackClientHyperHttpsConnector>>,
    state: SlackClientEventsUserState,
) -> slack_morphism::UserCallbackResult<()> {
    let SlackEventCallbackBody::Message(message) = event.event else {
        debug!("non-message push event ignored");
        return Ok(());
    };

    let inbound: Option<Arc<InboundState>> = {
        let guard = state.read().await;
        guard.get_user_state::<Arc<InboundState>>().cloned()
    };
    let Some(inbound) = inbound else {
        warn!("inbound state not available; cannot process message");
        return Ok(());
    };

    handle_message(&message, &inbound).await;
    Ok(())
}

async fn handle_message(message: &SlackMessageEvent, inbound: &InboundState) {
    if message.sender.bot_id.is_some() || message.subtype.is_some() {
        return;
    }
    let Some(user) = message.sender.user.as_ref() else {
        return;
    };
    let Some(text) = message.content.as_ref().and_then(|c| c.text.as_deref()) else {
        return;
    };
    let Some(channel) = message.origin.channel.clone() else {
        warn!(user_id = %user, "message without channel; cannot reply");
        return;
    };

    let reply = inbound.handler.handle_text(&user.to_string(), text).await;
    if let Err(err) = inbound.slack.enqueue(SlackMessage::plain(channel, reply)).await {
        warn!(%err, user_id = %user, "reply not queued");
    }
}
