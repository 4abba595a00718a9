//! Outbound message delivery boundary.
//!
//! The reminder engine only ever needs `push(target, text)`. Slack
//! provides the production implementation; [`LogOnlyChannel`] stands in
//! when no Slack token is configured.

use std::future::Future;
use std::pin::Pin;

use tracing::info;

use crate::Result;

/// A channel that can deliver a text message to a person.
pub trait PushChannel: Send + Sync {
    /// Deliver `text` to `target_id`.
    ///
    /// Implementations bound the call with their own timeout.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Delivery`](crate::AppError::Delivery) if the
    /// message could not be delivered.
    fn push<'a>(
        &'a self,
        target_id: &'a str,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

/// Delivery channel that records pushes in the log and always succeeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogOnlyChannel;

impl PushChannel for LogOnlyChannel {
    fn push<'a>(
        &'a self,
        target_id: &'a str,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            info!(target_id, text, "push (local-only mode)");
            Ok(())
        })
    }
}
