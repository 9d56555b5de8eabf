//! Chat collaborator: the narrow delivery contract and its Slack backends.
//!
//! Two delivery styles exist:
//! - [`ChatApi::post_message`] — bot-token API posting, returning the posted
//!   message's thread anchor so follow-ups can attach to it (enhanced mode
//!   and alert runs).
//! - [`slack::WebhookClient`] — fire-and-forget incoming webhook (legacy
//!   mode), no threading.

use async_trait::async_trait;

use crate::http::HttpError;

pub mod slack;

/// Result of a successful post: where replies can attach.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedMessage {
    /// Thread anchor of the delivered message, when the backend supplies one.
    pub thread_anchor: Option<String>,
}

/// Errors produced by chat delivery.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// Transport failure or non-success HTTP status.
    #[error(transparent)]
    Http(#[from] HttpError),
    /// Response body did not match the expected schema.
    #[error("chat response parse error: {0}")]
    Parse(String),
    /// The backend reported an application-level error.
    #[error("chat API error: {0}")]
    Api(String),
}

/// Narrow chat contract the dispatcher depends on.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Post a message, optionally as a threaded reply.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError`] on transport, schema, or application failure.
    async fn post_message(
        &self,
        text: &str,
        thread_anchor: Option<&str>,
    ) -> Result<PostedMessage, ChatError>;
}
