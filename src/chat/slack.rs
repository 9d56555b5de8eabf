//! Slack backends: `chat.postMessage` bot client and incoming-webhook client.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::http::{check_http_response, DEFAULT_TIMEOUT_SECS};

use super::{ChatApi, ChatError, PostedMessage};

/// Base URL for the Slack Web API.
const SLACK_API_BASE: &str = "https://slack.com/api";

// ---------------------------------------------------------------------------
// Wire types (pub for integration testing)
// ---------------------------------------------------------------------------

/// `chat.postMessage` request body.
#[doc(hidden)]
#[derive(Debug, Serialize)]
pub struct PostMessageRequest<'a> {
    /// Target channel.
    pub channel: &'a str,
    /// Message text.
    pub text: &'a str,
    /// Thread to reply into, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<&'a str>,
    /// Link previews stay off to keep the channel timeline compact.
    pub unfurl_links: bool,
    /// Media previews stay off as well.
    pub unfurl_media: bool,
}

/// `chat.postMessage` response body (subset of fields we use).
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct PostMessageResponse {
    /// Whether Slack accepted the message.
    pub ok: bool,
    /// Timestamp identifier of the posted message — the thread anchor.
    #[serde(default)]
    pub ts: Option<String>,
    /// Error code when `ok` is false.
    #[serde(default)]
    pub error: Option<String>,
}

/// Parse a `chat.postMessage` response body.
///
/// # Errors
///
/// Returns [`ChatError::Parse`] on malformed JSON, [`ChatError::Api`] when
/// Slack reports `ok: false`.
#[doc(hidden)]
pub fn parse_post_response(body: &str) -> Result<PostedMessage, ChatError> {
    let resp: PostMessageResponse =
        serde_json::from_str(body).map_err(|e| ChatError::Parse(e.to_string()))?;
    if !resp.ok {
        return Err(ChatError::Api(
            resp.error.unwrap_or_else(|| "unknown error".to_string()),
        ));
    }
    Ok(PostedMessage {
        thread_anchor: resp.ts,
    })
}

// ---------------------------------------------------------------------------
// Bot client
// ---------------------------------------------------------------------------

/// Slack Web API client posting as a bot into one channel.
#[derive(Debug, Clone)]
pub struct SlackClient {
    base_url: String,
    bot_token: String,
    channel: String,
    client: reqwest::Client,
}

impl SlackClient {
    /// Create a client for one channel.
    pub fn new(bot_token: impl Into<String>, channel: impl Into<String>) -> Self {
        Self::with_base_url(SLACK_API_BASE, bot_token, channel)
    }

    /// Create a client against a custom API base URL (for testing).
    pub fn with_base_url(
        base_url: impl Into<String>,
        bot_token: impl Into<String>,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            bot_token: bot_token.into(),
            channel: channel.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ChatApi for SlackClient {
    async fn post_message(
        &self,
        text: &str,
        thread_anchor: Option<&str>,
    ) -> Result<PostedMessage, ChatError> {
        let request = PostMessageRequest {
            channel: &self.channel,
            text,
            thread_ts: thread_anchor,
            unfurl_links: false,
            unfurl_media: false,
        };

        let response = self
            .client
            .post(format!("{}/chat.postMessage", self.base_url))
            .bearer_auth(&self.bot_token)
            .json(&request)
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .send()
            .await
            .map_err(crate::http::HttpError::from)?;

        let body = check_http_response(response).await?;
        let posted = parse_post_response(&body)?;
        info!(
            thread = thread_anchor.unwrap_or("new"),
            ts = posted.thread_anchor.as_deref().unwrap_or("-"),
            "Slack message posted"
        );
        Ok(posted)
    }
}

// ---------------------------------------------------------------------------
// Webhook client (legacy mode)
// ---------------------------------------------------------------------------

/// Incoming-webhook client for single flat messages.
#[derive(Debug, Clone)]
pub struct WebhookClient {
    url: String,
    client: reqwest::Client,
}

impl WebhookClient {
    /// Create a client for one webhook URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Post a single message. Success is any 2xx response.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError`] on transport failure or non-success status.
    pub async fn send(&self, text: &str) -> Result<(), ChatError> {
        debug!(chars = text.chars().count(), "posting webhook message");
        let response = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "text": text }))
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .send()
            .await
            .map_err(crate::http::HttpError::from)?;

        let body = check_http_response(response).await?;
        if body.trim() != "ok" {
            debug!(body = %body, "webhook returned an unexpected body, treating 2xx as success");
        }
        Ok(())
    }
}
