//! Gemini narrator implementation using the `generateContent` REST API.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::aggregate::StageMap;
use crate::http::{check_http_response, DEFAULT_TIMEOUT_SECS};

use super::{build_prompt, Narrator, NarratorError};

/// Base URL for the generative-language API.
const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

// ---------------------------------------------------------------------------
// Wire types (pub for integration testing)
// ---------------------------------------------------------------------------

/// `generateContent` request body.
#[doc(hidden)]
#[derive(Debug, Serialize)]
pub struct GenerateRequest {
    /// Conversation contents (a single user turn here).
    pub contents: Vec<Content>,
}

/// A content turn.
#[doc(hidden)]
#[derive(Debug, Serialize, Deserialize)]
pub struct Content {
    /// Content parts.
    pub parts: Vec<Part>,
}

/// A text part.
#[doc(hidden)]
#[derive(Debug, Serialize, Deserialize)]
pub struct Part {
    /// The text.
    pub text: String,
}

/// `generateContent` response body (subset of fields we use).
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct GenerateResponse {
    /// Response candidates; the first one is used.
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

/// A single response candidate.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct Candidate {
    /// Candidate content.
    pub content: Content,
}

/// Build a `generateContent` request for one prompt.
#[doc(hidden)]
pub fn build_request(prompt: String) -> GenerateRequest {
    GenerateRequest {
        contents: vec![Content {
            parts: vec![Part { text: prompt }],
        }],
    }
}

/// Parse a `generateContent` response into the summary text.
///
/// # Errors
///
/// Returns [`NarratorError::Parse`] on malformed JSON, [`NarratorError::Empty`]
/// when no candidate carries text.
#[doc(hidden)]
pub fn parse_response(body: &str) -> Result<String, NarratorError> {
    let resp: GenerateResponse =
        serde_json::from_str(body).map_err(|e| NarratorError::Parse(e.to_string()))?;

    let text = resp
        .candidates
        .into_iter()
        .next()
        .map(|c| {
            c.content
                .parts
                .into_iter()
                .map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(NarratorError::Empty);
    }
    Ok(trimmed.to_string())
}

// ---------------------------------------------------------------------------
// Narrator
// ---------------------------------------------------------------------------

/// Gemini `generateContent` narrator.
#[derive(Debug, Clone)]
pub struct GeminiNarrator {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl GeminiNarrator {
    /// Create a narrator for one model.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::with_base_url(GEMINI_API_BASE, api_key, model)
    }

    /// Create a narrator against a custom API base URL (for testing).
    pub fn with_base_url(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Narrator for GeminiNarrator {
    async fn generate(&self, map: &StageMap) -> Result<String, NarratorError> {
        let request = build_request(build_prompt(map));

        info!(model = %self.model, "generating pipeline summary");
        let response = self
            .client
            .post(format!(
                "{}/models/{}:generateContent",
                self.base_url, self.model
            ))
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .send()
            .await
            .map_err(crate::http::HttpError::from)?;

        let body = check_http_response(response).await?;
        let summary = parse_response(&body)?;
        info!(chars = summary.chars().count(), "summary generated");
        Ok(summary)
    }
}
