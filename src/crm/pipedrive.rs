//! Pipedrive v1 REST client implementing [`CrmApi`].
//!
//! Authentication is the `api_token` query parameter. Every call is a single
//! attempt with a bounded timeout; failures are logged (with status and
//! sanitized body) and degrade to empty/default results per the [`CrmApi`]
//! contract.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::http::{check_http_response, DEFAULT_TIMEOUT_SECS};

use super::{CrmApi, CrmError, Deal, Stage};

/// Timeout for stage-name lookups, which sit on the alert rendering path and
/// should fail fast.
const STAGE_NAME_TIMEOUT_SECS: u64 = 10;

/// Page size for deal listings. The CRM caps a single page at 500.
const DEAL_FETCH_LIMIT: &str = "500";

// ---------------------------------------------------------------------------
// Wire types (pub for integration testing)
// ---------------------------------------------------------------------------

/// Generic Pipedrive response envelope.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: serde::Deserialize<'de>"))]
pub struct Envelope<T> {
    /// Whether the call succeeded at the application level.
    pub success: bool,
    /// Payload; may be absent or null even on success.
    #[serde(default)]
    pub data: Option<T>,
    /// Application-level error message.
    #[serde(default)]
    pub error: Option<String>,
}

/// Payload of `/pipelines/{id}` — stages may or may not be embedded.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct PipelinePayload {
    /// Embedded stage definitions, when the API includes them.
    #[serde(default)]
    pub stages: Vec<Stage>,
}

/// Payload of `/stages/{id}`.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct StagePayload {
    /// Stage display name.
    #[serde(default)]
    pub name: Option<String>,
}

// ---------------------------------------------------------------------------
// Parse helpers (pub for integration testing)
// ---------------------------------------------------------------------------

/// Unwrap a Pipedrive envelope, mapping `success: false` to [`CrmError::Api`].
///
/// A missing/null `data` member comes back as `None` — some endpoints serve
/// null instead of an empty list.
///
/// # Errors
///
/// Returns [`CrmError::Parse`] on malformed JSON, [`CrmError::Api`] when the
/// envelope reports failure.
#[doc(hidden)]
pub fn parse_envelope<T: DeserializeOwned>(body: &str) -> Result<Option<T>, CrmError> {
    let envelope: Envelope<T> =
        serde_json::from_str(body).map_err(|e| CrmError::Parse(e.to_string()))?;
    if !envelope.success {
        return Err(CrmError::Api(
            envelope.error.unwrap_or_else(|| "unknown error".to_string()),
        ));
    }
    Ok(envelope.data)
}

/// Sort stages by their pipeline position, ascending.
#[doc(hidden)]
pub fn sort_stages(mut stages: Vec<Stage>) -> Vec<Stage> {
    stages.sort_by_key(|s| s.order_nr);
    stages
}

/// Deserialize deal records one by one, skipping malformed entries.
///
/// One junk record (a missing `id`, a wrong type) drops only that record,
/// not the whole page.
#[doc(hidden)]
pub fn parse_deal_records(records: Vec<Value>) -> Vec<Deal> {
    let mut deals = Vec::with_capacity(records.len());
    for record in records {
        match serde_json::from_value::<Deal>(record) {
            Ok(deal) => deals.push(deal),
            Err(e) => warn!(error = %e, "malformed deal record skipped"),
        }
    }
    deals
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Pipedrive REST client.
#[derive(Debug, Clone)]
pub struct PipedriveClient {
    base_url: String,
    api_token: String,
    client: reqwest::Client,
}

impl PipedriveClient {
    /// Create a client against the given API base URL.
    pub fn new(base_url: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_token: api_token.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Fetch one path with query parameters, returning the raw body.
    async fn fetch(
        &self,
        path: &str,
        query: &[(&str, &str)],
        timeout_secs: u64,
    ) -> Result<String, CrmError> {
        let url = format!("{}/{path}", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("api_token", self.api_token.as_str())])
            .query(query)
            .timeout(Duration::from_secs(timeout_secs))
            .send()
            .await
            .map_err(crate::http::HttpError::from)?;
        Ok(check_http_response(response).await?)
    }

    /// Fetch deals with the given query, degrading to empty on any failure.
    async fn fetch_deals(&self, query: &[(&str, &str)], context: &str) -> Vec<Deal> {
        let body = match self.fetch("deals", query, DEFAULT_TIMEOUT_SECS).await {
            Ok(body) => body,
            Err(e) => {
                warn!(context, error = %e, "deal fetch failed");
                return Vec::new();
            }
        };
        match parse_envelope::<Vec<Value>>(&body) {
            Ok(Some(records)) => parse_deal_records(records),
            Ok(None) => {
                debug!(context, "deal fetch returned null data");
                Vec::new()
            }
            Err(e) => {
                warn!(context, error = %e, "deal fetch rejected");
                Vec::new()
            }
        }
    }

    /// Fetch stages from the `/stages` listing endpoint (fallback path).
    async fn list_stages_fallback(&self, pipeline_id: &str) -> Vec<Stage> {
        info!(pipeline_id, "pipeline payload had no embedded stages, trying /stages");
        let body = match self
            .fetch("stages", &[("pipeline_id", pipeline_id)], DEFAULT_TIMEOUT_SECS)
            .await
        {
            Ok(body) => body,
            Err(e) => {
                warn!(pipeline_id, error = %e, "stage list fetch failed");
                return Vec::new();
            }
        };
        match parse_envelope::<Vec<Stage>>(&body) {
            Ok(Some(stages)) => sort_stages(stages),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(pipeline_id, error = %e, "stage list fetch rejected");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl CrmApi for PipedriveClient {
    async fn list_open_deals(&self, pipeline_id: &str) -> Vec<Deal> {
        info!(pipeline_id, "fetching all open deals");
        let deals = self
            .fetch_deals(
                &[
                    ("pipeline_id", pipeline_id),
                    ("status", "open"),
                    ("limit", DEAL_FETCH_LIMIT),
                ],
                "pipeline",
            )
            .await;
        info!(count = deals.len(), "open deals fetched");
        deals
    }

    async fn list_stages(&self, pipeline_id: &str) -> Vec<Stage> {
        info!(pipeline_id, "fetching pipeline stages");
        let body = match self
            .fetch(
                &format!("pipelines/{pipeline_id}"),
                &[],
                DEFAULT_TIMEOUT_SECS,
            )
            .await
        {
            Ok(body) => body,
            Err(e) => {
                warn!(pipeline_id, error = %e, "pipeline fetch failed");
                return Vec::new();
            }
        };

        let payload = match parse_envelope::<PipelinePayload>(&body) {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                warn!(pipeline_id, "pipeline fetch returned no data");
                return Vec::new();
            }
            Err(e) => {
                warn!(pipeline_id, error = %e, "pipeline fetch rejected");
                return Vec::new();
            }
        };

        if payload.stages.is_empty() {
            return self.list_stages_fallback(pipeline_id).await;
        }

        let stages = sort_stages(payload.stages);
        for (i, stage) in stages.iter().enumerate() {
            debug!(
                position = i.saturating_add(1),
                stage_id = stage.id,
                name = %stage.name,
                order_nr = stage.order_nr,
                "stage"
            );
        }
        stages
    }

    async fn list_open_deals_for_stage(&self, pipeline_id: &str, stage_id: i64) -> Vec<Deal> {
        let stage = stage_id.to_string();
        let deals = self
            .fetch_deals(
                &[
                    ("pipeline_id", pipeline_id),
                    ("stage_id", stage.as_str()),
                    ("status", "open"),
                    ("limit", DEAL_FETCH_LIMIT),
                ],
                "stage",
            )
            .await;
        info!(stage_id, count = deals.len(), "stage deals fetched");
        deals
    }

    async fn get_stage_name(&self, stage_id: i64) -> String {
        let fallback = format!("Stage {stage_id}");
        let body = match self
            .fetch(
                &format!("stages/{stage_id}"),
                &[],
                STAGE_NAME_TIMEOUT_SECS,
            )
            .await
        {
            Ok(body) => body,
            Err(e) => {
                debug!(stage_id, error = %e, "stage name lookup failed");
                return fallback;
            }
        };
        match parse_envelope::<StagePayload>(&body) {
            Ok(Some(StagePayload { name: Some(name) })) => name,
            Ok(_) => fallback,
            Err(e) => {
                debug!(stage_id, error = %e, "stage name lookup rejected");
                fallback
            }
        }
    }
}
