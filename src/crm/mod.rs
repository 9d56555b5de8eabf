//! CRM collaborator: deal and stage records, custom-field normalization, and
//! the [`CrmApi`] trait.
//!
//! One implementation is provided: [`pipedrive::PipedriveClient`] against the
//! Pipedrive v1 REST API.
//!
//! The contract is deliberately forgiving: every method degrades to an empty
//! or default value on transport or application-level error (logged with
//! status and body). The caller decides which empty results are fatal — an
//! empty stage list is, an empty per-stage deal list is not.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::http::HttpError;

pub mod pipedrive;

// ---------------------------------------------------------------------------
// Domain records
// ---------------------------------------------------------------------------

/// An open deal, snapshotted at fetch time.
///
/// The well-known fields are deserialized directly; everything else (custom
/// fields keyed by opaque hash strings, owner references, ...) lands in
/// `extra` and is read through [`Deal::custom_field`] and [`Deal::owner_ref`].
#[derive(Debug, Clone, Deserialize)]
pub struct Deal {
    /// CRM-internal deal identifier.
    pub id: i64,
    /// Deal title — the company name, used as the business key.
    #[serde(default)]
    pub title: String,
    /// Identifier of the stage the deal currently occupies.
    #[serde(default)]
    pub stage_id: Option<i64>,
    /// Timestamp the deal entered its current stage.
    #[serde(default)]
    pub stage_change_time: Option<String>,
    /// All remaining fields, including custom fields keyed by hash.
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl Deal {
    /// Read a custom field off the deal, normalizing its wire shape.
    pub fn custom_field(&self, field_key: &str) -> FieldValue {
        FieldValue::normalize(self.extra.get(field_key))
    }

    /// Extract the owner id, tolerating both wire shapes.
    ///
    /// Deals carry owner info under `owner_id` or `user_id`, either as a bare
    /// numeric id or as an object with an `id` member.
    pub fn owner_ref(&self) -> Option<i64> {
        let raw = self.extra.get("owner_id").or_else(|| self.extra.get("user_id"))?;
        match raw {
            Value::Number(n) => n.as_i64(),
            Value::Object(obj) => obj.get("id").and_then(Value::as_i64),
            _ => None,
        }
    }
}

/// A pipeline stage definition.
#[derive(Debug, Clone, Deserialize)]
pub struct Stage {
    /// Stage identifier.
    pub id: i64,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Position within the pipeline, ascending.
    #[serde(default)]
    pub order_nr: i64,
}

// ---------------------------------------------------------------------------
// Custom-field normalization
// ---------------------------------------------------------------------------

/// The normalized shape of a custom-field value.
///
/// The CRM serves custom fields in two shapes depending on the endpoint:
/// a bare string, or an object wrapping the value in a `value` member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// Field absent, null, or an unrecognized shape.
    Missing,
    /// Bare string value.
    Scalar(String),
    /// Value unwrapped from a `{"value": ...}` object.
    Wrapped(String),
}

impl FieldValue {
    /// Normalize a raw JSON custom-field value.
    pub fn normalize(raw: Option<&Value>) -> Self {
        match raw {
            Some(Value::String(s)) if !s.is_empty() => Self::Scalar(s.clone()),
            Some(Value::Object(obj)) => match obj.get("value") {
                Some(Value::String(s)) => Self::Wrapped(s.clone()),
                Some(Value::Number(n)) => Self::Wrapped(n.to_string()),
                _ => Self::Missing,
            },
            _ => Self::Missing,
        }
    }

    /// The contained string, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Missing => None,
            Self::Scalar(s) | Self::Wrapped(s) => Some(s.as_str()),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors produced while talking to the CRM.
///
/// The fetch variants never escape the client: each [`CrmApi`] method logs
/// the error and degrades to an empty/default value. The caller-side helpers
/// ([`require_stages`], [`require_stage_named`]) do return the last two
/// variants — those are the conditions a run cannot proceed past.
#[derive(Debug, thiserror::Error)]
pub enum CrmError {
    /// Transport failure or non-success HTTP status.
    #[error(transparent)]
    Http(#[from] HttpError),
    /// Response body did not match the expected schema.
    #[error("CRM response parse error: {0}")]
    Parse(String),
    /// The CRM envelope reported `success: false`.
    #[error("CRM API error: {0}")]
    Api(String),
    /// The pipeline served no stage definitions.
    #[error("no stages found for pipeline {0}; check the pipeline id and the API token's access")]
    NoStages(String),
    /// No stage carries the requested display name.
    #[error("stage {name:?} not found in pipeline {pipeline_id}")]
    StageNotFound {
        /// Requested display name.
        name: String,
        /// Pipeline that was searched.
        pipeline_id: String,
    },
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Narrow CRM contract the alert/aggregation engine depends on.
///
/// Implementations must be `Send + Sync`; the engine holds them behind
/// `&dyn CrmApi`.
#[async_trait]
pub trait CrmApi: Send + Sync {
    /// All open deals of the pipeline. Empty on error.
    async fn list_open_deals(&self, pipeline_id: &str) -> Vec<Deal>;

    /// The pipeline's stages, sorted by ascending `order_nr`. Empty on error.
    async fn list_stages(&self, pipeline_id: &str) -> Vec<Stage>;

    /// Open deals currently in one stage. Empty on error.
    async fn list_open_deals_for_stage(&self, pipeline_id: &str, stage_id: i64) -> Vec<Deal>;

    /// Display name for a stage id. Falls back to `"Stage {id}"` on error.
    async fn get_stage_name(&self, stage_id: i64) -> String;
}

// ---------------------------------------------------------------------------
// Caller-side helpers
// ---------------------------------------------------------------------------

/// Fetch the stage list, treating an empty result as fatal.
///
/// Every downstream computation needs the stage definitions; an empty list
/// means a wrong pipeline id, a pipeline without stages, or a token without
/// access.
///
/// # Errors
///
/// Returns [`CrmError::NoStages`] when the fetch degrades to an empty list.
pub async fn require_stages(crm: &dyn CrmApi, pipeline_id: &str) -> Result<Vec<Stage>, CrmError> {
    let stages = crm.list_stages(pipeline_id).await;
    if stages.is_empty() {
        return Err(CrmError::NoStages(pipeline_id.to_string()));
    }
    Ok(stages)
}

/// Look up a stage by its display name.
///
/// # Errors
///
/// Returns [`CrmError::StageNotFound`] when no stage carries the name.
pub fn require_stage_named<'a>(
    stages: &'a [Stage],
    name: &str,
    pipeline_id: &str,
) -> Result<&'a Stage, CrmError> {
    stages
        .iter()
        .find(|s| s.name == name)
        .ok_or_else(|| CrmError::StageNotFound {
            name: name.to_string(),
            pipeline_id: pipeline_id.to_string(),
        })
}
