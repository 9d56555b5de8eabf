//! Narrative collaborator: turns the stage map into a free-text summary.
//!
//! One backend is implemented: [`gemini::GeminiNarrator`] against the Google
//! generative-language REST API. The narrative layer is strictly optional —
//! missing credentials or any generation failure degrade to a deterministic
//! fallback string, never a crash.

use async_trait::async_trait;
use tracing::warn;

use crate::aggregate::StageMap;
use crate::http::HttpError;

pub mod gemini;

/// Errors produced by narrative generation.
#[derive(Debug, thiserror::Error)]
pub enum NarratorError {
    /// Transport failure or non-success HTTP status.
    #[error(transparent)]
    Http(#[from] HttpError),
    /// Response body did not match the expected schema.
    #[error("narrator response parse error: {0}")]
    Parse(String),
    /// The backend returned no usable text.
    #[error("narrator returned empty output")]
    Empty,
}

/// Narrow narrative contract the report pipeline depends on.
#[async_trait]
pub trait Narrator: Send + Sync {
    /// Generate a free-text summary of the stage map.
    ///
    /// # Errors
    ///
    /// Returns [`NarratorError`] on API, network, or parse failure.
    async fn generate(&self, map: &StageMap) -> Result<String, NarratorError>;
}

/// Build the summary prompt from the stage map.
pub fn build_prompt(map: &StageMap) -> String {
    let mut prompt = String::with_capacity(1024);

    prompt.push_str(
        "You are an assistant to a sales manager. Below is the current state \
         of the sales pipeline: the open deals in each stage.\n\
         Write a short report for the sales team covering the stage-by-stage \
         numbers, anything that looks like a bottleneck or an imbalance, and \
         one or two concrete actions for today.\n\
         Keep it concise and easy to read in Slack (bullet points are fine). \
         The per-stage detail is posted in the thread, so end with a pointer \
         to the thread.\n\n",
    );

    prompt.push_str("Pipeline status:\n");
    prompt.push_str(&format!("Total companies: {}\n", map.total_companies()));
    for entry in &map.entries {
        prompt.push_str(&format!("- {}: {} deals\n", entry.stage, entry.companies.len()));
        if !entry.companies.is_empty() {
            let companies = entry
                .companies
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            prompt.push_str(&format!("  (companies: {companies})\n"));
        }
    }

    prompt.push_str("\nOutput the report body only, with no preamble.\n");
    prompt
}

/// Deterministic summary used when generation fails or is not configured.
pub fn fallback_summary(map: &StageMap) -> String {
    format!(
        "The pipeline currently holds {} companies across {} stages. \
         See the thread for per-stage detail.",
        map.total_companies(),
        map.entries.len()
    )
}

/// Canned line for a pipeline with no deals at all; the API is not called.
pub const NO_DEALS_SUMMARY: &str = "No deals in the pipeline today. A good day to focus on new leads.";

/// Produce the report narrative, degrading instead of failing.
///
/// An empty pipeline short-circuits to [`NO_DEALS_SUMMARY`] without touching
/// the backend; an unconfigured or failing backend falls back to
/// [`fallback_summary`].
pub async fn summarize(narrator: Option<&dyn Narrator>, map: &StageMap) -> String {
    if map.has_no_deals() {
        return NO_DEALS_SUMMARY.to_string();
    }
    let Some(narrator) = narrator else {
        return fallback_summary(map);
    };
    match narrator.generate(map).await {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "narrative generation failed, using fallback summary");
            fallback_summary(map)
        }
    }
}
