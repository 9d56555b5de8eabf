//! Message rendering: alert bodies and aggregate report bodies.
//!
//! Two independent paths share no state. The alert path renders one message
//! per [`AlertEvent`]; the aggregate path renders a parent report plus, in
//! enhanced mode, one per-stage section intended for a thread reply. Which
//! path a run takes — and whether the report is flat or threaded — is decided
//! by configuration and passed in as an explicit [`DeliveryMode`], never
//! inferred here.

use crate::aggregate::{StageEntry, StageMap};
use crate::alerts::{AlertEvent, AlertKind};

/// How a report is delivered.
///
/// Selected from which credentials are configured: bot token + LLM key give
/// `Enhanced` (parent message + threaded per-stage replies), a bare webhook
/// gives `Legacy` (single flat message, no narrative).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Single flat webhook message.
    Legacy,
    /// Parent message with threaded per-stage replies and an LLM narrative.
    Enhanced,
}

/// A message ready for delivery, consumed exactly once by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    /// Final message body.
    pub body: String,
    /// Thread to attach to; `None` posts a new top-level message.
    pub thread_anchor: Option<String>,
}

// ---------------------------------------------------------------------------
// Alert path
// ---------------------------------------------------------------------------

/// Render the body for one alert event.
///
/// `stage_name` is the resolved display name of the deal's current stage;
/// `owner` is the pre-formatted owner label (mention, id, or "unassigned").
pub fn render_alert(event: &AlertEvent<'_>, stage_name: &str, owner: &str) -> String {
    match event.kind {
        AlertKind::Deadline {
            days_until,
            target_date,
        } => {
            let (urgency, status) = deadline_status(days_until);
            format!(
                "{urgency} *Deadline alert: {status}*\n\n\
                 Company: {title}\n\
                 Target date: {target_date}\n\
                 Current stage: {stage_name}\n\
                 Owner: {owner}\n\n\
                 Please review next steps.",
                title = event.deal.title,
            )
        }
        AlertKind::Stagnation { days_in_stage } => {
            let urgency = stagnation_urgency(days_in_stage);
            format!(
                "{urgency} *Stagnation alert: {days_in_stage} days in the same stage*\n\n\
                 Company: {title}\n\
                 Current stage: {stage_name}\n\
                 Time in stage: {days_in_stage} days\n\n\
                 Consider the next action.",
                title = event.deal.title,
            )
        }
    }
}

/// Urgency glyph and status text for a deadline metric.
fn deadline_status(days_until: i64) -> (&'static str, String) {
    if days_until < 0 {
        ("🚨", format!("overdue by {} days", days_until.abs()))
    } else if days_until == 0 {
        ("⚠️", "due today".to_string())
    } else if days_until == 1 {
        ("⚠️", "due tomorrow".to_string())
    } else {
        ("📅", format!("due in {days_until} days"))
    }
}

/// Urgency glyph for a stagnation metric.
fn stagnation_urgency(days_in_stage: i64) -> &'static str {
    if days_in_stage >= 30 {
        "🚨"
    } else if days_in_stage >= 14 {
        "⚠️"
    } else {
        "📌"
    }
}

// ---------------------------------------------------------------------------
// Aggregate path
// ---------------------------------------------------------------------------

/// Literal marker rendered for a stage with no deals.
pub const EMPTY_STAGE_MARKER: &str = "none";

/// Render one stage's detail section: companies slash-joined, or the literal
/// empty marker. Used as a thread reply in enhanced mode and as a body
/// section in legacy mode.
pub fn format_stage_detail(entry: &StageEntry) -> String {
    let count = entry.companies.len();
    if entry.companies.is_empty() {
        format!("*{}* (0)\n{EMPTY_STAGE_MARKER}", entry.stage)
    } else {
        let companies = entry
            .companies
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" / ");
        format!("*{}* ({count})\n{companies}", entry.stage)
    }
}

/// Company count with its unit, pluralized.
fn company_total(map: &StageMap) -> String {
    match map.total_companies() {
        1 => "1 company".to_string(),
        n => format!("{n} companies"),
    }
}

/// Render the enhanced-mode parent message: header plus the narrative.
pub fn render_report_parent(summary: &str, map: &StageMap) -> String {
    format!(
        "📊 *Daily pipeline report* ({})\n\n{summary}",
        company_total(map)
    )
}

/// Render the legacy-mode flat report: header plus every stage section.
pub fn render_report_legacy(map: &StageMap) -> String {
    let mut parts = vec![format!("Daily pipeline report ({})", company_total(map))];
    for entry in &map.entries {
        parts.push(format_stage_detail(entry));
    }
    parts.join("\n\n")
}
