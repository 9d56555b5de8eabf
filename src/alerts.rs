//! Alert classification: pure date arithmetic over deal snapshots.
//!
//! Two independent rules run against every deal, so a single deal can yield
//! zero, one, or two events:
//!
//! - **Deadline**: a configured custom field holds the handover target date.
//!   Approaching deadlines alert at fixed checkpoints (default 3/1/0 days
//!   out); overdue deadlines alert on every run until resolved. The asymmetry
//!   is intentional.
//! - **Stagnation**: a deal alerts only on the run where its time in the
//!   current stage crosses one of the exact day counts (default 3/7/14/30).
//!   A run that lands on day 13 or 15 produces nothing.
//!
//! Classification is a pure function of the deal snapshots, the caller's
//! calendar date, and the wall clock. There is no cross-run state: a deal
//! sitting at the zero-day checkpoint re-alerts every run within that day.

use chrono::{DateTime, NaiveDate, NaiveDateTime, ParseError, Utc};
use tracing::{debug, info};

use crate::config::AlertRulesConfig;
use crate::crm::Deal;

/// Classification parameters: which field holds the target date and which
/// day counts trigger.
#[derive(Debug, Clone)]
pub struct AlertRules {
    /// Custom-field key holding the `YYYY-MM-DD` target date.
    pub deadline_field_key: String,
    /// Days-until values that trigger a deadline alert (overdue always does).
    pub deadline_days: Vec<i64>,
    /// Exact days-in-stage values that trigger a stagnation alert.
    pub stagnation_days: Vec<i64>,
}

impl AlertRules {
    /// Build rules from configuration.
    pub fn new(deadline_field_key: impl Into<String>, thresholds: &AlertRulesConfig) -> Self {
        Self {
            deadline_field_key: deadline_field_key.into(),
            deadline_days: thresholds.deadline_days.clone(),
            stagnation_days: thresholds.stagnation_days.clone(),
        }
    }
}

/// What triggered an alert, with its metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    /// The handover date is approaching or has passed.
    Deadline {
        /// Signed days until the target date; negative once overdue.
        days_until: i64,
        /// The literal target date.
        target_date: NaiveDate,
    },
    /// The deal has sat in its current stage for an exact threshold count.
    Stagnation {
        /// Whole days spent in the current stage.
        days_in_stage: i64,
    },
}

/// A derived alert, valid for the current run only.
///
/// Borrows its deal: events are created fresh each run, consumed once by the
/// renderer, and never persisted.
#[derive(Debug, Clone)]
pub struct AlertEvent<'a> {
    /// The deal that triggered the alert.
    pub deal: &'a Deal,
    /// Alert category and trigger metric.
    pub kind: AlertKind,
    /// When this run computed the event.
    pub computed_at: DateTime<Utc>,
}

/// Parse a target date in `YYYY-MM-DD` form (no time component).
///
/// # Errors
///
/// Returns the chrono parse error; callers decide skip-vs-propagate.
pub fn parse_target_date(raw: &str) -> Result<NaiveDate, ParseError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
}

/// Parse a stage-entry timestamp.
///
/// Accepts RFC 3339 (a trailing literal `Z` reads as UTC) and the CRM's
/// `YYYY-MM-DD HH:MM:SS` form, which is interpreted as UTC.
///
/// # Errors
///
/// Returns the chrono parse error; callers decide skip-vs-propagate.
pub fn parse_stage_entry(raw: &str) -> Result<DateTime<Utc>, ParseError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|naive| naive.and_utc())
}

/// Classify deals into alert events.
///
/// `today` is the caller's local calendar date (the deadline rule is not
/// timezone-aware); `now` is the UTC wall clock for the stagnation rule.
///
/// Output order: all deadline events in source-deal order, then all
/// stagnation events in source-deal order. Delivery follows this order.
pub fn classify<'a>(
    deals: &'a [Deal],
    today: NaiveDate,
    now: DateTime<Utc>,
    rules: &AlertRules,
) -> Vec<AlertEvent<'a>> {
    let mut events = Vec::new();

    for deal in deals {
        if let Some(event) = check_deadline(deal, today, now, rules) {
            info!(deal_id = deal.id, title = %deal.title, kind = ?event.kind, "deadline alert");
            events.push(event);
        }
    }

    for deal in deals {
        if let Some(event) = check_stagnation(deal, now, rules) {
            info!(deal_id = deal.id, title = %deal.title, kind = ?event.kind, "stagnation alert");
            events.push(event);
        }
    }

    events
}

fn check_deadline<'a>(
    deal: &'a Deal,
    today: NaiveDate,
    now: DateTime<Utc>,
    rules: &AlertRules,
) -> Option<AlertEvent<'a>> {
    let raw = deal.custom_field(&rules.deadline_field_key);
    let raw = raw.as_str()?;

    let target_date = match parse_target_date(raw) {
        Ok(date) => date,
        Err(e) => {
            debug!(deal_id = deal.id, raw, error = %e, "unparseable target date, skipping");
            return None;
        }
    };

    let days_until = target_date.signed_duration_since(today).num_days();
    if days_until < 0 || rules.deadline_days.contains(&days_until) {
        return Some(AlertEvent {
            deal,
            kind: AlertKind::Deadline {
                days_until,
                target_date,
            },
            computed_at: now,
        });
    }
    None
}

fn check_stagnation<'a>(
    deal: &'a Deal,
    now: DateTime<Utc>,
    rules: &AlertRules,
) -> Option<AlertEvent<'a>> {
    let raw = deal.stage_change_time.as_deref()?;

    let entered = match parse_stage_entry(raw) {
        Ok(ts) => ts,
        Err(e) => {
            debug!(deal_id = deal.id, raw, error = %e, "unparseable stage entry time, skipping");
            return None;
        }
    };

    let days_in_stage = now.signed_duration_since(entered).num_days();
    if rules.stagnation_days.contains(&days_in_stage) {
        return Some(AlertEvent {
            deal,
            kind: AlertKind::Stagnation { days_in_stage },
            computed_at: now,
        });
    }
    None
}
