//! Delivery orchestration: where each rendered message goes, and how failures
//! are isolated.
//!
//! Alert events deliver independently — a deal with a thread anchor on file
//! gets a threaded reply, the rest get top-level messages, and one failed
//! delivery never blocks the next. Enhanced reports deliver the parent first
//! and attach per-stage follow-ups to the anchor it returns. Legacy reports
//! are a single webhook shot where any failure fails the run.

use std::collections::HashMap;

use tracing::{debug, error, info};

use crate::aggregate::StageMap;
use crate::alerts::AlertEvent;
use crate::chat::slack::WebhookClient;
use crate::chat::{ChatApi, ChatError};
use crate::crm::CrmApi;
use crate::owners::OwnerMap;
use crate::render::{format_stage_detail, render_alert, RenderedMessage};

/// Outcome counters for a batch delivery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Messages delivered.
    pub sent: usize,
    /// Messages that failed to deliver.
    pub failed: usize,
}

impl DeliveryReport {
    /// True when nothing failed.
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

/// Per-run delivery orchestrator.
///
/// Holds the chat and CRM collaborators plus a stage-name cache so repeated
/// alerts for the same stage don't refetch its display name.
pub struct Dispatcher<'a> {
    chat: &'a dyn ChatApi,
    crm: &'a dyn CrmApi,
    stage_names: HashMap<i64, String>,
}

impl<'a> Dispatcher<'a> {
    /// Create a dispatcher for one run.
    pub fn new(chat: &'a dyn ChatApi, crm: &'a dyn CrmApi) -> Self {
        Self {
            chat,
            crm,
            stage_names: HashMap::new(),
        }
    }

    /// Resolve a stage display name through the per-run cache.
    async fn stage_name(&mut self, stage_id: Option<i64>) -> String {
        let Some(stage_id) = stage_id else {
            return "unknown".to_string();
        };
        if let Some(name) = self.stage_names.get(&stage_id) {
            return name.clone();
        }
        let name = self.crm.get_stage_name(stage_id).await;
        self.stage_names.insert(stage_id, name.clone());
        name
    }

    /// Deliver one message per alert event, isolating per-event failures.
    ///
    /// The thread anchor, when a field key is configured and the deal carries
    /// a value, turns the alert into a threaded reply; otherwise the alert is
    /// a new top-level message.
    pub async fn dispatch_alerts(
        &mut self,
        events: &[AlertEvent<'_>],
        thread_field_key: Option<&str>,
        owners: &OwnerMap,
    ) -> DeliveryReport {
        let mut report = DeliveryReport::default();

        for event in events {
            let stage_name = self.stage_name(event.deal.stage_id).await;
            let owner = owners.label(event.deal.owner_ref());
            let thread_anchor = thread_field_key
                .and_then(|key| event.deal.custom_field(key).as_str().map(str::to_string));

            let message = RenderedMessage {
                body: render_alert(event, &stage_name, &owner),
                thread_anchor,
            };

            match message.thread_anchor.as_deref() {
                Some(anchor) => {
                    debug!(deal_id = event.deal.id, anchor, "posting alert into deal thread")
                }
                None => debug!(deal_id = event.deal.id, "posting alert to channel"),
            }

            match self
                .chat
                .post_message(&message.body, message.thread_anchor.as_deref())
                .await
            {
                Ok(_) => report.sent = report.sent.saturating_add(1),
                Err(e) => {
                    error!(deal_id = event.deal.id, error = %e, "alert delivery failed");
                    report.failed = report.failed.saturating_add(1);
                }
            }
        }

        info!(sent = report.sent, failed = report.failed, "alert batch delivered");
        report
    }

    /// Deliver an enhanced report: parent first, then one threaded follow-up
    /// per stage in map order.
    ///
    /// Per-stage failures are counted and skipped; remaining follow-ups still
    /// deliver.
    ///
    /// # Errors
    ///
    /// Returns an error when the parent itself fails or comes back without a
    /// thread anchor — without it, nothing can attach.
    pub async fn dispatch_report(
        &mut self,
        parent_body: &str,
        map: &StageMap,
    ) -> Result<DeliveryReport, ChatError> {
        let posted = self.chat.post_message(parent_body, None).await?;
        let anchor = posted
            .thread_anchor
            .ok_or_else(|| ChatError::Api("backend returned no thread anchor".to_string()))?;
        info!(anchor = %anchor, "report parent posted");

        let mut report = DeliveryReport::default();
        for entry in &map.entries {
            let detail = format_stage_detail(entry);
            match self.chat.post_message(&detail, Some(&anchor)).await {
                Ok(_) => {
                    debug!(stage = %entry.stage, "stage detail posted");
                    report.sent = report.sent.saturating_add(1);
                }
                Err(e) => {
                    error!(stage = %entry.stage, error = %e, "stage detail delivery failed");
                    report.failed = report.failed.saturating_add(1);
                }
            }
        }

        info!(sent = report.sent, failed = report.failed, "report thread delivered");
        Ok(report)
    }
}

/// Deliver a legacy report as a single webhook message.
///
/// # Errors
///
/// Any transport error or non-success response is a run failure.
pub async fn dispatch_report_legacy(webhook: &WebhookClient, body: &str) -> Result<(), ChatError> {
    info!(chars = body.chars().count(), "posting legacy report");
    webhook.send(body).await
}
