//! Dispatcher behavior against scripted chat and CRM fakes: failure
//! isolation, threading, and the per-run stage-name cache.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde_json::json;

use dealwatch::aggregate::{StageEntry, StageMap};
use dealwatch::alerts::{AlertEvent, AlertKind};
use dealwatch::chat::{ChatApi, ChatError, PostedMessage};
use dealwatch::crm::{CrmApi, Deal, Stage};
use dealwatch::dispatch::Dispatcher;
use dealwatch::owners::OwnerMap;

const PARENT_ANCHOR: &str = "1727000000.000100";

#[derive(Debug, Clone, PartialEq, Eq)]
struct Recorded {
    text: String,
    thread_anchor: Option<String>,
}

/// Chat fake that records every call and fails on scripted call indices.
struct ScriptedChat {
    calls: Mutex<Vec<Recorded>>,
    fail_on: Vec<usize>,
    anchor: Option<String>,
}

impl ScriptedChat {
    fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_on: Vec::new(),
            anchor: Some(PARENT_ANCHOR.to_string()),
        }
    }

    fn failing_on(indices: &[usize]) -> Self {
        Self {
            fail_on: indices.to_vec(),
            ..Self::new()
        }
    }

    fn without_anchor() -> Self {
        Self {
            anchor: None,
            ..Self::new()
        }
    }

    fn calls(&self) -> Vec<Recorded> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl ChatApi for ScriptedChat {
    async fn post_message(
        &self,
        text: &str,
        thread_anchor: Option<&str>,
    ) -> Result<PostedMessage, ChatError> {
        let mut calls = self.calls.lock().expect("calls lock");
        let index = calls.len();
        calls.push(Recorded {
            text: text.to_string(),
            thread_anchor: thread_anchor.map(str::to_string),
        });
        if self.fail_on.contains(&index) {
            return Err(ChatError::Api("scripted failure".to_string()));
        }
        Ok(PostedMessage {
            thread_anchor: self.anchor.clone(),
        })
    }
}

/// CRM fake that serves stage names and counts the lookups.
struct StubCrm {
    names: HashMap<i64, String>,
    name_lookups: Mutex<usize>,
}

impl StubCrm {
    fn new(names: &[(i64, &str)]) -> Self {
        Self {
            names: names
                .iter()
                .map(|(id, name)| (*id, (*name).to_string()))
                .collect(),
            name_lookups: Mutex::new(0),
        }
    }

    fn lookups(&self) -> usize {
        *self.name_lookups.lock().expect("lookups lock")
    }
}

#[async_trait]
impl CrmApi for StubCrm {
    async fn list_open_deals(&self, _pipeline_id: &str) -> Vec<Deal> {
        Vec::new()
    }

    async fn list_stages(&self, _pipeline_id: &str) -> Vec<Stage> {
        Vec::new()
    }

    async fn list_open_deals_for_stage(&self, _pipeline_id: &str, _stage_id: i64) -> Vec<Deal> {
        Vec::new()
    }

    async fn get_stage_name(&self, stage_id: i64) -> String {
        let mut lookups = self.name_lookups.lock().expect("lookups lock");
        *lookups = lookups.saturating_add(1);
        self.names
            .get(&stage_id)
            .cloned()
            .unwrap_or_else(|| format!("Stage {stage_id}"))
    }
}

fn deal(value: serde_json::Value) -> Deal {
    serde_json::from_value(value).expect("deal should deserialize")
}

fn deadline_event(deal: &Deal) -> AlertEvent<'_> {
    AlertEvent {
        deal,
        kind: AlertKind::Deadline {
            days_until: 0,
            target_date: NaiveDate::from_ymd_opt(2025, 6, 10).expect("valid date"),
        },
        computed_at: Utc::now(),
    }
}

fn stage_map(entries: &[(&str, &[&str])]) -> StageMap {
    StageMap {
        entries: entries
            .iter()
            .map(|(stage, companies)| StageEntry {
                stage: (*stage).to_string(),
                companies: companies
                    .iter()
                    .map(|c| (*c).to_string())
                    .collect::<BTreeSet<_>>(),
            })
            .collect(),
    }
}

#[tokio::test]
async fn alert_failure_does_not_block_later_events() {
    let deals = vec![
        deal(json!({"id": 1, "title": "Acme", "stage_id": 5})),
        deal(json!({"id": 2, "title": "Globex", "stage_id": 5})),
        deal(json!({"id": 3, "title": "Initech", "stage_id": 5})),
    ];
    let events: Vec<AlertEvent<'_>> = deals.iter().map(deadline_event).collect();

    let chat = ScriptedChat::failing_on(&[1]);
    let crm = StubCrm::new(&[(5, "Negotiation")]);
    let mut dispatcher = Dispatcher::new(&chat, &crm);

    let report = dispatcher
        .dispatch_alerts(&events, None, &OwnerMap::default())
        .await;

    assert_eq!(report.sent, 2);
    assert_eq!(report.failed, 1);
    assert!(!report.is_clean());
    // Every event was attempted despite the middle failure.
    assert_eq!(chat.calls().len(), 3);
}

#[tokio::test]
async fn stage_names_are_cached_per_run() {
    let deals = vec![
        deal(json!({"id": 1, "title": "Acme", "stage_id": 5})),
        deal(json!({"id": 2, "title": "Globex", "stage_id": 5})),
        deal(json!({"id": 3, "title": "Initech", "stage_id": 6})),
    ];
    let events: Vec<AlertEvent<'_>> = deals.iter().map(deadline_event).collect();

    let chat = ScriptedChat::new();
    let crm = StubCrm::new(&[(5, "Negotiation"), (6, "Closing")]);
    let mut dispatcher = Dispatcher::new(&chat, &crm);

    dispatcher
        .dispatch_alerts(&events, None, &OwnerMap::default())
        .await;

    // Two distinct stage ids, two lookups, regardless of event count.
    assert_eq!(crm.lookups(), 2);
}

#[tokio::test]
async fn alert_threads_into_deal_anchor_when_field_present() {
    let threaded = deal(json!({
        "id": 1,
        "title": "Acme",
        "stage_id": 5,
        "thread_key": "1700000000.000200",
    }));
    let plain = deal(json!({"id": 2, "title": "Globex", "stage_id": 5}));
    let events = vec![deadline_event(&threaded), deadline_event(&plain)];

    let chat = ScriptedChat::new();
    let crm = StubCrm::new(&[(5, "Negotiation")]);
    let mut dispatcher = Dispatcher::new(&chat, &crm);

    dispatcher
        .dispatch_alerts(&events, Some("thread_key"), &OwnerMap::default())
        .await;

    let calls = chat.calls();
    assert_eq!(calls[0].thread_anchor.as_deref(), Some("1700000000.000200"));
    assert_eq!(calls[1].thread_anchor, None);
}

#[tokio::test]
async fn alert_body_carries_stage_and_owner() {
    let deals = vec![deal(json!({
        "id": 1,
        "title": "Acme",
        "stage_id": 5,
        "owner_id": 101,
    }))];
    let events: Vec<AlertEvent<'_>> = deals.iter().map(deadline_event).collect();

    let chat = ScriptedChat::new();
    let crm = StubCrm::new(&[(5, "Negotiation")]);
    let mut dispatcher = Dispatcher::new(&chat, &crm);

    dispatcher
        .dispatch_alerts(&events, None, &OwnerMap::parse("101: U01AAA\n"))
        .await;

    let calls = chat.calls();
    assert!(calls[0].text.contains("Current stage: Negotiation"));
    assert!(calls[0].text.contains("Owner: <@U01AAA>"));
}

#[tokio::test]
async fn report_posts_parent_then_threaded_details_in_order() {
    let map = stage_map(&[("Lead", &["Acme"]), ("Negotiation", &["Globex"])]);

    let chat = ScriptedChat::new();
    let crm = StubCrm::new(&[]);
    let mut dispatcher = Dispatcher::new(&chat, &crm);

    let report = dispatcher
        .dispatch_report("parent body", &map)
        .await
        .expect("report should deliver");

    assert_eq!(report.sent, 2);
    assert_eq!(report.failed, 0);

    let calls = chat.calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[0].text, "parent body");
    assert_eq!(calls[0].thread_anchor, None);
    // Details attach to the parent's anchor, in stage-map order.
    assert!(calls[1].text.starts_with("*Lead*"));
    assert_eq!(calls[1].thread_anchor.as_deref(), Some(PARENT_ANCHOR));
    assert!(calls[2].text.starts_with("*Negotiation*"));
    assert_eq!(calls[2].thread_anchor.as_deref(), Some(PARENT_ANCHOR));
}

#[tokio::test]
async fn report_parent_failure_is_fatal() {
    let map = stage_map(&[("Lead", &["Acme"])]);

    let chat = ScriptedChat::failing_on(&[0]);
    let crm = StubCrm::new(&[]);
    let mut dispatcher = Dispatcher::new(&chat, &crm);

    assert!(dispatcher.dispatch_report("parent body", &map).await.is_err());
    // No detail posts after a failed parent.
    assert_eq!(chat.calls().len(), 1);
}

#[tokio::test]
async fn report_fails_when_parent_returns_no_anchor() {
    let map = stage_map(&[("Lead", &["Acme"])]);

    let chat = ScriptedChat::without_anchor();
    let crm = StubCrm::new(&[]);
    let mut dispatcher = Dispatcher::new(&chat, &crm);

    let result = dispatcher.dispatch_report("parent body", &map).await;
    assert!(matches!(result, Err(ChatError::Api(_))));
    assert_eq!(chat.calls().len(), 1);
}

#[tokio::test]
async fn report_detail_failure_is_counted_not_fatal() {
    let map = stage_map(&[("Lead", &["Acme"]), ("Negotiation", &["Globex"])]);

    // Call 0 is the parent; call 1 is the first detail.
    let chat = ScriptedChat::failing_on(&[1]);
    let crm = StubCrm::new(&[]);
    let mut dispatcher = Dispatcher::new(&chat, &crm);

    let report = dispatcher
        .dispatch_report("parent body", &map)
        .await
        .expect("detail failures should not fail the report");

    assert_eq!(report.sent, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(chat.calls().len(), 3);
}
