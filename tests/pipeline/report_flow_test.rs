//! End-to-end flow over fetched snapshots: classification, aggregation, and
//! rendering, with no network in the loop.

use std::collections::HashMap;

use chrono::{NaiveDate, TimeZone, Utc};
use serde_json::json;

use dealwatch::aggregate::aggregate;
use dealwatch::alerts::{classify, AlertKind, AlertRules};
use dealwatch::crm::{Deal, Stage};
use dealwatch::narrator::{fallback_summary, summarize, NO_DEALS_SUMMARY};
use dealwatch::render::{render_alert, render_report_legacy, render_report_parent};

const DEADLINE_FIELD: &str = "b459bec642f11294904272a4fe6273d3591b9566";

fn rules() -> AlertRules {
    AlertRules {
        deadline_field_key: DEADLINE_FIELD.to_string(),
        deadline_days: vec![3, 1, 0],
        stagnation_days: vec![3, 7, 14, 30],
    }
}

fn stage(id: i64, name: &str, order_nr: i64) -> Stage {
    Stage {
        id,
        name: name.to_string(),
        order_nr,
    }
}

fn deal(value: serde_json::Value) -> Deal {
    serde_json::from_value(value).expect("deal should deserialize")
}

#[test]
fn snapshot_to_legacy_report_body() {
    let stages = vec![
        stage(1, "Lead", 0),
        stage(2, "Negotiation", 1),
        stage(3, "Closed", 2),
    ];
    let mut deals_by_stage = HashMap::new();
    deals_by_stage.insert(
        1,
        vec![
            deal(json!({"id": 1, "title": "Acme"})),
            deal(json!({"id": 2, "title": " Acme "})),
            deal(json!({"id": 3, "title": "Globex"})),
        ],
    );
    deals_by_stage.insert(2, vec![deal(json!({"id": 4, "title": "Initech"}))]);
    deals_by_stage.insert(3, Vec::new());

    let map = aggregate(&stages, &deals_by_stage);
    let body = render_report_legacy(&map);

    assert!(body.starts_with("Daily pipeline report (3 companies)"));
    assert!(body.contains("*Lead* (2)\nAcme / Globex"));
    assert!(body.contains("*Negotiation* (1)\nInitech"));
    assert!(body.contains("*Closed* (0)\nnone"));
}

#[tokio::test]
async fn snapshot_to_parent_report_with_fallback_summary() {
    let stages = vec![stage(1, "Lead", 0), stage(2, "Closed", 1)];
    let mut deals_by_stage = HashMap::new();
    deals_by_stage.insert(1, vec![deal(json!({"id": 1, "title": "Acme"}))]);

    let map = aggregate(&stages, &deals_by_stage);
    let summary = summarize(None, &map).await;
    let body = render_report_parent(&summary, &map);

    assert!(body.starts_with("📊 *Daily pipeline report* (1 company)"));
    assert!(body.ends_with(&fallback_summary(&map)));
}

#[tokio::test]
async fn empty_pipeline_report_uses_canned_summary() {
    let stages = vec![stage(1, "Lead", 0)];
    let map = aggregate(&stages, &HashMap::new());

    let summary = summarize(None, &map).await;
    assert_eq!(summary, NO_DEALS_SUMMARY);
}

#[test]
fn snapshot_to_alert_bodies() {
    let today = NaiveDate::from_ymd_opt(2025, 6, 10).expect("valid date");
    let now = Utc
        .with_ymd_and_hms(2025, 6, 10, 9, 0, 0)
        .single()
        .expect("valid time");

    let deals = vec![
        // Overdue by two days.
        deal(json!({"id": 1, "title": "Acme", "stage_id": 5, DEADLINE_FIELD: "2025-06-08"})),
        // Seven whole days in stage.
        deal(json!({
            "id": 2,
            "title": "Globex",
            "stage_id": 5,
            "stage_change_time": "2025-06-03T08:00:00Z",
        })),
        // No alert condition at all.
        deal(json!({"id": 3, "title": "Initech", "stage_id": 5})),
    ];

    let events = classify(&deals, today, now, &rules());
    assert_eq!(events.len(), 2);
    assert!(matches!(events[0].kind, AlertKind::Deadline { days_until: -2, .. }));
    assert!(matches!(events[1].kind, AlertKind::Stagnation { days_in_stage: 7 }));

    let overdue = render_alert(&events[0], "Negotiation", "unassigned");
    assert!(overdue.starts_with("🚨"));
    assert!(overdue.contains("overdue by 2 days"));
    assert!(overdue.contains("Company: Acme"));

    let stuck = render_alert(&events[1], "Negotiation", "owner_id 7");
    assert!(stuck.contains("7 days in the same stage"));
    assert!(stuck.contains("Owner: owner_id 7"));
}
