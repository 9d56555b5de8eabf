#![allow(missing_docs)]

//! Dealwatch CLI — CRM pipeline alerts and reports for Slack.
//!
//! One-shot batch binary: an external scheduler invokes a subcommand, the
//! run fetches, classifies, renders, delivers, and exits. Configuration is
//! validated before the first network call.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Local, Utc};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use dealwatch::aggregate::aggregate;
use dealwatch::alerts::{classify, AlertRules};
use dealwatch::chat::slack::{SlackClient, WebhookClient};
use dealwatch::config::Config;
use dealwatch::crm::pipedrive::PipedriveClient;
use dealwatch::crm::{require_stage_named, require_stages, CrmApi, Stage};
use dealwatch::dispatch::{dispatch_report_legacy, Dispatcher};
use dealwatch::narrator::gemini::GeminiNarrator;
use dealwatch::narrator::{summarize, Narrator};
use dealwatch::owners::OwnerMap;
use dealwatch::render::{render_report_legacy, render_report_parent, DeliveryMode};

#[derive(Parser)]
#[command(name = "dealwatch", version, about = "CRM pipeline alerts and reports for Slack")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Post the per-stage pipeline report (enhanced or legacy per config).
    Report {
        /// Render the flat report to stdout without sending anything.
        #[arg(long)]
        preview: bool,
    },
    /// Check deadline and stagnation alerts and post them.
    Alerts,
    /// Post the first deal of one named stage to the webhook.
    Spotlight {
        /// Stage display name to spotlight.
        #[arg(long)]
        stage: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    dealwatch::logging::init();

    let cli = Cli::parse();
    let config = Config::load().context("failed to load configuration")?;

    match cli.command {
        Command::Report { preview } => run_report(&config, preview).await,
        Command::Alerts => run_alerts(&config).await,
        Command::Spotlight { stage } => run_spotlight(&config, &stage).await,
    }
}

/// Fetch each stage's open deals. A failed fetch reads as an empty stage.
async fn fetch_deals_by_stage(
    crm: &dyn CrmApi,
    pipeline_id: &str,
    stages: &[Stage],
) -> HashMap<i64, Vec<dealwatch::crm::Deal>> {
    let mut deals_by_stage = HashMap::with_capacity(stages.len());
    for stage in stages {
        let deals = crm.list_open_deals_for_stage(pipeline_id, stage.id).await;
        deals_by_stage.insert(stage.id, deals);
    }
    deals_by_stage
}

async fn run_report(config: &Config, preview: bool) -> Result<()> {
    info!("pipeline report run starting");
    let (token, pipeline_id) = config.require_crm()?;

    // Mode resolution happens before any network call so a misconfigured run
    // fails immediately. Preview needs no delivery credentials at all.
    let mode = if preview {
        None
    } else {
        Some(config.resolve_mode()?)
    };

    let crm = PipedriveClient::new(&config.crm.base_url, token);
    let stages = require_stages(&crm, pipeline_id).await?;
    let deals_by_stage = fetch_deals_by_stage(&crm, pipeline_id, &stages).await;
    let map = aggregate(&stages, &deals_by_stage);
    info!(
        stages = map.entries.len(),
        companies = map.total_companies(),
        "pipeline aggregated"
    );

    match mode {
        None => {
            println!("{}", render_report_legacy(&map));
        }
        Some(DeliveryMode::Enhanced) => {
            let (bot_token, channel) = config.require_bot()?;
            let narrator = config
                .narrative
                .api_key
                .as_deref()
                .map(|key| GeminiNarrator::new(key, config.narrative.model.clone()));
            let summary =
                summarize(narrator.as_ref().map(|n| n as &dyn Narrator), &map).await;

            let slack = SlackClient::new(bot_token, channel);
            let mut dispatcher = Dispatcher::new(&slack, &crm);
            let parent = render_report_parent(&summary, &map);
            let report = dispatcher
                .dispatch_report(&parent, &map)
                .await
                .context("report parent delivery failed")?;
            if !report.is_clean() {
                warn!(failed = report.failed, "some stage details failed to deliver");
            }
        }
        Some(DeliveryMode::Legacy) => {
            let url = config
                .slack
                .webhook_url
                .as_deref()
                .context("DEALWATCH_SLACK_WEBHOOK_URL is not set")?;
            let webhook = WebhookClient::new(url);
            dispatch_report_legacy(&webhook, &render_report_legacy(&map))
                .await
                .context("legacy report delivery failed")?;
        }
    }

    info!("pipeline report run complete");
    Ok(())
}

async fn run_alerts(config: &Config) -> Result<()> {
    info!("alert run starting");
    let (token, pipeline_id) = config.require_crm()?;
    let (bot_token, channel) = config.require_bot()?;

    let crm = PipedriveClient::new(&config.crm.base_url, token);
    let deals = crm.list_open_deals(pipeline_id).await;
    if deals.is_empty() {
        info!("no open deals found");
        return Ok(());
    }

    let rules = AlertRules::new(&config.crm.deadline_field_key, &config.alerts);
    let events = classify(&deals, Local::now().date_naive(), Utc::now(), &rules);
    if events.is_empty() {
        info!("no deals matched an alert condition");
        return Ok(());
    }
    info!(count = events.len(), "sending alerts");

    let owners = OwnerMap::load(Path::new(&config.paths.owner_map));
    let slack = SlackClient::new(bot_token, channel);
    let mut dispatcher = Dispatcher::new(&slack, &crm);
    let report = dispatcher
        .dispatch_alerts(&events, config.crm.thread_ts_field_key.as_deref(), &owners)
        .await;

    // Per-event failures are best-effort by design: they are logged and
    // counted above but do not fail the run.
    if !report.is_clean() {
        warn!(failed = report.failed, "some alerts failed to deliver");
    }

    info!("alert run complete");
    Ok(())
}

async fn run_spotlight(config: &Config, stage_name: &str) -> Result<()> {
    info!(stage = stage_name, "stage spotlight run starting");
    let (token, pipeline_id) = config.require_crm()?;

    let crm = PipedriveClient::new(&config.crm.base_url, token);
    let stages = require_stages(&crm, pipeline_id).await?;
    let stage = require_stage_named(&stages, stage_name, pipeline_id)?;

    let deals = crm.list_open_deals_for_stage(pipeline_id, stage.id).await;
    let Some(deal) = deals.first() else {
        info!(stage = stage_name, "no open deals in stage");
        return Ok(());
    };

    let owners = OwnerMap::load(Path::new(&config.paths.owner_map));
    let title = if deal.title.trim().is_empty() {
        format!("Deal {}", deal.id)
    } else {
        deal.title.clone()
    };
    let text = format!(
        ":rotating_light: Stage spotlight: {stage_name}\nCompany: {title}\nOwner: {owner}",
        owner = owners.label(deal.owner_ref()),
    );

    match config.slack.webhook_url.as_deref() {
        Some(url) => {
            WebhookClient::new(url)
                .send(&text)
                .await
                .context("spotlight delivery failed")?;
            info!(deal_id = deal.id, "spotlight posted");
        }
        None => {
            // Dry run: no webhook configured.
            println!("--- Slack payload (dry run) ---");
            println!("{text}");
            println!("-------------------------------");
        }
    }

    Ok(())
}
