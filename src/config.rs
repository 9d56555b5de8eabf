//! Configuration loading and validation.
//!
//! Loads dealwatch configuration from `./dealwatch.toml` (or
//! `$DEALWATCH_CONFIG_PATH`). Environment variables override file values;
//! file values override defaults.
//!
//! Precedence: env vars > config file > defaults.
//!
//! Required configuration is checked up front so a misconfigured run fails
//! before any network call is made.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::render::DeliveryMode;

// ── Top-level config ────────────────────────────────────────────

/// Top-level dealwatch configuration loaded from TOML.
///
/// Path: `./dealwatch.toml` or `$DEALWATCH_CONFIG_PATH`.
/// Env vars override file values; file values override defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// CRM (Pipedrive) settings.
    pub crm: CrmConfig,
    /// Slack delivery settings.
    pub slack: SlackConfig,
    /// Narrative (LLM summary) settings.
    pub narrative: NarrativeConfig,
    /// Alert-day thresholds.
    pub alerts: AlertRulesConfig,
    /// Filesystem paths for auxiliary data.
    pub paths: PathsConfig,
}

impl Config {
    /// Load configuration with precedence: env vars > TOML file > defaults.
    ///
    /// Config file path: `$DEALWATCH_CONFIG_PATH` or `./dealwatch.toml`.
    /// If the file does not exist, returns defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from_file()?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from TOML file only, no env overrides.
    fn load_from_file() -> Result<Self> {
        let path = Self::config_path_with(|key| std::env::var(key).ok());
        match std::fs::read_to_string(&path) {
            Ok(contents) => {
                tracing::info!(path = %path.display(), "loading config from file");
                let config: Config =
                    toml::from_str(&contents).context("failed to parse config TOML")?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("no config file found, using defaults");
                Ok(Config::default())
            }
            Err(e) => Err(anyhow::anyhow!("failed to read config file: {e}")),
        }
    }

    /// Resolve config path using a custom env resolver (for testing).
    fn config_path_with(env: impl Fn(&str) -> Option<String>) -> PathBuf {
        if let Some(p) = env("DEALWATCH_CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("dealwatch.toml")
    }

    /// Apply environment variable overrides (env > config > defaults).
    ///
    /// Takes a resolver function for testability (avoids unsafe `set_var` in tests).
    fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        // CRM.
        if let Some(v) = env("DEALWATCH_CRM_TOKEN") {
            self.crm.api_token = Some(v);
        }
        if let Some(v) = env("DEALWATCH_PIPELINE_ID") {
            self.crm.pipeline_id = Some(v);
        }
        if let Some(v) = env("DEALWATCH_DEADLINE_FIELD_KEY") {
            self.crm.deadline_field_key = v;
        }
        if let Some(v) = env("DEALWATCH_THREAD_TS_FIELD_KEY") {
            self.crm.thread_ts_field_key = Some(v);
        }

        // Slack.
        if let Some(v) = env("DEALWATCH_SLACK_BOT_TOKEN") {
            self.slack.bot_token = Some(v);
        }
        if let Some(v) = env("DEALWATCH_SLACK_CHANNEL") {
            self.slack.channel = Some(v);
        }
        if let Some(v) = env("DEALWATCH_SLACK_WEBHOOK_URL") {
            self.slack.webhook_url = Some(v);
        }

        // Narrative.
        if let Some(v) = env("DEALWATCH_GEMINI_API_KEY") {
            self.narrative.api_key = Some(v);
        }
        if let Some(v) = env("DEALWATCH_GEMINI_MODEL") {
            self.narrative.model = v;
        }

        // Paths.
        if let Some(v) = env("DEALWATCH_OWNER_MAP_PATH") {
            self.paths.owner_map = v;
        }
    }

    /// Parse a TOML string into config (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Config = toml::from_str(toml_str).context("failed to parse config TOML")?;
        Ok(config)
    }

    /// Require the CRM token and pipeline id, present in every subcommand.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first missing setting.
    pub fn require_crm(&self) -> Result<(&str, &str)> {
        let token = self
            .crm
            .api_token
            .as_deref()
            .context("DEALWATCH_CRM_TOKEN is not set")?;
        let pipeline = self
            .crm
            .pipeline_id
            .as_deref()
            .context("DEALWATCH_PIPELINE_ID is not set")?;
        Ok((token, pipeline))
    }

    /// Require the Slack bot token and channel (alert runs, enhanced reports).
    ///
    /// # Errors
    ///
    /// Returns an error naming the first missing setting.
    pub fn require_bot(&self) -> Result<(&str, &str)> {
        let token = self
            .slack
            .bot_token
            .as_deref()
            .context("DEALWATCH_SLACK_BOT_TOKEN is not set")?;
        let channel = self
            .slack
            .channel
            .as_deref()
            .context("DEALWATCH_SLACK_CHANNEL is not set")?;
        Ok((token, channel))
    }

    /// Resolve the report delivery mode from which credentials are present.
    ///
    /// Bot token + narrative key ⇒ [`DeliveryMode::Enhanced`] (channel then
    /// required); webhook URL ⇒ [`DeliveryMode::Legacy`] (no LLM summary).
    ///
    /// # Errors
    ///
    /// Returns an error when neither credential set is configured, or when
    /// the enhanced set is incomplete.
    pub fn resolve_mode(&self) -> Result<DeliveryMode> {
        if self.slack.bot_token.is_some() && self.narrative.api_key.is_some() {
            if self.slack.channel.is_none() {
                anyhow::bail!("DEALWATCH_SLACK_CHANNEL is not set");
            }
            return Ok(DeliveryMode::Enhanced);
        }
        if self.slack.webhook_url.is_some() {
            tracing::info!("legacy mode: using Slack webhook (no LLM summary)");
            return Ok(DeliveryMode::Legacy);
        }
        anyhow::bail!(
            "either DEALWATCH_SLACK_BOT_TOKEN + DEALWATCH_SLACK_CHANNEL + \
             DEALWATCH_GEMINI_API_KEY, or DEALWATCH_SLACK_WEBHOOK_URL is required"
        )
    }
}

// ── CRM config ──────────────────────────────────────────────────

/// CRM (Pipedrive) settings.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct CrmConfig {
    /// API token.
    pub api_token: Option<String>,
    /// API base URL.
    pub base_url: String,
    /// Pipeline identifier to poll.
    pub pipeline_id: Option<String>,
    /// Custom-field key holding the handover target date (`YYYY-MM-DD`).
    pub deadline_field_key: String,
    /// Custom-field key holding a Slack thread anchor, if any.
    pub thread_ts_field_key: Option<String>,
}

impl std::fmt::Debug for CrmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrmConfig")
            .field("api_token", &self.api_token.as_ref().map(|_| "__REDACTED__"))
            .field("base_url", &self.base_url)
            .field("pipeline_id", &self.pipeline_id)
            .field("deadline_field_key", &self.deadline_field_key)
            .field("thread_ts_field_key", &self.thread_ts_field_key)
            .finish()
    }
}

impl Default for CrmConfig {
    fn default() -> Self {
        Self {
            api_token: None,
            base_url: "https://api.pipedrive.com/v1".to_string(),
            pipeline_id: None,
            deadline_field_key: "b459bec642f11294904272a4fe6273d3591b9566".to_string(),
            thread_ts_field_key: None,
        }
    }
}

// ── Slack config ────────────────────────────────────────────────

/// Slack delivery settings.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct SlackConfig {
    /// Bot token for `chat.postMessage` (enhanced mode, alerts).
    pub bot_token: Option<String>,
    /// Target channel (enhanced mode, alerts).
    pub channel: Option<String>,
    /// Incoming webhook URL (legacy mode).
    pub webhook_url: Option<String>,
}

impl std::fmt::Debug for SlackConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackConfig")
            .field("bot_token", &self.bot_token.as_ref().map(|_| "__REDACTED__"))
            .field("channel", &self.channel)
            .field(
                "webhook_url",
                &self.webhook_url.as_ref().map(|_| "__REDACTED__"),
            )
            .finish()
    }
}

// ── Narrative config ────────────────────────────────────────────

/// Narrative (LLM summary) settings.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct NarrativeConfig {
    /// Gemini API key. Absent ⇒ deterministic fallback summary.
    pub api_key: Option<String>,
    /// Gemini model name.
    pub model: String,
}

impl std::fmt::Debug for NarrativeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NarrativeConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "__REDACTED__"))
            .field("model", &self.model)
            .finish()
    }
}

impl Default for NarrativeConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemini-2.0-flash".to_string(),
        }
    }
}

// ── Alert rules config ──────────────────────────────────────────

/// Alert-day thresholds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlertRulesConfig {
    /// Days-until-deadline values that trigger an alert (overdue always does).
    pub deadline_days: Vec<i64>,
    /// Exact days-in-stage values that trigger a stagnation alert.
    pub stagnation_days: Vec<i64>,
}

impl Default for AlertRulesConfig {
    fn default() -> Self {
        Self {
            deadline_days: vec![3, 1, 0],
            stagnation_days: vec![3, 7, 14, 30],
        }
    }
}

// ── Paths config ────────────────────────────────────────────────

/// Filesystem paths for auxiliary data.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Owner id → Slack member id map file.
    pub owner_map: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            owner_map: "config/owner_slack_map.yaml".to_string(),
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────
