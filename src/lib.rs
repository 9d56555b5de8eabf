//! Dealwatch — CRM pipeline alerts and reports, delivered to Slack.
//!
//! A batch binary run by an external scheduler. Each invocation fetches the
//! open deals of one pipeline, derives time-based alert events and a
//! per-stage summary, and posts the result to a Slack channel — either as a
//! single webhook message (legacy mode) or as a parent message with threaded
//! per-stage replies and an LLM-generated narrative (enhanced mode).
//!
//! See `DESIGN.md` for full architecture documentation.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod http;
pub mod logging;
pub mod owners;

pub mod chat;
pub mod crm;
pub mod narrator;

pub mod aggregate;
pub mod alerts;
pub mod dispatch;
pub mod render;
