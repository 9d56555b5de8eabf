//! Owner map: numeric CRM owner id → Slack member id.
//!
//! Loaded once per run from a flat `key: value` file. Lines starting with `#`
//! and inline `#` comments are ignored. A missing file is not an error — it
//! just means no owner gets a mention.

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, warn};

/// Read-only owner id → Slack member id mapping.
#[derive(Debug, Clone, Default)]
pub struct OwnerMap {
    entries: HashMap<String, String>,
}

impl OwnerMap {
    /// Load the map from a flat-file path. Missing file ⇒ empty map.
    pub fn load(path: &Path) -> Self {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "owner map file not found, using empty map");
                return Self::default();
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read owner map, using empty map");
                return Self::default();
            }
        };
        Self::parse(&contents)
    }

    /// Parse flat `key: value` lines, skipping comments and malformed lines.
    pub fn parse(contents: &str) -> Self {
        let mut entries = HashMap::new();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, rest)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim();
            let value = rest.split('#').next().unwrap_or_default().trim();
            if !key.is_empty() && !value.is_empty() {
                entries.insert(key.to_string(), value.to_string());
            }
        }
        Self { entries }
    }

    /// Number of mapped owners.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no owners are mapped.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The Slack member id for a CRM owner id, if mapped.
    pub fn slack_id(&self, owner_id: &str) -> Option<&str> {
        self.entries.get(owner_id).map(String::as_str)
    }

    /// Format an owner label for message bodies.
    ///
    /// Mapped owner ⇒ a Slack mention; unmapped ⇒ the bare id for manual
    /// lookup; no owner at all ⇒ "unassigned".
    pub fn label(&self, owner_id: Option<i64>) -> String {
        let Some(id) = owner_id else {
            return "unassigned".to_string();
        };
        match self.slack_id(&id.to_string()) {
            Some(slack_id) => format!("<@{slack_id}>"),
            None => format!("owner_id {id}"),
        }
    }
}
