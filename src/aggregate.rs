//! Stage aggregation: group deals by pipeline stage, deduplicated by title.
//!
//! The business key is the deal title (the company name). Titles are trimmed,
//! empty titles dropped, and duplicates collapsed — a company with two
//! simultaneous deals in one stage appears once. Stages with zero deals keep
//! an entry with an empty set so reports show the full pipeline rather than
//! silently hiding a stage.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use crate::crm::{Deal, Stage};

/// One stage's aggregate: display name and the distinct companies in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageEntry {
    /// Stage display name.
    pub stage: String,
    /// Distinct, trimmed, non-empty company titles.
    pub companies: BTreeSet<String>,
}

/// Ordered per-stage aggregation of the pipeline.
///
/// Order is ascending stage position as served by the pipeline definition;
/// it is preserved through rendering and threaded delivery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageMap {
    /// Entries in pipeline order.
    pub entries: Vec<StageEntry>,
}

impl StageMap {
    /// Total number of distinct companies across all stages.
    pub fn total_companies(&self) -> usize {
        self.entries
            .iter()
            .fold(0usize, |acc, e| acc.saturating_add(e.companies.len()))
    }

    /// True when no stage holds any deal.
    pub fn has_no_deals(&self) -> bool {
        self.entries.iter().all(|e| e.companies.is_empty())
    }
}

/// Aggregate per-stage deals into a [`StageMap`].
///
/// `stages` must already be in pipeline order; `deals_by_stage` maps stage id
/// to that stage's open deals (an absent key reads as "no data for this
/// stage", the degraded fetch result).
pub fn aggregate(stages: &[Stage], deals_by_stage: &HashMap<i64, Vec<Deal>>) -> StageMap {
    let mut entries = Vec::with_capacity(stages.len());

    for stage in stages {
        let mut companies = BTreeSet::new();
        for deal in deals_by_stage.get(&stage.id).map_or(&[][..], Vec::as_slice) {
            let title = deal.title.trim();
            if title.is_empty() {
                debug!(deal_id = deal.id, "deal has an empty title, dropped from aggregate");
                continue;
            }
            companies.insert(title.to_string());
        }
        debug!(stage = %stage.name, companies = companies.len(), "stage aggregated");
        entries.push(StageEntry {
            stage: stage.name.clone(),
            companies,
        });
    }

    StageMap { entries }
}
