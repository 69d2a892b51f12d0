use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use crate::models::job::JobType;

/// Bucket used in `grouped_by_label` and output paths for items without a
/// top prediction.
pub const UNKNOWN_LABEL: &str = "unknown";

/// A single label/score pair produced by a worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Prediction {
    pub label: String,
    pub score: f64,
}

/// One item's classification outcome as reported by a worker.
///
/// Field aliases accept the worker's original wire names.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemResult {
    #[serde(alias = "s3_key")]
    pub item_reference: String,
    #[serde(alias = "filename", default)]
    pub display_name: String,
    /// Empty means the item stayed unclassified.
    #[serde(alias = "top_prediction", default)]
    pub top_label: String,
    #[serde(default)]
    pub top_confidence: f64,
    #[serde(alias = "all_predictions", default)]
    pub ranked_predictions: Vec<Prediction>,
    #[serde(default)]
    pub processing_time_ms: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ItemResult {
    pub fn is_classified(&self) -> bool {
        !self.top_label.is_empty()
    }

    /// Label bucket this item is indexed under.
    pub fn label_bucket(&self) -> &str {
        if self.is_classified() {
            &self.top_label
        } else {
            UNKNOWN_LABEL
        }
    }

    /// Fill in a missing display name from the last path segment of the
    /// item reference.
    fn normalize(mut self) -> Self {
        if self.display_name.is_empty() {
            self.display_name = self
                .item_reference
                .rsplit('/')
                .next()
                .unwrap_or(&self.item_reference)
                .to_string();
        }
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResultSummary {
    pub total: usize,
    pub classified: usize,
    pub unknown: usize,
}

/// Accumulated outcome of a job, built incrementally as status messages
/// arrive. Every collection is keyed or ordered independently of arrival
/// order, so the same set of items always produces the same value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AggregatedResult {
    pub job_id: Uuid,
    pub job_type: JobType,
    pub total_items_completed: usize,
    pub per_item_results: BTreeMap<String, ItemResult>,
    pub grouped_by_label: BTreeMap<String, BTreeSet<String>>,
    pub summary: ResultSummary,
    #[serde(default)]
    pub output_locations: BTreeMap<String, String>,
    pub aggregate_processing_time_ms: f64,
}

impl AggregatedResult {
    pub fn new(job_id: Uuid, job_type: JobType) -> Self {
        Self {
            job_id,
            job_type,
            total_items_completed: 0,
            per_item_results: BTreeMap::new(),
            grouped_by_label: BTreeMap::new(),
            summary: ResultSummary::default(),
            output_locations: BTreeMap::new(),
            aggregate_processing_time_ms: 0.0,
        }
    }

    pub fn contains(&self, item_reference: &str) -> bool {
        self.per_item_results.contains_key(item_reference)
    }

    /// Merge one item. Returns the stored item when it was new, `None` for a
    /// redelivered duplicate.
    pub fn merge(&mut self, item: ItemResult) -> Option<ItemResult> {
        if self.contains(&item.item_reference) {
            return None;
        }

        let item = item.normalize();
        self.grouped_by_label
            .entry(item.label_bucket().to_string())
            .or_default()
            .insert(item.display_name.clone());

        self.total_items_completed += 1;
        self.summary.total += 1;
        if item.is_classified() {
            self.summary.classified += 1;
        } else {
            self.summary.unknown += 1;
        }

        self.per_item_results
            .insert(item.item_reference.clone(), item.clone());

        // Summed in key order so the total does not depend on arrival order.
        self.aggregate_processing_time_ms = self
            .per_item_results
            .values()
            .map(|r| r.processing_time_ms)
            .sum();

        Some(item)
    }

    pub fn record_output(&mut self, item_reference: &str, location: String) {
        self.output_locations
            .insert(item_reference.to_string(), location);
    }
}
