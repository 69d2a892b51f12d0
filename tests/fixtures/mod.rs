//! Builders for requests and worker notifications used across test suites
#![allow(dead_code)]

use classify_jobs::models::api::SubmitJobRequest;
use classify_jobs::models::job::JobType;
use classify_jobs::models::result::{ItemResult, Prediction};

/// Item references shaped like the uploads the API receives in practice
pub const SAMPLE_ITEMS: &[&str] = &[
    "uploads/cat_001_20250101-120000_a1b2c3d4.jpg",
    "uploads/dog_002_20250101-120001_e5f6a7b8.jpg",
    "uploads/bird_003_20250101-120002_c9d0e1f2.png",
];

pub fn image_request(items: &[&str]) -> SubmitJobRequest {
    SubmitJobRequest {
        job_type: JobType::ImageClassification,
        item_references: items.iter().map(|s| s.to_string()).collect(),
        custom_labels: None,
        top_k: None,
        confidence_threshold: None,
    }
}

pub fn custom_request(items: &[&str], labels: &[&str]) -> SubmitJobRequest {
    SubmitJobRequest {
        job_type: JobType::CustomClassification,
        item_references: items.iter().map(|s| s.to_string()).collect(),
        custom_labels: Some(labels.iter().map(|s| s.to_string()).collect()),
        top_k: Some(3),
        confidence_threshold: Some(0.4),
    }
}

/// A worker result for `reference` whose display name is the reference itself
pub fn item(reference: &str, label: &str) -> ItemResult {
    item_with_time(reference, label, 25.0)
}

pub fn item_with_time(reference: &str, label: &str, processing_time_ms: f64) -> ItemResult {
    let ranked_predictions = if label.is_empty() {
        Vec::new()
    } else {
        vec![
            Prediction {
                label: label.to_string(),
                score: 0.91,
            },
            Prediction {
                label: "other".to_string(),
                score: 0.04,
            },
        ]
    };

    ItemResult {
        item_reference: reference.to_string(),
        display_name: reference.to_string(),
        top_label: label.to_string(),
        top_confidence: if label.is_empty() { 0.0 } else { 0.91 },
        ranked_predictions,
        processing_time_ms,
        reason: label
            .is_empty()
            .then(|| "below confidence threshold".to_string()),
    }
}
