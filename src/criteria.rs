// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Per-criterion diagnostics
//!
//! Each criterion is scored on its own as a binary predictor of the
//! manipulative label, independent of the aggregate threshold.

use crate::metrics::{ratio, ConfusionMatrix};
use crate::records::{scored_records, ScoredRecord};
use serde::{Deserialize, Serialize};

/// Performance of a single criterion as a predictor of manipulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionMetrics {
    pub criterion: String,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    pub true_negatives: usize,
    /// Number of manipulative sources, the same for every criterion
    pub support: usize,
    /// Fraction of sources where the criterion matched
    pub prevalence: f64,
}

/// Metrics for every criterion, sorted by descending F1.
///
/// The sort is stable, so criteria with equal F1 keep the order of `criteria`.
/// Error records are ignored.
pub fn criterion_level_metrics(
    records: &[ScoredRecord],
    criteria: &[String],
) -> Vec<CriterionMetrics> {
    let mut metrics: Vec<CriterionMetrics> = criteria
        .iter()
        .map(|criterion| {
            let cm = ConfusionMatrix::from_outcomes(scored_records(records).map(|r| {
                (r.is_matched(criterion), r.ground_truth_label.is_manipulative())
            }));

            CriterionMetrics {
                criterion: criterion.clone(),
                precision: cm.precision(),
                recall: cm.recall(),
                f1_score: cm.f1_score(),
                true_positives: cm.tp,
                false_positives: cm.fp,
                false_negatives: cm.fn_,
                true_negatives: cm.tn,
                support: cm.tp + cm.fn_,
                prevalence: ratio(cm.tp + cm.fp, cm.total()),
            }
        })
        .collect();

    metrics.sort_by(|a, b| {
        b.f1_score
            .partial_cmp(&a.f1_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    metrics
}
