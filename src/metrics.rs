// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Aggregate-score metrics
//!
//! Implements:
//! - Confusion matrix under the `score >= threshold` rule
//! - Accuracy, Precision, Recall, F1
//! - Calibration (Brier score, ECE, MCE)
//! - Score distribution per class
//! - Risk-level cross-tabulation
//!
//! Zero denominators resolve to 0.0; empty inputs never fail.

use crate::config::RiskLevel;
use crate::datasets::Label;
use crate::error::{ensure_same_len, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Confusion matrix for manipulative-vs-credible classification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    /// True Positives (manipulative flagged as manipulative)
    pub tp: usize,
    /// True Negatives (credible passed as credible)
    pub tn: usize,
    /// False Positives (credible flagged as manipulative)
    pub fp: usize,
    /// False Negatives (manipulative passed as credible)
    pub fn_: usize,
}

impl ConfusionMatrix {
    /// Build from `(predicted_positive, actually_positive)` outcomes
    pub fn from_outcomes<I>(outcomes: I) -> Self
    where
        I: IntoIterator<Item = (bool, bool)>,
    {
        let mut matrix = Self::default();
        for (predicted, actual) in outcomes {
            match (predicted, actual) {
                (true, true) => matrix.tp += 1,
                (false, false) => matrix.tn += 1,
                (true, false) => matrix.fp += 1,
                (false, true) => matrix.fn_ += 1,
            }
        }
        matrix
    }

    /// Classify every score with `score >= threshold` and tally against labels
    pub fn from_scores(scores: &[u32], labels: &[Label], threshold: u32) -> Result<Self> {
        ensure_same_len(scores.len(), labels.len())?;
        Ok(Self::from_outcomes(
            scores
                .iter()
                .zip(labels.iter())
                .map(|(score, label)| (*score >= threshold, label.is_manipulative())),
        ))
    }

    /// Total number of samples
    pub fn total(&self) -> usize {
        self.tp + self.tn + self.fp + self.fn_
    }

    /// Accuracy: (TP + TN) / Total
    pub fn accuracy(&self) -> f64 {
        ratio(self.tp + self.tn, self.total())
    }

    /// Precision: TP / (TP + FP)
    pub fn precision(&self) -> f64 {
        ratio(self.tp, self.tp + self.fp)
    }

    /// Recall (true positive rate): TP / (TP + FN)
    pub fn recall(&self) -> f64 {
        ratio(self.tp, self.tp + self.fn_)
    }

    /// False positive rate: FP / (FP + TN)
    pub fn false_positive_rate(&self) -> f64 {
        ratio(self.fp, self.fp + self.tn)
    }

    /// F1 Score: 2 * (Precision * Recall) / (Precision + Recall)
    pub fn f1_score(&self) -> f64 {
        let precision = self.precision();
        let recall = self.recall();
        let denom = precision + recall;
        if denom == 0.0 {
            return 0.0;
        }
        2.0 * precision * recall / denom
    }
}

pub(crate) fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    numerator as f64 / denominator as f64
}

/// Classification metrics at one threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub accuracy: f64,
    pub true_positives: usize,
    pub true_negatives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    pub threshold: u32,
}

impl ClassificationMetrics {
    pub fn from_confusion_matrix(cm: ConfusionMatrix, threshold: u32) -> Self {
        Self {
            precision: cm.precision(),
            recall: cm.recall(),
            f1: cm.f1_score(),
            accuracy: cm.accuracy(),
            true_positives: cm.tp,
            true_negatives: cm.tn,
            false_positives: cm.fp,
            false_negatives: cm.fn_,
            threshold,
        }
    }

    pub fn confusion_matrix(&self) -> ConfusionMatrix {
        ConfusionMatrix {
            tp: self.true_positives,
            tn: self.true_negatives,
            fp: self.false_positives,
            fn_: self.false_negatives,
        }
    }

    /// Format as a human-readable string
    pub fn format(&self) -> String {
        format!(
            r#"Classification Report (threshold = {})
=====================
Accuracy:          {:.4} ({:.2}%)
Precision:         {:.4}
Recall:            {:.4}
F1 Score:          {:.4}

Confusion Matrix:
                     Predicted
                     Manipulative   Credible
Actual Manipulative  {:>12}   {:>8}
       Credible      {:>12}   {:>8}
"#,
            self.threshold,
            self.accuracy,
            self.accuracy * 100.0,
            self.precision,
            self.recall,
            self.f1,
            self.true_positives,
            self.false_negatives,
            self.false_positives,
            self.true_negatives,
        )
    }
}

/// Binary classification metrics: predict manipulative iff `score >= threshold`
pub fn binary_classification_metrics(
    predicted_scores: &[u32],
    ground_truth_labels: &[Label],
    threshold: u32,
) -> Result<ClassificationMetrics> {
    let cm = ConfusionMatrix::from_scores(predicted_scores, ground_truth_labels, threshold)?;
    Ok(ClassificationMetrics::from_confusion_matrix(cm, threshold))
}

/// Calibration summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationMetrics {
    pub brier_score: f64,
    pub expected_calibration_error: f64,
    pub max_calibration_error: f64,
}

/// One populated calibration bin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationBin {
    /// Bin range, e.g. "0.20-0.40"
    pub bin: String,
    /// Mean normalized score in the bin
    pub confidence: f64,
    /// Fraction of manipulative sources in the bin
    pub actual: f64,
    pub samples: usize,
    /// samples / total
    pub weight: f64,
}

/// Per-bin detail backing the calibration metrics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationData {
    pub bin_data: Vec<CalibrationBin>,
    pub normalized_scores: Vec<f64>,
    pub binary_labels: Vec<u8>,
}

/// Calibration of normalized scores (`score / max_score`) against labels
pub fn calibration_metrics(
    predicted_scores: &[u32],
    ground_truth_labels: &[Label],
    max_score: u32,
    num_bins: usize,
) -> Result<(CalibrationMetrics, CalibrationData)> {
    ensure_same_len(predicted_scores.len(), ground_truth_labels.len())?;

    let scale = max_score.max(1) as f64;
    let normalized_scores: Vec<f64> = predicted_scores.iter().map(|s| *s as f64 / scale).collect();
    let binary_labels: Vec<u8> = ground_truth_labels.iter().map(Label::to_binary).collect();

    let brier_score = brier_score(&normalized_scores, &binary_labels);
    let (ece, bin_data) = expected_calibration_error(&normalized_scores, &binary_labels, num_bins);
    let mce = bin_data
        .iter()
        .map(|b| (b.confidence - b.actual).abs())
        .fold(0.0, f64::max);

    Ok((
        CalibrationMetrics {
            brier_score,
            expected_calibration_error: ece,
            max_calibration_error: mce,
        },
        CalibrationData {
            bin_data,
            normalized_scores,
            binary_labels,
        },
    ))
}

/// Mean squared error between probabilities and binary outcomes (lower is better)
pub fn brier_score(probabilities: &[f64], labels: &[u8]) -> f64 {
    if probabilities.is_empty() {
        return 0.0;
    }
    let sum: f64 = probabilities
        .iter()
        .zip(labels.iter())
        .map(|(p, y)| (p - *y as f64).powi(2))
        .sum();
    sum / probabilities.len() as f64
}

/// Expected Calibration Error over `num_bins` equal-width bins on `[0, 1]`.
///
/// Bins are `[lo, hi)` except the last, which also holds 1.0. Empty bins are
/// skipped, so they neither add error nor appear in the bin data.
pub fn expected_calibration_error(
    probabilities: &[f64],
    labels: &[u8],
    num_bins: usize,
) -> (f64, Vec<CalibrationBin>) {
    let num_bins = num_bins.max(1);
    let total = probabilities.len();
    if total == 0 {
        return (0.0, Vec::new());
    }

    // (count, sum of probabilities, sum of labels)
    let mut bins = vec![(0usize, 0.0f64, 0.0f64); num_bins];
    for (p, y) in probabilities.iter().zip(labels.iter()) {
        let idx = ((p.clamp(0.0, 1.0) * num_bins as f64 + 1e-9).floor() as usize).min(num_bins - 1);
        bins[idx].0 += 1;
        bins[idx].1 += p;
        bins[idx].2 += *y as f64;
    }

    let mut ece = 0.0;
    let mut bin_data = Vec::new();
    for (i, (count, prob_sum, label_sum)) in bins.into_iter().enumerate() {
        if count == 0 {
            continue;
        }
        let confidence = prob_sum / count as f64;
        let actual = label_sum / count as f64;
        let weight = count as f64 / total as f64;
        ece += weight * (confidence - actual).abs();
        bin_data.push(CalibrationBin {
            bin: format!(
                "{:.2}-{:.2}",
                i as f64 / num_bins as f64,
                (i + 1) as f64 / num_bins as f64
            ),
            confidence,
            actual,
            samples: count,
            weight,
        });
    }

    (ece, bin_data)
}

/// Summary statistics of a set of scores; all `None` when empty
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DistributionStats {
    pub mean: Option<f64>,
    pub median: Option<f64>,
    /// Population standard deviation
    pub std: Option<f64>,
    pub min: Option<u32>,
    pub max: Option<u32>,
    pub count: usize,
}

impl DistributionStats {
    pub fn from_scores(scores: &[u32]) -> Self {
        if scores.is_empty() {
            return Self::default();
        }

        let n = scores.len() as f64;
        let mean = scores.iter().map(|s| *s as f64).sum::<f64>() / n;
        let variance = scores.iter().map(|s| (*s as f64 - mean).powi(2)).sum::<f64>() / n;

        let mut sorted = scores.to_vec();
        sorted.sort_unstable();
        let mid = sorted.len() / 2;
        let median = if sorted.len() % 2 == 0 {
            (sorted[mid - 1] as f64 + sorted[mid] as f64) / 2.0
        } else {
            sorted[mid] as f64
        };

        Self {
            mean: Some(mean),
            median: Some(median),
            std: Some(variance.sqrt()),
            min: sorted.first().copied(),
            max: sorted.last().copied(),
            count: scores.len(),
        }
    }
}

/// Score distribution per ground-truth class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreDistribution {
    pub manipulative: DistributionStats,
    pub credible: DistributionStats,
    pub overall: DistributionStats,
}

impl ScoreDistribution {
    pub fn compute(predicted_scores: &[u32], ground_truth_labels: &[Label]) -> Result<Self> {
        ensure_same_len(predicted_scores.len(), ground_truth_labels.len())?;

        let by_label = |wanted: Label| -> Vec<u32> {
            predicted_scores
                .iter()
                .zip(ground_truth_labels.iter())
                .filter(|(_, label)| **label == wanted)
                .map(|(score, _)| *score)
                .collect()
        };

        Ok(Self {
            manipulative: DistributionStats::from_scores(&by_label(Label::Manipulative)),
            credible: DistributionStats::from_scores(&by_label(Label::Credible)),
            overall: DistributionStats::from_scores(predicted_scores),
        })
    }
}

/// Risk level per score and its cross-tabulation against ground truth
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAnalysis {
    pub risk_levels: Vec<RiskLevel>,
    /// "<LEVEL>_vs_<label>" -> count
    pub cross_tabulation: BTreeMap<String, usize>,
}

impl RiskAnalysis {
    pub fn compute(predicted_scores: &[u32], ground_truth_labels: &[Label]) -> Result<Self> {
        ensure_same_len(predicted_scores.len(), ground_truth_labels.len())?;

        let risk_levels: Vec<RiskLevel> = predicted_scores
            .iter()
            .map(|s| RiskLevel::from_score(*s))
            .collect();
        let mut cross_tabulation = BTreeMap::new();
        for (level, label) in risk_levels.iter().zip(ground_truth_labels.iter()) {
            *cross_tabulation.entry(format!("{}_vs_{}", level, label)).or_insert(0) += 1;
        }

        Ok(Self {
            risk_levels,
            cross_tabulation,
        })
    }
}
