// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Threshold sweep, ROC curve and optimal-threshold selection
//!
//! A sweep only moves the classification boundary over scores that were
//! already computed; nothing here calls a scorer.

use crate::datasets::Label;
use crate::error::{ensure_same_len, EvalError, Result};
use crate::metrics::ConfusionMatrix;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Metrics at one integer threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdAnalysis {
    pub threshold: u32,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    pub true_negatives: usize,
    /// False positive rate
    pub fpr: f64,
    /// True positive rate (recall)
    pub tpr: f64,
}

impl ThresholdAnalysis {
    pub fn from_confusion_matrix(threshold: u32, cm: &ConfusionMatrix) -> Self {
        Self {
            threshold,
            accuracy: cm.accuracy(),
            precision: cm.precision(),
            recall: cm.recall(),
            f1_score: cm.f1_score(),
            true_positives: cm.tp,
            false_positives: cm.fp,
            false_negatives: cm.fn_,
            true_negatives: cm.tn,
            fpr: cm.false_positive_rate(),
            tpr: cm.recall(),
        }
    }

    /// Youden's J statistic: TPR - FPR
    pub fn youden_j(&self) -> f64 {
        self.tpr - self.fpr
    }

    /// Weighted error cost
    pub fn cost(&self, fn_cost: f64, fp_cost: f64) -> f64 {
        self.false_negatives as f64 * fn_cost + self.false_positives as f64 * fp_cost
    }
}

/// Analyze an arbitrary list of thresholds over precomputed scores
pub fn analyze_thresholds(
    scores: &[u32],
    labels: &[Label],
    thresholds: &[u32],
) -> Result<Vec<ThresholdAnalysis>> {
    ensure_same_len(scores.len(), labels.len())?;
    thresholds
        .iter()
        .map(|&threshold| {
            let cm = ConfusionMatrix::from_scores(scores, labels, threshold)?;
            tracing::debug!(threshold, tp = cm.tp, fp = cm.fp, "threshold analyzed");
            Ok(ThresholdAnalysis::from_confusion_matrix(threshold, &cm))
        })
        .collect()
}

/// Analyze every integer threshold in `[min_threshold, max_threshold]`
pub fn threshold_sweep(
    scores: &[u32],
    labels: &[Label],
    min_threshold: u32,
    max_threshold: u32,
) -> Result<Vec<ThresholdAnalysis>> {
    if min_threshold > max_threshold {
        return Err(EvalError::InvalidThresholdRange {
            min: min_threshold,
            max: max_threshold,
        });
    }
    let thresholds: Vec<u32> = (min_threshold..=max_threshold).collect();
    analyze_thresholds(scores, labels, &thresholds)
}

/// ROC curve over every distinct score value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RocCurve {
    pub fpr: Vec<f64>,
    pub tpr: Vec<f64>,
    /// Score cut-off for each point; the first point lies above the highest score
    pub thresholds: Vec<u32>,
    /// Area under the curve; `None` unless both classes are present
    pub auc: Option<f64>,
}

impl RocCurve {
    pub fn compute(scores: &[u32], labels: &[Label]) -> Result<Self> {
        ensure_same_len(scores.len(), labels.len())?;

        let n_pos = labels.iter().filter(|l| l.is_manipulative()).count();
        let n_neg = labels.len() - n_pos;

        let mut distinct: Vec<u32> = scores.to_vec();
        distinct.sort_unstable_by(|a, b| b.cmp(a));
        distinct.dedup();

        let mut curve = RocCurve {
            fpr: vec![0.0],
            tpr: vec![0.0],
            thresholds: vec![distinct.first().map_or(1, |max| max + 1)],
            auc: None,
        };

        for cutoff in distinct {
            let cm = ConfusionMatrix::from_scores(scores, labels, cutoff)?;
            curve.fpr.push(cm.false_positive_rate());
            curve.tpr.push(cm.recall());
            curve.thresholds.push(cutoff);
        }

        if n_pos > 0 && n_neg > 0 {
            curve.auc = Some(trapezoid_area(&curve.fpr, &curve.tpr));
        }

        Ok(curve)
    }
}

/// Trapezoidal-rule area under a curve given by parallel x/y points
pub fn trapezoid_area(x: &[f64], y: &[f64]) -> f64 {
    x.windows(2)
        .zip(y.windows(2))
        .map(|(xs, ys)| (xs[1] - xs[0]) * (ys[1] + ys[0]) / 2.0)
        .sum()
}

/// Objective used to pick an operating threshold
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Objective {
    /// Maximize F1
    F1,
    /// Maximize accuracy
    Accuracy,
    /// Maximize TPR - FPR
    Youden,
    /// Minimize `fn_count * fn_cost + fp_count * fp_cost`
    Cost { fn_cost: f64, fp_cost: f64 },
}

impl Objective {
    /// All objectives, with the given cost weights for `Cost`
    pub fn all(fn_cost: f64, fp_cost: f64) -> [Objective; 4] {
        [
            Objective::F1,
            Objective::Accuracy,
            Objective::Youden,
            Objective::Cost { fn_cost, fp_cost },
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Objective::F1 => "f1",
            Objective::Accuracy => "accuracy",
            Objective::Youden => "youden",
            Objective::Cost { .. } => "cost",
        }
    }

    /// Value to maximize for this objective
    fn value(&self, analysis: &ThresholdAnalysis) -> f64 {
        match self {
            Objective::F1 => analysis.f1_score,
            Objective::Accuracy => analysis.accuracy,
            Objective::Youden => analysis.youden_j(),
            Objective::Cost { fn_cost, fp_cost } => -analysis.cost(*fn_cost, *fp_cost),
        }
    }
}

impl fmt::Display for Objective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Objective {
    type Err = String;

    /// Parses the objective name; `cost` gets unit weights
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "f1" => Ok(Objective::F1),
            "accuracy" => Ok(Objective::Accuracy),
            "youden" => Ok(Objective::Youden),
            "cost" => Ok(Objective::Cost {
                fn_cost: 1.0,
                fp_cost: 1.0,
            }),
            other => Err(format!(
                "Unknown optimization target '{}' (expected f1, accuracy, youden or cost)",
                other
            )),
        }
    }
}

/// Best analysis under `objective`; ties go to the lowest threshold
pub fn find_optimal_threshold(
    analyses: &[ThresholdAnalysis],
    objective: Objective,
) -> Option<&ThresholdAnalysis> {
    analyses.iter().fold(None, |best: Option<&ThresholdAnalysis>, candidate| match best {
        None => Some(candidate),
        Some(current) => {
            let (c, b) = (objective.value(candidate), objective.value(current));
            if c > b || (c == b && candidate.threshold < current.threshold) {
                Some(candidate)
            } else {
                Some(current)
            }
        }
    })
}

/// Optimal threshold chosen under one objective
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimalThreshold {
    pub objective: Objective,
    pub threshold: u32,
    pub analysis: ThresholdAnalysis,
}

/// Optimal thresholds under every objective
pub fn optimal_thresholds(
    analyses: &[ThresholdAnalysis],
    fn_cost: f64,
    fp_cost: f64,
) -> Vec<OptimalThreshold> {
    Objective::all(fn_cost, fp_cost)
        .into_iter()
        .filter_map(|objective| {
            find_optimal_threshold(analyses, objective).map(|best| OptimalThreshold {
                objective,
                threshold: best.threshold,
                analysis: best.clone(),
            })
        })
        .collect()
}

/// Full sweep result: per-threshold curve plus continuous ROC
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSweep {
    pub analyses: Vec<ThresholdAnalysis>,
    pub roc: RocCurve,
}

impl ThresholdSweep {
    pub fn compute(
        scores: &[u32],
        labels: &[Label],
        min_threshold: u32,
        max_threshold: u32,
    ) -> Result<Self> {
        Ok(Self {
            analyses: threshold_sweep(scores, labels, min_threshold, max_threshold)?,
            roc: RocCurve::compute(scores, labels)?,
        })
    }

    pub fn optimal(&self, objective: Objective) -> Option<&ThresholdAnalysis> {
        find_optimal_threshold(&self.analyses, objective)
    }

    /// Write one CSV row per threshold, for external plotting
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = csv::Writer::from_path(path)?;
        for analysis in &self.analyses {
            writer.serialize(analysis)?;
        }
        writer.flush()?;
        tracing::info!("Threshold sweep written to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const M: Label = Label::Manipulative;
    const C: Label = Label::Credible;

    fn fixture() -> (Vec<u32>, Vec<Label>) {
        (vec![18, 15, 9, 7, 5, 4, 2, 0], vec![M, M, M, C, M, C, C, C])
    }

    #[test]
    fn test_sweep_covers_range() {
        let (scores, labels) = fixture();
        let sweep = threshold_sweep(&scores, &labels, 0, 20).unwrap();
        assert_eq!(sweep.len(), 21);
        assert_eq!(sweep[0].threshold, 0);
        assert_eq!(sweep[20].threshold, 20);

        // Everything is flagged at 0, nothing at 20
        assert_eq!(sweep[0].true_positives, 4);
        assert_eq!(sweep[0].false_positives, 4);
        assert_eq!(sweep[20].true_positives, 0);
        assert_eq!(sweep[20].false_negatives, 4);
    }

    #[test]
    fn test_sweep_matches_single_threshold_metrics() {
        let (scores, labels) = fixture();
        let sweep = threshold_sweep(&scores, &labels, 6, 6).unwrap();
        let single = crate::metrics::binary_classification_metrics(&scores, &labels, 6).unwrap();
        assert_eq!(sweep[0].f1_score, single.f1);
        assert_eq!(sweep[0].accuracy, single.accuracy);
    }

    #[test]
    fn test_invalid_range() {
        let (scores, labels) = fixture();
        assert!(matches!(
            threshold_sweep(&scores, &labels, 10, 3),
            Err(EvalError::InvalidThresholdRange { min: 10, max: 3 })
        ));
    }

    #[test]
    fn test_roc_auc() {
        let perfect = RocCurve::compute(&[18, 15, 2, 4], &[M, M, C, C]).unwrap();
        assert_eq!(perfect.auc, Some(1.0));
        assert_eq!(perfect.thresholds[0], 19);
        assert_eq!(perfect.fpr.last(), Some(&1.0));
        assert_eq!(perfect.tpr.last(), Some(&1.0));

        // One inverted pair out of 16 -> AUC 15/16
        let (scores, labels) = fixture();
        let roc = RocCurve::compute(&scores, &labels).unwrap();
        assert!((roc.auc.unwrap() - 15.0 / 16.0).abs() < 1e-9);
    }

    #[test]
    fn test_roc_ties_produce_diagonal_segment() {
        let roc = RocCurve::compute(&[5, 5], &[M, C]).unwrap();
        assert_eq!(roc.fpr, vec![0.0, 1.0]);
        assert_eq!(roc.tpr, vec![0.0, 1.0]);
        assert_eq!(roc.auc, Some(0.5));
    }

    #[test]
    fn test_roc_single_class_has_no_auc() {
        let roc = RocCurve::compute(&[3, 9], &[M, M]).unwrap();
        assert_eq!(roc.auc, None);
    }

    #[test]
    fn test_optimal_threshold_objectives() {
        let (scores, labels) = fixture();
        let sweep = threshold_sweep(&scores, &labels, 0, 20).unwrap();

        let f1 = find_optimal_threshold(&sweep, Objective::F1).unwrap();
        assert_eq!(f1.threshold, 5);
        assert_eq!(f1.false_negatives, 0);

        let accuracy = find_optimal_threshold(&sweep, Objective::Accuracy).unwrap();
        // Thresholds 5 and 8 both make one error; the lower one wins
        assert_eq!(accuracy.threshold, 5);

        let youden = find_optimal_threshold(&sweep, Objective::Youden).unwrap();
        assert_eq!(youden.threshold, 5);

        // Expensive false positives push the threshold up past the credible 7
        let cost = find_optimal_threshold(
            &sweep,
            Objective::Cost {
                fn_cost: 1.0,
                fp_cost: 5.0,
            },
        )
        .unwrap();
        assert_eq!(cost.threshold, 8);
    }

    #[test]
    fn test_ties_break_to_lowest_threshold_regardless_of_order() {
        let (scores, labels) = fixture();
        let mut sweep = threshold_sweep(&scores, &labels, 0, 20).unwrap();
        sweep.reverse();
        // Thresholds 19 and 20 tie with F1 = 0, as do many others; the best is unique
        assert_eq!(find_optimal_threshold(&sweep, Objective::F1).unwrap().threshold, 5);

        let flat = threshold_sweep(&[0, 0], &[M, C], 1, 20).unwrap();
        assert_eq!(find_optimal_threshold(&flat, Objective::Accuracy).unwrap().threshold, 1);
    }

    #[test]
    fn test_empty_sweep_has_no_optimum() {
        assert!(find_optimal_threshold(&[], Objective::F1).is_none());
    }

    #[test]
    fn test_objective_parsing() {
        assert_eq!("F1".parse::<Objective>().unwrap(), Objective::F1);
        assert_eq!("youden".parse::<Objective>().unwrap(), Objective::Youden);
        assert!(matches!("cost".parse::<Objective>().unwrap(), Objective::Cost { .. }));
        assert!("precision".parse::<Objective>().is_err());
    }

    #[test]
    fn test_optimal_thresholds_for_every_objective() {
        let (scores, labels) = fixture();
        let sweep = ThresholdSweep::compute(&scores, &labels, 0, 20).unwrap();
        let optima = optimal_thresholds(&sweep.analyses, 1.0, 1.0);
        let names: Vec<&str> = optima.iter().map(|o| o.objective.name()).collect();
        assert_eq!(names, vec!["f1", "accuracy", "youden", "cost"]);
    }

    #[test]
    fn test_write_csv() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("sweep.csv");
        let (scores, labels) = fixture();
        let sweep = ThresholdSweep::compute(&scores, &labels, 0, 3).unwrap();
        sweep.write_csv(&path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[0].starts_with("threshold,accuracy,precision,recall,f1_score"));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn labelled_scores() -> impl Strategy<Value = Vec<(u32, bool)>> {
        prop::collection::vec((0u32..=20, any::<bool>()), 0..60)
    }

    proptest! {
        #[test]
        fn recall_never_increases_with_threshold(data in labelled_scores()) {
            let scores: Vec<u32> = data.iter().map(|(s, _)| *s).collect();
            let labels: Vec<Label> = data
                .iter()
                .map(|(_, m)| if *m { Label::Manipulative } else { Label::Credible })
                .collect();

            let sweep = threshold_sweep(&scores, &labels, 0, 20).unwrap();
            for pair in sweep.windows(2) {
                prop_assert!(pair[0].recall >= pair[1].recall);
                prop_assert!(pair[0].fpr >= pair[1].fpr);
            }
        }

        #[test]
        fn auc_stays_in_unit_interval(data in labelled_scores()) {
            let scores: Vec<u32> = data.iter().map(|(s, _)| *s).collect();
            let labels: Vec<Label> = data
                .iter()
                .map(|(_, m)| if *m { Label::Manipulative } else { Label::Credible })
                .collect();

            if let Some(auc) = RocCurve::compute(&scores, &labels).unwrap().auc {
                prop_assert!((-1e-9..=1.0 + 1e-9).contains(&auc));
            }
        }
    }
}
