// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Evaluation orchestrator
//!
//! Drives a dataset through a [`CriteriaScorer`] and assembles:
//! - Classification metrics at the configured threshold
//! - Calibration metrics and per-bin data
//! - Per-criterion metrics
//! - Score distribution and risk-level cross-tabulation
//! - Threshold comparison, correlation and error analysis over scored records
//! - Multi-run stability tests
//!
//! Scoring is the only expensive step. It runs on a bounded rayon pool and
//! happens at most once per source per pass; every analysis after it works on
//! the scored records.

use crate::config::EvaluationConfig;
use crate::correlation::{CorrelationAnalysis, CorrelationAnalyzer};
use crate::criteria::{criterion_level_metrics, CriterionMetrics};
use crate::datasets::{Dataset, Label, SourceEntry};
use crate::error::{EvalError, Result};
use crate::error_analysis::{ErrorAnalysis, ErrorAnalyzer};
use crate::metrics::{
    binary_classification_metrics, calibration_metrics, CalibrationData, CalibrationMetrics,
    ClassificationMetrics, ConfusionMatrix, RiskAnalysis, ScoreDistribution,
};
use crate::records::{scored_records, scores_and_labels, validate_records, ScoredRecord};
use crate::scorer::CriteriaScorer;
use crate::stability::{StabilityAnalyzer, StabilityReport};
use crate::threshold::{
    analyze_thresholds, optimal_thresholds, OptimalThreshold, ThresholdAnalysis, ThresholdSweep,
};
use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Run metadata recorded with every evaluation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationMetadata {
    pub timestamp: DateTime<Utc>,
    pub dataset_id: String,
    /// SHA-256 of the dataset; absent when evaluating pre-scored records
    pub dataset_fingerprint: Option<String>,
    pub scorer: String,
    pub total_sources: usize,
    pub threshold: u32,
    pub successfully_scored: usize,
    pub failed: usize,
    pub version: String,
}

/// Complete result of one evaluation at one threshold
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub metadata: EvaluationMetadata,
    pub classification_metrics: ClassificationMetrics,
    pub calibration_metrics: CalibrationMetrics,
    pub calibration_data: CalibrationData,
    pub criterion_metrics: Vec<CriterionMetrics>,
    pub score_distribution: ScoreDistribution,
    pub risk_analysis: RiskAnalysis,
    pub scoring_results: Vec<ScoredRecord>,
}

/// Which scored records `find_misclassifications` returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MisclassificationKind {
    All,
    FalsePositive,
    FalseNegative,
    Correct,
}

impl FromStr for MisclassificationKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "all" => Ok(Self::All),
            "false_positive" | "fp" => Ok(Self::FalsePositive),
            "false_negative" | "fn" => Ok(Self::FalseNegative),
            "correct" => Ok(Self::Correct),
            other => Err(format!("Unknown misclassification kind '{}'", other)),
        }
    }
}

/// Outcome of a single prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    #[serde(rename = "FP")]
    FalsePositive,
    #[serde(rename = "FN")]
    FalseNegative,
    Correct,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Outcome::FalsePositive => "FP",
            Outcome::FalseNegative => "FN",
            Outcome::Correct => "Correct",
        })
    }
}

/// A scored record together with its predicted label and outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Misclassification {
    #[serde(flatten)]
    pub record: ScoredRecord,
    pub predicted_label: Label,
    pub error_type: Outcome,
}

impl EvaluationResult {
    /// Confusion matrix at the evaluated threshold
    pub fn confusion_data(&self) -> ConfusionMatrix {
        self.classification_metrics.confusion_matrix()
    }

    /// Scored records of the requested kind, in dataset order, at most `limit`
    pub fn find_misclassifications(
        &self,
        kind: MisclassificationKind,
        limit: usize,
    ) -> Vec<Misclassification> {
        let threshold = self.metadata.threshold;

        scored_records(&self.scoring_results)
            .filter_map(|record| {
                let predicted_label = record.predicted_label(threshold);
                let error_type = match (predicted_label, record.ground_truth_label) {
                    (Label::Manipulative, Label::Credible) => Outcome::FalsePositive,
                    (Label::Credible, Label::Manipulative) => Outcome::FalseNegative,
                    _ => Outcome::Correct,
                };

                let wanted = match kind {
                    MisclassificationKind::All => true,
                    MisclassificationKind::FalsePositive => error_type == Outcome::FalsePositive,
                    MisclassificationKind::FalseNegative => error_type == Outcome::FalseNegative,
                    MisclassificationKind::Correct => error_type == Outcome::Correct,
                };

                wanted.then(|| Misclassification {
                    record: record.clone(),
                    predicted_label,
                    error_type,
                })
            })
            .take(limit)
            .collect()
    }
}

/// Classification at several thresholds over a single scoring pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdComparison {
    pub analyses: Vec<ThresholdAnalysis>,
    pub optimal_thresholds: Vec<OptimalThreshold>,
    pub scoring_results: Vec<ScoredRecord>,
}

/// Diagnostics over already-scored records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvancedAnalysis {
    pub threshold: u32,
    pub criterion_metrics: Vec<CriterionMetrics>,
    pub threshold_sweep: ThresholdSweep,
    pub optimal_thresholds: Vec<OptimalThreshold>,
    pub correlation: CorrelationAnalysis,
    pub error_analysis: ErrorAnalysis,
}

/// Main evaluator
pub struct Evaluator {
    config: EvaluationConfig,
    scorer: Box<dyn CriteriaScorer>,
    /// Scoring workers, shared by every pass
    pool: ThreadPool,
}

impl Evaluator {
    /// Build an evaluator and its scoring worker pool (`workers` threads, or
    /// one per core when 0)
    pub fn new<S: CriteriaScorer + 'static>(config: EvaluationConfig, scorer: S) -> Result<Self> {
        let mut builder = rayon::ThreadPoolBuilder::new();
        if config.workers > 0 {
            builder = builder.num_threads(config.workers);
        }
        let pool = builder.build()?;

        Ok(Self {
            config,
            scorer: Box::new(scorer),
            pool,
        })
    }

    pub fn config(&self) -> &EvaluationConfig {
        &self.config
    }

    pub fn scorer_name(&self) -> &str {
        self.scorer.name()
    }

    /// Number of threads in the scoring pool
    pub fn worker_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Evaluate at the configured threshold
    pub fn evaluate(&self, dataset: &Dataset) -> Result<EvaluationResult> {
        self.evaluate_at(dataset, self.config.threshold)
    }

    /// Score the dataset once and evaluate at `threshold`
    pub fn evaluate_at(&self, dataset: &Dataset, threshold: u32) -> Result<EvaluationResult> {
        let records = self.score_dataset(dataset)?;
        self.assemble(records, threshold, &dataset.id, Some(dataset.fingerprint()))
    }

    /// Evaluate records produced by an earlier scoring pass
    pub fn evaluate_records(
        &self,
        records: Vec<ScoredRecord>,
        threshold: u32,
    ) -> Result<EvaluationResult> {
        validate_records(&records, &self.config.criteria, self.config.max_score)?;
        self.assemble(records, threshold, "scored_records", None)
    }

    /// Score once, then classify at every threshold in `thresholds`
    /// (the configured comparison thresholds when empty)
    pub fn compare_thresholds(
        &self,
        dataset: &Dataset,
        thresholds: &[u32],
    ) -> Result<ThresholdComparison> {
        let records = self.score_dataset(dataset)?;
        self.compare_records(records, thresholds)
    }

    /// Threshold comparison over already-scored records
    pub fn compare_records(
        &self,
        records: Vec<ScoredRecord>,
        thresholds: &[u32],
    ) -> Result<ThresholdComparison> {
        let thresholds = if thresholds.is_empty() {
            self.config.compare_thresholds.as_slice()
        } else {
            thresholds
        };

        tracing::info!("Comparing {} thresholds", thresholds.len());
        let (scores, labels) = scores_and_labels(&records);
        let analyses = analyze_thresholds(&scores, &labels, thresholds)?;
        let optimal = optimal_thresholds(&analyses, self.config.fn_cost, self.config.fp_cost);

        Ok(ThresholdComparison {
            analyses,
            optimal_thresholds: optimal,
            scoring_results: records,
        })
    }

    /// Criterion metrics, full threshold sweep with ROC, optimal thresholds,
    /// correlation and error analysis
    pub fn advanced_analysis(
        &self,
        records: &[ScoredRecord],
        threshold: u32,
    ) -> Result<AdvancedAnalysis> {
        let (scores, labels) = scores_and_labels(records);
        let threshold_sweep = ThresholdSweep::compute(&scores, &labels, 0, self.config.max_score)?;
        let optimal = optimal_thresholds(
            &threshold_sweep.analyses,
            self.config.fn_cost,
            self.config.fp_cost,
        );

        let correlation = CorrelationAnalyzer::new(
            self.config.min_support,
            self.config.min_lift,
            self.config.top_patterns,
        )
        .analyze(records);
        let error_analysis =
            ErrorAnalyzer::new(self.config.top_error_criteria).analyze(records, threshold);

        if let Some(auc) = threshold_sweep.roc.auc {
            tracing::info!("ROC AUC: {:.4}", auc);
        }

        Ok(AdvancedAnalysis {
            threshold,
            criterion_metrics: criterion_level_metrics(records, &self.config.criteria),
            threshold_sweep,
            optimal_thresholds: optimal,
            correlation,
            error_analysis,
        })
    }

    /// Score the dataset `runs` times and measure per-source score stability
    pub fn stability_test(&self, dataset: &Dataset, runs: usize) -> Result<StabilityReport> {
        if runs < 2 {
            return Err(EvalError::InsufficientRuns { runs });
        }
        self.validate_dataset(dataset)?;

        let mut all_runs = Vec::with_capacity(runs);
        for run in 1..=runs {
            tracing::info!("Stability run {}/{}", run, runs);
            all_runs.push(self.score_sources(&dataset.sources));
        }

        StabilityAnalyzer::new(self.config.stability_threshold).analyze(&all_runs)
    }

    /// Validate the dataset, then score every source once
    pub fn score_dataset(&self, dataset: &Dataset) -> Result<Vec<ScoredRecord>> {
        self.validate_dataset(dataset)?;
        Ok(self.score_sources(&dataset.sources))
    }

    /// Check the dataset against the configuration, logging and returning
    /// the non-fatal warnings
    pub fn validate_dataset(&self, dataset: &Dataset) -> Result<Vec<String>> {
        let warnings = dataset.validate(&self.config).into_result()?;
        for warning in &warnings {
            tracing::warn!("{}", warning);
        }
        Ok(warnings)
    }

    fn score_sources(&self, sources: &[SourceEntry]) -> Vec<ScoredRecord> {
        tracing::info!("Scoring {} sources with {}", sources.len(), self.scorer.name());

        let progress = if self.config.show_progress {
            ProgressBar::new(sources.len() as u64)
        } else {
            ProgressBar::hidden()
        };
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} Scoring: [{wide_bar:.cyan/blue}] {pos}/{len} ({eta})")
        {
            progress.set_style(style.progress_chars("#>-"));
        }

        // Collecting an indexed parallel iterator keeps dataset order
        let records: Vec<ScoredRecord> = self.pool.install(|| {
            sources
                .par_iter()
                .enumerate()
                .map(|(index, source)| {
                    let record = self.score_one(index, source);
                    progress.inc(1);
                    record
                })
                .collect()
        });
        progress.finish_and_clear();

        let failed = records.iter().filter(|r| !r.is_scored()).count();
        tracing::info!("Scored {} sources ({} failed)", records.len() - failed, failed);
        records
    }

    fn score_one(&self, index: usize, source: &SourceEntry) -> ScoredRecord {
        let record = match self.scorer.score(&source.text, &source.url, &source.title) {
            Ok(response) => ScoredRecord::from_response(
                index,
                source,
                response,
                &self.config.criteria,
                self.config.max_score,
            ),
            Err(e) => ScoredRecord::failed(index, source, format!("{:#}", e)),
        };

        if let Some(ref error) = record.error {
            tracing::warn!("Error scoring {}: {}", source.url, error);
        }
        record
    }

    fn assemble(
        &self,
        records: Vec<ScoredRecord>,
        threshold: u32,
        dataset_id: &str,
        dataset_fingerprint: Option<String>,
    ) -> Result<EvaluationResult> {
        let (scores, labels) = scores_and_labels(&records);

        let classification_metrics = binary_classification_metrics(&scores, &labels, threshold)?;
        let (calibration_metrics, calibration_data) = calibration_metrics(
            &scores,
            &labels,
            self.config.max_score,
            self.config.calibration_bins,
        )?;
        let criterion_metrics = criterion_level_metrics(&records, &self.config.criteria);
        let score_distribution = ScoreDistribution::compute(&scores, &labels)?;
        let risk_analysis = RiskAnalysis::compute(&scores, &labels)?;

        tracing::info!(
            "Threshold {} - Accuracy: {:.4}, Precision: {:.4}, Recall: {:.4}, F1: {:.4}",
            threshold,
            classification_metrics.accuracy,
            classification_metrics.precision,
            classification_metrics.recall,
            classification_metrics.f1
        );

        let metadata = EvaluationMetadata {
            timestamp: Utc::now(),
            dataset_id: dataset_id.to_string(),
            dataset_fingerprint,
            scorer: self.scorer.name().to_string(),
            total_sources: records.len(),
            threshold,
            successfully_scored: scores.len(),
            failed: records.len() - scores.len(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        };

        Ok(EvaluationResult {
            metadata,
            classification_metrics,
            calibration_metrics,
            calibration_data,
            criterion_metrics,
            score_distribution,
            risk_analysis,
            scoring_results: records,
        })
    }
}

/// Save any result structure as pretty-printed JSON
pub fn save_json<T: Serialize>(value: &T, output_path: &Path) -> Result<()> {
    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(output_path, json)?;
    tracing::info!("Results saved to {}", output_path.display());
    Ok(())
}
