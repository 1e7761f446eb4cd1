// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Evaluation engine for the Narrative Credibility Index (NCI)
//!
//! This crate provides:
//! - Dataset loading, validation and synthetic generation
//! - A scorer capability trait with offline reference scorers
//! - Classification and calibration metrics (Brier, ECE, MCE)
//! - Per-criterion diagnostics
//! - Threshold sweeps, ROC AUC and optimal-threshold selection
//! - Criterion co-occurrence mining, error analysis and stability testing
//! - An evaluator that scores each source once and composes all of the above

pub mod config;
pub mod correlation;
pub mod criteria;
pub mod datasets;
pub mod error;
pub mod error_analysis;
pub mod evaluator;
pub mod metrics;
pub mod records;
pub mod scorer;
pub mod stability;
pub mod threshold;

pub use config::{EvaluationConfig, RiskLevel, DEFAULT_THRESHOLD, MAX_SCORE, NCI_CRITERIA};
pub use correlation::{AssociationPattern, CorrelationAnalysis, CorrelationAnalyzer};
pub use criteria::{criterion_level_metrics, CriterionMetrics};
pub use datasets::{Dataset, Label, SourceEntry, ValidationReport};
pub use error::{EvalError, Result};
pub use error_analysis::{ErrorAnalysis, ErrorAnalyzer, ErrorBucket, ErrorInstance};
pub use evaluator::{
    save_json, AdvancedAnalysis, EvaluationResult, Evaluator, MisclassificationKind, Outcome,
    ThresholdComparison,
};
pub use metrics::{
    binary_classification_metrics, calibration_metrics, CalibrationMetrics, ClassificationMetrics,
    ConfusionMatrix,
};
pub use records::ScoredRecord;
pub use scorer::{CriteriaScorer, KeywordScorer, NoisyScorer, ReplayScorer, ScoreResponse};
pub use stability::{StabilityAnalyzer, StabilityReport, StabilityResult};
pub use threshold::{
    find_optimal_threshold, threshold_sweep, Objective, RocCurve, ThresholdAnalysis, ThresholdSweep,
};
