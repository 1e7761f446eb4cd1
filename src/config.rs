// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Evaluation configuration, criterion catalogue and risk bands

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Upper bound of the aggregate score (one point per criterion)
pub const MAX_SCORE: u32 = 20;

/// Score at or above which a source is classified as manipulative
pub const DEFAULT_THRESHOLD: u32 = 6;

/// The 20 Narrative Credibility Index criteria, in canonical order
pub const NCI_CRITERIA: [&str; 20] = [
    "timing",
    "emotional_manipulation",
    "uniform_messaging",
    "missing_information",
    "simplistic_narratives",
    "tribal_division",
    "authority_overload",
    "call_for_urgent_action",
    "overuse_of_novelty",
    "financial_political_gain",
    "suppression_of_dissent",
    "false_dilemmas",
    "bandwagon_effect",
    "emotional_repetition",
    "cherry_picked_data",
    "logical_fallacies",
    "manufactured_outrage",
    "framing_techniques",
    "rapid_behavior_shifts",
    "historical_parallels",
];

/// Coarse risk bucket derived from the aggregate score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
    Critical,
}

impl RiskLevel {
    /// LOW 0-5, MODERATE 6-10, HIGH 11-15, CRITICAL 16+
    pub fn from_score(score: u32) -> Self {
        match score {
            0..=5 => RiskLevel::Low,
            6..=10 => RiskLevel::Moderate,
            11..=15 => RiskLevel::High,
            _ => RiskLevel::Critical,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Moderate => "MODERATE",
            RiskLevel::High => "HIGH",
            RiskLevel::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for an evaluation run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Classification threshold (score >= threshold -> manipulative)
    pub threshold: u32,
    /// Upper bound of the score range
    pub max_score: u32,
    /// Fixed criterion set every scored record must carry
    pub criteria: Vec<String>,
    /// Number of equal-width calibration bins
    pub calibration_bins: usize,
    /// Minimum co-occurrence count before a criterion pair is considered
    pub min_support: usize,
    /// Lift above which a pair counts as a significant association
    pub min_lift: f64,
    /// Number of association patterns to keep
    pub top_patterns: usize,
    /// Number of dominant criteria reported per error bucket
    pub top_error_criteria: usize,
    /// Coefficient of variation below which a source is stable
    pub stability_threshold: f64,
    /// Cost of a missed manipulative source
    pub fn_cost: f64,
    /// Cost of flagging a credible source
    pub fp_cost: f64,
    /// Scoring worker pool size (0 = one per core)
    pub workers: usize,
    /// Thresholds tested by `compare_thresholds` when none are given
    pub compare_thresholds: Vec<u32>,
    /// Texts shorter than this raise a dataset warning
    pub min_text_length: usize,
    /// Show a progress bar while scoring
    pub show_progress: bool,
    /// Output directory for results
    pub output_dir: String,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            max_score: MAX_SCORE,
            criteria: NCI_CRITERIA.iter().map(|c| c.to_string()).collect(),
            calibration_bins: 5,
            min_support: 3,
            min_lift: 1.5,
            top_patterns: 20,
            top_error_criteria: 10,
            stability_threshold: 0.15,
            fn_cost: 1.0,
            fp_cost: 1.0,
            workers: 4,
            compare_thresholds: (3..=15).collect(),
            min_text_length: 50,
            show_progress: true,
            output_dir: "eval_output".to_string(),
        }
    }
}

impl EvaluationConfig {
    /// Load a configuration from a JSON file; missing keys take their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Configuration for a custom criterion set; the score range follows its size
    pub fn with_criteria<I, S>(mut self, criteria: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.criteria = criteria.into_iter().map(Into::into).collect();
        self.max_score = self.criteria.len() as u32;
        self
    }
}
