// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Score stability across repeated scoring runs
//!
//! Runs must cover the same ordered sources. Per source position the valid
//! scores are reduced to mean, population standard deviation and coefficient
//! of variation; a source is stable when its CV is below the threshold.

use crate::error::{EvalError, Result};
use crate::records::ScoredRecord;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StabilityResult {
    pub source_id: String,
    pub mean_score: f64,
    pub std_dev: f64,
    /// `std_dev / mean_score`, infinite when the mean is 0
    pub coefficient_of_variation: f64,
    pub min_score: u32,
    pub max_score: u32,
    /// Runs that produced a valid score for this source
    pub num_runs: usize,
    pub is_stable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StabilityReport {
    pub runs: usize,
    pub stability_threshold: f64,
    pub results: Vec<StabilityResult>,
    pub stable_sources: usize,
    pub unstable_sources: usize,
    /// Mean CV over sources with a finite CV
    pub mean_cv: f64,
}

impl StabilityReport {
    /// Fraction of assessed sources that are stable
    pub fn stable_fraction(&self) -> f64 {
        crate::metrics::ratio(self.stable_sources, self.results.len())
    }
}

#[derive(Debug, Clone)]
pub struct StabilityAnalyzer {
    pub stability_threshold: f64,
}

impl Default for StabilityAnalyzer {
    fn default() -> Self {
        Self {
            stability_threshold: 0.15,
        }
    }
}

impl StabilityAnalyzer {
    pub fn new(stability_threshold: f64) -> Self {
        Self { stability_threshold }
    }

    pub fn analyze(&self, runs: &[Vec<ScoredRecord>]) -> Result<StabilityReport> {
        if runs.len() < 2 {
            return Err(EvalError::InsufficientRuns { runs: runs.len() });
        }

        let expected = runs[0].len();
        if let Some((run, found)) = runs
            .iter()
            .enumerate()
            .map(|(i, r)| (i, r.len()))
            .find(|(_, len)| *len != expected)
        {
            return Err(EvalError::RunLengthMismatch { run, expected, found });
        }

        let results: Vec<StabilityResult> = (0..expected)
            .filter_map(|position| self.assess(position, runs))
            .collect();

        let stable_sources = results.iter().filter(|r| r.is_stable).count();
        let finite: Vec<f64> = results
            .iter()
            .map(|r| r.coefficient_of_variation)
            .filter(|cv| cv.is_finite())
            .collect();
        let mean_cv = if finite.is_empty() {
            0.0
        } else {
            finite.iter().sum::<f64>() / finite.len() as f64
        };

        tracing::info!(
            runs = runs.len(),
            sources = results.len(),
            stable = stable_sources,
            "stability analysis complete"
        );

        Ok(StabilityReport {
            runs: runs.len(),
            stability_threshold: self.stability_threshold,
            unstable_sources: results.len() - stable_sources,
            stable_sources,
            mean_cv,
            results,
        })
    }

    fn assess(&self, position: usize, runs: &[Vec<ScoredRecord>]) -> Option<StabilityResult> {
        let valid: Vec<&ScoredRecord> = runs
            .iter()
            .map(|run| &run[position])
            .filter(|record| record.is_scored())
            .collect();

        if valid.len() < 2 {
            return None;
        }

        let scores: Vec<f64> = valid.iter().map(|r| r.predicted_score as f64).collect();
        let n = scores.len() as f64;
        let mean = scores.iter().sum::<f64>() / n;
        let std_dev = (scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n).sqrt();
        let coefficient_of_variation = if mean > 0.0 { std_dev / mean } else { f64::INFINITY };

        let source_id = if valid[0].identifier.is_empty() {
            format!("source_{}", position)
        } else {
            valid[0].identifier.clone()
        };

        Some(StabilityResult {
            source_id,
            mean_score: mean,
            std_dev,
            coefficient_of_variation,
            min_score: valid.iter().map(|r| r.predicted_score).min().unwrap_or(0),
            max_score: valid.iter().map(|r| r.predicted_score).max().unwrap_or(0),
            num_runs: valid.len(),
            is_stable: coefficient_of_variation < self.stability_threshold,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::Label;

    fn run(scores: &[u32]) -> Vec<ScoredRecord> {
        scores
            .iter()
            .enumerate()
            .map(|(i, s)| {
                ScoredRecord::new(&format!("https://example.org/{i}"), *s, Label::Manipulative)
            })
            .collect()
    }

    #[test]
    fn test_requires_two_runs() {
        let analyzer = StabilityAnalyzer::default();
        assert!(matches!(analyzer.analyze(&[]), Err(EvalError::InsufficientRuns { runs: 0 })));
        assert!(matches!(
            analyzer.analyze(&[run(&[1, 2])]),
            Err(EvalError::InsufficientRuns { runs: 1 })
        ));
    }

    #[test]
    fn test_run_length_mismatch() {
        let result = StabilityAnalyzer::default().analyze(&[run(&[1, 2]), run(&[1, 2]), run(&[1])]);
        assert!(matches!(
            result,
            Err(EvalError::RunLengthMismatch {
                run: 2,
                expected: 2,
                found: 1
            })
        ));
    }

    #[test]
    fn test_identical_runs_are_stable() {
        let report = StabilityAnalyzer::default()
            .analyze(&[run(&[10, 4]), run(&[10, 4]), run(&[10, 4])])
            .unwrap();
        assert_eq!(report.results.len(), 2);
        assert!(report.results.iter().all(|r| r.is_stable && r.std_dev == 0.0));
        assert_eq!(report.stable_sources, 2);
        assert_eq!(report.stable_fraction(), 1.0);
    }

    #[test]
    fn test_statistics() {
        let report = StabilityAnalyzer::default().analyze(&[run(&[8]), run(&[12])]).unwrap();
        let result = &report.results[0];
        assert_eq!(result.source_id, "https://example.org/0");
        assert_eq!(result.mean_score, 10.0);
        assert_eq!(result.std_dev, 2.0);
        assert!((result.coefficient_of_variation - 0.2).abs() < 1e-9);
        assert_eq!((result.min_score, result.max_score), (8, 12));
        assert!(!result.is_stable);
        assert_eq!(report.unstable_sources, 1);
    }

    #[test]
    fn test_zero_mean_is_infinitely_variable() {
        let report = StabilityAnalyzer::default().analyze(&[run(&[0]), run(&[0])]).unwrap();
        assert!(report.results[0].coefficient_of_variation.is_infinite());
        assert!(!report.results[0].is_stable);
        assert_eq!(report.mean_cv, 0.0);
    }

    #[test]
    fn test_error_entries_skipped() {
        let mut second = run(&[5, 5]);
        second[1] = second[1].clone().with_error("timeout");
        let third = run(&[5, 9]);

        let report = StabilityAnalyzer::default().analyze(&[run(&[5, 5]), second, third]).unwrap();
        assert_eq!(report.results[0].num_runs, 3);
        assert_eq!(report.results[1].num_runs, 2);

        // A source with fewer than two valid scores is omitted
        let mut lone = run(&[3]);
        lone[0] = lone[0].clone().with_error("timeout");
        let report = StabilityAnalyzer::default().analyze(&[lone, run(&[3])]).unwrap();
        assert!(report.results.is_empty());
    }
}
