// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Error taxonomy for the evaluation engine
//!
//! Only input-validation problems and I/O surface as errors. Per-record scorer
//! failures are carried on the record itself, and metric edge cases (empty
//! input, zero denominators) resolve to defaults.

/// Errors that abort an evaluation run
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error("Invalid dataset ({} violation(s)): {}", .violations.len(), .violations.join("; "))]
    InvalidDataset { violations: Vec<String> },

    #[error("Prediction and label lengths differ: {predictions} predictions, {labels} labels")]
    LengthMismatch { predictions: usize, labels: usize },

    #[error("Stability testing needs at least 2 scoring runs, got {runs}")]
    InsufficientRuns { runs: usize },

    #[error("Scoring run {run} covers {found} sources, expected {expected}")]
    RunLengthMismatch { run: usize, expected: usize, found: usize },

    #[error("Invalid threshold range: min {min} is greater than max {max}")]
    InvalidThresholdRange { min: u32, max: u32 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to build scoring worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T> = std::result::Result<T, EvalError>;

/// Fail with `LengthMismatch` unless both parallel inputs have the same length
pub(crate) fn ensure_same_len(predictions: usize, labels: usize) -> Result<()> {
    if predictions != labels {
        return Err(EvalError::LengthMismatch { predictions, labels });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_dataset_lists_every_violation() {
        let err = EvalError::InvalidDataset {
            violations: vec!["Source 0: bad".to_string(), "Source 3: worse".to_string()],
        };
        let message = err.to_string();
        assert!(message.contains("2 violation(s)"));
        assert!(message.contains("Source 0: bad"));
        assert!(message.contains("Source 3: worse"));
    }

    #[test]
    fn test_ensure_same_len() {
        assert!(ensure_same_len(3, 3).is_ok());
        assert!(matches!(
            ensure_same_len(2, 3),
            Err(EvalError::LengthMismatch { predictions: 2, labels: 3 })
        ));
    }
}
