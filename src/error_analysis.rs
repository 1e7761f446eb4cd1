// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Misclassification analysis at a fixed threshold

use crate::datasets::Label;
use crate::metrics::ratio;
use crate::records::{scored_records, ScoredRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One misclassified record, for manual audit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInstance {
    pub index: usize,
    pub identifier: String,
    pub title: String,
    pub predicted_score: u32,
    pub ground_truth_score: Option<u32>,
    pub matched_criteria: Vec<String>,
    pub num_criteria: usize,
    pub risk_level: String,
}

impl ErrorInstance {
    fn from_record(record: &ScoredRecord) -> Self {
        let matched_criteria = record.matched_criteria();
        Self {
            index: record.index,
            identifier: record.identifier.clone(),
            title: record.title.clone(),
            predicted_score: record.predicted_score,
            ground_truth_score: record.ground_truth_score,
            num_criteria: matched_criteria.len(),
            matched_criteria,
            risk_level: record.risk_level.clone(),
        }
    }
}

/// All errors of one kind (false positives or false negatives)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorBucket {
    pub count: usize,
    pub examples: Vec<ErrorInstance>,
    /// Most frequent matched criteria, most common first
    pub common_criteria: Vec<(String, usize)>,
    /// Mean predicted score, 0 for an empty bucket
    pub avg_score: f64,
}

impl ErrorBucket {
    fn build(examples: Vec<ErrorInstance>, top_k: usize) -> Self {
        let mut frequency: HashMap<&str, usize> = HashMap::new();
        for example in &examples {
            for criterion in &example.matched_criteria {
                *frequency.entry(criterion.as_str()).or_insert(0) += 1;
            }
        }

        let mut common_criteria: Vec<(String, usize)> = frequency
            .into_iter()
            .map(|(criterion, count)| (criterion.to_string(), count))
            .collect();
        common_criteria.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        common_criteria.truncate(top_k);

        let avg_score = if examples.is_empty() {
            0.0
        } else {
            examples.iter().map(|e| e.predicted_score as f64).sum::<f64>() / examples.len() as f64
        };

        Self {
            count: examples.len(),
            examples,
            common_criteria,
            avg_score,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorSummary {
    pub total_errors: usize,
    /// False positives over evaluated records
    pub fp_rate: f64,
    /// False negatives over evaluated records
    pub fn_rate: f64,
    /// Non-error records considered
    pub evaluated: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorAnalysis {
    pub threshold: u32,
    pub false_positives: ErrorBucket,
    pub false_negatives: ErrorBucket,
    pub summary: ErrorSummary,
}

/// Buckets misclassifications and summarizes the criteria behind them
#[derive(Debug, Clone)]
pub struct ErrorAnalyzer {
    pub top_k: usize,
}

impl Default for ErrorAnalyzer {
    fn default() -> Self {
        Self { top_k: 10 }
    }
}

impl ErrorAnalyzer {
    pub fn new(top_k: usize) -> Self {
        Self { top_k }
    }

    pub fn analyze(&self, records: &[ScoredRecord], threshold: u32) -> ErrorAnalysis {
        let mut false_positives = Vec::new();
        let mut false_negatives = Vec::new();
        let mut evaluated = 0;

        for record in scored_records(records) {
            evaluated += 1;
            match (record.predicted_label(threshold), record.ground_truth_label) {
                (Label::Manipulative, Label::Credible) => {
                    false_positives.push(ErrorInstance::from_record(record))
                }
                (Label::Credible, Label::Manipulative) => {
                    false_negatives.push(ErrorInstance::from_record(record))
                }
                _ => {}
            }
        }

        let summary = ErrorSummary {
            total_errors: false_positives.len() + false_negatives.len(),
            fp_rate: ratio(false_positives.len(), evaluated),
            fn_rate: ratio(false_negatives.len(), evaluated),
            evaluated,
        };

        ErrorAnalysis {
            threshold,
            false_positives: ErrorBucket::build(false_positives, self.top_k),
            false_negatives: ErrorBucket::build(false_negatives, self.top_k),
            summary,
        }
    }
}
