// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Criterion co-occurrence and lift-based association mining

use crate::records::{scored_records, ScoredRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A pair of criteria that co-occur more often than independence predicts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssociationPattern {
    /// The pair, in name order
    pub criteria: [String; 2],
    /// Records in which both matched
    pub count: usize,
    /// Co-occurrences expected if the two were independent
    pub expected: f64,
    /// `count / expected`
    pub lift: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrelationAnalysis {
    /// Criterion -> number of records where it matched
    pub criterion_counts: BTreeMap<String, usize>,
    /// Symmetric co-occurrence counts; the diagonal is not stored
    pub cooccurrence_matrix: BTreeMap<String, BTreeMap<String, usize>>,
    /// Significant pairs, highest lift first
    pub common_patterns: Vec<AssociationPattern>,
    /// Non-error records considered
    pub total_records: usize,
}

impl CorrelationAnalysis {
    /// Co-occurrence count of two criteria, in either order
    pub fn cooccurrence(&self, a: &str, b: &str) -> usize {
        self.cooccurrence_matrix
            .get(a)
            .and_then(|row| row.get(b))
            .copied()
            .unwrap_or(0)
    }
}

/// Mines criterion pairs whose co-occurrence lift exceeds a cutoff
#[derive(Debug, Clone)]
pub struct CorrelationAnalyzer {
    pub min_support: usize,
    pub min_lift: f64,
    pub top_k: usize,
}

impl Default for CorrelationAnalyzer {
    fn default() -> Self {
        Self {
            min_support: 3,
            min_lift: 1.5,
            top_k: 20,
        }
    }
}

impl CorrelationAnalyzer {
    pub fn new(min_support: usize, min_lift: f64, top_k: usize) -> Self {
        Self {
            min_support,
            min_lift,
            top_k,
        }
    }

    pub fn analyze(&self, records: &[ScoredRecord]) -> CorrelationAnalysis {
        let mut analysis = CorrelationAnalysis::default();
        let mut pair_counts: BTreeMap<(String, String), usize> = BTreeMap::new();

        for record in scored_records(records) {
            analysis.total_records += 1;
            let matched = record.matched_criteria();

            for criterion in &matched {
                *analysis.criterion_counts.entry(criterion.clone()).or_insert(0) += 1;
            }

            for (i, first) in matched.iter().enumerate() {
                for second in &matched[i + 1..] {
                    *pair_counts.entry((first.clone(), second.clone())).or_insert(0) += 1;
                }
            }
        }

        let total = analysis.total_records as f64;
        let mut patterns = Vec::new();

        for ((first, second), &count) in &pair_counts {
            analysis
                .cooccurrence_matrix
                .entry(first.clone())
                .or_default()
                .insert(second.clone(), count);
            analysis
                .cooccurrence_matrix
                .entry(second.clone())
                .or_default()
                .insert(first.clone(), count);

            if count < self.min_support {
                continue;
            }

            let first_count = analysis.criterion_counts.get(first).copied().unwrap_or(0);
            let second_count = analysis.criterion_counts.get(second).copied().unwrap_or(0);
            let expected = (first_count * second_count) as f64 / total;
            if expected <= 0.0 {
                continue;
            }

            let lift = count as f64 / expected;
            if lift > self.min_lift {
                patterns.push(AssociationPattern {
                    criteria: [first.clone(), second.clone()],
                    count,
                    expected,
                    lift,
                });
            }
        }

        patterns.sort_by(|a, b| b.lift.partial_cmp(&a.lift).unwrap_or(std::cmp::Ordering::Equal));
        patterns.truncate(self.top_k);

        tracing::debug!(
            records = analysis.total_records,
            patterns = patterns.len(),
            "correlation analysis complete"
        );

        analysis.common_patterns = patterns;
        analysis
    }
}
