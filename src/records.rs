// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Scored records: the unit every metric in this crate consumes

use crate::datasets::{Label, SourceEntry};
use crate::error::{EvalError, Result};
use crate::scorer::ScoreResponse;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One evaluated source: predicted score, matched criteria and ground truth
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRecord {
    /// Position of the source in its dataset
    pub index: usize,
    /// URL or synthetic id; groups repeated runs in stability tests
    pub identifier: String,
    #[serde(default)]
    pub title: String,
    pub predicted_score: u32,
    pub ground_truth_label: Label,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ground_truth_score: Option<u32>,
    /// Criterion name -> matched flag
    #[serde(default)]
    pub criteria_matches: BTreeMap<String, bool>,
    #[serde(default)]
    pub risk_level: String,
    #[serde(default)]
    pub summary: String,
    /// Present when scoring failed; such records are excluded from metrics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScoredRecord {
    pub fn new(identifier: &str, predicted_score: u32, ground_truth_label: Label) -> Self {
        Self {
            index: 0,
            identifier: identifier.to_string(),
            title: String::new(),
            predicted_score,
            ground_truth_label,
            ground_truth_score: None,
            criteria_matches: BTreeMap::new(),
            risk_level: String::new(),
            summary: String::new(),
            error: None,
        }
    }

    /// Set the matched flag for each `(criterion, matched)` pair
    pub fn with_criteria<I, S>(mut self, criteria: I) -> Self
    where
        I: IntoIterator<Item = (S, bool)>,
        S: Into<String>,
    {
        self.criteria_matches
            .extend(criteria.into_iter().map(|(c, matched)| (c.into(), matched)));
        self
    }

    pub fn with_error(mut self, error: &str) -> Self {
        self.error = Some(error.to_string());
        self
    }

    /// Record for a source whose scorer call failed outright
    pub fn failed(index: usize, source: &SourceEntry, error: String) -> Self {
        Self {
            index,
            identifier: source.url.clone(),
            title: source.title.clone(),
            predicted_score: 0,
            ground_truth_label: source.ground_truth_label,
            ground_truth_score: source.ground_truth_score,
            criteria_matches: BTreeMap::new(),
            risk_level: "ERROR".to_string(),
            summary: String::new(),
            error: Some(error),
        }
    }

    /// Convert a scorer response into a record.
    ///
    /// A response carrying an error, an aggregate score outside
    /// `[0, max_score]`, or a criterion set different from `criteria` yields
    /// an error record rather than failing the run.
    pub fn from_response(
        index: usize,
        source: &SourceEntry,
        response: ScoreResponse,
        criteria: &[String],
        max_score: u32,
    ) -> Self {
        if let Some(error) = response.error {
            return Self::failed(index, source, error);
        }

        if response.aggregate_score < 0 || response.aggregate_score > max_score as i64 {
            return Self::failed(
                index,
                source,
                format!(
                    "Malformed response: aggregate_score {} outside 0-{}",
                    response.aggregate_score, max_score
                ),
            );
        }

        let criteria_matches: BTreeMap<String, bool> = response
            .criteria_scores
            .into_iter()
            .map(|(criterion, score)| (criterion, score.matched))
            .collect();

        if let Some(problem) = criteria_mismatch(&criteria_matches, criteria) {
            return Self::failed(index, source, format!("Malformed response: {}", problem));
        }

        Self {
            index,
            identifier: source.url.clone(),
            title: source.title.clone(),
            predicted_score: response.aggregate_score as u32,
            ground_truth_label: source.ground_truth_label,
            ground_truth_score: source.ground_truth_score,
            criteria_matches,
            risk_level: response.risk_level,
            summary: response.summary,
            error: None,
        }
    }

    /// Whether the record takes part in metric computation
    pub fn is_scored(&self) -> bool {
        self.error.is_none()
    }

    pub fn is_matched(&self, criterion: &str) -> bool {
        self.criteria_matches.get(criterion).copied().unwrap_or(false)
    }

    /// Names of the matched criteria, in name order
    pub fn matched_criteria(&self) -> Vec<String> {
        self.criteria_matches
            .iter()
            .filter(|(_, matched)| **matched)
            .map(|(c, _)| c.clone())
            .collect()
    }

    pub fn predicted_label(&self, threshold: u32) -> Label {
        Label::predicted(self.predicted_score, threshold)
    }
}

/// Describe how a criterion map deviates from the expected set, if it does
fn criteria_mismatch(matches: &BTreeMap<String, bool>, criteria: &[String]) -> Option<String> {
    let missing: Vec<&str> = criteria
        .iter()
        .filter(|c| !matches.contains_key(c.as_str()))
        .map(String::as_str)
        .collect();
    let unexpected: Vec<&str> = matches
        .keys()
        .filter(|k| !criteria.contains(*k))
        .map(String::as_str)
        .collect();

    if missing.is_empty() && unexpected.is_empty() {
        return None;
    }

    let mut parts = Vec::new();
    if !missing.is_empty() {
        parts.push(format!("missing criteria [{}]", missing.join(", ")));
    }
    if !unexpected.is_empty() {
        parts.push(format!("unexpected criteria [{}]", unexpected.join(", ")));
    }
    Some(parts.join(", "))
}

/// Records that take part in metric computation
pub fn scored_records(records: &[ScoredRecord]) -> impl Iterator<Item = &ScoredRecord> {
    records.iter().filter(|r| r.is_scored())
}

/// Predicted scores and labels of the scored records, as parallel vectors
pub fn scores_and_labels(records: &[ScoredRecord]) -> (Vec<u32>, Vec<Label>) {
    scored_records(records)
        .map(|r| (r.predicted_score, r.ground_truth_label))
        .unzip()
}

/// Check externally supplied records against the criterion set and score
/// range, reporting every violation. Error records are exempt.
pub fn validate_records(
    records: &[ScoredRecord],
    criteria: &[String],
    max_score: u32,
) -> Result<()> {
    let mut violations = Vec::new();

    for (i, record) in records.iter().enumerate().filter(|(_, r)| r.is_scored()) {
        if record.predicted_score > max_score {
            violations.push(format!(
                "Record {} ({}): predicted_score {} outside 0-{}",
                i, record.identifier, record.predicted_score, max_score
            ));
        }
        if let Some(problem) = criteria_mismatch(&record.criteria_matches, criteria) {
            violations.push(format!("Record {} ({}): {}", i, record.identifier, problem));
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(EvalError::InvalidDataset { violations })
    }
}
