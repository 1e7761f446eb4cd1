// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

use nci_eval::scorer::CriterionScore;
use nci_eval::{
    CriteriaScorer, Dataset, EvalError, EvaluationConfig, Evaluator, KeywordScorer, Label,
    NoisyScorer, ReplayScorer, ScoreResponse, SourceEntry, NCI_CRITERIA,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Deterministic scorer: each URL maps to a fixed number of matched criteria.
/// Every call is counted.
struct CountingScorer {
    scores: HashMap<String, usize>,
    calls: Arc<AtomicUsize>,
}

impl CountingScorer {
    fn new(scores: &[(&str, usize)]) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let scorer = Self {
            scores: scores.iter().map(|(url, s)| (url.to_string(), *s)).collect(),
            calls: Arc::clone(&calls),
        };
        (scorer, calls)
    }
}

impl CriteriaScorer for CountingScorer {
    fn score(&self, _text: &str, url: &str, _title: &str) -> anyhow::Result<ScoreResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let Some(&matched) = self.scores.get(url) else {
            return Ok(ScoreResponse::failed("upstream timeout"));
        };
        Ok(response_with(matched))
    }

    fn name(&self) -> &str {
        "Counting"
    }
}

fn response_with(matched: usize) -> ScoreResponse {
    let criteria_scores: BTreeMap<String, CriterionScore> = NCI_CRITERIA
        .iter()
        .enumerate()
        .map(|(i, c)| {
            (
                c.to_string(),
                CriterionScore {
                    matched: i < matched,
                    reason: String::new(),
                },
            )
        })
        .collect();
    ScoreResponse::from_criteria(criteria_scores)
}

fn config() -> EvaluationConfig {
    EvaluationConfig {
        show_progress: false,
        min_text_length: 0,
        ..Default::default()
    }
}

fn four_sources() -> Dataset {
    Dataset::new(
        "four",
        vec![
            SourceEntry::new("text", "https://a", "A", Label::Manipulative),
            SourceEntry::new("text", "https://b", "B", Label::Manipulative),
            SourceEntry::new("text", "https://c", "C", Label::Credible),
            SourceEntry::new("text", "https://d", "D", Label::Credible),
        ],
    )
}

const FOUR_SCORES: [(&str, usize); 4] = [
    ("https://a", 18),
    ("https://b", 15),
    ("https://c", 2),
    ("https://d", 4),
];

#[test]
fn test_compare_thresholds_scores_each_source_once() {
    let (scorer, calls) = CountingScorer::new(&FOUR_SCORES);
    let evaluator = Evaluator::new(config(), scorer).unwrap();

    let thresholds: Vec<u32> = (0..=20).collect();
    let comparison = evaluator.compare_thresholds(&four_sources(), &thresholds).unwrap();

    assert_eq!(comparison.analyses.len(), 21);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[test]
fn test_end_to_end_threshold_6_and_20() {
    let (scorer, calls) = CountingScorer::new(&FOUR_SCORES);
    let evaluator = Evaluator::new(config(), scorer).unwrap();

    let result = evaluator.evaluate_at(&four_sources(), 6).unwrap();
    let m = &result.classification_metrics;
    assert_eq!(
        (m.true_positives, m.true_negatives, m.false_positives, m.false_negatives),
        (2, 2, 0, 0)
    );
    assert_eq!(m.accuracy, 1.0);
    assert_eq!(m.f1, 1.0);

    // Re-evaluating yields an independent result; only classification moves
    let strict = evaluator.evaluate_records(result.scoring_results.clone(), 20).unwrap();
    let s = &strict.classification_metrics;
    assert_eq!((s.true_positives, s.false_negatives), (0, 2));
    assert_eq!(s.precision, 0.0);
    assert_eq!(s.recall, 0.0);
    assert_eq!(strict.criterion_metrics, result.criterion_metrics);
    assert_eq!(result.classification_metrics.threshold, 6);

    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[test]
fn test_scoring_failures_are_excluded_but_retained() {
    let (scorer, _) = CountingScorer::new(&FOUR_SCORES);
    let evaluator = Evaluator::new(config(), scorer).unwrap();

    let mut dataset = four_sources();
    dataset
        .sources
        .insert(1, SourceEntry::new("text", "https://unknown", "?", Label::Credible));

    let result = evaluator.evaluate(&dataset).unwrap();
    assert_eq!(result.metadata.total_sources, 5);
    assert_eq!(result.metadata.successfully_scored, 4);
    assert_eq!(result.metadata.failed, 1);
    assert_eq!(result.scoring_results[1].error.as_deref(), Some("upstream timeout"));
    assert_eq!(result.scoring_results[1].identifier, "https://unknown");
    assert_eq!(result.classification_metrics.accuracy, 1.0);
    assert_eq!(result.score_distribution.overall.count, 4);
}

#[test]
fn test_malformed_dataset_reports_every_violation() {
    let values = serde_json::json!([
        {
            "text": "t", "url": "u1", "title": "x",
            "ground_truth_label": "manipulative", "source_dataset": "m"
        },
        {
            "text": "t", "url": "u2", "title": "x",
            "ground_truth_label": "satire", "source_dataset": "m"
        },
        {"url": "u3", "title": "x", "ground_truth_label": "credible", "source_dataset": "m"},
        {
            "text": "t", "url": "u4", "title": "x",
            "ground_truth_label": "credible", "source_dataset": "m", "ground_truth_score": 42
        }
    ]);
    let serde_json::Value::Array(values) = values else {
        unreachable!()
    };

    match Dataset::from_json_values("bad", values, &config()) {
        Err(EvalError::InvalidDataset { violations }) => assert_eq!(violations.len(), 3),
        other => panic!("expected InvalidDataset, got {:?}", other.map(|d| d.len())),
    }
}

#[test]
fn test_replay_scorer_round_trip() {
    let dataset = four_sources();
    let mut replay = ReplayScorer::new();
    for (url, matched) in FOUR_SCORES {
        replay.insert(url, response_with(matched));
    }

    let evaluator = Evaluator::new(config(), replay).unwrap();
    let result = evaluator.evaluate(&dataset).unwrap();
    let scores: Vec<u32> = result.scoring_results.iter().map(|r| r.predicted_score).collect();
    assert_eq!(scores, vec![18, 15, 2, 4]);
    assert_eq!(result.scoring_results[0].risk_level, "CRITICAL");
}

#[test]
fn test_keyword_scorer_on_synthetic_data() {
    let dataset = Dataset::synthetic(60, 7);
    let evaluator = Evaluator::new(
        EvaluationConfig {
            threshold: 2,
            ..config()
        },
        KeywordScorer::new(),
    )
    .unwrap();

    let result = evaluator.evaluate(&dataset).unwrap();
    assert_eq!(result.metadata.total_sources, 60);
    assert!(result.classification_metrics.accuracy > 0.5);

    let analysis = evaluator.advanced_analysis(&result.scoring_results, 2).unwrap();
    let auc = analysis.threshold_sweep.roc.auc.unwrap();
    assert!(auc > 0.5, "keyword scorer should beat chance on synthetic data, got {auc}");
}

#[test]
fn test_stability_with_noisy_scorer() {
    let (scorer, calls) = CountingScorer::new(&FOUR_SCORES);
    let evaluator = Evaluator::new(config(), NoisyScorer::new(scorer, 0.0, 1)).unwrap();

    let report = evaluator.stability_test(&four_sources(), 3).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 12);
    assert_eq!(report.stable_sources, 4);

    let (scorer, _) = CountingScorer::new(&FOUR_SCORES);
    let noisy = Evaluator::new(config(), NoisyScorer::new(scorer, 0.5, 1)).unwrap();
    let report = noisy.stability_test(&four_sources(), 4).unwrap();
    assert_eq!(report.results.len(), 4);
    assert!(report.results.iter().all(|r| r.min_score <= r.max_score));
}
