// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Scorer capability and reference scorers
//!
//! The production scorer is an LLM-backed service outside this crate. The
//! engine only sees it through [`CriteriaScorer`], which makes it possible to
//! substitute:
//! - `KeywordScorer`: deterministic keyword indicators per criterion
//! - `ReplayScorer`: replays responses captured from an earlier scoring run
//! - `NoisyScorer`: wraps another scorer and flips criteria at random, for
//!   stability studies

use crate::config::RiskLevel;
use anyhow::{Context, Result};
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Verdict for a single criterion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionScore {
    pub matched: bool,
    #[serde(default)]
    pub reason: String,
}

/// Response returned by a scorer for one text
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreResponse {
    #[serde(default)]
    pub criteria_scores: BTreeMap<String, CriterionScore>,
    /// Signed so that out-of-range values from a misbehaving scorer can be detected
    #[serde(default)]
    pub aggregate_score: i64,
    #[serde(default)]
    pub risk_level: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScoreResponse {
    /// Build a response whose aggregate score is the number of matched criteria
    pub fn from_criteria(criteria_scores: BTreeMap<String, CriterionScore>) -> Self {
        let matched: Vec<&str> = criteria_scores
            .iter()
            .filter(|(_, s)| s.matched)
            .map(|(c, _)| c.as_str())
            .collect();
        let aggregate = matched.len() as u32;

        let summary = if matched.is_empty() {
            "No manipulation indicators found".to_string()
        } else {
            format!("{} indicator(s): {}", matched.len(), matched.join(", "))
        };

        Self {
            aggregate_score: aggregate as i64,
            risk_level: RiskLevel::from_score(aggregate).to_string(),
            summary,
            criteria_scores,
            error: None,
        }
    }

    /// Response carrying a scoring failure
    pub fn failed(message: &str) -> Self {
        Self {
            risk_level: "UNKNOWN".to_string(),
            error: Some(message.to_string()),
            ..Default::default()
        }
    }
}

/// Scores a text against a fixed set of boolean criteria
pub trait CriteriaScorer: Send + Sync {
    /// Score one source. `Err` and a response carrying `error` are both
    /// treated as a per-record failure by the evaluator.
    fn score(&self, text: &str, url: &str, title: &str) -> Result<ScoreResponse>;

    /// Get scorer name
    fn name(&self) -> &str;

    /// Get scorer description
    fn description(&self) -> &str {
        ""
    }
}

impl<T: CriteriaScorer + ?Sized> CriteriaScorer for Box<T> {
    fn score(&self, text: &str, url: &str, title: &str) -> Result<ScoreResponse> {
        (**self).score(text, url, title)
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    fn description(&self) -> &str {
        (**self).description()
    }
}

/// Keyword-based scorer using hand-crafted indicators for each criterion
#[derive(Debug, Clone)]
pub struct KeywordScorer {
    /// Criterion name -> lowercase indicator phrases
    indicators: Vec<(String, Vec<String>)>,
    /// Texts shorter than this are rejected
    min_text_length: usize,
}

impl KeywordScorer {
    pub fn new() -> Self {
        let table: [(&str, &[&str]); 20] = [
            (
                "timing",
                &["just as", "coincidentally", "right before the election", "conveniently timed"],
            ),
            ("emotional_manipulation", &["shocking", "terrifying", "fear", "horrifying"]),
            ("uniform_messaging", &["mainstream media", "everyone is saying", "same message"]),
            ("missing_information", &["don't want you to know", "hiding", "cover-up"]),
            ("simplistic_narratives", &["good and evil", "good versus evil", "pure and simple"]),
            ("tribal_division", &["us versus them", "elites", "the other side"]),
            ("authority_overload", &["experts agree", "authorities confirm", "top experts"]),
            (
                "call_for_urgent_action",
                &["act now", "before it's too late", "share this immediately"],
            ),
            ("overuse_of_novelty", &["breaking", "unprecedented", "never before"]),
            ("financial_political_gain", &["profit", "big corporations", "billionaire"]),
            ("suppression_of_dissent", &["silenced", "censored", "traitors"]),
            ("false_dilemmas", &["only two options", "either you", "total surrender"]),
            ("bandwagon_effect", &["everyone is", "left behind", "join the millions"]),
            ("emotional_repetition", &["fear and anger, fear and anger", "again and again"]),
            ("cherry_picked_data", &["9 out of 10", "the numbers prove", "statistics show"]),
            ("logical_fallacies", &["therefore it must", "if you disagree", "slippery slope"]),
            ("manufactured_outrage", &["outrageous", "furious", "outrage"]),
            ("framing_techniques", &["the real story", "make no mistake", "changes everything"]),
            ("rapid_behavior_shifts", &["overnight", "suddenly everyone", "switching sides"]),
            ("historical_parallels", &["just like in", "history is repeating", "1938"]),
        ];

        let indicators = table
            .iter()
            .map(|(criterion, phrases)| {
                (criterion.to_string(), phrases.iter().map(|p| p.to_string()).collect())
            })
            .collect();

        Self {
            indicators,
            min_text_length: 50,
        }
    }

    /// Scorer over a custom criterion set
    pub fn with_indicators(indicators: Vec<(String, Vec<String>)>) -> Self {
        Self {
            indicators: indicators
                .into_iter()
                .map(|(c, phrases)| (c, phrases.into_iter().map(|p| p.to_lowercase()).collect()))
                .collect(),
            min_text_length: 50,
        }
    }

    pub fn min_text_length(mut self, length: usize) -> Self {
        self.min_text_length = length;
        self
    }

    /// Criteria covered by this scorer, in declaration order
    pub fn criteria(&self) -> Vec<&str> {
        self.indicators.iter().map(|(c, _)| c.as_str()).collect()
    }
}

impl Default for KeywordScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl CriteriaScorer for KeywordScorer {
    fn score(&self, text: &str, _url: &str, title: &str) -> Result<ScoreResponse> {
        if text.trim().chars().count() < self.min_text_length {
            return Ok(ScoreResponse::failed("Text too short to score"));
        }

        let haystack = format!("{} {}", title, text).to_lowercase();

        let criteria_scores = self
            .indicators
            .iter()
            .map(|(criterion, phrases)| {
                let hit = phrases.iter().find(|p| haystack.contains(p.as_str()));
                let score = CriterionScore {
                    matched: hit.is_some(),
                    reason: hit.map(|p| format!("Matched indicator '{}'", p)).unwrap_or_default(),
                };
                (criterion.clone(), score)
            })
            .collect();

        Ok(ScoreResponse::from_criteria(criteria_scores))
    }

    fn name(&self) -> &str {
        "Keyword"
    }

    fn description(&self) -> &str {
        "Hand-crafted keyword indicators for each NCI criterion"
    }
}

/// A captured scorer response for one source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedResponse {
    pub url: String,
    #[serde(flatten)]
    pub response: ScoreResponse,
}

/// Replays captured responses keyed by source URL
#[derive(Debug, Clone, Default)]
pub struct ReplayScorer {
    responses: HashMap<String, ScoreResponse>,
}

impl ReplayScorer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, url: &str, response: ScoreResponse) {
        self.responses.insert(url.to_string(), response);
    }

    /// Load a JSON array of `{"url": ..., <response fields>}` objects
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to open recorded responses: {}", path.display()))?;
        let recorded: Vec<RecordedResponse> = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse recorded responses: {}", path.display()))?;

        let mut scorer = Self::new();
        for entry in recorded {
            scorer.insert(&entry.url, entry.response);
        }
        tracing::info!("Loaded {} recorded responses from {}", scorer.len(), path.display());
        Ok(scorer)
    }

    pub fn len(&self) -> usize {
        self.responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }
}

impl CriteriaScorer for ReplayScorer {
    fn score(&self, _text: &str, url: &str, _title: &str) -> Result<ScoreResponse> {
        self.responses
            .get(url)
            .cloned()
            .with_context(|| format!("No recorded response for {}", url))
    }

    fn name(&self) -> &str {
        "Replay"
    }

    fn description(&self) -> &str {
        "Replays scorer responses captured in an earlier run"
    }
}

/// Flips each criterion verdict of an inner scorer with a fixed probability
pub struct NoisyScorer<S> {
    inner: S,
    flip_probability: f64,
    rng: Mutex<ChaCha8Rng>,
}

impl<S: CriteriaScorer> NoisyScorer<S> {
    /// `flip_probability` is clamped to `[0, 1]`; NaN and infinities disable noise
    pub fn new(inner: S, flip_probability: f64, seed: u64) -> Self {
        let flip_probability = if flip_probability.is_finite() {
            flip_probability.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            inner,
            flip_probability,
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
        }
    }
}

impl<S: CriteriaScorer> CriteriaScorer for NoisyScorer<S> {
    fn score(&self, text: &str, url: &str, title: &str) -> Result<ScoreResponse> {
        let response = self.inner.score(text, url, title)?;
        if response.error.is_some() {
            return Ok(response);
        }

        let mut rng = self.rng.lock();
        let criteria_scores = response
            .criteria_scores
            .into_iter()
            .map(|(criterion, mut score)| {
                if rng.gen_bool(self.flip_probability) {
                    score.matched = !score.matched;
                }
                (criterion, score)
            })
            .collect();

        Ok(ScoreResponse::from_criteria(criteria_scores))
    }

    fn name(&self) -> &str {
        "Noisy"
    }

    fn description(&self) -> &str {
        "Randomly perturbed criterion verdicts"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NCI_CRITERIA;

    const MANIPULATIVE: &str = "BREAKING: this shocking and unprecedented event changes \
        everything. Act now before it's too late, share this immediately. It's us versus them.";
    const CREDIBLE: &str = "According to the published annual report, revenue grew by four percent \
        and officials said the figures would be revised once more data is available.";

    #[test]
    fn test_keyword_scorer_covers_catalogue() {
        let scorer = KeywordScorer::new();
        let criteria = scorer.criteria();
        assert_eq!(criteria.len(), NCI_CRITERIA.len());
        for (a, b) in criteria.iter().zip(NCI_CRITERIA.iter()) {
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_keyword_scorer_separates_classes() {
        let scorer = KeywordScorer::new();

        let manipulative = scorer.score(MANIPULATIVE, "u1", "").unwrap();
        assert!(manipulative.error.is_none());
        assert!(manipulative.aggregate_score >= 5);
        assert_eq!(manipulative.criteria_scores.len(), 20);
        assert!(manipulative.criteria_scores["overuse_of_novelty"].matched);
        assert!(manipulative.criteria_scores["tribal_division"].matched);

        let credible = scorer.score(CREDIBLE, "u2", "").unwrap();
        assert_eq!(credible.aggregate_score, 0);
        assert_eq!(credible.risk_level, "LOW");
    }

    #[test]
    fn test_keyword_scorer_rejects_short_text() {
        let response = KeywordScorer::new().score("too short", "u", "t").unwrap();
        assert_eq!(response.error.as_deref(), Some("Text too short to score"));
    }

    #[test]
    fn test_aggregate_counts_matches() {
        let mut criteria = BTreeMap::new();
        criteria.insert("a".to_string(), CriterionScore { matched: true, reason: String::new() });
        criteria.insert("b".to_string(), CriterionScore { matched: false, reason: String::new() });
        criteria.insert("c".to_string(), CriterionScore { matched: true, reason: String::new() });

        let response = ScoreResponse::from_criteria(criteria);
        assert_eq!(response.aggregate_score, 2);
        assert!(response.summary.contains("a, c"));
    }

    #[test]
    fn test_replay_scorer() {
        let mut scorer = ReplayScorer::new();
        scorer.insert("https://a", ScoreResponse::failed("timeout"));

        let replayed = scorer.score("", "https://a", "").unwrap();
        assert_eq!(replayed.error.as_deref(), Some("timeout"));
        assert!(scorer.score("", "https://missing", "").is_err());
    }

    #[test]
    fn test_replay_scorer_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("responses.json");
        std::fs::write(
            &path,
            r#"[{"url": "https://a", "aggregate_score": 2, "risk_level": "LOW",
                 "criteria_scores": {"timing": {"matched": true}, "fear": {"matched": true}}}]"#,
        )
        .expect("write");

        let scorer = ReplayScorer::from_file(&path).expect("load");
        assert_eq!(scorer.len(), 1);
        let response = scorer.score("", "https://a", "").unwrap();
        assert_eq!(response.aggregate_score, 2);
        assert!(response.criteria_scores["timing"].matched);
    }

    #[test]
    fn test_noisy_scorer_extremes() {
        let base = KeywordScorer::new().score(MANIPULATIVE, "u", "").unwrap();

        let quiet = NoisyScorer::new(KeywordScorer::new(), 0.0, 1);
        let quiet_score = quiet.score(MANIPULATIVE, "u", "").unwrap().aggregate_score;
        assert_eq!(quiet_score, base.aggregate_score);

        let inverted = NoisyScorer::new(KeywordScorer::new(), 1.0, 1);
        let flipped = inverted.score(MANIPULATIVE, "u", "").unwrap();
        assert_eq!(flipped.aggregate_score, 20 - base.aggregate_score);
    }

    #[test]
    fn test_noisy_scorer_non_finite_probability_disables_noise() {
        let base = KeywordScorer::new().score(MANIPULATIVE, "u", "").unwrap();

        for probability in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let scorer = NoisyScorer::new(KeywordScorer::new(), probability, 3);
            for _ in 0..5 {
                let response = scorer.score(MANIPULATIVE, "u", "").unwrap();
                assert_eq!(response.aggregate_score, base.aggregate_score);
            }
        }
    }
}
