// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Dataset loading, validation and synthetic generation for NCI evaluation
//!
//! Datasets are JSON arrays of source objects. Validation inspects the raw
//! JSON so that every violation in the file is reported at once, before any
//! source is sent to a scorer.

use crate::config::EvaluationConfig;
use crate::error::{EvalError, Result as EvalResult};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;

/// Ground-truth class of a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    /// Positive class: the source uses narrative manipulation
    Manipulative,
    /// Negative class
    Credible,
}

impl Label {
    /// 1 for manipulative, 0 for credible
    pub fn to_binary(&self) -> u8 {
        match self {
            Label::Manipulative => 1,
            Label::Credible => 0,
        }
    }

    pub fn is_manipulative(&self) -> bool {
        *self == Label::Manipulative
    }

    /// Label predicted for a score under the `score >= threshold` rule
    pub fn predicted(score: u32, threshold: u32) -> Self {
        if score >= threshold {
            Label::Manipulative
        } else {
            Label::Credible
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "manipulative" => Some(Label::Manipulative),
            "credible" => Some(Label::Credible),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Manipulative => "manipulative",
            Label::Credible => "credible",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single source to be scored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceEntry {
    pub text: String,
    pub url: String,
    pub title: String,
    pub ground_truth_label: Label,
    /// Provenance tag
    pub source_dataset: String,
    /// Expert-assigned reference score, reporting only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ground_truth_score: Option<u32>,
    #[serde(
        default,
        deserialize_with = "null_as_empty",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub metadata: BTreeMap<String, Value>,
}

/// `"metadata": null` reads as an empty map
fn null_as_empty<'de, D>(
    deserializer: D,
) -> std::result::Result<BTreeMap<String, Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<BTreeMap<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

impl SourceEntry {
    pub fn new(text: &str, url: &str, title: &str, label: Label) -> Self {
        Self {
            text: text.to_string(),
            url: url.to_string(),
            title: title.to_string(),
            ground_truth_label: label,
            source_dataset: "manual".to_string(),
            ground_truth_score: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_ground_truth_score(mut self, score: u32) -> Self {
        self.ground_truth_score = Some(score);
        self
    }
}

const REQUIRED_FIELDS: [&str; 5] = ["text", "url", "title", "ground_truth_label", "source_dataset"];

/// Outcome of dataset validation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    pub total_sources: usize,
    /// Fatal violations
    pub errors: Vec<String>,
    /// Non-fatal observations
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Turn a report with errors into `EvalError::InvalidDataset`
    pub fn into_result(self) -> EvalResult<Vec<String>> {
        if self.errors.is_empty() {
            Ok(self.warnings)
        } else {
            Err(EvalError::InvalidDataset { violations: self.errors })
        }
    }
}

/// Validate raw JSON sources, collecting every violation
pub fn validate_sources(
    values: &[Value],
    max_score: u32,
    min_text_length: usize,
) -> ValidationReport {
    let mut report = ValidationReport {
        total_sources: values.len(),
        ..Default::default()
    };

    for (i, value) in values.iter().enumerate() {
        let Some(source) = value.as_object() else {
            report.errors.push(format!("Source {}: Not a JSON object", i));
            continue;
        };

        for field in REQUIRED_FIELDS {
            match source.get(field) {
                None => report
                    .errors
                    .push(format!("Source {}: Missing required field '{}'", i, field)),
                Some(v) if !v.is_string() => {
                    report.errors.push(format!("Source {}: Field '{}' must be a string", i, field))
                }
                Some(_) => {}
            }
        }

        if let Some(label) = source.get("ground_truth_label").and_then(Value::as_str) {
            if Label::parse(label).is_none() {
                report.errors.push(format!(
                    "Source {}: Invalid ground_truth_label '{}' \
                     (expected 'manipulative' or 'credible')",
                    i, label
                ));
            }
        }

        if let Some(text) = source.get("text").and_then(Value::as_str) {
            if text.chars().count() < min_text_length {
                report.warnings.push(format!("Source {}: Text is very short", i));
            }
        }

        match source.get("metadata") {
            None | Some(Value::Null) | Some(Value::Object(_)) => {}
            Some(_) => report
                .errors
                .push(format!("Source {}: Field 'metadata' must be an object", i)),
        }

        match source.get("ground_truth_score") {
            None | Some(Value::Null) => {}
            Some(score) => match score.as_u64() {
                Some(s) if s <= max_score as u64 => {}
                _ => report.errors.push(format!(
                    "Source {}: ground_truth_score must be an integer in 0-{}",
                    i, max_score
                )),
            },
        }
    }

    report
}

/// A loaded dataset ready for evaluation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub id: String,
    pub sources: Vec<SourceEntry>,
}

impl Dataset {
    pub fn new(id: &str, sources: Vec<SourceEntry>) -> Self {
        Self {
            id: id.to_string(),
            sources,
        }
    }

    /// Build a dataset from raw JSON values, failing with every violation found.
    ///
    /// Warnings are not logged here; `Evaluator` reports them before scoring.
    pub fn from_json_values(
        id: &str,
        values: Vec<Value>,
        config: &EvaluationConfig,
    ) -> EvalResult<Self> {
        validate_sources(&values, config.max_score, config.min_text_length).into_result()?;

        let sources = values
            .into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<Vec<SourceEntry>, _>>()?;

        Ok(Self::new(id, sources))
    }

    /// Load a dataset from a JSON file
    pub fn load(path: &Path, config: &EvaluationConfig) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to open dataset file: {}", path.display()))?;
        let parsed: Value = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse dataset file: {}", path.display()))?;
        let Value::Array(values) = parsed else {
            anyhow::bail!("Dataset file {} must contain a JSON array", path.display());
        };

        let id = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "dataset".to_string());

        let dataset = Self::from_json_values(&id, values, config)?;
        tracing::info!("Loaded {} sources from {}", dataset.len(), path.display());
        Ok(dataset)
    }

    /// Save the dataset as a pretty-printed JSON array
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.sources)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write dataset: {}", path.display()))?;
        Ok(())
    }

    /// Validate typed sources (score range and text length)
    pub fn validate(&self, config: &EvaluationConfig) -> ValidationReport {
        let mut report = ValidationReport {
            total_sources: self.sources.len(),
            ..Default::default()
        };

        for (i, source) in self.sources.iter().enumerate() {
            if let Some(score) = source.ground_truth_score {
                if score > config.max_score {
                    report.errors.push(format!(
                        "Source {}: ground_truth_score must be an integer in 0-{}",
                        i, config.max_score
                    ));
                }
            }
            if source.text.chars().count() < config.min_text_length {
                report.warnings.push(format!("Source {}: Text is very short", i));
            }
        }

        report
    }

    /// SHA-256 of the canonical JSON encoding of the sources
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        match serde_json::to_vec(&self.sources) {
            Ok(bytes) => hasher.update(&bytes),
            Err(e) => tracing::warn!("Could not encode dataset for fingerprinting: {}", e),
        }
        format!("{:x}", hasher.finalize())
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Number of sources per ground-truth label
    pub fn label_distribution(&self) -> HashMap<Label, usize> {
        let mut dist = HashMap::new();
        for source in &self.sources {
            *dist.entry(source.ground_truth_label).or_insert(0) += 1;
        }
        dist
    }

    /// Generate a seeded synthetic dataset for pipeline testing
    pub fn synthetic(size: usize, seed: u64) -> Self {
        use rand::seq::SliceRandom;
        use rand::{Rng, SeedableRng};
        use rand_chacha::ChaCha8Rng;

        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        let manipulative_phrases = [
            "BREAKING: this shocking and unprecedented event changes everything.",
            "Act now before it's too late, share this immediately.",
            "They don't want you to know what the mainstream media is hiding.",
            "It's us versus them, and the elites have chosen their side.",
            "Everyone is already switching sides, don't be left behind.",
            "There are only two options: total surrender or fight back.",
            "This is outrageous and people are furious about it.",
            "Critics are being silenced and labelled traitors for asking questions.",
            "Just like in 1938, history is repeating itself right in front of us.",
            "Top experts agree and dozens of authorities confirm it.",
            "Big corporations will profit enormously from this decision.",
            "The numbers prove it: 9 out of 10 cases show the cover-up.",
            "It is a battle between good and evil, pure and simple.",
            "Suddenly everyone is wearing the symbol overnight.",
            "Fear and anger, fear and anger, that is what they want you to feel.",
        ];

        let credible_phrases = [
            "According to the published annual report, revenue grew by four percent.",
            "The city council voted on the budget proposal after a public hearing.",
            "Researchers noted several limitations and called for further study.",
            "Officials said the figures would be revised once more data is available.",
            "The study, which was peer reviewed, compared outcomes across three regions.",
            "Opponents of the measure argued that costs had been underestimated.",
            "The weather service expects moderate rainfall over the weekend.",
            "Both proposals include trade-offs that analysts described in detail.",
        ];

        let sources = (0..size)
            .map(|i| {
                let is_manipulative = rng.gen_bool(0.5);
                let text = if is_manipulative {
                    let count = rng.gen_range(3..=7);
                    manipulative_phrases
                        .choose_multiple(&mut rng, count)
                        .copied()
                        .collect::<Vec<_>>()
                        .join(" ")
                } else {
                    let count = rng.gen_range(2..=4);
                    let mut parts: Vec<&str> = credible_phrases
                        .choose_multiple(&mut rng, count)
                        .copied()
                        .collect();
                    // Occasional borrowed framing keeps the classes from separating perfectly
                    if rng.gen_bool(0.2) {
                        if let Some(phrase) = manipulative_phrases.choose(&mut rng) {
                            parts.push(*phrase);
                        }
                    }
                    parts.join(" ")
                };

                let label = if is_manipulative {
                    Label::Manipulative
                } else {
                    Label::Credible
                };

                SourceEntry {
                    text,
                    url: format!("https://synthetic.example/{}", i),
                    title: format!("Synthetic source {}", i),
                    ground_truth_label: label,
                    source_dataset: "synthetic".to_string(),
                    ground_truth_score: None,
                    metadata: BTreeMap::new(),
                }
            })
            .collect();

        Self::new("synthetic", sources)
    }
}
