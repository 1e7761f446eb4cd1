// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! NCI evaluation CLI
//!
//! Usage:
//!   nci-eval evaluate --dataset sources.json --threshold 6
//!   nci-eval compare --synthetic 200 --thresholds 3,6,9,12
//!   nci-eval analyze --results eval_output/eval_sources.json
//!   nci-eval stability --synthetic 50 --runs 5 --noise 0.05
//!   nci-eval sample --size 100 --output sources.json

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use nci_eval::config::EvaluationConfig;
use nci_eval::datasets::Dataset;
use nci_eval::evaluator::{save_json, EvaluationResult, Evaluator};
use nci_eval::scorer::{CriteriaScorer, KeywordScorer, NoisyScorer, ReplayScorer};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "nci-eval")]
#[command(about = "Evaluate Narrative Credibility Index scoring against labelled sources")]
#[command(version)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output directory (overrides the configuration)
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Score a dataset and compute all metrics at one threshold
    Evaluate {
        #[command(flatten)]
        input: InputArgs,

        /// Classification threshold (overrides the configuration)
        #[arg(short, long)]
        threshold: Option<u32>,
    },
    /// Score once and compare several thresholds
    Compare {
        #[command(flatten)]
        input: InputArgs,

        /// Comma-separated thresholds (default: configured comparison range)
        #[arg(long, value_delimiter = ',')]
        thresholds: Vec<u32>,
    },
    /// Advanced analysis of a saved evaluation result
    Analyze {
        /// Evaluation result JSON written by `evaluate`
        #[arg(short, long)]
        results: PathBuf,
    },
    /// Score a dataset repeatedly and report score stability
    Stability {
        #[command(flatten)]
        input: InputArgs,

        /// Number of scoring runs
        #[arg(long, default_value_t = 3)]
        runs: usize,

        /// Probability of flipping each criterion verdict per run
        #[arg(long, default_value_t = 0.0)]
        noise: f64,
    },
    /// Write a synthetic dataset
    Sample {
        #[arg(long, default_value_t = 100)]
        size: usize,

        #[arg(short, long, default_value_t = 42)]
        seed: u64,

        /// Destination file
        #[arg(long, default_value = "synthetic_sources.json")]
        path: PathBuf,
    },
}

#[derive(Args, Debug)]
struct InputArgs {
    /// Dataset JSON file
    #[arg(short, long, conflicts_with = "synthetic")]
    dataset: Option<PathBuf>,

    /// Generate a synthetic dataset of this size instead
    #[arg(long, default_value_t = 200)]
    synthetic: usize,

    /// Random seed for synthetic data and noise
    #[arg(short, long, default_value_t = 42)]
    seed: u64,

    /// Scorer to evaluate
    #[arg(long, value_enum, default_value_t = ScorerKind::Keyword)]
    scorer: ScorerKind,

    /// Recorded responses for the replay scorer
    #[arg(long, required_if_eq("scorer", "replay"))]
    responses: Option<PathBuf>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ScorerKind {
    Keyword,
    Replay,
}

impl InputArgs {
    fn dataset(&self, config: &EvaluationConfig) -> Result<Dataset> {
        match self.dataset {
            Some(ref path) => Dataset::load(path, config),
            None => {
                tracing::info!(
                    "Generating synthetic dataset: {} sources, seed {}",
                    self.synthetic,
                    self.seed
                );
                Ok(Dataset::synthetic(self.synthetic, self.seed))
            }
        }
    }

    fn scorer(&self) -> Result<Box<dyn CriteriaScorer>> {
        match self.scorer {
            ScorerKind::Keyword => Ok(Box::new(KeywordScorer::new())),
            ScorerKind::Replay => {
                let path = self
                    .responses
                    .as_ref()
                    .context("--responses is required for the replay scorer")?;
                Ok(Box::new(ReplayScorer::from_file(path)?))
            }
        }
    }
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match cli.config {
        Some(ref path) => EvaluationConfig::from_file(path)?,
        None => EvaluationConfig::default(),
    };
    if let Some(ref output) = cli.output {
        config.output_dir = output.to_string_lossy().to_string();
    }
    let output_dir = PathBuf::from(&config.output_dir);
    let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");

    match cli.command {
        Command::Evaluate { input, threshold } => {
            if let Some(threshold) = threshold {
                config.threshold = threshold;
            }
            let dataset = input.dataset(&config)?;
            let evaluator = Evaluator::new(config, input.scorer()?)?;
            let result = evaluator.evaluate(&dataset)?;

            print_evaluation(&result);
            let path = output_dir.join(format!("eval_{}_{}.json", dataset.id, timestamp));
            save_json(&result, &path)?;
            println!("\nResults saved to: {}", path.display());
        }
        Command::Compare { input, thresholds } => {
            let dataset = input.dataset(&config)?;
            let evaluator = Evaluator::new(config, input.scorer()?)?;
            let comparison = evaluator.compare_thresholds(&dataset, &thresholds)?;

            println!(
                "\n{:<10} {:>10} {:>10} {:>10} {:>10}",
                "Threshold", "Accuracy", "Precision", "Recall", "F1"
            );
            println!("{:-<54}", "");
            for analysis in &comparison.analyses {
                println!(
                    "{:<10} {:>10.4} {:>10.4} {:>10.4} {:>10.4}",
                    analysis.threshold,
                    analysis.accuracy,
                    analysis.precision,
                    analysis.recall,
                    analysis.f1_score
                );
            }
            println!("{:-<54}", "");
            for optimal in &comparison.optimal_thresholds {
                println!("Optimal ({}): {}", optimal.objective, optimal.threshold);
            }

            let path = output_dir.join(format!("compare_{}_{}.json", dataset.id, timestamp));
            save_json(&comparison, &path)?;
            println!("\nComparison saved to: {}", path.display());
        }
        Command::Analyze { results } => {
            let result = load_result(&results)?;
            let evaluator = Evaluator::new(config, KeywordScorer::new())?;
            let analysis =
                evaluator.advanced_analysis(&result.scoring_results, result.metadata.threshold)?;

            println!("\nTop criteria by F1:");
            for metrics in analysis.criterion_metrics.iter().take(5) {
                println!(
                    "  {:<28} F1={:.4} prevalence={:.2}",
                    metrics.criterion, metrics.f1_score, metrics.prevalence
                );
            }
            if let Some(auc) = analysis.threshold_sweep.roc.auc {
                println!("\nROC AUC: {:.4}", auc);
            }
            for pattern in analysis.correlation.common_patterns.iter().take(5) {
                println!(
                    "  {} + {}: lift {:.2} ({} sources)",
                    pattern.criteria[0], pattern.criteria[1], pattern.lift, pattern.count
                );
            }
            println!(
                "\nErrors at threshold {}: {} false positives, {} false negatives",
                analysis.threshold,
                analysis.error_analysis.false_positives.count,
                analysis.error_analysis.false_negatives.count
            );

            let json_path = output_dir.join(format!("advanced_{}.json", timestamp));
            save_json(&analysis, &json_path)?;
            let csv_path = output_dir.join(format!("threshold_sweep_{}.csv", timestamp));
            analysis.threshold_sweep.write_csv(&csv_path)?;
            println!("\nAnalysis saved to: {} and {}", json_path.display(), csv_path.display());
        }
        Command::Stability { input, runs, noise } => {
            let dataset = input.dataset(&config)?;
            let scorer = input.scorer()?;
            let evaluator = if noise > 0.0 {
                Evaluator::new(config, NoisyScorer::new(scorer, noise, input.seed))?
            } else {
                Evaluator::new(config, scorer)?
            };
            let report = evaluator.stability_test(&dataset, runs)?;

            println!(
                "\nStable sources: {}/{} ({:.1}%), mean CV {:.4}",
                report.stable_sources,
                report.results.len(),
                report.stable_fraction() * 100.0,
                report.mean_cv
            );

            let path = output_dir.join(format!("stability_{}_{}.json", dataset.id, timestamp));
            save_json(&report, &path)?;
            println!("Stability report saved to: {}", path.display());
        }
        Command::Sample { size, seed, path } => {
            let dataset = Dataset::synthetic(size, seed);
            dataset.save(&path)?;
            println!("Wrote {} synthetic sources to {}", dataset.len(), path.display());
        }
    }

    Ok(())
}

fn load_result(path: &Path) -> Result<EvaluationResult> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to open results: {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse results: {}", path.display()))
}

fn print_evaluation(result: &EvaluationResult) {
    println!("\n{}", "=".repeat(60));
    println!("NCI EVALUATION: {} ({})", result.metadata.dataset_id, result.metadata.scorer);
    println!("{}", "=".repeat(60));
    println!(
        "Sources: {} scored, {} failed",
        result.metadata.successfully_scored, result.metadata.failed
    );
    println!("\n{}", result.classification_metrics.format());
    println!(
        "\nCalibration: Brier={:.4}, ECE={:.4}, MCE={:.4}",
        result.calibration_metrics.brier_score,
        result.calibration_metrics.expected_calibration_error,
        result.calibration_metrics.max_calibration_error
    );
    println!("\nMost predictive criteria:");
    for metrics in result.criterion_metrics.iter().take(5) {
        println!("  {:<28} F1={:.4}", metrics.criterion, metrics.f1_score);
    }
}
