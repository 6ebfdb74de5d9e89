//! Offline retrain job: base corpus + feedback log → next artifact generation.
//! Also bootstraps generation 1 on a fresh checkout.
//!
//! The running service picks the new pair up via `POST /admin/reload-artifacts`.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use hoax_detector::artifacts::ArtifactStore;
use hoax_detector::config::{DetectorConfig, ENV_DETECTOR_CONFIG_PATH};
use hoax_detector::error::Error;
use hoax_detector::retrain::retrain;

#[derive(Parser)]
#[command(name = "retrain")]
#[command(about = "Refit the hoax classifier from the base corpus plus user feedback.")]
#[command(version)]
struct Cli {
    /// Detector config (TOML); missing file means defaults
    #[arg(long, env = ENV_DETECTOR_CONFIG_PATH)]
    config: Option<PathBuf>,
    /// Override `[paths].base_corpus`
    #[arg(long)]
    base: Option<PathBuf>,
    /// Override `[paths].feedback_log`
    #[arg(long)]
    feedback: Option<PathBuf>,
    /// Override `[paths].artifacts_dir`
    #[arg(long)]
    artifacts: Option<PathBuf>,
    /// Override `[training].holdout_fraction` (0 disables evaluation)
    #[arg(long)]
    holdout: Option<f64>,
    /// Print the report as JSON on stdout
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    hoax_detector::init_tracing();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("retrain failed: {e:#}");
            // 2 = someone else is retraining; safe to try again later.
            match e.downcast_ref::<Error>() {
                Some(Error::RetrainInProgress) => ExitCode::from(2),
                _ => ExitCode::FAILURE,
            }
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let cfg = match &cli.config {
        Some(path) if path.exists() => DetectorConfig::load_from_file(path)?,
        Some(path) => {
            tracing::info!(path = %path.display(), "config not found, using defaults");
            DetectorConfig::default()
        }
        None => DetectorConfig::load_default()?,
    };

    let base = cli.base.unwrap_or(cfg.paths.base_corpus.clone());
    let feedback = cli.feedback.unwrap_or(cfg.paths.feedback_log.clone());
    let store = ArtifactStore::new(cli.artifacts.unwrap_or(cfg.paths.artifacts_dir.clone()));

    let mut opts = cfg.retrain_options();
    if let Some(h) = cli.holdout.filter(|h| h.is_finite()) {
        opts.holdout_fraction = h.clamp(0.0, 0.5);
    }

    let (_, report) = retrain(&base, &feedback, &store, &opts)?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("encoding report")?
        );
    } else {
        println!(
            "generation {} committed: {} rows ({} valid / {} hoax), vocabulary {}",
            report.generation,
            report.total_rows,
            report.valid_rows,
            report.hoax_rows,
            report.vocabulary_size
        );
        println!(
            "  base {} (+{} skipped), feedback {} (+{} excluded), {} duplicates collapsed",
            report.base_rows,
            report.base_skipped,
            report.feedback_used,
            report.feedback_excluded,
            report.duplicates_collapsed
        );
        if let Some(acc) = report.holdout_accuracy {
            println!("  holdout accuracy {:.3}", acc);
        }
    }
    Ok(())
}
