//! Speech-quality evaluation CLI.
//!
//! Matches every `.wav` under the clean directory with its counterpart in
//! the degraded directory (same relative path) and reports average PESQ and
//! STOI over all pairs, scored in parallel across all cores.
//!
//! # Output
//!
//! One `[RESULT]` line per metric on stdout. Exit code 0 on success,
//! non-zero on error (including zero matched pairs).

use clap::Parser;
use std::path::PathBuf;
use vc_data_rs::metrics::{collect_pairs, evaluate_pairs};

#[derive(Parser, Debug)]
#[command(
    name = "vc-eval",
    about = "Average PESQ/STOI between clean and degraded wav trees",
    long_about = "Recursively pairs wav files by relative path between a clean\n\
                  reference directory and a degraded/processed directory, then\n\
                  reports the arithmetic mean of PESQ and STOI over all pairs."
)]
struct Args {
    /// Directory of clean reference wav files.
    clean_dir: PathBuf,

    /// Directory of degraded/processed wav files (must differ from clean_dir).
    noisy_dir: PathBuf,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    tracing::info!("Task: speech-quality evaluation (PESQ/STOI)");
    tracing::info!("clean_dir: {}", args.clean_dir.display());
    tracing::info!("noisy_dir: {}", args.noisy_dir.display());

    let pairs = collect_pairs(&args.clean_dir, &args.noisy_dir)
        .map_err(|e| anyhow::anyhow!("pair collection failed: {e}"))?;

    tracing::info!(
        "Scoring {} pairs on {} threads",
        pairs.len(),
        rayon::current_num_threads()
    );

    let report =
        evaluate_pairs(&pairs).map_err(|e| anyhow::anyhow!("evaluation failed: {e}"))?;

    println!(
        "[RESULT] average PESQ of {} wav files : {:.4}",
        report.n_files, report.pesq_avg
    );
    println!(
        "[RESULT] average STOI of {} wav files : {:.4}",
        report.n_files, report.stoi_avg
    );

    Ok(())
}
