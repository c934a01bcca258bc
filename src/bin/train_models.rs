// Model Training Binary Entry Point
//
// Purpose: run the full training pipeline on an already-generated dataset
// (JSON array of records carrying the input schema plus `average_yield` and
// `crop` labels) and persist both bundles. The training summary is written to
// stdout as JSON.
// Usage: cargo run --bin train_models -- dataset.json [models_dir]

use anyhow::{bail, Context, Result};
use crop_advisor_rust::pipeline;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crop_advisor_rust=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut args = std::env::args().skip(1);
    let Some(dataset_path) = args.next() else {
        bail!("Usage: train_models <dataset.json> [models_dir]");
    };
    let models_dir = PathBuf::from(args.next().unwrap_or_else(|| "trained_models".to_string()));

    let records = pipeline::load_records(&PathBuf::from(&dataset_path))
        .with_context(|| format!("Loading dataset from {}", dataset_path))?;
    tracing::info!(records = records.len(), "loaded dataset");

    let summary = pipeline::train_from_records(&records, &models_dir)?;

    tracing::info!(
        features = summary.n_features,
        ensemble_r2 = summary.ensemble.as_ref().map(|e| e.ensemble_r2),
        "training complete"
    );
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
