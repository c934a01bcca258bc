// Crop Recommendation Binary Entry Point
//
// Purpose: rank candidate crops for one JSON request read from stdin; the
// JSON response goes to stdout. Exit status reflects only process-level
// failure (an unparsable request body).
// Usage: echo '{"state":"punjab",...}' | cargo run --bin predict_crops

use crop_advisor_rust::{InferenceFacade, JitterSource, RawInput};
use std::io::Read;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_TOP_K: usize = 5;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crop_advisor_rust=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut body = String::new();
    std::io::stdin().read_to_string(&mut body)?;

    let input: RawInput = match serde_json::from_str(&body) {
        Ok(input) => input,
        Err(err) => {
            println!(
                "{}",
                serde_json::json!({ "success": false, "error": format!("Invalid request body: {}", err) })
            );
            std::process::exit(1);
        }
    };

    let top_k = std::env::var("CROP_ADVISOR_TOP_K")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_TOP_K);

    let models_dir = PathBuf::from(
        std::env::var("CROP_ADVISOR_MODELS").unwrap_or_else(|_| "trained_models".to_string()),
    );
    let facade = InferenceFacade::load(&models_dir, JitterSource::from_entropy());

    let response = facade.recommend_crops(&input, top_k);
    println!("{}", serde_json::to_string(&response)?);
    Ok(())
}
