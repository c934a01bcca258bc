// Yield Prediction Binary Entry Point
//
// Purpose: predict crop yield for one JSON request read from stdin; the JSON
// response goes to stdout. Exit status reflects only process-level failure
// (an unparsable request body); prediction-level failures are encoded in the
// response itself.
// Usage: echo '{"state":"punjab",...}' | cargo run --bin predict_yield

use crop_advisor_rust::{InferenceFacade, JitterSource, RawInput};
use std::io::Read;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> anyhow::Result<()> {
    // Structured logging on stderr; stdout is the response channel
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

    let models_dir = PathBuf::from(
        std::env::var("CROP_ADVISOR_MODELS").unwrap_or_else(|_| "trained_models".to_string()),
    );
    let facade = InferenceFacade::load(&models_dir, JitterSource::from_entropy());

    let response = facade.predict_yield(&input);
    println!("{}", serde_json::to_string(&response)?);
    Ok(())
}
