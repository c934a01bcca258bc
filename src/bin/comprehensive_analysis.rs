// Comprehensive Analysis Binary Entry Point
//
// Purpose: yield prediction plus crop recommendations plus a one-line
// summary for one JSON request read from stdin; the JSON response goes to
// stdout. A failing half is flagged in the response while the other half is
// still returned.
// Usage: echo '{"state":"punjab",...}' | cargo run --bin comprehensive_analysis

use crop_advisor_rust::{InferenceFacade, JitterSource, RawInput};
use std::io::Read;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

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

    let models_dir = PathBuf::from(
        std::env::var("CROP_ADVISOR_MODELS").unwrap_or_else(|_| "trained_models".to_string()),
    );
    let facade = InferenceFacade::load(&models_dir, JitterSource::from_entropy());

    let response = facade.comprehensive(&input);
    println!("{}", serde_json::to_string(&response)?);
    Ok(())
}
