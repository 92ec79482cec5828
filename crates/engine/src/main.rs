use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::info;

use fusion_engine::config;
use fusion_engine::core::orchestrator::Orchestrator;
use fusion_engine::core::runner::CycleRunner;
use fusion_engine::logging;
use fusion_engine::types::AnalysisRequest;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignore if missing).
    let _ = dotenvy::dotenv();

    let config_dir = std::env::var("FUSION_CONFIG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config"));

    let config = config::load_config(&config_dir)?;

    // Hold the guard for the process lifetime.
    let _guard = logging::init_tracing(&config.app.logging)?;

    let Some(request_path) = std::env::args().nth(1).map(PathBuf::from) else {
        bail!("usage: fusion-engine <analysis-request.json>");
    };

    let raw = std::fs::read_to_string(&request_path)
        .with_context(|| format!("failed to read request file: {}", request_path.display()))?;
    let request: AnalysisRequest = serde_json::from_str(&raw)
        .with_context(|| format!("parsing {}", request_path.display()))?;

    info!(
        symbol = %request.symbol,
        timeframe = request.timeframe.label(),
        candles = request.candles.len(),
        "fusion engine starting"
    );

    let orchestrator = Orchestrator::new(&config).context("building orchestrator")?;
    let runner = CycleRunner::new(orchestrator, Duration::from_secs(config.app.cycle_timeout_seconds));
    let result = runner.run(request).await.context("analysis cycle failed")?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
