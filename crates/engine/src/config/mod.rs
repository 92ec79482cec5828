pub mod types;
pub mod validate;

pub use types::*;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// Load and merge all config JSON files into a single [`FusionConfig`],
/// then apply environment variable overrides and validate.
///
/// Expected directory layout:
/// ```text
/// config/
///   app.json
///   analyzers.json
///   fusion.json
///   risk.json
/// ```
///
/// # Environment variable overrides
///
/// | Env Var                         | Config Field                                  |
/// |---------------------------------|-----------------------------------------------|
/// | `FUSION_KELLY_FRACTION`         | `risk.kelly_fraction`                         |
/// | `FUSION_MAX_RISK_PER_TRADE`     | `risk.max_risk_per_trade`                     |
/// | `FUSION_TRANSACTION_COST_PCT`   | `fusion.orchestrator.transaction_cost_pct`    |
/// | `FUSION_LOG_DIR`                | `app.logging.log_dir`                         |
/// | `FUSION_CYCLE_TIMEOUT_SECONDS`  | `app.cycle_timeout_seconds`                   |
pub fn load_config(config_dir: &Path) -> Result<FusionConfig> {
    let mut config = FusionConfig {
        app: read_json(config_dir, "app.json")?,
        analyzers: read_json(config_dir, "analyzers.json")?,
        fusion: read_json(config_dir, "fusion.json")?,
        risk: read_json(config_dir, "risk.json")?,
    };

    apply_env_overrides(&mut config);
    validate::validate_config(&config)?;

    Ok(config)
}

fn read_json<T: DeserializeOwned>(config_dir: &Path, name: &str) -> Result<T> {
    let path = config_dir.join(name);
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parsing {name}"))
}

// ---------------------------------------------------------------------------
// Environment variable overrides
// ---------------------------------------------------------------------------

/// Apply environment variable overrides to the loaded config.
///
/// Only non-empty env vars take effect. Parse failures are skipped and the
/// JSON value remains.
fn apply_env_overrides(config: &mut FusionConfig) {
    if let Some(val) = env_decimal("FUSION_KELLY_FRACTION") {
        info!(%val, "env override: FUSION_KELLY_FRACTION");
        config.risk.kelly_fraction = val;
    }

    if let Some(val) = env_decimal("FUSION_MAX_RISK_PER_TRADE") {
        info!(%val, "env override: FUSION_MAX_RISK_PER_TRADE");
        config.risk.max_risk_per_trade = val;
    }

    if let Some(val) = env_decimal("FUSION_TRANSACTION_COST_PCT") {
        info!(%val, "env override: FUSION_TRANSACTION_COST_PCT");
        config.fusion.orchestrator.transaction_cost_pct = val;
    }

    if let Some(val) = env_string("FUSION_LOG_DIR") {
        info!("env override: FUSION_LOG_DIR");
        config.app.logging.log_dir = val;
    }

    if let Some(val) = env_parse::<u64>("FUSION_CYCLE_TIMEOUT_SECONDS") {
        info!(val, "env override: FUSION_CYCLE_TIMEOUT_SECONDS");
        config.app.cycle_timeout_seconds = val;
    }
}

/// Read a non-empty env var as a `String`.
fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Read a non-empty env var and parse it as `T`.
fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|v| v.parse().ok())
}

/// Read a non-empty env var and parse it as `Decimal`.
fn env_decimal(key: &str) -> Option<Decimal> {
    env_string(key).and_then(|v| Decimal::from_str(&v).ok())
}
