use anyhow::{bail, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::types::{
    CombinerConfig, DivergenceConfig, FusionConfig, IndicatorParams, ModuleWeights,
    OrchestratorConfig, RegimeConfig, RetracementConfig, RiskConfig, StructureConfig,
};
use crate::constants::{DIVERGENCE_MIN_ANGLE_FLOOR, DIVERGENCE_MIN_PERIOD_FLOOR};
use crate::errors::EngineError;

/// Validate invariants across the merged config that serde alone cannot enforce.
///
/// Called automatically by [`super::load_config`]. Every violation is
/// collected so a single run reports all of them.
pub fn validate_config(config: &FusionConfig) -> Result<()> {
    let mut errors: Vec<String> = Vec::new();

    if config.app.cycle_timeout_seconds == 0 {
        errors.push("app: cycle_timeout_seconds must be > 0".into());
    }
    if config.app.logging.log_dir.is_empty() {
        errors.push("app.logging: log_dir is empty".into());
    }

    validate_indicators(&config.analyzers.indicators, &mut errors);
    validate_regime(&config.analyzers.regime, &mut errors);
    validate_divergence(&config.analyzers.divergence, &mut errors);
    validate_structure(&config.analyzers.structure, &mut errors);
    validate_retracement(&config.analyzers.retracement, &mut errors);
    validate_weights(&config.fusion.weights, &mut errors);
    validate_combiner(&config.fusion.combiner, &mut errors);
    validate_orchestrator(&config.fusion.orchestrator, &mut errors);
    validate_risk(&config.risk, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        let msg = format!(
            "Configuration validation failed ({} error{}):\n  - {}",
            errors.len(),
            if errors.len() == 1 { "" } else { "s" },
            errors.join("\n  - ")
        );
        bail!("{msg}");
    }
}

/// Run one section validator and convert its findings into an [`EngineError`].
///
/// Component constructors use this to re-check the slice they were given.
pub fn check_section<T>(
    section: &T,
    validator: fn(&T, &mut Vec<String>),
) -> std::result::Result<(), EngineError> {
    let mut errors = Vec::new();
    validator(section, &mut errors);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(EngineError::Config(errors.join("; ")))
    }
}

fn in_unit_interval(v: Decimal) -> bool {
    v >= Decimal::ZERO && v <= dec!(1)
}

// ---------------------------------------------------------------------------
// Analyzers
// ---------------------------------------------------------------------------

pub fn validate_indicators(p: &IndicatorParams, errors: &mut Vec<String>) {
    let periods = [
        ("ema_fast", p.ema_fast),
        ("ema_slow", p.ema_slow),
        ("ema_trend", p.ema_trend),
        ("rsi_period", p.rsi_period),
        ("macd_fast", p.macd_fast),
        ("macd_slow", p.macd_slow),
        ("macd_signal", p.macd_signal),
        ("bb_period", p.bb_period),
        ("atr_period", p.atr_period),
        ("volume_avg_period", p.volume_avg_period),
    ];
    for (name, value) in periods {
        if value == 0 {
            errors.push(format!("analyzers.indicators: {name} must be > 0"));
        }
    }
    if p.macd_fast >= p.macd_slow {
        errors.push(format!(
            "analyzers.indicators: macd_fast ({}) must be < macd_slow ({})",
            p.macd_fast, p.macd_slow
        ));
    }
    if p.bb_std <= Decimal::ZERO {
        errors.push("analyzers.indicators: bb_std must be > 0".into());
    }
}

pub fn validate_regime(r: &RegimeConfig, errors: &mut Vec<String>) {
    for (name, value) in [
        ("atr_period", r.atr_period),
        ("adx_period", r.adx_period),
        ("rsi_period", r.rsi_period),
        ("macd_signal", r.macd_signal),
        ("percentile_window", r.percentile_window),
        ("expansion_lookback", r.expansion_lookback),
        ("history_capacity", r.history_capacity),
    ] {
        if value == 0 {
            errors.push(format!("analyzers.regime: {name} must be > 0"));
        }
    }
    if r.macd_fast >= r.macd_slow {
        errors.push("analyzers.regime: macd_fast must be < macd_slow".into());
    }
    if r.min_candles < 2 * r.adx_period + 1 {
        errors.push(format!(
            "analyzers.regime: min_candles ({}) must cover two ADX periods",
            r.min_candles
        ));
    }
    if r.volatility_edges_pct.windows(2).any(|w| w[0] >= w[1])
        || r.volatility_edges_pct[0] <= Decimal::ZERO
    {
        errors.push("analyzers.regime: volatility_edges_pct must be positive and strictly ascending".into());
    }
    if r.adx_transitioning >= r.adx_trending {
        errors.push(format!(
            "analyzers.regime: adx_transitioning ({}) must be < adx_trending ({})",
            r.adx_transitioning, r.adx_trending
        ));
    }
    if r.rsi_extreme_low >= r.rsi_extreme_high || r.exhaustion_rsi_low >= r.exhaustion_rsi_high {
        errors.push("analyzers.regime: RSI low thresholds must be below high thresholds".into());
    }
    let base = &r.adaptive_base;
    if base.rsi_oversold >= base.rsi_overbought {
        errors.push("analyzers.regime.adaptive_base: rsi_oversold must be < rsi_overbought".into());
    }
    if base.stop_loss_multiplier <= Decimal::ZERO || base.take_profit_multiplier <= Decimal::ZERO {
        errors.push("analyzers.regime.adaptive_base: ATR multipliers must be > 0".into());
    }
}

pub fn validate_divergence(d: &DivergenceConfig, errors: &mut Vec<String>) {
    for (name, value) in [
        ("rsi_period", d.rsi_period),
        ("stoch_k", d.stoch_k),
        ("stoch_d", d.stoch_d),
        ("swing_order", d.swing_order),
        ("target_window", d.target_window),
    ] {
        if value == 0 {
            errors.push(format!("analyzers.divergence: {name} must be > 0"));
        }
    }
    if d.macd_fast >= d.macd_slow {
        errors.push("analyzers.divergence: macd_fast must be < macd_slow".into());
    }
    if d.min_period < DIVERGENCE_MIN_PERIOD_FLOOR {
        errors.push(format!(
            "analyzers.divergence: min_period ({}) must be >= {DIVERGENCE_MIN_PERIOD_FLOOR}",
            d.min_period
        ));
    }
    if d.min_angle_diff < DIVERGENCE_MIN_ANGLE_FLOOR {
        errors.push(format!(
            "analyzers.divergence: min_angle_diff ({}) must be >= {DIVERGENCE_MIN_ANGLE_FLOOR}",
            d.min_angle_diff
        ));
    }
    if !in_unit_interval(d.invalidation_pct) {
        errors.push("analyzers.divergence: invalidation_pct must be in [0, 1]".into());
    }
}

pub fn validate_structure(s: &StructureConfig, errors: &mut Vec<String>) {
    if s.swing_window == 0 {
        errors.push("analyzers.structure: swing_window must be > 0".into());
    }
    if s.max_order_blocks == 0 || s.max_fvgs == 0 || s.max_liquidity_zones == 0 {
        errors.push("analyzers.structure: retention limits must be > 0".into());
    }
    if s.watch_threshold >= s.signal_threshold {
        errors.push(format!(
            "analyzers.structure: watch_threshold ({}) must be < signal_threshold ({})",
            s.watch_threshold, s.signal_threshold
        ));
    }
    if s.order_block_min_move < Decimal::ZERO || s.fvg_min_gap_pct < Decimal::ZERO {
        errors.push("analyzers.structure: minimum sizes must be >= 0".into());
    }
}

pub fn validate_retracement(r: &RetracementConfig, errors: &mut Vec<String>) {
    if r.swing_order == 0 {
        errors.push("analyzers.retracement: swing_order must be > 0".into());
    }
    if r.watch_threshold >= r.signal_threshold {
        errors.push(format!(
            "analyzers.retracement: watch_threshold ({}) must be < signal_threshold ({})",
            r.watch_threshold, r.signal_threshold
        ));
    }
    if r.level_tolerance_pct <= Decimal::ZERO {
        errors.push("analyzers.retracement: level_tolerance_pct must be > 0".into());
    }
}

// ---------------------------------------------------------------------------
// Fusion
// ---------------------------------------------------------------------------

pub fn validate_weights(w: &ModuleWeights, errors: &mut Vec<String>) {
    for (name, weight) in w.entries() {
        if weight < Decimal::ZERO {
            errors.push(format!("fusion.weights: {name} ({weight}) must be >= 0"));
        }
    }
    let sum = w.sum();
    if (sum - dec!(1)).abs() > dec!(0.0001) {
        errors.push(format!("fusion.weights: weights must sum to 1.0, got {sum}"));
    }
}

pub fn validate_combiner(c: &CombinerConfig, errors: &mut Vec<String>) {
    if c.opportunity_threshold <= Decimal::ZERO || c.opportunity_threshold > dec!(1) {
        errors.push("fusion.combiner: opportunity_threshold must be in (0, 1]".into());
    }
    if c.rsi_oversold > c.rsi_near_oversold || c.rsi_near_oversold >= c.rsi_near_overbought
        || c.rsi_near_overbought > c.rsi_overbought
    {
        errors.push("fusion.combiner: RSI thresholds must be ordered oversold <= near_oversold < near_overbought <= overbought".into());
    }
    if c.medium_risk_score >= c.high_risk_score {
        errors.push("fusion.combiner: medium_risk_score must be < high_risk_score".into());
    }
    if c.elevated_volatility_pct >= c.high_volatility_pct {
        errors.push("fusion.combiner: elevated_volatility_pct must be < high_volatility_pct".into());
    }
    if !in_unit_interval(c.pattern_priority_confidence) {
        errors.push("fusion.combiner: pattern_priority_confidence must be in [0, 1]".into());
    }
}

pub fn validate_orchestrator(o: &OrchestratorConfig, errors: &mut Vec<String>) {
    if o.signal_threshold <= Decimal::ZERO || o.signal_threshold >= dec!(1) {
        errors.push("fusion.orchestrator: signal_threshold must be in (0, 1)".into());
    }
    for (name, v) in [
        ("extreme_volatility_derate", o.extreme_volatility_derate),
        ("high_risk_min_confidence", o.high_risk_min_confidence),
        ("squeeze_min_confidence", o.squeeze_min_confidence),
        ("below_threshold_derate", o.below_threshold_derate),
        ("max_cost_penalty", o.max_cost_penalty),
        ("cost_hold_confidence", o.cost_hold_confidence),
        ("high_currency_risk_tightening", o.high_currency_risk_tightening),
    ] {
        if !in_unit_interval(v) {
            errors.push(format!("fusion.orchestrator: {name} ({v}) must be in [0, 1]"));
        }
    }
    if o.dip_peak_boost < dec!(1) {
        errors.push("fusion.orchestrator: dip_peak_boost must be >= 1".into());
    }
    if o.transaction_cost_pct < Decimal::ZERO {
        errors.push("fusion.orchestrator: transaction_cost_pct must be >= 0".into());
    }
    if o.stop_atr_multiplier <= Decimal::ZERO || o.take_profit_atr_multiplier <= Decimal::ZERO {
        errors.push("fusion.orchestrator: ATR multipliers must be > 0".into());
    }
    if o.lot_size <= Decimal::ZERO || o.lot_step <= Decimal::ZERO {
        errors.push("fusion.orchestrator: lot_size and lot_step must be > 0".into());
    }
}

// ---------------------------------------------------------------------------
// Risk
// ---------------------------------------------------------------------------

pub fn validate_risk(r: &RiskConfig, errors: &mut Vec<String>) {
    for (name, v) in [
        ("kelly_fraction", r.kelly_fraction),
        ("max_risk_per_trade", r.max_risk_per_trade),
        ("max_portfolio_risk", r.max_portfolio_risk),
        ("max_drawdown", r.max_drawdown),
        ("default_win_rate", r.default_win_rate),
    ] {
        if !in_unit_interval(v) {
            errors.push(format!("risk: {name} ({v}) must be in [0, 1]"));
        }
    }
    if r.max_risk_per_trade > r.max_portfolio_risk {
        errors.push(format!(
            "risk: max_risk_per_trade ({}) must be <= max_portfolio_risk ({})",
            r.max_risk_per_trade, r.max_portfolio_risk
        ));
    }
    if r.history_capacity == 0 {
        errors.push("risk: history_capacity must be > 0".into());
    }
    if r.min_trades_for_stats > r.history_capacity {
        errors.push("risk: min_trades_for_stats must not exceed history_capacity".into());
    }
    if r.default_win_loss_ratio <= Decimal::ZERO {
        errors.push("risk: default_win_loss_ratio must be > 0".into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&FusionConfig::default()).is_ok());
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let mut config = FusionConfig::default();
        config.fusion.weights.regime = dec!(0.30);
        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("must sum to 1.0"), "got: {err}");
    }

    #[test]
    fn test_errors_are_aggregated() {
        let mut config = FusionConfig::default();
        config.risk.kelly_fraction = dec!(1.5);
        config.analyzers.structure.watch_threshold = dec!(70);
        config.app.cycle_timeout_seconds = 0;
        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("3 errors"), "got: {err}");
        assert!(err.contains("kelly_fraction"));
        assert!(err.contains("watch_threshold"));
    }

    #[test]
    fn test_unordered_volatility_edges_rejected() {
        let mut regime = RegimeConfig::default();
        regime.volatility_edges_pct = [dec!(0.5), dec!(2.0), dec!(1.0), dec!(3.5)];
        let err = check_section(&regime, validate_regime).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn test_check_section_passes_defaults() {
        assert!(check_section(&RiskConfig::default(), validate_risk).is_ok());
        assert!(check_section(&CombinerConfig::default(), validate_combiner).is_ok());
        assert!(check_section(&OrchestratorConfig::default(), validate_orchestrator).is_ok());
    }

    #[test]
    fn test_divergence_period_floor_enforced() {
        let divergence = DivergenceConfig {
            min_period: 5,
            ..DivergenceConfig::default()
        };
        let err = check_section(&divergence, validate_divergence).unwrap_err();
        assert!(matches!(&err, EngineError::Config(msg) if msg.contains("min_period (5)")), "got: {err}");
    }

    #[test]
    fn test_divergence_angle_floor_enforced() {
        let divergence = DivergenceConfig {
            min_angle_diff: dec!(4.9),
            ..DivergenceConfig::default()
        };
        let err = check_section(&divergence, validate_divergence).unwrap_err();
        assert!(matches!(&err, EngineError::Config(msg) if msg.contains("min_angle_diff (4.9)")), "got: {err}");
    }

    #[test]
    fn test_divergence_floors_may_be_raised() {
        let divergence = DivergenceConfig {
            min_period: 15,
            min_angle_diff: dec!(8),
            ..DivergenceConfig::default()
        };
        assert!(check_section(&divergence, validate_divergence).is_ok());
    }
}
