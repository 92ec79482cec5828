use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

use crate::constants::{
    DEFAULT_KELLY_FRACTION, DEFAULT_MAX_DRAWDOWN, DEFAULT_MAX_PORTFOLIO_RISK,
    DEFAULT_MAX_RISK_PER_TRADE, DEFAULT_REGIME_HISTORY_CAPACITY, DEFAULT_TRADE_HISTORY_CAPACITY,
    DEFAULT_TRANSACTION_COST_PCT, MODULE_CROSS_ASSET, MODULE_CURRENCY_RISK, MODULE_DIVERGENCE,
    MODULE_INSTRUMENT_TREND, MODULE_REGIME, MODULE_RETRACEMENT, MODULE_SIGNAL_COMBINER,
    MODULE_STRUCTURE,
};

// ---------------------------------------------------------------------------
// Top-level aggregate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FusionConfig {
    pub app: AppConfig,
    pub analyzers: AnalyzersConfig,
    pub fusion: FusionSettings,
    pub risk: RiskConfig,
}

// ---------------------------------------------------------------------------
// app.json
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    /// Wall-clock ceiling for one analysis cycle.
    pub cycle_timeout_seconds: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            cycle_timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_dir: String,
    pub file_name: String,
    /// Used when `RUST_LOG` is unset.
    pub default_filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: "logs".into(),
            file_name: "fusion-engine.log".into(),
            default_filter: "fusion_engine=info,warn".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// analyzers.json
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AnalyzersConfig {
    pub indicators: IndicatorParams,
    pub regime: RegimeConfig,
    pub divergence: DivergenceConfig,
    pub structure: StructureConfig,
    pub retracement: RetracementConfig,
}

/// Periods of the shared indicator snapshot.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IndicatorParams {
    pub ema_fast: u32,
    pub ema_slow: u32,
    pub ema_trend: u32,
    pub rsi_period: u32,
    pub macd_fast: u32,
    pub macd_slow: u32,
    pub macd_signal: u32,
    pub bb_period: u32,
    #[serde(with = "rust_decimal::serde::str")]
    pub bb_std: Decimal,
    pub atr_period: u32,
    pub volume_avg_period: u32,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            ema_fast: 20,
            ema_slow: 50,
            ema_trend: 200,
            rsi_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            bb_period: 20,
            bb_std: dec!(2),
            atr_period: 14,
            volume_avg_period: 20,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegimeConfig {
    pub min_candles: usize,
    pub atr_period: usize,
    pub adx_period: usize,
    pub rsi_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    /// ATR% upper edges of the VeryLow, Low, Normal and High buckets.
    pub volatility_edges_pct: [Decimal; 4],
    pub percentile_window: usize,
    pub expansion_lookback: usize,
    #[serde(with = "rust_decimal::serde::str")]
    pub expansion_threshold: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub squeeze_percentile: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub adx_trending: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub adx_transitioning: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub di_dominance: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub breakout_adx_slope: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub rsi_extreme_high: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub rsi_extreme_low: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub exhaustion_rsi_high: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub exhaustion_rsi_low: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub early_warning_probability: Decimal,
    pub history_capacity: usize,
    pub adaptive_base: AdaptiveBase,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            min_candles: 50,
            atr_period: 14,
            adx_period: 14,
            rsi_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            volatility_edges_pct: [dec!(0.5), dec!(1.0), dec!(2.0), dec!(3.5)],
            percentile_window: 100,
            expansion_lookback: 10,
            expansion_threshold: dec!(0.15),
            squeeze_percentile: dec!(25),
            adx_trending: dec!(25),
            adx_transitioning: dec!(20),
            di_dominance: dec!(0.10),
            breakout_adx_slope: dec!(2),
            rsi_extreme_high: dec!(75),
            rsi_extreme_low: dec!(25),
            exhaustion_rsi_high: dec!(80),
            exhaustion_rsi_low: dec!(20),
            early_warning_probability: dec!(60),
            history_capacity: DEFAULT_REGIME_HISTORY_CAPACITY,
            adaptive_base: AdaptiveBase::default(),
        }
    }
}

/// Starting point of the layered adaptive-parameter mapping.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AdaptiveBase {
    #[serde(with = "rust_decimal::serde::str")]
    pub rsi_oversold: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub rsi_overbought: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub signal_threshold: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub stop_loss_multiplier: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub take_profit_multiplier: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub position_size_multiplier: Decimal,
}

impl Default for AdaptiveBase {
    fn default() -> Self {
        Self {
            rsi_oversold: dec!(30),
            rsi_overbought: dec!(70),
            signal_threshold: dec!(0.3),
            stop_loss_multiplier: dec!(2.0),
            take_profit_multiplier: dec!(3.0),
            position_size_multiplier: dec!(1.0),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DivergenceConfig {
    pub min_candles: usize,
    pub rsi_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub stoch_k: usize,
    pub stoch_d: usize,
    /// Neighbourhood half-width of a swing point.
    pub swing_order: usize,
    pub min_swing_separation: usize,
    /// Max index distance between a price swing and its oscillator swing.
    pub alignment_tolerance: usize,
    pub min_period: usize,
    #[serde(with = "rust_decimal::serde::str")]
    pub min_angle_diff: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub min_strength: Decimal,
    /// Breach fraction beyond the divergence extreme that invalidates it.
    #[serde(with = "rust_decimal::serde::str")]
    pub invalidation_pct: Decimal,
    pub target_window: usize,
}

impl Default for DivergenceConfig {
    fn default() -> Self {
        Self {
            min_candles: 50,
            rsi_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            stoch_k: 14,
            stoch_d: 3,
            swing_order: 5,
            min_swing_separation: 5,
            alignment_tolerance: 5,
            min_period: 10,
            min_angle_diff: dec!(5),
            min_strength: dec!(30),
            invalidation_pct: dec!(0.02),
            target_window: 50,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StructureConfig {
    pub min_candles: usize,
    /// Close beyond the block candle's extreme, as a fraction of that extreme.
    #[serde(with = "rust_decimal::serde::str")]
    pub order_block_min_move: Decimal,
    pub max_order_blocks: usize,
    #[serde(with = "rust_decimal::serde::str")]
    pub fvg_min_gap_pct: Decimal,
    pub max_fvgs: usize,
    pub swing_window: usize,
    #[serde(with = "rust_decimal::serde::str")]
    pub liquidity_tolerance_pct: Decimal,
    pub max_liquidity_zones: usize,
    #[serde(with = "rust_decimal::serde::str")]
    pub proximity_pct: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub signal_threshold: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub watch_threshold: Decimal,
}

impl Default for StructureConfig {
    fn default() -> Self {
        Self {
            min_candles: 50,
            order_block_min_move: dec!(0.005),
            max_order_blocks: 5,
            fvg_min_gap_pct: dec!(0.1),
            max_fvgs: 10,
            swing_window: 5,
            liquidity_tolerance_pct: dec!(0.2),
            max_liquidity_zones: 10,
            proximity_pct: dec!(0.5),
            signal_threshold: dec!(60),
            watch_threshold: dec!(40),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetracementConfig {
    pub min_candles: usize,
    pub swing_order: usize,
    /// Minimum swing prominence as a percentage of price.
    #[serde(with = "rust_decimal::serde::str")]
    pub prominence_pct: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub level_tolerance_pct: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub signal_threshold: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub watch_threshold: Decimal,
}

impl Default for RetracementConfig {
    fn default() -> Self {
        Self {
            min_candles: 50,
            swing_order: 5,
            prominence_pct: dec!(0.5),
            level_tolerance_pct: dec!(0.5),
            signal_threshold: dec!(60),
            watch_threshold: dec!(40),
        }
    }
}

// ---------------------------------------------------------------------------
// fusion.json
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FusionSettings {
    pub weights: ModuleWeights,
    pub combiner: CombinerConfig,
    pub orchestrator: OrchestratorConfig,
}

/// Per-module weight of the fused score. Must sum to 1.0.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModuleWeights {
    #[serde(with = "rust_decimal::serde::str")]
    pub instrument_trend: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub cross_asset: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub currency_risk: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub signal_combiner: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub regime: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub divergence: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub structure: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub retracement: Decimal,
}

impl Default for ModuleWeights {
    fn default() -> Self {
        Self {
            instrument_trend: dec!(0.20),
            cross_asset: dec!(0.10),
            currency_risk: dec!(0.05),
            signal_combiner: dec!(0.15),
            regime: dec!(0.10),
            divergence: dec!(0.15),
            structure: dec!(0.15),
            retracement: dec!(0.10),
        }
    }
}

impl ModuleWeights {
    /// `(module name, weight)` pairs in a fixed order.
    pub fn entries(&self) -> [(&'static str, Decimal); 8] {
        [
            (MODULE_INSTRUMENT_TREND, self.instrument_trend),
            (MODULE_CROSS_ASSET, self.cross_asset),
            (MODULE_CURRENCY_RISK, self.currency_risk),
            (MODULE_SIGNAL_COMBINER, self.signal_combiner),
            (MODULE_REGIME, self.regime),
            (MODULE_DIVERGENCE, self.divergence),
            (MODULE_STRUCTURE, self.structure),
            (MODULE_RETRACEMENT, self.retracement),
        ]
    }

    pub fn get(&self, module: &str) -> Decimal {
        self.entries()
            .iter()
            .find(|(name, _)| *name == module)
            .map(|(_, w)| *w)
            .unwrap_or(Decimal::ZERO)
    }

    pub fn sum(&self) -> Decimal {
        self.entries().iter().map(|(_, w)| *w).sum()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CombinerConfig {
    /// Achieved/possible ratio at which a dip or peak opportunity fires.
    #[serde(with = "rust_decimal::serde::str")]
    pub opportunity_threshold: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub rsi_oversold: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub rsi_near_oversold: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub rsi_overbought: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub rsi_near_overbought: Decimal,
    /// Distance from a Bollinger edge that counts as touching it, in percent.
    #[serde(with = "rust_decimal::serde::str")]
    pub band_proximity_pct: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub level_proximity_pct: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub volume_spike_ratio: Decimal,
    /// ATR% above which volatility counts as high for false-signal risk.
    #[serde(with = "rust_decimal::serde::str")]
    pub high_volatility_pct: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub elevated_volatility_pct: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub high_risk_score: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub medium_risk_score: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub pattern_priority_confidence: Decimal,
}

impl Default for CombinerConfig {
    fn default() -> Self {
        Self {
            opportunity_threshold: dec!(0.60),
            rsi_oversold: dec!(30),
            rsi_near_oversold: dec!(35),
            rsi_overbought: dec!(70),
            rsi_near_overbought: dec!(65),
            band_proximity_pct: dec!(1.0),
            level_proximity_pct: dec!(2.0),
            volume_spike_ratio: dec!(1.5),
            high_volatility_pct: dec!(3.5),
            elevated_volatility_pct: dec!(2.0),
            high_risk_score: dec!(60),
            medium_risk_score: dec!(30),
            pattern_priority_confidence: dec!(0.7),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// |fused score| needed for BUY/SELL.
    #[serde(with = "rust_decimal::serde::str")]
    pub signal_threshold: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub extreme_volatility_derate: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub high_risk_min_confidence: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub squeeze_min_confidence: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub below_threshold_derate: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub dip_peak_threshold: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub dip_peak_boost: Decimal,
    /// Round-trip cost as a percentage of notional.
    #[serde(with = "rust_decimal::serde::str")]
    pub transaction_cost_pct: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub max_cost_penalty: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub cost_hold_confidence: Decimal,
    /// Max distance, in percent, between a default level and its refinement.
    #[serde(with = "rust_decimal::serde::str")]
    pub level_refine_pct: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub stop_atr_multiplier: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub take_profit_atr_multiplier: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub high_currency_risk_tightening: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub lot_size: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub lot_step: Decimal,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            signal_threshold: dec!(0.3),
            extreme_volatility_derate: dec!(0.8),
            high_risk_min_confidence: dec!(0.7),
            squeeze_min_confidence: dec!(0.8),
            below_threshold_derate: dec!(0.85),
            dip_peak_threshold: dec!(60),
            dip_peak_boost: dec!(1.2),
            transaction_cost_pct: DEFAULT_TRANSACTION_COST_PCT,
            max_cost_penalty: dec!(0.3),
            cost_hold_confidence: dec!(0.4),
            level_refine_pct: dec!(5),
            stop_atr_multiplier: dec!(2.0),
            take_profit_atr_multiplier: dec!(3.0),
            high_currency_risk_tightening: dec!(0.8),
            lot_size: dec!(1),
            lot_step: dec!(0.01),
        }
    }
}

// ---------------------------------------------------------------------------
// risk.json
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    #[serde(with = "rust_decimal::serde::str")]
    pub kelly_fraction: Decimal,
    /// Hard ceiling on capital risked per trade.
    #[serde(with = "rust_decimal::serde::str")]
    pub max_risk_per_trade: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub max_portfolio_risk: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub max_drawdown: Decimal,
    pub history_capacity: usize,
    /// Trades needed before recorded statistics replace the defaults.
    pub min_trades_for_stats: usize,
    #[serde(with = "rust_decimal::serde::str")]
    pub default_win_rate: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub default_win_loss_ratio: Decimal,
    /// ATR% above which the size multiplier starts shrinking.
    #[serde(with = "rust_decimal::serde::str")]
    pub high_volatility_pct: Decimal,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            kelly_fraction: DEFAULT_KELLY_FRACTION,
            max_risk_per_trade: DEFAULT_MAX_RISK_PER_TRADE,
            max_portfolio_risk: DEFAULT_MAX_PORTFOLIO_RISK,
            max_drawdown: DEFAULT_MAX_DRAWDOWN,
            history_capacity: DEFAULT_TRADE_HISTORY_CAPACITY,
            min_trades_for_stats: 30,
            default_win_rate: dec!(0.45),
            default_win_loss_ratio: dec!(1.5),
            high_volatility_pct: dec!(3.5),
        }
    }
}
