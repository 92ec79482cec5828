use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::combiner::CombinedSignal;
use super::divergence::DivergenceAnalysis;
use super::market_data::{Candle, MarketDataPoint};
use super::regime::RegimeAnalysis;
use super::retracement::RetracementAnalysis;
use super::risk::PositionSize;
use super::signal::{FirstLineAnalysis, ModuleResult, PatternSignal, StrengthTier, TradeAction};
use super::structure::StructureAnalysis;
use super::timeframe::Timeframe;

/// Precomputed first-line outputs supplied with a request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FirstLineInputs {
    #[serde(default)]
    pub instrument: Option<FirstLineAnalysis>,
    #[serde(default)]
    pub cross_asset: Option<FirstLineAnalysis>,
    #[serde(default)]
    pub currency_risk: Option<FirstLineAnalysis>,
}

/// One analysis cycle's input: one instrument, one timeframe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub candles: Vec<Candle>,
    #[serde(default)]
    pub market_data: Vec<MarketDataPoint>,
    #[serde(with = "rust_decimal::serde::str")]
    pub capital: Decimal,
    #[serde(default)]
    pub first_line: FirstLineInputs,
    #[serde(default)]
    pub pattern: Option<PatternSignal>,
}

/// Every module's tagged outcome for one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleReports {
    pub instrument_trend: ModuleResult<FirstLineAnalysis>,
    pub cross_asset: ModuleResult<FirstLineAnalysis>,
    pub currency_risk: ModuleResult<FirstLineAnalysis>,
    pub signal_combiner: ModuleResult<CombinedSignal>,
    pub regime: ModuleResult<RegimeAnalysis>,
    pub divergence: ModuleResult<DivergenceAnalysis>,
    pub structure: ModuleResult<StructureAnalysis>,
    pub retracement: ModuleResult<RetracementAnalysis>,
}

/// The orchestrator's own dip/peak check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DipPeakCheck {
    /// 0-100.
    pub dip_score: Decimal,
    pub peak_score: Decimal,
    pub applied: Option<TradeAction>,
    pub criteria: Vec<String>,
}

/// Outcome of the transaction-cost viability check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostCheck {
    /// Half the ATR percentage.
    pub expected_move_pct: Decimal,
    pub round_trip_cost_pct: Decimal,
    pub viable: bool,
    /// Fraction removed from confidence, 0-max penalty.
    pub penalty: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionResult {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub signal: TradeAction,
    /// 0-1.
    #[serde(with = "rust_decimal::serde::str")]
    pub confidence: Decimal,
    pub strength_tier: StrengthTier,
    /// Weighted directional score in [-1, 1].
    #[serde(with = "rust_decimal::serde::str")]
    pub fused_score: Decimal,
    /// 0-1.
    #[serde(with = "rust_decimal::serde::str")]
    pub confluence: Decimal,
    /// 0-100.
    #[serde(with = "rust_decimal::serde::str")]
    pub quality_score: Decimal,
    pub modules: ModuleReports,
    pub dip_peak: DipPeakCheck,
    pub cost_check: CostCheck,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub stop_loss: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub take_profit: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub risk_reward: Option<Decimal>,
    pub position: PositionSize,
    pub summary: String,
    pub recommendations: Vec<String>,
    /// Unix milliseconds at which the result was produced.
    pub generated_at: i64,
}
