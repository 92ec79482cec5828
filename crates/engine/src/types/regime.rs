use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::signal::{Bias, RiskLevel};

/// Volatility bucket by ATR as a percentage of price, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolatilityRegime {
    VeryLow,
    Low,
    Normal,
    High,
    Extreme,
}

impl VolatilityRegime {
    pub fn is_low(&self) -> bool {
        matches!(self, Self::VeryLow | Self::Low)
    }

    /// Contribution to the overall regime score (0-30). Normal conditions
    /// are the most tradeable.
    pub fn score(&self) -> Decimal {
        match self {
            Self::VeryLow => dec!(10),
            Self::Low => dec!(20),
            Self::Normal => dec!(30),
            Self::High => dec!(15),
            Self::Extreme => dec!(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendRegime {
    Trending,
    Transitioning,
    Ranging,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MomentumState {
    Accelerating,
    Decelerating,
    Stable,
    Exhausted,
}

impl MomentumState {
    /// Contribution to the overall regime score (0-30).
    pub fn score(&self) -> Decimal {
        match self {
            Self::Accelerating => dec!(30),
            Self::Stable => dec!(20),
            Self::Decelerating => dec!(10),
            Self::Exhausted => dec!(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolatilityAnalysis {
    pub regime: VolatilityRegime,
    pub atr: Decimal,
    pub atr_pct: Decimal,
    /// Rank of the current ATR% within the trailing window, 0-100.
    pub percentile: Decimal,
    pub expanding: bool,
    pub contracting: bool,
    pub squeeze_potential: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendAnalysis {
    pub regime: TrendRegime,
    pub direction: Bias,
    pub adx: Decimal,
    pub plus_di: Decimal,
    pub minus_di: Decimal,
    /// ADX rescaled to 0-100.
    pub strength: Decimal,
    /// Mean ADX of the last 5 values minus the mean of the prior 5.
    pub adx_slope: Decimal,
    pub breakout_potential: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MomentumAnalysis {
    pub state: MomentumState,
    pub rsi: Decimal,
    pub macd_histogram: Decimal,
    pub histogram_roc: Decimal,
    pub aligned: bool,
    pub peak_divergence: bool,
    /// 0-100.
    pub reversal_potential: Decimal,
}

/// Regime-tuned trading parameters, each clamped to hard bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveParameters {
    pub rsi_oversold: Decimal,
    pub rsi_overbought: Decimal,
    pub signal_threshold: Decimal,
    pub stop_loss_multiplier: Decimal,
    pub take_profit_multiplier: Decimal,
    pub position_size_multiplier: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeTransition {
    /// 0-100.
    pub probability: Decimal,
    pub early_warning: bool,
    pub triggers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeAnalysis {
    pub volatility: VolatilityAnalysis,
    pub trend: TrendAnalysis,
    pub momentum: MomentumAnalysis,
    pub adaptive: AdaptiveParameters,
    pub transition: RegimeTransition,
    /// 0-100.
    pub overall_score: Decimal,
    pub risk_level: RiskLevel,
}

impl RegimeAnalysis {
    pub fn history_entry(&self) -> RegimeHistoryEntry {
        RegimeHistoryEntry {
            volatility: self.volatility.regime,
            trend: self.trend.regime,
            direction: self.trend.direction,
            momentum: self.momentum.state,
            overall_score: self.overall_score,
        }
    }
}

/// Compact per-cycle regime snapshot kept for transition statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeHistoryEntry {
    pub volatility: VolatilityRegime,
    pub trend: TrendRegime,
    pub direction: Bias,
    pub momentum: MomentumState,
    pub overall_score: Decimal,
}
