use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::signal::{ModuleSignal, RiskLevel, TradeAction};
use super::timeframe::Timeframe;

/// Additive opportunity score (dip or peak).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpportunityScore {
    pub achieved: Decimal,
    pub possible: Decimal,
    /// `achieved / possible`, 0-1.
    pub ratio: Decimal,
    pub triggered: bool,
    pub evidence: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FalseSignalRisk {
    /// 0-100.
    pub score: Decimal,
    pub level: RiskLevel,
    pub factors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HorizonConfirmation {
    pub timeframe: Timeframe,
    pub weight: Decimal,
    pub volatility_adjustment: Decimal,
    pub adjusted_confidence: Decimal,
    pub min_confidence: Decimal,
    pub confirmed: bool,
}

/// Which precedence rule produced the combined signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombinerDecision {
    DipOpportunity,
    PeakOpportunity,
    HighRisk,
    Unconfirmed,
    PatternOverride,
    Base,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedSignal {
    pub signal: TradeAction,
    /// 0-1.
    pub confidence: Decimal,
    pub base_signal: ModuleSignal,
    pub base_confidence: Decimal,
    pub decision: CombinerDecision,
    pub dip: OpportunityScore,
    pub peak: OpportunityScore,
    pub risk: FalseSignalRisk,
    pub horizon: HorizonConfirmation,
    pub pattern_applied: bool,
}
