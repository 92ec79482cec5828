use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::signal::Bias;
use super::swing::{SwingKind, SwingPoint};

/// Range preceding a strong displacement, treated as a re-entry zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBlock {
    pub kind: Bias,
    /// Index of the block candle.
    pub index: usize,
    pub low: Decimal,
    pub high: Decimal,
    /// Displacement beyond the block, in percent.
    pub strength: Decimal,
    pub touched: bool,
    pub broken: bool,
}

/// Three-candle imbalance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FairValueGap {
    pub kind: Bias,
    /// Index of the middle candle.
    pub index: usize,
    pub low: Decimal,
    pub high: Decimal,
    pub size_pct: Decimal,
    pub filled: bool,
    /// 0-100.
    pub fill_pct: Decimal,
}

impl FairValueGap {
    pub fn contains(&self, price: Decimal) -> bool {
        price >= self.low && price <= self.high
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketTrend {
    Bullish,
    Bearish,
    Ranging,
}

impl MarketTrend {
    pub fn direction(&self) -> i8 {
        match self {
            Self::Bullish => 1,
            Self::Bearish => -1,
            Self::Ranging => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketStructure {
    pub trend: MarketTrend,
    pub higher_highs: usize,
    pub higher_lows: usize,
    pub lower_highs: usize,
    pub lower_lows: usize,
    pub swing_highs: Vec<SwingPoint>,
    pub swing_lows: Vec<SwingPoint>,
    /// Most recent swing extreme opposing the trend.
    pub bos_level: Option<Decimal>,
    /// Extremum of the last two opposing swings.
    pub choch_level: Option<Decimal>,
    pub bos_broken: bool,
    pub choch_broken: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidityZone {
    pub price: Decimal,
    /// Swing side the zone was built from: highs rest sell stops above,
    /// lows rest buy stops below.
    pub side: SwingKind,
    pub touches: usize,
    pub strength: Decimal,
    pub swept: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureAnalysis {
    pub order_blocks: Vec<OrderBlock>,
    pub fair_value_gaps: Vec<FairValueGap>,
    pub market_structure: MarketStructure,
    pub liquidity_zones: Vec<LiquidityZone>,
    pub bullish_score: Decimal,
    pub bearish_score: Decimal,
    pub target: Option<Decimal>,
    pub stop: Option<Decimal>,
    pub reasons: Vec<String>,
}
