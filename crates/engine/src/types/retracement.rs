use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::swing::SwingPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelStrength {
    Weak,
    Moderate,
    Strong,
    VeryStrong,
}

impl LevelStrength {
    /// Base contribution to bounce potential.
    pub fn score(&self) -> Decimal {
        match self {
            Self::Weak => dec!(10),
            Self::Moderate => dec!(20),
            Self::Strong => dec!(30),
            Self::VeryStrong => dec!(40),
        }
    }
}

/// Direction of the impulse being retraced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwingDirection {
    /// Low came first, the high is the latest swing; pullbacks run down.
    Up,
    /// High came first, the low is the latest swing; pullbacks run up.
    Down,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FibonacciLevel {
    pub ratio: Decimal,
    pub price: Decimal,
    pub strength: LevelStrength,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwingRange {
    pub high: SwingPoint,
    pub low: SwingPoint,
    pub direction: SwingDirection,
}

impl SwingRange {
    pub fn range(&self) -> Decimal {
        self.high.price - self.low.price
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetracementAnalysis {
    pub swing: Option<SwingRange>,
    pub levels: Vec<FibonacciLevel>,
    pub nearest_level: Option<FibonacciLevel>,
    /// Distance from price to the nearest level, in percent.
    pub distance_pct: Option<Decimal>,
    /// 0-100.
    pub bounce_potential: Decimal,
    pub target: Option<Decimal>,
    pub stop: Option<Decimal>,
}

impl RetracementAnalysis {
    pub fn empty() -> Self {
        Self {
            swing: None,
            levels: Vec::new(),
            nearest_level: None,
            distance_pct: None,
            bounce_potential: Decimal::ZERO,
            target: None,
            stop: None,
        }
    }
}
