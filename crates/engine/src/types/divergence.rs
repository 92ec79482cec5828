use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::signal::Bias;
use super::swing::PivotPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DivergenceKind {
    /// Price lower low, oscillator higher low.
    RegularBullish,
    /// Price higher high, oscillator lower high.
    RegularBearish,
    /// Price higher low, oscillator lower low.
    HiddenBullish,
    /// Price lower high, oscillator higher high.
    HiddenBearish,
}

impl DivergenceKind {
    pub fn is_regular(&self) -> bool {
        matches!(self, Self::RegularBullish | Self::RegularBearish)
    }

    pub fn bias(&self) -> Bias {
        match self {
            Self::RegularBullish | Self::HiddenBullish => Bias::Bullish,
            Self::RegularBearish | Self::HiddenBearish => Bias::Bearish,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DivergenceClass {
    A,
    B,
    C,
}

impl DivergenceClass {
    pub fn from_score(score: Decimal) -> Self {
        if score >= dec!(80) {
            Self::A
        } else if score >= dec!(60) {
            Self::B
        } else {
            Self::C
        }
    }

    /// Ranking bonus used when picking the dominant divergence.
    pub fn bonus(&self) -> Decimal {
        match self {
            Self::A => dec!(30),
            Self::B => dec!(20),
            Self::C => dec!(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Divergence {
    pub kind: DivergenceKind,
    /// Oscillator the divergence was found on.
    pub indicator: String,
    pub price_points: [PivotPoint; 2],
    pub indicator_points: [PivotPoint; 2],
    /// Degrees between the price segment and the oscillator segment.
    pub angle_diff: Decimal,
    /// Candles between the two pivots.
    pub period: usize,
    /// 0-100.
    pub strength: Decimal,
    /// 0-100.
    pub maturity: Decimal,
    pub class: DivergenceClass,
    pub success_probability: Decimal,
    pub invalidated: bool,
}

impl Divergence {
    pub fn rank_score(&self) -> Decimal {
        self.strength + self.maturity + self.class.bonus()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DivergenceAnalysis {
    pub divergences: Vec<Divergence>,
    /// Share of oscillators agreeing on a bullish divergence, 0-100.
    pub bullish_confluence: Decimal,
    pub bearish_confluence: Decimal,
    pub dominant: Option<Divergence>,
    pub target: Option<Decimal>,
    pub invalidation: Option<Decimal>,
}
