use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeDirection {
    Long,
    Short,
}

/// Closed trade outcome fed into the Kelly statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    #[serde(with = "rust_decimal::serde::str")]
    pub entry_price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub exit_price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub size: Decimal,
    pub direction: TradeDirection,
}

impl TradeRecord {
    pub fn pnl(&self) -> Decimal {
        let delta = self.exit_price - self.entry_price;
        match self.direction {
            TradeDirection::Long => delta * self.size,
            TradeDirection::Short => -delta * self.size,
        }
    }

    pub fn is_win(&self) -> bool {
        self.pnl() > Decimal::ZERO
    }
}

/// Summary statistics over the recorded trades.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeStats {
    pub trades: usize,
    pub win_rate: Decimal,
    pub avg_win_loss_ratio: Decimal,
    /// Expected return per unit risked: `p * b - q`.
    pub expectancy: Decimal,
    /// True while too few trades exist and defaults are in use.
    pub using_defaults: bool,
}

/// Recommended position for one signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSize {
    /// Raw Kelly fraction before scaling, clipped to [0, 1].
    pub kelly_fraction: Decimal,
    /// Share of capital put at risk after fractional scaling, the per-trade
    /// ceiling and confidence.
    pub risk_fraction: Decimal,
    pub risk_amount: Decimal,
    pub notional: Decimal,
    pub units: Decimal,
    pub lots: Decimal,
    /// Set when sizing was refused (drawdown guard, missing stop, HOLD).
    pub refused_reason: Option<String>,
}

impl PositionSize {
    pub fn zero(reason: impl Into<String>) -> Self {
        Self {
            kelly_fraction: Decimal::ZERO,
            risk_fraction: Decimal::ZERO,
            risk_amount: Decimal::ZERO,
            notional: Decimal::ZERO,
            units: Decimal::ZERO,
            lots: Decimal::ZERO,
            refused_reason: Some(reason.into()),
        }
    }
}
