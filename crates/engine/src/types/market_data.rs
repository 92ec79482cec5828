use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::timeframe::Timeframe;
use crate::errors::EngineError;

/// A single OHLC candle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: i64,
    #[serde(with = "rust_decimal::serde::str")]
    pub open: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub high: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub low: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub close: Decimal,
    /// Traded volume; feeds volume-spike evidence only.
    #[serde(with = "rust_decimal::serde::str", default)]
    pub volume: Decimal,
    pub interval: Timeframe,
}

impl Candle {
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }
}

/// Auxiliary cross-asset prices sampled alongside the candle series.
///
/// Only the external first-line analyzers read these.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketDataPoint {
    pub timestamp: i64,
    /// Instrument name → price.
    #[serde(default)]
    pub prices: BTreeMap<String, Decimal>,
}

/// Snapshot of the standard indicators at the last candle of a window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub price: Decimal,
    pub ema_20: Decimal,
    pub ema_50: Decimal,
    pub ema_200: Decimal,
    pub rsi_14: Decimal,
    pub macd_line: Decimal,
    pub macd_signal: Decimal,
    pub macd_histogram: Decimal,
    /// Histogram one candle earlier; used for cross detection.
    pub macd_histogram_prev: Decimal,
    pub bb_upper: Decimal,
    pub bb_middle: Decimal,
    pub bb_lower: Decimal,
    pub atr_14: Decimal,
    /// ATR as a percentage of price.
    pub atr_pct: Decimal,
    pub volume: Decimal,
    pub volume_20_avg: Decimal,
}

/// Column views over a candle window.
pub struct Columns {
    pub opens: Vec<Decimal>,
    pub highs: Vec<Decimal>,
    pub lows: Vec<Decimal>,
    pub closes: Vec<Decimal>,
    pub volumes: Vec<Decimal>,
}

impl Columns {
    pub fn from_candles(candles: &[Candle]) -> Self {
        Self {
            opens: candles.iter().map(|c| c.open).collect(),
            highs: candles.iter().map(|c| c.high).collect(),
            lows: candles.iter().map(|c| c.low).collect(),
            closes: candles.iter().map(|c| c.close).collect(),
            volumes: candles.iter().map(|c| c.volume).collect(),
        }
    }
}

/// Check the ordering and shape invariants of a candle window.
///
/// Timestamps must be non-decreasing and every row must satisfy
/// `low <= min(open, close)` and `high >= max(open, close)`.
pub fn validate_candles(candles: &[Candle]) -> Result<(), EngineError> {
    for (i, pair) in candles.windows(2).enumerate() {
        if pair[1].timestamp < pair[0].timestamp {
            return Err(EngineError::invalid_input(format!(
                "candle timestamps decrease at index {}: {} < {}",
                i + 1,
                pair[1].timestamp,
                pair[0].timestamp
            )));
        }
    }

    for (i, c) in candles.iter().enumerate() {
        if c.high < c.low {
            return Err(EngineError::invalid_input(format!(
                "candle {i} has high {} below low {}",
                c.high, c.low
            )));
        }
        if c.high < c.open.max(c.close) || c.low > c.open.min(c.close) {
            return Err(EngineError::invalid_input(format!(
                "candle {i} body lies outside its high/low range"
            )));
        }
        if c.close <= Decimal::ZERO {
            return Err(EngineError::invalid_input(format!(
                "candle {i} has non-positive close {}",
                c.close
            )));
        }
    }

    Ok(())
}
