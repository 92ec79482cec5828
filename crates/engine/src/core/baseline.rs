//! Technical baseline used as the instrument-trend reading when no external
//! instrument-trend analyzer output is available.
//!
//! Scores EMA alignment, RSI bands, MACD histogram sign and Bollinger
//! position into `[-1, 1]`, then maps the score onto the first-line output
//! contract. The baseline reports no support or resistance: its only levels
//! are the Bollinger bands, which the combiner already scores on their own.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::types::{Bias, FirstLineAnalysis, IndicatorSnapshot, ModuleSignal};

/// |score| needed before the baseline takes a side.
const DIRECTION_THRESHOLD: Decimal = dec!(0.3);

pub struct TechnicalBaseline;

impl TechnicalBaseline {
    /// Composite technical score in `[-1, 1]`.
    pub fn score(ind: &IndicatorSnapshot) -> Decimal {
        let mut score = Decimal::ZERO;

        // EMA alignment.
        if ind.ema_20 > ind.ema_50 && ind.ema_50 > ind.ema_200 {
            score += dec!(0.3);
        } else if ind.ema_20 > ind.ema_50 {
            score += dec!(0.15);
        } else if ind.ema_20 < ind.ema_50 && ind.ema_50 < ind.ema_200 {
            score -= dec!(0.3);
        } else if ind.ema_20 < ind.ema_50 {
            score -= dec!(0.15);
        }

        // RSI bands.
        if ind.rsi_14 < dec!(30) {
            score += dec!(0.25);
        } else if ind.rsi_14 > dec!(70) {
            score -= dec!(0.25);
        } else if ind.rsi_14 < dec!(40) {
            score += dec!(0.1);
        } else if ind.rsi_14 > dec!(60) {
            score -= dec!(0.1);
        }

        // MACD histogram sign.
        if ind.macd_histogram > Decimal::ZERO {
            score += dec!(0.2);
        } else if ind.macd_histogram < Decimal::ZERO {
            score -= dec!(0.2);
        }

        // Bollinger position: below the middle leans long.
        let bb_range = ind.bb_upper - ind.bb_lower;
        if bb_range > Decimal::ZERO {
            let bb_position = (ind.price - ind.bb_lower) / bb_range;
            score += (dec!(0.5) - bb_position) * dec!(0.5);
        }

        score.max(dec!(-1)).min(dec!(1))
    }

    /// Map a snapshot onto the first-line contract.
    pub fn from_snapshot(ind: &IndicatorSnapshot) -> FirstLineAnalysis {
        let score = Self::score(ind);
        let signal = if score >= DIRECTION_THRESHOLD {
            ModuleSignal::Buy
        } else if score <= -DIRECTION_THRESHOLD {
            ModuleSignal::Sell
        } else {
            ModuleSignal::Hold
        };
        let trend = if ind.ema_20 > ind.ema_50 {
            Bias::Bullish
        } else if ind.ema_20 < ind.ema_50 {
            Bias::Bearish
        } else {
            Bias::Neutral
        };

        let mut indicator_map = BTreeMap::new();
        indicator_map.insert("score".to_string(), score);
        indicator_map.insert("rsi".to_string(), ind.rsi_14);
        indicator_map.insert("macd_histogram".to_string(), ind.macd_histogram);
        indicator_map.insert("ema_20".to_string(), ind.ema_20);
        indicator_map.insert("ema_50".to_string(), ind.ema_50);

        FirstLineAnalysis {
            signal,
            confidence: score.abs(),
            trend,
            indicators: indicator_map,
            support: None,
            resistance: None,
            divergence: None,
            atr: Some(ind.atr_14),
            risk_level: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> IndicatorSnapshot {
        IndicatorSnapshot {
            price: dec!(100),
            ema_20: dec!(100),
            ema_50: dec!(100),
            ema_200: dec!(100),
            rsi_14: dec!(50),
            macd_line: Decimal::ZERO,
            macd_signal: Decimal::ZERO,
            macd_histogram: Decimal::ZERO,
            macd_histogram_prev: Decimal::ZERO,
            bb_upper: dec!(100),
            bb_middle: dec!(100),
            bb_lower: dec!(100),
            atr_14: dec!(1),
            atr_pct: dec!(1),
            volume: dec!(10),
            volume_20_avg: dec!(10),
        }
    }

    #[test]
    fn test_neutral_snapshot_holds() {
        let a = TechnicalBaseline::from_snapshot(&snapshot());
        assert_eq!(a.signal, ModuleSignal::Hold);
        assert_eq!(a.confidence, Decimal::ZERO);
        assert_eq!(a.trend, Bias::Neutral);
    }

    #[test]
    fn test_aligned_uptrend_buys() {
        let mut s = snapshot();
        s.ema_20 = dec!(105);
        s.ema_50 = dec!(102);
        s.ema_200 = dec!(98);
        s.macd_histogram = dec!(0.5);
        let a = TechnicalBaseline::from_snapshot(&s);
        assert_eq!(a.signal, ModuleSignal::Buy);
        assert_eq!(a.confidence, dec!(0.5));
        assert_eq!(a.trend, Bias::Bullish);
    }

    #[test]
    fn test_score_is_clamped() {
        let mut s = snapshot();
        s.ema_20 = dec!(90);
        s.ema_50 = dec!(95);
        s.ema_200 = dec!(99);
        s.rsi_14 = dec!(85);
        s.macd_histogram = dec!(-1);
        s.bb_upper = dec!(101);
        s.bb_lower = dec!(99);
        s.price = dec!(150);
        assert_eq!(TechnicalBaseline::score(&s), dec!(-1));
    }

    #[test]
    fn test_bands_are_not_reported_as_levels() {
        let mut s = snapshot();
        s.price = dec!(96.5);
        s.bb_upper = dec!(104);
        s.bb_lower = dec!(96);
        let a = TechnicalBaseline::from_snapshot(&s);
        assert!(a.support.is_none());
        assert!(a.resistance.is_none());
        assert_eq!(a.atr, Some(dec!(1)));
    }
}
