//! Timeframe tag for candle windows.
//!
//! Besides naming the candle interval, each timeframe carries the
//! multi-horizon confirmation metadata used by the signal combiner: a
//! confirmation weight (how much a signal on this horizon is trusted) and the
//! minimum confidence a signal needs before it is acted upon.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported candle intervals, ordered shortest to longest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "2h")]
    H2,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "6h")]
    H6,
    #[serde(rename = "1d")]
    D1,
}

impl Timeframe {
    /// All timeframes in ascending order (shortest to longest).
    pub const ALL: [Timeframe; 9] = [
        Timeframe::M1,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::H1,
        Timeframe::H2,
        Timeframe::H4,
        Timeframe::H6,
        Timeframe::D1,
    ];

    /// Interval label, e.g. `"15m"`.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::M1 => "1m",
            Self::M5 => "5m",
            Self::M15 => "15m",
            Self::M30 => "30m",
            Self::H1 => "1h",
            Self::H2 => "2h",
            Self::H4 => "4h",
            Self::H6 => "6h",
            Self::D1 => "1d",
        }
    }

    /// Parse from an interval label.
    #[must_use]
    pub fn from_label(s: &str) -> Option<Self> {
        match s {
            "1m" => Some(Self::M1),
            "5m" => Some(Self::M5),
            "15m" => Some(Self::M15),
            "30m" => Some(Self::M30),
            "1h" => Some(Self::H1),
            "2h" => Some(Self::H2),
            "4h" => Some(Self::H4),
            "6h" => Some(Self::H6),
            "1d" => Some(Self::D1),
            _ => None,
        }
    }

    /// Duration in seconds.
    #[must_use]
    pub const fn duration_secs(&self) -> u64 {
        match self {
            Self::M1 => 60,
            Self::M5 => 300,
            Self::M15 => 900,
            Self::M30 => 1800,
            Self::H1 => 3600,
            Self::H2 => 7200,
            Self::H4 => 14400,
            Self::H6 => 21600,
            Self::D1 => 86400,
        }
    }

    /// Trust placed in a signal observed on this horizon.
    ///
    /// Short horizons are noisy and get scaled down; the daily horizon is
    /// slightly favoured.
    #[must_use]
    pub fn confirmation_weight(&self) -> Decimal {
        match self {
            Self::M1 => dec!(0.70),
            Self::M5 => dec!(0.80),
            Self::M15 => dec!(0.85),
            Self::M30 => dec!(0.90),
            Self::H1 => dec!(1.00),
            Self::H2 => dec!(1.00),
            Self::H4 => dec!(1.05),
            Self::H6 => dec!(1.05),
            Self::D1 => dec!(1.10),
        }
    }

    /// Minimum (weighted) confidence a directional signal needs on this horizon.
    #[must_use]
    pub fn min_confidence(&self) -> Decimal {
        match self {
            Self::M1 => dec!(0.75),
            Self::M5 => dec!(0.70),
            Self::M15 => dec!(0.65),
            Self::M30 => dec!(0.62),
            Self::H1 => dec!(0.60),
            Self::H2 => dec!(0.58),
            Self::H4 => dec!(0.55),
            Self::H6 => dec!(0.55),
            Self::D1 => dec!(0.50),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeframe_labels() {
        assert_eq!(Timeframe::M1.label(), "1m");
        assert_eq!(Timeframe::H4.label(), "4h");
        assert_eq!(Timeframe::from_label("15m"), Some(Timeframe::M15));
        assert_eq!(Timeframe::from_label("1d"), Some(Timeframe::D1));
        assert_eq!(Timeframe::from_label("invalid"), None);
    }

    #[test]
    fn test_timeframe_duration() {
        assert_eq!(Timeframe::M1.duration_secs(), 60);
        assert_eq!(Timeframe::H1.duration_secs(), 3600);
        assert_eq!(Timeframe::D1.duration_secs(), 86400);
    }

    #[test]
    fn test_min_confidence_relaxes_with_horizon() {
        for pair in Timeframe::ALL.windows(2) {
            assert!(pair[0].min_confidence() >= pair[1].min_confidence());
        }
    }

    #[test]
    fn test_timeframe_ordering() {
        assert!(Timeframe::M1 < Timeframe::M5);
        assert!(Timeframe::H1 < Timeframe::D1);
    }

    #[test]
    fn test_serde_uses_labels() {
        let json = serde_json::to_string(&Timeframe::H4).unwrap();
        assert_eq!(json, "\"4h\"");
        let tf: Timeframe = serde_json::from_str("\"30m\"").unwrap();
        assert_eq!(tf, Timeframe::M30);
    }
}
