use std::collections::BTreeMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Categorical output of any analyzer.
///
/// Analyzers speak slightly different dialects (trade verbs, bias words,
/// wait/watch states); all of them collapse onto one numeric axis through
/// [`ModuleSignal::direction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModuleSignal {
    Buy,
    Sell,
    Bullish,
    Bearish,
    Neutral,
    Hold,
    Wait,
    Watch,
}

impl ModuleSignal {
    /// +1 for bullish dialects, -1 for bearish, 0 otherwise.
    pub fn direction(&self) -> i8 {
        match self {
            Self::Buy | Self::Bullish => 1,
            Self::Sell | Self::Bearish => -1,
            Self::Neutral | Self::Hold | Self::Wait | Self::Watch => 0,
        }
    }

    pub fn is_directional(&self) -> bool {
        self.direction() != 0
    }
}

/// Final trade decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeAction {
    Buy,
    Sell,
    Hold,
}

impl TradeAction {
    pub fn direction(&self) -> i8 {
        match self {
            Self::Buy => 1,
            Self::Sell => -1,
            Self::Hold => 0,
        }
    }

    pub fn from_direction(direction: i8) -> Self {
        match direction.signum() {
            1 => Self::Buy,
            -1 => Self::Sell,
            _ => Self::Hold,
        }
    }

    pub fn as_module_signal(&self) -> ModuleSignal {
        match self {
            Self::Buy => ModuleSignal::Buy,
            Self::Sell => ModuleSignal::Sell,
            Self::Hold => ModuleSignal::Hold,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
            Self::Hold => "HOLD",
        }
    }
}

/// Directional bias used by trend fields, divergence flags and patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Bias {
    Bullish,
    Bearish,
    #[default]
    Neutral,
}

impl Bias {
    pub fn direction(&self) -> i8 {
        match self {
            Self::Bullish => 1,
            Self::Bearish => -1,
            Self::Neutral => 0,
        }
    }

    pub fn from_direction(direction: i8) -> Self {
        match direction.signum() {
            1 => Self::Bullish,
            -1 => Self::Bearish,
            _ => Self::Neutral,
        }
    }
}

/// Three-tier risk classification shared by the regime detector and the
/// cross-asset risk collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Qualitative bucket for the final confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrengthTier {
    VeryStrong,
    Strong,
    Moderate,
    Weak,
    VeryWeak,
}

impl StrengthTier {
    pub fn from_confidence(confidence: Decimal) -> Self {
        if confidence >= dec!(0.8) {
            Self::VeryStrong
        } else if confidence >= dec!(0.65) {
            Self::Strong
        } else if confidence >= dec!(0.5) {
            Self::Moderate
        } else if confidence >= dec!(0.3) {
            Self::Weak
        } else {
            Self::VeryWeak
        }
    }
}

// ============================================================================
// Module results
// ============================================================================

/// Successful analyzer output before it is wrapped into a [`ModuleResult`].
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleOutput<T> {
    pub signal: ModuleSignal,
    /// Strength on the 0-100 scale.
    pub strength: Decimal,
    pub detail: T,
}

impl<T> ModuleOutput<T> {
    /// Build an output, clamping `strength` into `[0, 100]`.
    pub fn new(signal: ModuleSignal, strength: Decimal, detail: T) -> Self {
        Self {
            signal,
            strength: strength.max(Decimal::ZERO).min(dec!(100)),
            detail,
        }
    }
}

/// Tagged per-module outcome.
///
/// Sentinels carry a neutral signal and zero strength, so consumers can fold
/// every module into the fused score without special-casing failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ModuleResult<T> {
    InsufficientData {
        required: usize,
        available: usize,
    },
    Error {
        reason: String,
    },
    Success {
        signal: ModuleSignal,
        /// 0-100.
        #[serde(with = "rust_decimal::serde::str")]
        strength: Decimal,
        detail: T,
    },
}

impl<T> ModuleResult<T> {
    pub fn success(output: ModuleOutput<T>) -> Self {
        Self::Success {
            signal: output.signal,
            strength: output.strength,
            detail: output.detail,
        }
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self::Error {
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn signal(&self) -> ModuleSignal {
        match self {
            Self::Success { signal, .. } => *signal,
            _ => ModuleSignal::Neutral,
        }
    }

    pub fn strength(&self) -> Decimal {
        match self {
            Self::Success { strength, .. } => *strength,
            _ => Decimal::ZERO,
        }
    }

    pub fn detail(&self) -> Option<&T> {
        match self {
            Self::Success { detail, .. } => Some(detail),
            _ => None,
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            Self::InsufficientData { .. } => "insufficient_data",
            Self::Error { .. } => "error",
            Self::Success { .. } => "success",
        }
    }
}

// ============================================================================
// Collaborator contracts
// ============================================================================

/// Output contract of the first-line analyzers (instrument trend, cross-asset
/// trend, currency risk).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirstLineAnalysis {
    pub signal: ModuleSignal,
    /// Self-assessed confidence in [0.0, 1.0].
    #[serde(with = "rust_decimal::serde::str")]
    pub confidence: Decimal,
    pub trend: Bias,
    #[serde(default)]
    pub indicators: BTreeMap<String, Decimal>,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub support: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub resistance: Option<Decimal>,
    /// Divergence flag raised by the collaborator, if any.
    #[serde(default)]
    pub divergence: Option<Bias>,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub atr: Option<Decimal>,
    /// Only the currency-risk collaborator fills this in.
    #[serde(default)]
    pub risk_level: Option<RiskLevel>,
}

impl FirstLineAnalysis {
    /// A neutral, zero-confidence reading.
    pub fn neutral() -> Self {
        Self {
            signal: ModuleSignal::Neutral,
            confidence: Decimal::ZERO,
            trend: Bias::Neutral,
            indicators: BTreeMap::new(),
            support: None,
            resistance: None,
            divergence: None,
            atr: None,
            risk_level: None,
        }
    }
}

/// Chart pattern supplied alongside the candle window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternSignal {
    /// e.g. "head_and_shoulders", "double_bottom".
    pub name: String,
    pub bias: Bias,
    #[serde(with = "rust_decimal::serde::str")]
    pub confidence: Decimal,
    /// Historical reliability of the pattern family in [0, 1].
    #[serde(with = "rust_decimal::serde::str", default = "default_reliability")]
    pub reliability: Decimal,
}

fn default_reliability() -> Decimal {
    dec!(0.7)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_signal_directions() {
        assert_eq!(ModuleSignal::Buy.direction(), 1);
        assert_eq!(ModuleSignal::Bullish.direction(), 1);
        assert_eq!(ModuleSignal::Sell.direction(), -1);
        assert_eq!(ModuleSignal::Bearish.direction(), -1);
        for s in [
            ModuleSignal::Neutral,
            ModuleSignal::Hold,
            ModuleSignal::Wait,
            ModuleSignal::Watch,
        ] {
            assert_eq!(s.direction(), 0);
        }
    }

    #[test]
    fn test_module_output_clamps_strength() {
        let out = ModuleOutput::new(ModuleSignal::Buy, dec!(140), ());
        assert_eq!(out.strength, dec!(100));
        let out = ModuleOutput::new(ModuleSignal::Sell, dec!(-5), ());
        assert_eq!(out.strength, Decimal::ZERO);
    }

    #[test]
    fn test_sentinels_are_neutral() {
        let r: ModuleResult<()> = ModuleResult::InsufficientData {
            required: 50,
            available: 10,
        };
        assert_eq!(r.signal(), ModuleSignal::Neutral);
        assert_eq!(r.strength(), Decimal::ZERO);
        assert!(r.detail().is_none());
        assert_eq!(r.status(), "insufficient_data");

        let e: ModuleResult<()> = ModuleResult::error("boom");
        assert_eq!(e.status(), "error");
        assert_eq!(e.strength(), Decimal::ZERO);
    }

    #[test]
    fn test_module_result_serializes_with_status_tag() {
        let r: ModuleResult<BTreeMap<String, u32>> = ModuleResult::InsufficientData {
            required: 50,
            available: 12,
        };
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["status"], "insufficient_data");
        assert_eq!(v["required"], 50);

        let mut detail = BTreeMap::new();
        detail.insert("swings".to_string(), 3u32);
        let ok = ModuleResult::success(ModuleOutput::new(ModuleSignal::Watch, dec!(42), detail));
        let v = serde_json::to_value(&ok).unwrap();
        assert_eq!(v["status"], "success");
        assert_eq!(v["signal"], "WATCH");
        assert_eq!(v["strength"], "42");
        assert_eq!(v["detail"]["swings"], 3);
    }

    #[test]
    fn test_strength_tiers() {
        assert_eq!(StrengthTier::from_confidence(dec!(0.9)), StrengthTier::VeryStrong);
        assert_eq!(StrengthTier::from_confidence(dec!(0.7)), StrengthTier::Strong);
        assert_eq!(StrengthTier::from_confidence(dec!(0.55)), StrengthTier::Moderate);
        assert_eq!(StrengthTier::from_confidence(dec!(0.35)), StrengthTier::Weak);
        assert_eq!(StrengthTier::from_confidence(dec!(0.1)), StrengthTier::VeryWeak);
    }

    #[test]
    fn test_first_line_contract_optional_fields() {
        let json = r#"{"signal":"BUY","confidence":"0.7","trend":"bullish"}"#;
        let a: FirstLineAnalysis = serde_json::from_str(json).unwrap();
        assert_eq!(a.signal, ModuleSignal::Buy);
        assert!(a.support.is_none());
        assert!(a.indicators.is_empty());
    }
}
