//! Seams between the orchestrator and the analyzers it fans out to.
//!
//! Leaf analyzers are pure functions of a candle window. First-line
//! analyzers are external collaborators that additionally read the
//! cross-asset market data. Both are invoked through isolation wrappers that
//! turn short windows, errors and panics into tagged sentinels so a single
//! misbehaving module can never abort a cycle.

use std::panic::{self, AssertUnwindSafe};

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::constants::{MODULE_CROSS_ASSET, MODULE_CURRENCY_RISK, MODULE_INSTRUMENT_TREND};
use crate::errors::EngineError;
use crate::types::{Candle, FirstLineAnalysis, MarketDataPoint, ModuleOutput, ModuleResult};

/// A structural or statistical analyzer over one candle window.
pub trait LeafAnalyzer: Send + Sync {
    type Detail: Send;

    /// Module key in the result record and the weight table.
    const NAME: &'static str;

    /// Shortest window the analyzer accepts.
    fn min_candles(&self) -> usize;

    fn analyze(&self, candles: &[Candle]) -> Result<ModuleOutput<Self::Detail>, EngineError>;
}

/// Run a leaf analyzer with input-length gating and panic isolation.
pub fn run_isolated<A: LeafAnalyzer>(analyzer: &A, candles: &[Candle]) -> ModuleResult<A::Detail> {
    let required = analyzer.min_candles();
    if candles.len() < required {
        warn!(
            module = A::NAME,
            required,
            available = candles.len(),
            "insufficient data"
        );
        return ModuleResult::InsufficientData {
            required,
            available: candles.len(),
        };
    }

    match panic::catch_unwind(AssertUnwindSafe(|| analyzer.analyze(candles))) {
        Ok(Ok(output)) => {
            debug!(
                module = A::NAME,
                signal = ?output.signal,
                strength = %output.strength,
                "analyzer complete"
            );
            ModuleResult::success(output)
        }
        Ok(Err(EngineError::InsufficientData {
            required,
            available,
            ..
        })) => {
            warn!(module = A::NAME, required, available, "insufficient data");
            ModuleResult::InsufficientData {
                required,
                available,
            }
        }
        Ok(Err(e)) => {
            warn!(module = A::NAME, error = %e, "analyzer failed");
            ModuleResult::error(e.to_string())
        }
        Err(payload) => {
            let err = EngineError::AnalyzerPanic {
                module: A::NAME.to_string(),
                reason: panic_message(payload.as_ref()),
            };
            warn!(module = A::NAME, error = %err, "analyzer panicked");
            ModuleResult::error(err.to_string())
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// First-line collaborators
// ═══════════════════════════════════════════════════════════════════════════

/// Which first-line slot an analyzer fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FirstLineRole {
    InstrumentTrend,
    CrossAsset,
    CurrencyRisk,
}

impl FirstLineRole {
    pub fn module_name(&self) -> &'static str {
        match self {
            Self::InstrumentTrend => MODULE_INSTRUMENT_TREND,
            Self::CrossAsset => MODULE_CROSS_ASSET,
            Self::CurrencyRisk => MODULE_CURRENCY_RISK,
        }
    }
}

/// External analyzer consumed as a black box through its output contract.
pub trait FirstLineAnalyzer: Send + Sync {
    fn name(&self) -> &str;

    fn analyze(
        &self,
        candles: &[Candle],
        market_data: &[MarketDataPoint],
    ) -> Result<FirstLineAnalysis, EngineError>;
}

/// Wrap a first-line analysis as a module result. Strength is the
/// collaborator's confidence rescaled to 0-100.
pub fn first_line_result(analysis: FirstLineAnalysis) -> ModuleResult<FirstLineAnalysis> {
    let confidence = analysis.confidence.max(Decimal::ZERO).min(dec!(1));
    ModuleResult::success(ModuleOutput::new(
        analysis.signal,
        confidence * dec!(100),
        analysis,
    ))
}

/// Run a first-line collaborator with panic isolation.
pub fn run_first_line(
    role: FirstLineRole,
    analyzer: &dyn FirstLineAnalyzer,
    candles: &[Candle],
    market_data: &[MarketDataPoint],
) -> ModuleResult<FirstLineAnalysis> {
    let module = role.module_name();
    match panic::catch_unwind(AssertUnwindSafe(|| analyzer.analyze(candles, market_data))) {
        Ok(Ok(analysis)) => first_line_result(analysis),
        Ok(Err(e)) => {
            warn!(module, analyzer = analyzer.name(), error = %e, "first-line analyzer failed");
            ModuleResult::error(e.to_string())
        }
        Err(payload) => {
            let err = EngineError::AnalyzerPanic {
                module: module.to_string(),
                reason: panic_message(payload.as_ref()),
            };
            warn!(module, error = %err, "first-line analyzer panicked");
            ModuleResult::error(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Bias, ModuleSignal, Timeframe};

    struct Fixed;

    impl LeafAnalyzer for Fixed {
        type Detail = u32;
        const NAME: &'static str = "fixed";

        fn min_candles(&self) -> usize {
            3
        }

        fn analyze(&self, candles: &[Candle]) -> Result<ModuleOutput<u32>, EngineError> {
            Ok(ModuleOutput::new(ModuleSignal::Buy, dec!(70), candles.len() as u32))
        }
    }

    struct Panicky;

    impl LeafAnalyzer for Panicky {
        type Detail = ();
        const NAME: &'static str = "panicky";

        fn min_candles(&self) -> usize {
            0
        }

        fn analyze(&self, _candles: &[Candle]) -> Result<ModuleOutput<()>, EngineError> {
            panic!("index out of range");
        }
    }

    struct Failing;

    impl LeafAnalyzer for Failing {
        type Detail = ();
        const NAME: &'static str = "failing";

        fn min_candles(&self) -> usize {
            0
        }

        fn analyze(&self, _candles: &[Candle]) -> Result<ModuleOutput<()>, EngineError> {
            Err(EngineError::numeric("zero range"))
        }
    }

    fn candles(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| Candle {
                timestamp: i as i64,
                open: dec!(10),
                high: dec!(11),
                low: dec!(9),
                close: dec!(10),
                volume: dec!(1),
                interval: Timeframe::H1,
            })
            .collect()
    }

    #[test]
    fn test_short_window_is_insufficient() {
        let r = run_isolated(&Fixed, &candles(2));
        assert_eq!(
            r,
            ModuleResult::InsufficientData {
                required: 3,
                available: 2
            }
        );
    }

    #[test]
    fn test_success_passes_through() {
        let r = run_isolated(&Fixed, &candles(5));
        assert_eq!(r.signal(), ModuleSignal::Buy);
        assert_eq!(r.detail(), Some(&5));
    }

    #[test]
    fn test_panic_becomes_error_sentinel() {
        let r = run_isolated(&Panicky, &candles(1));
        match r {
            ModuleResult::Error { reason } => assert!(reason.contains("index out of range")),
            other => panic!("expected error sentinel, got {other:?}"),
        }
    }

    #[test]
    fn test_error_becomes_error_sentinel() {
        let r = run_isolated(&Failing, &candles(1));
        assert_eq!(r.status(), "error");
        assert_eq!(r.strength(), Decimal::ZERO);
    }

    #[test]
    fn test_first_line_strength_is_scaled_confidence() {
        let mut a = FirstLineAnalysis::neutral();
        a.signal = ModuleSignal::Bullish;
        a.confidence = dec!(0.65);
        a.trend = Bias::Bullish;
        let r = first_line_result(a);
        assert_eq!(r.strength(), dec!(65));
        assert_eq!(r.signal(), ModuleSignal::Bullish);
    }
}
