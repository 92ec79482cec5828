//! Second-line combiner over the first-line readings.
//!
//! Takes the instrument-trend reading as its base signal and layers on
//! additive dip/peak opportunity scores, a false-signal risk estimate, a
//! per-timeframe confirmation gate and chart-pattern priority. Decision
//! precedence, highest first:
//!
//! 1. dip opportunity (BUY)
//! 2. peak opportunity (SELL)
//! 3. high false-signal risk (HOLD)
//! 4. unconfirmed on this horizon (HOLD)
//! 5. high-confidence pattern override
//! 6. base signal

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use crate::config::validate::{check_section, validate_combiner};
use crate::config::CombinerConfig;
use crate::errors::EngineError;
use crate::types::{
    Bias, CombinedSignal, CombinerDecision, DivergenceAnalysis, FalseSignalRisk,
    FirstLineAnalysis, HorizonConfirmation, IndicatorSnapshot, OpportunityScore, PatternSignal,
    RiskLevel, Timeframe, TradeAction,
};

// Opportunity evidence points.
const RSI_EXTREME_POINTS: Decimal = dec!(25);
const RSI_NEAR_POINTS: Decimal = dec!(15);
const BAND_POINTS: Decimal = dec!(20);
const DIVERGENCE_POINTS: Decimal = dec!(15);
const LEVEL_POINTS: Decimal = dec!(15);
const VOLUME_POINTS: Decimal = dec!(10);
const CROSS_POINTS: Decimal = dec!(10);
const PATTERN_POINTS: Decimal = dec!(15);
const POSSIBLE_POINTS: Decimal = dec!(110);

// Confidence adjustments.
const OPPORTUNITY_BOOST: Decimal = dec!(0.2);
const HORIZON_BOOST: Decimal = dec!(0.05);
const PATTERN_BOOST: Decimal = dec!(0.1);
const HIGH_RISK_PENALTY: Decimal = dec!(0.3);
const MEDIUM_RISK_PENALTY: Decimal = dec!(0.1);

/// Everything the combiner reads for one cycle.
#[derive(Debug, Clone, Copy)]
pub struct CombinerInputs<'a> {
    pub base: &'a FirstLineAnalysis,
    pub snapshot: &'a IndicatorSnapshot,
    pub divergence: Option<&'a DivergenceAnalysis>,
    pub cross_asset: Option<&'a FirstLineAnalysis>,
    pub currency_risk: Option<&'a FirstLineAnalysis>,
    pub pattern: Option<&'a PatternSignal>,
    pub timeframe: Timeframe,
}

pub struct SignalCombiner {
    config: CombinerConfig,
}

impl SignalCombiner {
    pub fn new(config: CombinerConfig) -> Result<Self, EngineError> {
        check_section(&config, validate_combiner)?;
        Ok(Self { config })
    }

    // -----------------------------------------------------------------------
    // Opportunity scores
    // -----------------------------------------------------------------------

    pub fn dip_score(&self, inputs: &CombinerInputs<'_>) -> OpportunityScore {
        self.opportunity(inputs, Bias::Bullish)
    }

    pub fn peak_score(&self, inputs: &CombinerInputs<'_>) -> OpportunityScore {
        self.opportunity(inputs, Bias::Bearish)
    }

    fn opportunity(&self, inputs: &CombinerInputs<'_>, side: Bias) -> OpportunityScore {
        let cfg = &self.config;
        let ind = inputs.snapshot;
        let price = ind.price;
        let mut achieved = Decimal::ZERO;
        let mut evidence = Vec::new();
        let bullish = side == Bias::Bullish;

        let rsi = ind.rsi_14;
        let (extreme, near) = if bullish {
            (rsi < cfg.rsi_oversold, rsi < cfg.rsi_near_oversold)
        } else {
            (rsi > cfg.rsi_overbought, rsi > cfg.rsi_near_overbought)
        };
        if extreme {
            achieved += RSI_EXTREME_POINTS;
            evidence.push(format!("RSI {} at extreme", rsi.round_dp(1)));
        } else if near {
            achieved += RSI_NEAR_POINTS;
            evidence.push(format!("RSI {} near extreme", rsi.round_dp(1)));
        }

        let band_margin = cfg.band_proximity_pct / dec!(100);
        let at_band = if bullish {
            price <= ind.bb_lower * (dec!(1) + band_margin)
        } else {
            price >= ind.bb_upper * (dec!(1) - band_margin)
        };
        if at_band && ind.bb_upper > ind.bb_lower {
            achieved += BAND_POINTS;
            evidence.push(if bullish { "lower band touch" } else { "upper band touch" }.to_string());
        }

        let divergence_points = self.divergence_points(inputs, side);
        if divergence_points > Decimal::ZERO {
            achieved += divergence_points;
            evidence.push("divergence supports reversal".to_string());
        }

        let level = if bullish { inputs.base.support } else { inputs.base.resistance };
        if let Some(level) = level {
            if price > Decimal::ZERO {
                let gap = if bullish { price - level } else { level - price };
                let distance_pct = gap / price * dec!(100);
                if distance_pct >= Decimal::ZERO && distance_pct <= cfg.level_proximity_pct {
                    achieved += LEVEL_POINTS;
                    evidence.push(format!(
                        "{} within {}%",
                        if bullish { "support" } else { "resistance" },
                        distance_pct.round_dp(2)
                    ));
                }
            }
        }

        if ind.volume_20_avg > Decimal::ZERO && ind.volume >= ind.volume_20_avg * cfg.volume_spike_ratio {
            achieved += VOLUME_POINTS;
            evidence.push("volume spike".to_string());
        }

        let crossed = if bullish {
            ind.macd_histogram_prev <= Decimal::ZERO && ind.macd_histogram > Decimal::ZERO
        } else {
            ind.macd_histogram_prev >= Decimal::ZERO && ind.macd_histogram < Decimal::ZERO
        };
        if crossed {
            achieved += CROSS_POINTS;
            evidence.push("MACD histogram cross".to_string());
        }

        if let Some(p) = inputs.pattern.filter(|p| p.bias == side) {
            let points = PATTERN_POINTS * clamp01(p.confidence) * clamp01(p.reliability);
            if points > Decimal::ZERO {
                achieved += points;
                evidence.push(format!("{} pattern", p.name));
            }
        }

        let ratio = (achieved / POSSIBLE_POINTS).min(dec!(1));
        let gated = if bullish {
            rsi < cfg.rsi_near_oversold && price < ind.bb_middle
        } else {
            rsi > cfg.rsi_near_overbought && price > ind.bb_middle
        };

        OpportunityScore {
            achieved,
            possible: POSSIBLE_POINTS,
            ratio: ratio.round_dp(4),
            triggered: ratio >= cfg.opportunity_threshold && gated,
            evidence,
        }
    }

    /// Divergence evidence: detector output scaled by its strength, or the
    /// base collaborator's flag at full weight, whichever is larger.
    fn divergence_points(&self, inputs: &CombinerInputs<'_>, side: Bias) -> Decimal {
        let from_detector = inputs
            .divergence
            .and_then(|d| d.dominant.as_ref())
            .filter(|d| !d.invalidated && d.kind.bias() == side)
            .map(|d| DIVERGENCE_POINTS * d.strength / dec!(100))
            .unwrap_or(Decimal::ZERO);
        let from_flag = if inputs.base.divergence == Some(side) {
            DIVERGENCE_POINTS
        } else {
            Decimal::ZERO
        };
        from_detector.max(from_flag)
    }

    // -----------------------------------------------------------------------
    // False-signal risk
    // -----------------------------------------------------------------------

    pub fn false_signal_risk(&self, inputs: &CombinerInputs<'_>) -> FalseSignalRisk {
        let cfg = &self.config;
        let mut score = Decimal::ZERO;
        let mut factors = Vec::new();
        let base_dir = inputs.base.signal.direction();

        let atr_pct = inputs.snapshot.atr_pct;
        if atr_pct >= cfg.high_volatility_pct {
            score += dec!(25);
            factors.push(format!("high volatility ({}% ATR)", atr_pct.round_dp(2)));
        } else if atr_pct >= cfg.elevated_volatility_pct {
            score += dec!(15);
            factors.push(format!("elevated volatility ({}% ATR)", atr_pct.round_dp(2)));
        }

        let trend_dir = inputs.base.trend.direction();
        if base_dir != 0 && trend_dir != 0 && base_dir != trend_dir {
            score += dec!(20);
            factors.push("signal against prevailing trend".to_string());
        }

        match inputs.currency_risk.and_then(|c| c.risk_level) {
            Some(RiskLevel::High) => {
                score += dec!(20);
                factors.push("high cross-asset risk".to_string());
            }
            Some(RiskLevel::Medium) => {
                score += dec!(10);
                factors.push("medium cross-asset risk".to_string());
            }
            _ => {}
        }

        if inputs.base.confidence < dec!(0.5) {
            score += dec!(15);
            factors.push("low base confidence".to_string());
        }

        if let Some(cross) = inputs.cross_asset {
            let cross_dir = cross.trend.direction();
            if base_dir != 0 && cross_dir != 0 && cross_dir != base_dir {
                score += dec!(15);
                factors.push("cross-asset trend disagrees".to_string());
            }
        }

        let score = score.min(dec!(100));
        let level = if score >= cfg.high_risk_score {
            RiskLevel::High
        } else if score >= cfg.medium_risk_score {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        };
        FalseSignalRisk { score, level, factors }
    }

    // -----------------------------------------------------------------------
    // Horizon confirmation
    // -----------------------------------------------------------------------

    pub fn horizon(&self, inputs: &CombinerInputs<'_>) -> HorizonConfirmation {
        let tf = inputs.timeframe;
        let weight = tf.confirmation_weight();
        let atr_pct = inputs.snapshot.atr_pct;
        let volatility_adjustment = if atr_pct >= self.config.high_volatility_pct {
            dec!(0.85)
        } else if atr_pct >= self.config.elevated_volatility_pct {
            dec!(0.95)
        } else {
            dec!(1)
        };
        let adjusted_confidence = inputs.base.confidence * weight * volatility_adjustment;
        let min_confidence = tf.min_confidence();
        let confirmed = !inputs.base.signal.is_directional() || adjusted_confidence >= min_confidence;
        HorizonConfirmation {
            timeframe: tf,
            weight,
            volatility_adjustment,
            adjusted_confidence,
            min_confidence,
            confirmed,
        }
    }

    // -----------------------------------------------------------------------
    // Decision
    // -----------------------------------------------------------------------

    pub fn combine(&self, inputs: &CombinerInputs<'_>) -> CombinedSignal {
        let dip = self.dip_score(inputs);
        let peak = self.peak_score(inputs);
        let risk = self.false_signal_risk(inputs);
        let horizon = self.horizon(inputs);
        let base = inputs.base;
        let base_dir = base.signal.direction();

        let priority_pattern = inputs.pattern.filter(|p| {
            let dir = p.bias.direction();
            p.confidence >= self.config.pattern_priority_confidence && dir != 0 && base_dir != -dir
        });

        let (signal, decision) = if dip.triggered {
            (TradeAction::Buy, CombinerDecision::DipOpportunity)
        } else if peak.triggered {
            (TradeAction::Sell, CombinerDecision::PeakOpportunity)
        } else if risk.level == RiskLevel::High {
            (TradeAction::Hold, CombinerDecision::HighRisk)
        } else if !horizon.confirmed {
            (TradeAction::Hold, CombinerDecision::Unconfirmed)
        } else if let Some(p) = priority_pattern {
            (TradeAction::from_direction(p.bias.direction()), CombinerDecision::PatternOverride)
        } else {
            (TradeAction::from_direction(base_dir), CombinerDecision::Base)
        };

        let pattern_applied = decision == CombinerDecision::PatternOverride
            || (signal != TradeAction::Hold
                && inputs
                    .pattern
                    .is_some_and(|p| p.bias.direction() == signal.direction()));

        let mut confidence = base.confidence;
        match decision {
            CombinerDecision::DipOpportunity => confidence += OPPORTUNITY_BOOST * dip.ratio,
            CombinerDecision::PeakOpportunity => confidence += OPPORTUNITY_BOOST * peak.ratio,
            _ => {}
        }
        if horizon.confirmed && signal != TradeAction::Hold {
            confidence += HORIZON_BOOST;
        }
        if pattern_applied {
            if let Some(p) = inputs.pattern {
                confidence += PATTERN_BOOST * clamp01(p.confidence);
            }
        }
        confidence -= match risk.level {
            RiskLevel::High => HIGH_RISK_PENALTY,
            RiskLevel::Medium => MEDIUM_RISK_PENALTY,
            RiskLevel::Low => Decimal::ZERO,
        };
        let floor = horizon.min_confidence * dec!(0.8);
        let confidence = confidence.max(floor).min(dec!(1));

        debug!(
            signal = signal.as_str(),
            decision = ?decision,
            confidence = %confidence,
            dip = %dip.ratio,
            peak = %peak.ratio,
            risk = ?risk.level,
            "signals combined"
        );

        CombinedSignal {
            signal,
            confidence,
            base_signal: base.signal,
            base_confidence: base.confidence,
            decision,
            dip,
            peak,
            risk,
            horizon,
            pattern_applied,
        }
    }
}

fn clamp01(v: Decimal) -> Decimal {
    v.max(Decimal::ZERO).min(dec!(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ModuleSignal;

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
            bb_upper: dec!(104),
            bb_middle: dec!(100),
            bb_lower: dec!(96),
            atr_14: dec!(1),
            atr_pct: dec!(1),
            volume: dec!(1000),
            volume_20_avg: dec!(1000),
        }
    }

    fn base(signal: ModuleSignal, confidence: Decimal, trend: Bias) -> FirstLineAnalysis {
        FirstLineAnalysis {
            signal,
            confidence,
            trend,
            ..FirstLineAnalysis::neutral()
        }
    }

    fn combiner() -> SignalCombiner {
        SignalCombiner::new(CombinerConfig::default()).unwrap()
    }

    fn inputs<'a>(
        base: &'a FirstLineAnalysis,
        snapshot: &'a IndicatorSnapshot,
        pattern: Option<&'a PatternSignal>,
    ) -> CombinerInputs<'a> {
        CombinerInputs {
            base,
            snapshot,
            divergence: None,
            cross_asset: None,
            currency_risk: None,
            pattern,
            timeframe: Timeframe::H1,
        }
    }

    #[test]
    fn test_dip_fires_on_stacked_evidence() {
        let mut s = snapshot();
        s.price = dec!(96.5);
        s.rsi_14 = dec!(25);
        s.volume = dec!(2000);
        s.macd_histogram_prev = dec!(-0.1);
        s.macd_histogram = dec!(0.05);
        let b = FirstLineAnalysis {
            support: Some(dec!(95.5)),
            ..base(ModuleSignal::Neutral, dec!(0.6), Bias::Neutral)
        };
        let c = combiner().combine(&inputs(&b, &s, None));
        // 25 RSI + 20 band + 15 support + 10 volume + 10 cross = 80 / 110
        assert_eq!(c.dip.achieved, dec!(80));
        assert!(c.dip.triggered);
        assert!(!c.peak.triggered);
        assert_eq!(c.signal, TradeAction::Buy);
        assert_eq!(c.decision, CombinerDecision::DipOpportunity);
        assert!(c.confidence > dec!(0.6) && c.confidence <= dec!(1));
    }

    #[test]
    fn test_dip_needs_price_below_middle_band() {
        let mut s = snapshot();
        s.price = dec!(101);
        s.rsi_14 = dec!(25);
        s.bb_lower = dec!(100.5);
        s.volume = dec!(2000);
        s.macd_histogram_prev = dec!(-0.1);
        s.macd_histogram = dec!(0.05);
        let b = FirstLineAnalysis {
            support: Some(dec!(100)),
            ..base(ModuleSignal::Neutral, dec!(0.6), Bias::Neutral)
        };
        let c = combiner().combine(&inputs(&b, &s, None));
        assert!(c.dip.ratio >= dec!(0.6));
        assert!(!c.dip.triggered);
    }

    #[test]
    fn test_bearish_pattern_overrides_neutral_base() {
        let s = snapshot();
        let b = base(ModuleSignal::Hold, dec!(0.7), Bias::Neutral);
        let pattern = PatternSignal {
            name: "head_and_shoulders".to_string(),
            bias: Bias::Bearish,
            confidence: dec!(0.8),
            reliability: dec!(0.7),
        };
        let c = combiner().combine(&inputs(&b, &s, Some(&pattern)));
        assert_eq!(c.signal, TradeAction::Sell);
        assert_eq!(c.decision, CombinerDecision::PatternOverride);
        assert!(c.pattern_applied);
    }

    #[test]
    fn test_pattern_cannot_flip_opposite_base() {
        let s = snapshot();
        let b = base(ModuleSignal::Buy, dec!(0.8), Bias::Bullish);
        let pattern = PatternSignal {
            name: "head_and_shoulders".to_string(),
            bias: Bias::Bearish,
            confidence: dec!(0.8),
            reliability: dec!(0.7),
        };
        let c = combiner().combine(&inputs(&b, &s, Some(&pattern)));
        assert_eq!(c.signal, TradeAction::Buy);
        assert_eq!(c.decision, CombinerDecision::Base);
    }

    #[test]
    fn test_high_risk_forces_hold() {
        let mut s = snapshot();
        s.atr_pct = dec!(5);
        let b = base(ModuleSignal::Buy, dec!(0.4), Bias::Bearish);
        let c = combiner().combine(&inputs(&b, &s, None));
        // 25 volatility + 20 mismatch + 15 low confidence
        assert_eq!(c.risk.score, dec!(60));
        assert_eq!(c.risk.level, RiskLevel::High);
        assert_eq!(c.signal, TradeAction::Hold);
        assert_eq!(c.decision, CombinerDecision::HighRisk);
    }

    #[test]
    fn test_weak_signal_unconfirmed_on_short_horizon() {
        let s = snapshot();
        let b = base(ModuleSignal::Buy, dec!(0.6), Bias::Bullish);
        let mut i = inputs(&b, &s, None);
        i.timeframe = Timeframe::M1;
        let c = combiner().combine(&i);
        // 0.6 * 0.7 < 0.75
        assert!(!c.horizon.confirmed);
        assert_eq!(c.signal, TradeAction::Hold);
        assert_eq!(c.decision, CombinerDecision::Unconfirmed);
        assert_eq!(c.confidence, dec!(0.6));
    }

    #[test]
    fn test_confidence_floor_and_cap() {
        let s = snapshot();
        let b = base(ModuleSignal::Neutral, dec!(0.1), Bias::Neutral);
        let c = combiner().combine(&inputs(&b, &s, None));
        assert_eq!(c.signal, TradeAction::Hold);
        // H1 floor: 0.8 * 0.60
        assert_eq!(c.confidence, dec!(0.48));

        let b = base(ModuleSignal::Buy, dec!(1), Bias::Bullish);
        let c = combiner().combine(&inputs(&b, &s, None));
        assert_eq!(c.confidence, dec!(1));
    }

    #[test]
    fn test_baseline_band_is_scored_once() {
        let mut s = snapshot();
        s.price = dec!(96.5);
        let b = crate::core::baseline::TechnicalBaseline::from_snapshot(&s);
        let dip = combiner().dip_score(&inputs(&b, &s, None));
        assert_eq!(dip.achieved, dec!(20));
        assert_eq!(dip.evidence, vec!["lower band touch".to_string()]);
    }
}
