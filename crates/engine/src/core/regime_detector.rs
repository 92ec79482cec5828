//! Market regime classification.
//!
//! Three independent readings are combined per cycle:
//! - Volatility: Wilder ATR as a percentage of price, bucketed into five
//!   ordered regimes, ranked against a trailing window, with
//!   expansion/contraction flags and squeeze detection.
//! - Trend: Wilder DMI/ADX, trending/transitioning/ranging with DI dominance
//!   for direction and ADX slope for breakout potential.
//! - Momentum: RSI plus MACD-histogram rate of change relative to its own
//!   recent dispersion.
//!
//! From these the detector derives regime-adaptive trading parameters and a
//! transition probability. The only state it keeps is a bounded history of
//! past regime snapshots, used to estimate how often a similar regime has
//! changed on the following cycle.
//!
//! References:
//!     Wilder (1978), "New Concepts in Technical Trading Systems".
//!     Bollinger (2001), "Bollinger on Bollinger Bands" (volatility squeeze).

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use super::analyzer::LeafAnalyzer;
use super::indicators;
use super::ring_buffer::RingBuffer;
use crate::config::validate::{check_section, validate_regime};
use crate::config::RegimeConfig;
use crate::constants::{MODULE_REGIME, SCORE_MAX};
use crate::errors::EngineError;
use crate::types::{
    AdaptiveParameters, Bias, Candle, Columns, ModuleOutput, ModuleSignal, MomentumAnalysis,
    MomentumState, RegimeAnalysis, RegimeHistoryEntry, RegimeTransition, RiskLevel,
    TrendAnalysis, TrendRegime, VolatilityAnalysis, VolatilityRegime,
};

/// History matches needed before historical transitions are trusted.
const MIN_HISTORY_MATCHES: usize = 3;
/// Window of the momentum-alignment and histogram-dispersion checks.
const ALIGNMENT_LOOKBACK: usize = 5;
const HISTOGRAM_STD_WINDOW: usize = 10;
const PEAK_DIVERGENCE_WINDOW: usize = 10;
const ADX_SLOPE_WINDOW: usize = 5;

pub struct RegimeDetector {
    config: RegimeConfig,
    history: RingBuffer<RegimeHistoryEntry>,
}

impl RegimeDetector {
    pub fn new(config: RegimeConfig) -> Result<Self, EngineError> {
        check_section(&config, validate_regime)?;
        let history = RingBuffer::new(config.history_capacity);
        Ok(Self { config, history })
    }

    /// Append this cycle's regime to the transition history.
    pub fn record(&mut self, analysis: &RegimeAnalysis) {
        self.history.push(analysis.history_entry());
    }

    /// Snapshot of the recorded regimes, oldest first.
    pub fn history(&self) -> Vec<RegimeHistoryEntry> {
        self.history.snapshot()
    }

    // -----------------------------------------------------------------------
    // Volatility
    // -----------------------------------------------------------------------

    pub fn analyze_volatility(&self, cols: &Columns) -> Result<VolatilityAnalysis, EngineError> {
        let cfg = &self.config;
        let period = cfg.atr_period;
        let atrs = indicators::atr_series(&cols.highs, &cols.lows, &cols.closes, period);
        let atr = *atrs.last().ok_or_else(|| insufficient(period + 1, cols.closes.len()))?;

        let atr_pcts: Vec<Decimal> = atrs
            .iter()
            .enumerate()
            .map(|(j, &a)| {
                let close = cols.closes[j + period];
                if close > Decimal::ZERO {
                    a / close * dec!(100)
                } else {
                    Decimal::ZERO
                }
            })
            .collect();
        let atr_pct = atr_pcts.last().copied().unwrap_or(Decimal::ZERO);

        let edges = &cfg.volatility_edges_pct;
        let regime = if atr_pct < edges[0] {
            VolatilityRegime::VeryLow
        } else if atr_pct < edges[1] {
            VolatilityRegime::Low
        } else if atr_pct < edges[2] {
            VolatilityRegime::Normal
        } else if atr_pct < edges[3] {
            VolatilityRegime::High
        } else {
            VolatilityRegime::Extreme
        };

        let window_start = atr_pcts.len().saturating_sub(cfg.percentile_window);
        let percentile = indicators::percentile_rank(&atr_pcts[window_start..], atr_pct);

        let lookback = cfg.expansion_lookback;
        let (expanding, contracting) = if atrs.len() >= 2 * lookback {
            let recent = indicators::mean(&atrs[atrs.len() - lookback..]);
            let prior = indicators::mean(&atrs[atrs.len() - 2 * lookback..atrs.len() - lookback]);
            if prior > Decimal::ZERO {
                let ratio = recent / prior;
                (
                    ratio > dec!(1) + cfg.expansion_threshold,
                    ratio < dec!(1) - cfg.expansion_threshold,
                )
            } else {
                (recent > Decimal::ZERO, false)
            }
        } else {
            (false, false)
        };

        let squeeze_potential =
            regime.is_low() && contracting && percentile < cfg.squeeze_percentile;

        Ok(VolatilityAnalysis {
            regime,
            atr,
            atr_pct,
            percentile,
            expanding,
            contracting,
            squeeze_potential,
        })
    }

    // -----------------------------------------------------------------------
    // Trend
    // -----------------------------------------------------------------------

    pub fn analyze_trend(&self, cols: &Columns) -> Result<TrendAnalysis, EngineError> {
        let cfg = &self.config;
        let dmi = indicators::dmi(&cols.highs, &cols.lows, &cols.closes, cfg.adx_period);
        let adx = *dmi
            .adx
            .last()
            .ok_or_else(|| insufficient(2 * cfg.adx_period + 1, cols.closes.len()))?;
        let plus_di = dmi.plus_di.last().copied().unwrap_or(Decimal::ZERO);
        let minus_di = dmi.minus_di.last().copied().unwrap_or(Decimal::ZERO);

        let regime = if adx >= cfg.adx_trending {
            TrendRegime::Trending
        } else if adx >= cfg.adx_transitioning {
            TrendRegime::Transitioning
        } else {
            TrendRegime::Ranging
        };

        let dominance = dec!(1) + cfg.di_dominance;
        let direction = if plus_di > minus_di * dominance {
            Bias::Bullish
        } else if minus_di > plus_di * dominance {
            Bias::Bearish
        } else {
            Bias::Neutral
        };

        let strength = (adx / dec!(50) * SCORE_MAX).min(SCORE_MAX);

        let n = dmi.adx.len();
        let adx_slope = if n >= 2 * ADX_SLOPE_WINDOW {
            indicators::mean(&dmi.adx[n - ADX_SLOPE_WINDOW..])
                - indicators::mean(&dmi.adx[n - 2 * ADX_SLOPE_WINDOW..n - ADX_SLOPE_WINDOW])
        } else {
            Decimal::ZERO
        };
        let breakout_potential =
            regime == TrendRegime::Ranging && adx_slope > cfg.breakout_adx_slope;

        Ok(TrendAnalysis {
            regime,
            direction,
            adx,
            plus_di,
            minus_di,
            strength,
            adx_slope,
            breakout_potential,
        })
    }

    // -----------------------------------------------------------------------
    // Momentum
    // -----------------------------------------------------------------------

    pub fn analyze_momentum(&self, cols: &Columns) -> Result<MomentumAnalysis, EngineError> {
        let cfg = &self.config;
        let closes = &cols.closes;
        let rsis = indicators::rsi_series(closes, cfg.rsi_period);
        let macd = indicators::macd_series(closes, cfg.macd_fast, cfg.macd_slow, cfg.macd_signal);
        let hist = &macd.histogram;

        let needed_hist = HISTOGRAM_STD_WINDOW + 1;
        if hist.len() < needed_hist || rsis.len() <= ALIGNMENT_LOOKBACK {
            return Err(insufficient(
                cfg.macd_slow + cfg.macd_signal - 1 + needed_hist,
                closes.len(),
            ));
        }

        let rsi = rsis[rsis.len() - 1];
        let h = hist[hist.len() - 1];
        let h_prev = hist[hist.len() - 2];
        let roc = h - h_prev;
        let dispersion = indicators::std_dev(&hist[hist.len() - HISTOGRAM_STD_WINDOW..]);

        let rsi_extreme_for_exhaustion =
            rsi > cfg.exhaustion_rsi_high || rsi < cfg.exhaustion_rsi_low;
        let state = if rsi_extreme_for_exhaustion && h.abs() < h_prev.abs() {
            MomentumState::Exhausted
        } else if dispersion > Decimal::ZERO && roc.abs() > dispersion * dec!(0.5) {
            let agreement = roc * h;
            if agreement > Decimal::ZERO {
                MomentumState::Accelerating
            } else if agreement < Decimal::ZERO {
                MomentumState::Decelerating
            } else {
                MomentumState::Stable
            }
        } else {
            MomentumState::Stable
        };

        let rsi_momentum = rsi - rsis[rsis.len() - 1 - ALIGNMENT_LOOKBACK];
        let macd_momentum = h - hist[hist.len() - 1 - ALIGNMENT_LOOKBACK];
        let aligned = !rsi_momentum.is_zero()
            && !macd_momentum.is_zero()
            && rsi_momentum.is_sign_positive() == macd_momentum.is_sign_positive();

        let peak_divergence = peak_divergence(closes, hist);

        let mut reversal = Decimal::ZERO;
        if rsi > cfg.rsi_extreme_high || rsi < cfg.rsi_extreme_low {
            reversal += dec!(40);
        }
        if peak_divergence {
            reversal += dec!(30);
        }
        if state == MomentumState::Exhausted {
            reversal += dec!(20);
        }
        if state == MomentumState::Decelerating {
            reversal += dec!(10);
        }

        Ok(MomentumAnalysis {
            state,
            rsi,
            macd_histogram: h,
            histogram_roc: roc,
            aligned,
            peak_divergence,
            reversal_potential: reversal.min(SCORE_MAX),
        })
    }

    // -----------------------------------------------------------------------
    // Adaptive parameters
    // -----------------------------------------------------------------------

    /// Layered mapping: base → volatility tier → trend tier → momentum state
    /// → hard clamp.
    pub fn adaptive_parameters(
        &self,
        volatility: &VolatilityAnalysis,
        trend: &TrendAnalysis,
        momentum: &MomentumAnalysis,
    ) -> AdaptiveParameters {
        let base = &self.config.adaptive_base;
        let mut p = AdaptiveParameters {
            rsi_oversold: base.rsi_oversold,
            rsi_overbought: base.rsi_overbought,
            signal_threshold: base.signal_threshold,
            stop_loss_multiplier: base.stop_loss_multiplier,
            take_profit_multiplier: base.take_profit_multiplier,
            position_size_multiplier: base.position_size_multiplier,
        };

        match volatility.regime {
            VolatilityRegime::VeryLow => {
                p.signal_threshold -= dec!(0.05);
                p.stop_loss_multiplier *= dec!(0.8);
                p.take_profit_multiplier *= dec!(0.8);
                p.position_size_multiplier *= dec!(1.2);
            }
            VolatilityRegime::Low => {
                p.signal_threshold -= dec!(0.02);
                p.stop_loss_multiplier *= dec!(0.9);
                p.take_profit_multiplier *= dec!(0.9);
                p.position_size_multiplier *= dec!(1.1);
            }
            VolatilityRegime::Normal => {}
            VolatilityRegime::High => {
                p.rsi_oversold -= dec!(5);
                p.rsi_overbought += dec!(5);
                p.signal_threshold += dec!(0.05);
                p.stop_loss_multiplier *= dec!(1.3);
                p.take_profit_multiplier *= dec!(1.2);
                p.position_size_multiplier *= dec!(0.7);
            }
            VolatilityRegime::Extreme => {
                p.rsi_oversold -= dec!(10);
                p.rsi_overbought += dec!(10);
                p.signal_threshold += dec!(0.1);
                p.stop_loss_multiplier *= dec!(1.6);
                p.take_profit_multiplier *= dec!(1.4);
                p.position_size_multiplier *= dec!(0.5);
            }
        }

        match (trend.regime, trend.direction) {
            (TrendRegime::Trending, Bias::Bullish) => {
                // Pullbacks in an uptrend rarely reach classic oversold.
                p.rsi_oversold += dec!(5);
                p.rsi_overbought += dec!(5);
                p.take_profit_multiplier *= dec!(1.3);
            }
            (TrendRegime::Trending, Bias::Bearish) => {
                p.rsi_oversold -= dec!(5);
                p.rsi_overbought -= dec!(5);
                p.take_profit_multiplier *= dec!(1.3);
            }
            (TrendRegime::Trending, Bias::Neutral) => {
                p.take_profit_multiplier *= dec!(1.2);
            }
            (TrendRegime::Ranging, _) => {
                p.signal_threshold += dec!(0.02);
                p.take_profit_multiplier *= dec!(0.8);
            }
            (TrendRegime::Transitioning, _) => {
                p.signal_threshold += dec!(0.05);
                p.position_size_multiplier *= dec!(0.8);
            }
        }

        match momentum.state {
            MomentumState::Accelerating => {
                p.position_size_multiplier *= dec!(1.1);
            }
            MomentumState::Decelerating => {
                p.signal_threshold += dec!(0.02);
                p.position_size_multiplier *= dec!(0.9);
            }
            MomentumState::Exhausted => {
                p.signal_threshold += dec!(0.05);
                p.stop_loss_multiplier *= dec!(0.9);
                p.position_size_multiplier *= dec!(0.7);
            }
            MomentumState::Stable => {}
        }

        p.rsi_oversold = clamp(p.rsi_oversold, dec!(20), dec!(40));
        p.rsi_overbought = clamp(p.rsi_overbought, dec!(60), dec!(80));
        p.signal_threshold = clamp(p.signal_threshold, dec!(0.2), dec!(0.5));
        p.stop_loss_multiplier = clamp(p.stop_loss_multiplier, dec!(1.0), dec!(4.0));
        p.take_profit_multiplier = clamp(p.take_profit_multiplier, dec!(1.5), dec!(6.0));
        p.position_size_multiplier = clamp(p.position_size_multiplier, dec!(0.25), dec!(1.5));
        p
    }

    // -----------------------------------------------------------------------
    // Transition probability
    // -----------------------------------------------------------------------

    pub fn transition(
        &self,
        volatility: &VolatilityAnalysis,
        trend: &TrendAnalysis,
        momentum: &MomentumAnalysis,
    ) -> RegimeTransition {
        let mut probability = Decimal::ZERO;
        let mut triggers = Vec::new();

        if volatility.squeeze_potential {
            probability += dec!(25);
            triggers.push("volatility squeeze".to_string());
        }
        if volatility.expanding {
            probability += dec!(20);
            triggers.push("volatility expanding".to_string());
        }
        if trend.breakout_potential {
            probability += dec!(25);
            triggers.push("ADX rising out of range".to_string());
        }
        match momentum.state {
            MomentumState::Exhausted => {
                probability += dec!(25);
                triggers.push("momentum exhausted".to_string());
            }
            MomentumState::Decelerating => {
                probability += dec!(15);
                triggers.push("momentum decelerating".to_string());
            }
            _ => {}
        }

        if let Some(fraction) =
            self.historical_change_rate(volatility.regime, trend.regime, momentum.state)
        {
            probability += dec!(20) * fraction;
            if fraction > Decimal::ZERO {
                triggers.push(format!("similar regimes changed {}% of the time", (fraction * dec!(100)).round()));
            }
        }

        let probability = probability.min(SCORE_MAX);
        let early_warning = probability > self.config.early_warning_probability
            || volatility.squeeze_potential
            || trend.breakout_potential
            || momentum.state == MomentumState::Exhausted;

        RegimeTransition {
            probability,
            early_warning,
            triggers,
        }
    }

    /// Fraction of recorded cycles matching the given regime whose next
    /// cycle had a different volatility or trend regime.
    fn historical_change_rate(
        &self,
        volatility: VolatilityRegime,
        trend: TrendRegime,
        momentum: MomentumState,
    ) -> Option<Decimal> {
        let entries = self.history.snapshot();
        let mut matches = 0usize;
        let mut changed = 0usize;
        for pair in entries.windows(2) {
            let (cur, next) = (&pair[0], &pair[1]);
            if cur.volatility == volatility && cur.trend == trend && cur.momentum == momentum {
                matches += 1;
                if next.volatility != cur.volatility || next.trend != cur.trend {
                    changed += 1;
                }
            }
        }
        if matches < MIN_HISTORY_MATCHES {
            return None;
        }
        Some(Decimal::from(changed as u64) / Decimal::from(matches as u64))
    }

    // -----------------------------------------------------------------------
    // Composite
    // -----------------------------------------------------------------------

    pub fn analyze_regime(&self, candles: &[Candle]) -> Result<RegimeAnalysis, EngineError> {
        if candles.len() < self.config.min_candles {
            return Err(insufficient(self.config.min_candles, candles.len()));
        }
        let cols = Columns::from_candles(candles);

        let volatility = self.analyze_volatility(&cols)?;
        let trend = self.analyze_trend(&cols)?;
        let momentum = self.analyze_momentum(&cols)?;
        let adaptive = self.adaptive_parameters(&volatility, &trend, &momentum);
        let transition = self.transition(&volatility, &trend, &momentum);

        let overall_score = (trend.strength * dec!(0.4)
            + volatility.regime.score()
            + momentum.state.score())
        .max(Decimal::ZERO)
        .min(SCORE_MAX);

        let risk_level = if volatility.regime == VolatilityRegime::Extreme
            || (volatility.regime == VolatilityRegime::High
                && transition.probability > self.config.early_warning_probability)
        {
            RiskLevel::High
        } else if volatility.regime.is_low() && trend.regime == TrendRegime::Trending {
            RiskLevel::Low
        } else {
            RiskLevel::Medium
        };

        debug!(
            volatility = ?volatility.regime,
            trend = ?trend.regime,
            direction = ?trend.direction,
            momentum = ?momentum.state,
            overall = %overall_score,
            transition = %transition.probability,
            "regime classified"
        );

        Ok(RegimeAnalysis {
            volatility,
            trend,
            momentum,
            adaptive,
            transition,
            overall_score,
            risk_level,
        })
    }
}

impl LeafAnalyzer for RegimeDetector {
    type Detail = RegimeAnalysis;
    const NAME: &'static str = MODULE_REGIME;

    fn min_candles(&self) -> usize {
        self.config.min_candles
    }

    /// Trending regimes vote with their direction at ADX-derived strength;
    /// everything else is neutral at the overall regime score.
    fn analyze(&self, candles: &[Candle]) -> Result<ModuleOutput<RegimeAnalysis>, EngineError> {
        let analysis = self.analyze_regime(candles)?;
        let (signal, strength) = match (analysis.trend.regime, analysis.trend.direction) {
            (TrendRegime::Trending, Bias::Bullish) => (ModuleSignal::Bullish, analysis.trend.strength),
            (TrendRegime::Trending, Bias::Bearish) => (ModuleSignal::Bearish, analysis.trend.strength),
            _ => (ModuleSignal::Neutral, analysis.overall_score),
        };
        Ok(ModuleOutput::new(signal, strength, analysis))
    }
}

/// Price/momentum disagreement between the last window and the one before:
/// a higher price high on a lower histogram high, or a lower price low on a
/// higher histogram low.
fn peak_divergence(closes: &[Decimal], hist: &[Decimal]) -> bool {
    let w = PEAK_DIVERGENCE_WINDOW;
    if closes.len() < 2 * w || hist.len() < 2 * w {
        return false;
    }
    let max = |s: &[Decimal]| s.iter().copied().fold(s[0], Decimal::max);
    let min = |s: &[Decimal]| s.iter().copied().fold(s[0], Decimal::min);

    let (pc, pp) = (&closes[closes.len() - w..], &closes[closes.len() - 2 * w..closes.len() - w]);
    let (hc, hp) = (&hist[hist.len() - w..], &hist[hist.len() - 2 * w..hist.len() - w]);

    let bearish = max(pc) > max(pp) && max(hc) < max(hp);
    let bullish = min(pc) < min(pp) && min(hc) > min(hp);
    bearish || bullish
}

fn clamp(v: Decimal, lo: Decimal, hi: Decimal) -> Decimal {
    v.max(lo).min(hi)
}

fn insufficient(required: usize, available: usize) -> EngineError {
    EngineError::InsufficientData {
        module: MODULE_REGIME.to_string(),
        required,
        available,
    }
}
