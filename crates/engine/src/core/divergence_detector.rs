//! Price/oscillator divergence detection across RSI, MACD histogram and
//! stochastic %K.
//!
//! Swing lows of price are paired with oscillator troughs (bullish side) and
//! swing highs with oscillator peaks (bearish side). A pair of consecutive
//! swings whose slopes disagree by at least the minimum angle becomes a
//! candidate, then is scored for strength, maturity and expected success.
//!
//! Each segment's slope is `atan(value delta / index delta)` in degrees,
//! taken on the raw series.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use super::analyzer::LeafAnalyzer;
use super::indicators;
use super::swings::{enforce_separation, local_maxima, local_minima};
use crate::config::validate::{check_section, validate_divergence};
use crate::config::DivergenceConfig;
use crate::constants::{
    MODULE_DIVERGENCE, OSCILLATOR_COUNT, OSC_MACD, OSC_RSI, OSC_STOCHASTIC, SCORE_MAX,
};
use crate::errors::EngineError;
use crate::types::{
    Bias, Candle, Columns, Divergence, DivergenceAnalysis, DivergenceClass, DivergenceKind,
    ModuleOutput, ModuleSignal, PivotPoint, SwingKind,
};

/// Angle at which the angle component of strength saturates.
const ANGLE_SATURATION_DEG: Decimal = dec!(60);
/// Pivot distance at which the period component saturates.
const PERIOD_SATURATION: Decimal = dec!(50);

/// One oscillator aligned to the candle window.
pub struct Oscillator {
    pub name: &'static str,
    /// Candle index of `values[0]`.
    pub offset: usize,
    pub values: Vec<Decimal>,
}

impl Oscillator {
    /// Pivots mapped to candle indices.
    fn pivots(&self, kind: SwingKind, order: usize, min_separation: usize) -> Vec<PivotPoint> {
        let raw = match kind {
            SwingKind::High => local_maxima(&self.values, order),
            SwingKind::Low => local_minima(&self.values, order),
        };
        enforce_separation(&raw, &self.values, min_separation, kind)
            .into_iter()
            .map(|j| PivotPoint {
                index: j + self.offset,
                value: self.values[j],
            })
            .collect()
    }

    /// Whether `value` sits in this oscillator's overbought/oversold zone for
    /// a divergence of the given bias.
    fn in_extreme_zone(&self, value: Decimal, bias: Bias) -> bool {
        let (low, high) = match self.name {
            OSC_RSI => (dec!(30), dec!(70)),
            OSC_STOCHASTIC => (dec!(20), dec!(80)),
            _ => return false,
        };
        match bias {
            Bias::Bullish => value < low,
            Bias::Bearish => value > high,
            Bias::Neutral => false,
        }
    }
}

/// Fixed window facts shared by every candidate.
pub struct WindowContext<'a> {
    /// Lows for the bullish side, highs for the bearish side.
    pub prices: &'a [Decimal],
    pub last_index: usize,
    pub current_price: Decimal,
}

pub struct DivergenceDetector {
    config: DivergenceConfig,
}

impl DivergenceDetector {
    pub fn new(config: DivergenceConfig) -> Result<Self, EngineError> {
        check_section(&config, validate_divergence)?;
        Ok(Self { config })
    }

    pub fn oscillators(&self, cols: &Columns) -> Vec<Oscillator> {
        let cfg = &self.config;
        let n = cols.closes.len();
        let mut out = Vec::with_capacity(OSCILLATOR_COUNT as usize);

        let rsi = indicators::rsi_series(&cols.closes, cfg.rsi_period);
        if !rsi.is_empty() {
            out.push(Oscillator {
                name: OSC_RSI,
                offset: n - rsi.len(),
                values: rsi,
            });
        }

        let macd = indicators::macd_series(&cols.closes, cfg.macd_fast, cfg.macd_slow, cfg.macd_signal);
        if !macd.histogram.is_empty() {
            out.push(Oscillator {
                name: OSC_MACD,
                offset: macd.histogram_offset(n),
                values: macd.histogram,
            });
        }

        let (k, _) = indicators::stochastic(&cols.highs, &cols.lows, &cols.closes, cfg.stoch_k, cfg.stoch_d);
        if !k.is_empty() {
            out.push(Oscillator {
                name: OSC_STOCHASTIC,
                offset: n - k.len(),
                values: k,
            });
        }
        out
    }

    /// Divergences between the price swings of one side and one oscillator.
    pub fn find_divergences(
        &self,
        side: SwingKind,
        price_swings: &[usize],
        oscillator: &Oscillator,
        ctx: &WindowContext<'_>,
    ) -> Vec<Divergence> {
        let cfg = &self.config;
        let pivots = oscillator.pivots(side, cfg.swing_order, cfg.min_swing_separation);

        let mut found = Vec::new();
        for pair in price_swings.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let period = b - a;
            if period < cfg.min_period {
                continue;
            }
            let (Some(oa), Some(ob)) = (
                nearest_pivot(&pivots, a, cfg.alignment_tolerance),
                nearest_pivot(&pivots, b, cfg.alignment_tolerance),
            ) else {
                continue;
            };
            if oa.index == ob.index {
                continue;
            }

            let (pa, pb) = (ctx.prices[a], ctx.prices[b]);
            let kind = match side {
                SwingKind::Low if pb < pa && ob.value > oa.value => DivergenceKind::RegularBullish,
                SwingKind::Low if pb > pa && ob.value < oa.value => DivergenceKind::HiddenBullish,
                SwingKind::High if pb > pa && ob.value < oa.value => DivergenceKind::RegularBearish,
                SwingKind::High if pb < pa && ob.value > oa.value => DivergenceKind::HiddenBearish,
                _ => continue,
            };

            let period_d = Decimal::from(period as u64);
            let price_angle = slope_degrees(pb - pa, period_d);
            let osc_angle = slope_degrees(ob.value - oa.value, period_d);
            let (Some(price_angle), Some(osc_angle)) = (price_angle, osc_angle) else {
                continue;
            };
            let angle_diff = (price_angle - osc_angle).abs();
            if angle_diff < cfg.min_angle_diff {
                continue;
            }

            let price_change_pct = if pa.is_zero() {
                Decimal::ZERO
            } else {
                ((pb - pa) / pa * dec!(100)).abs()
            };
            let extreme = oscillator.in_extreme_zone(ob.value, kind.bias());
            let strength = divergence_strength(angle_diff, period_d, price_change_pct, extreme, kind);
            if strength < cfg.min_strength {
                continue;
            }

            let maturity = maturity(ctx.last_index.saturating_sub(b));
            let class = DivergenceClass::from_score((strength + maturity) / dec!(2));
            let success_probability = success_probability(kind, class, maturity);

            let invalidated = match kind.bias() {
                Bias::Bullish => ctx.current_price < pb * (dec!(1) - cfg.invalidation_pct),
                _ => ctx.current_price > pb * (dec!(1) + cfg.invalidation_pct),
            };

            found.push(Divergence {
                kind,
                indicator: oscillator.name.to_string(),
                price_points: [
                    PivotPoint { index: a, value: pa },
                    PivotPoint { index: b, value: pb },
                ],
                indicator_points: [oa, ob],
                angle_diff: angle_diff.round_dp(2),
                period,
                strength,
                maturity,
                class,
                success_probability,
                invalidated,
            });
        }
        found
    }

    pub fn analyze_divergences(&self, candles: &[Candle]) -> Result<DivergenceAnalysis, EngineError> {
        let cfg = &self.config;
        if candles.len() < cfg.min_candles {
            return Err(EngineError::InsufficientData {
                module: MODULE_DIVERGENCE.to_string(),
                required: cfg.min_candles,
                available: candles.len(),
            });
        }
        let cols = Columns::from_candles(candles);
        let n = cols.closes.len();
        let current_price = cols.closes[n - 1];

        let swing_highs = enforce_separation(
            &local_maxima(&cols.highs, cfg.swing_order),
            &cols.highs,
            cfg.min_swing_separation,
            SwingKind::High,
        );
        let swing_lows = enforce_separation(
            &local_minima(&cols.lows, cfg.swing_order),
            &cols.lows,
            cfg.min_swing_separation,
            SwingKind::Low,
        );

        let oscillators = self.oscillators(&cols);
        let mut divergences = Vec::new();
        for osc in &oscillators {
            let lows_ctx = WindowContext {
                prices: &cols.lows,
                last_index: n - 1,
                current_price,
            };
            divergences.extend(self.find_divergences(SwingKind::Low, &swing_lows, osc, &lows_ctx));
            let highs_ctx = WindowContext {
                prices: &cols.highs,
                ..lows_ctx
            };
            divergences.extend(self.find_divergences(SwingKind::High, &swing_highs, osc, &highs_ctx));
        }

        let bullish_confluence = confluence(&divergences, Bias::Bullish);
        let bearish_confluence = confluence(&divergences, Bias::Bearish);

        let dominant = divergences
            .iter()
            .filter(|d| !d.invalidated)
            .fold(None::<&Divergence>, |best, d| match best {
                Some(b) if b.rank_score() >= d.rank_score() => Some(b),
                _ => Some(d),
            })
            .cloned();

        let (target, invalidation) = match &dominant {
            Some(d) => {
                let start = n.saturating_sub(cfg.target_window);
                let hi = cols.highs[start..].iter().copied().fold(cols.highs[start], Decimal::max);
                let lo = cols.lows[start..].iter().copied().fold(cols.lows[start], Decimal::min);
                let range = hi - lo;
                match d.kind.bias() {
                    Bias::Bullish => (
                        Some(current_price + range * dec!(0.618)),
                        Some(current_price - range * dec!(0.382)),
                    ),
                    _ => (
                        Some(current_price - range * dec!(0.618)),
                        Some(current_price + range * dec!(0.382)),
                    ),
                }
            }
            None => (None, None),
        };

        debug!(
            found = divergences.len(),
            bullish_confluence = %bullish_confluence,
            bearish_confluence = %bearish_confluence,
            dominant = ?dominant.as_ref().map(|d| d.kind),
            "divergence scan complete"
        );

        Ok(DivergenceAnalysis {
            divergences,
            bullish_confluence,
            bearish_confluence,
            dominant,
            target,
            invalidation,
        })
    }
}

impl LeafAnalyzer for DivergenceDetector {
    type Detail = DivergenceAnalysis;
    const NAME: &'static str = MODULE_DIVERGENCE;

    fn min_candles(&self) -> usize {
        self.config.min_candles
    }

    fn analyze(&self, candles: &[Candle]) -> Result<ModuleOutput<DivergenceAnalysis>, EngineError> {
        let analysis = self.analyze_divergences(candles)?;
        let (signal, strength) = match analysis.dominant.as_ref().map(|d| (d.kind.bias(), d.strength)) {
            Some((Bias::Bullish, s)) => (
                ModuleSignal::Bullish,
                s * dec!(0.7) + analysis.bullish_confluence * dec!(0.3),
            ),
            Some((Bias::Bearish, s)) => (
                ModuleSignal::Bearish,
                s * dec!(0.7) + analysis.bearish_confluence * dec!(0.3),
            ),
            _ => (ModuleSignal::Neutral, Decimal::ZERO),
        };
        Ok(ModuleOutput::new(signal, strength, analysis))
    }
}

fn nearest_pivot(pivots: &[PivotPoint], index: usize, tolerance: usize) -> Option<PivotPoint> {
    pivots
        .iter()
        .filter(|p| p.index.abs_diff(index) <= tolerance)
        .min_by_key(|p| p.index.abs_diff(index))
        .copied()
}

/// `atan(delta / period)` in degrees.
fn slope_degrees(delta: Decimal, period: Decimal) -> Option<Decimal> {
    let ratio = (delta / period).to_f64()?;
    Decimal::from_f64(ratio.atan().to_degrees())
}

fn divergence_strength(
    angle_diff: Decimal,
    period: Decimal,
    price_change_pct: Decimal,
    extreme_zone: bool,
    kind: DivergenceKind,
) -> Decimal {
    let angle = (angle_diff / ANGLE_SATURATION_DEG).min(dec!(1)) * dec!(40);
    let span = (period / PERIOD_SATURATION).min(dec!(1)) * dec!(20);
    let magnitude = (price_change_pct * dec!(4)).min(dec!(20));
    let zone = if extreme_zone { dec!(10) } else { Decimal::ZERO };
    let type_bonus = if kind.is_regular() { dec!(10) } else { dec!(5) };
    (angle + span + magnitude + zone + type_bonus).min(SCORE_MAX)
}

/// Ramps to 100 over the first 10 candles after completion, decays by one
/// point per candle to 60 at 50 candles, then two points per candle.
pub fn maturity(candles_since: usize) -> Decimal {
    let c = Decimal::from(candles_since as u64);
    if candles_since <= 10 {
        c / dec!(10) * dec!(100)
    } else if candles_since <= 50 {
        dec!(100) - (c - dec!(10))
    } else {
        (dec!(60) - (c - dec!(50)) * dec!(2)).max(Decimal::ZERO)
    }
}

pub fn success_probability(kind: DivergenceKind, class: DivergenceClass, maturity: Decimal) -> Decimal {
    use DivergenceClass::*;
    use DivergenceKind::*;
    let base = match (kind, class) {
        (RegularBullish, A) => dec!(0.72),
        (RegularBullish, B) => dec!(0.62),
        (RegularBullish, C) => dec!(0.52),
        (RegularBearish, A) => dec!(0.70),
        (RegularBearish, B) => dec!(0.60),
        (RegularBearish, C) => dec!(0.50),
        (HiddenBullish, A) => dec!(0.68),
        (HiddenBullish, B) => dec!(0.58),
        (HiddenBullish, C) => dec!(0.48),
        (HiddenBearish, A) => dec!(0.66),
        (HiddenBearish, B) => dec!(0.56),
        (HiddenBearish, C) => dec!(0.46),
    };
    let adjusted = if maturity >= dec!(80) {
        base * dec!(1.1)
    } else if maturity < dec!(30) {
        base * dec!(0.9)
    } else {
        base
    };
    adjusted.min(dec!(0.95))
}

/// Share of oscillators carrying a live divergence of the given bias, 0-100.
fn confluence(divergences: &[Divergence], bias: Bias) -> Decimal {
    let mut names: Vec<&str> = divergences
        .iter()
        .filter(|d| !d.invalidated && d.kind.bias() == bias)
        .map(|d| d.indicator.as_str())
        .collect();
    names.sort_unstable();
    names.dedup();
    Decimal::from(names.len() as u64) / Decimal::from(OSCILLATOR_COUNT) * SCORE_MAX
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Timeframe;

    fn detector() -> DivergenceDetector {
        DivergenceDetector::new(DivergenceConfig::default()).unwrap()
    }

    /// `base - depth + 2 * |i - center|`, floored at `base`.
    fn dip(i: usize, center: usize, depth: i64) -> Decimal {
        let d = depth - 2 * (i as i64 - center as i64).abs();
        Decimal::from(d.max(0))
    }

    #[test]
    fn test_regular_bullish_divergence_is_scored() {
        let n = 45;
        let lows: Vec<Decimal> = (0..n)
            .map(|i| dec!(100) - dip(i, 10, 10) - dip(i, 30, 15))
            .collect();
        let osc = Oscillator {
            name: OSC_RSI,
            offset: 0,
            values: (0..n).map(|i| dec!(50) - dip(i, 10, 20) - dip(i, 30, 10)).collect(),
        };
        let swings = local_minima(&lows, 5);
        assert_eq!(swings, vec![10, 30]);

        let ctx = WindowContext {
            prices: &lows,
            last_index: n - 1,
            current_price: dec!(100),
        };
        let found = detector().find_divergences(SwingKind::Low, &swings, &osc, &ctx);
        assert_eq!(found.len(), 1);
        let d = &found[0];
        assert_eq!(d.kind, DivergenceKind::RegularBullish);
        assert_eq!(d.period, 20);
        // atan(10 / 20) + atan(5 / 20)
        assert_eq!(d.angle_diff, dec!(40.60));
        // angle 27.07 + span 8 + magnitude capped 20 + regular 10
        assert_eq!(d.strength.round_dp(2), dec!(65.07));
        assert_eq!(d.maturity, dec!(96));
        assert_eq!(d.class, DivergenceClass::A);
        assert_eq!(d.success_probability, dec!(0.792));
        assert!(!d.invalidated);
    }

    #[test]
    fn test_breach_marks_divergence_invalidated() {
        let n = 45;
        let lows: Vec<Decimal> = (0..n)
            .map(|i| dec!(100) - dip(i, 10, 10) - dip(i, 30, 15))
            .collect();
        let osc = Oscillator {
            name: OSC_MACD,
            offset: 0,
            values: (0..n).map(|i| dec!(50) - dip(i, 10, 20) - dip(i, 30, 10)).collect(),
        };
        let ctx = WindowContext {
            prices: &lows,
            last_index: n - 1,
            current_price: dec!(80),
        };
        let found = detector().find_divergences(SwingKind::Low, &[10, 30], &osc, &ctx);
        assert_eq!(found.len(), 1);
        assert!(found[0].invalidated);
        assert_eq!(confluence(&found, Bias::Bullish), Decimal::ZERO);
    }

    /// Window of `fill` with the given points overridden.
    fn series(n: usize, fill: Decimal, points: &[(usize, Decimal)]) -> Vec<Decimal> {
        let mut out = vec![fill; n];
        for &(i, v) in points {
            out[i] = v;
        }
        out
    }

    /// Oscillator troughs at 10 (30) and 15 (34), visible to a swing order of 2.
    fn close_troughs() -> Oscillator {
        Oscillator {
            name: OSC_RSI,
            offset: 0,
            values: series(
                30,
                dec!(50),
                &[
                    (8, dec!(45)),
                    (9, dec!(40)),
                    (10, dec!(30)),
                    (11, dec!(40)),
                    (12, dec!(45)),
                    (13, dec!(42)),
                    (14, dec!(38)),
                    (15, dec!(34)),
                    (16, dec!(40)),
                    (17, dec!(45)),
                ],
            ),
        }
    }

    #[test]
    fn test_short_pivot_spacing_is_ignored() {
        let lows = series(30, dec!(21), &[(10, dec!(20)), (15, dec!(19))]);
        let osc = close_troughs();
        let ctx = WindowContext {
            prices: &lows,
            last_index: 29,
            current_price: dec!(21),
        };
        let tight = DivergenceConfig {
            swing_order: 2,
            min_swing_separation: 2,
            ..DivergenceConfig::default()
        };
        let pivots: Vec<usize> = osc
            .pivots(SwingKind::Low, tight.swing_order, tight.min_swing_separation)
            .iter()
            .map(|p| p.index)
            .collect();
        assert_eq!(pivots, vec![10, 15]);

        // Constructed directly: a one-candle minimum is below the validated floor.
        let unrestricted = DivergenceDetector {
            config: DivergenceConfig {
                min_period: 1,
                ..tight.clone()
            },
        };
        let found = unrestricted.find_divergences(SwingKind::Low, &[10, 15], &osc, &ctx);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, DivergenceKind::RegularBullish);
        assert_eq!(found[0].period, 5);

        let floored = DivergenceDetector::new(tight).unwrap();
        assert!(floored.find_divergences(SwingKind::Low, &[10, 15], &osc, &ctx).is_empty());
    }

    /// `depth - 2 * |i - center|`, floored at zero.
    fn vee(i: usize, center: usize, depth: Decimal) -> Decimal {
        let d = depth - Decimal::from(2 * (i as i64 - center as i64).abs());
        d.max(Decimal::ZERO)
    }

    /// RSI troughs of 30 at 10 and `30 + rise` at 30 against price lows of
    /// 20 and 19, one point down over twenty candles.
    fn shallow_pair(rise: Decimal) -> Vec<Divergence> {
        let n = 45;
        let lows = series(n, dec!(21), &[(10, dec!(20)), (30, dec!(19))]);
        let osc = Oscillator {
            name: OSC_RSI,
            offset: 0,
            values: (0..n)
                .map(|i| dec!(50) - vee(i, 10, dec!(20)) - vee(i, 30, dec!(20) - rise))
                .collect(),
        };
        let ctx = WindowContext {
            prices: &lows,
            last_index: n - 1,
            current_price: dec!(21),
        };
        detector().find_divergences(SwingKind::Low, &[10, 30], &osc, &ctx)
    }

    #[test]
    fn test_angle_difference_below_minimum_is_rejected() {
        // atan(0.7 / 20) + atan(1 / 20) = 4.87 degrees
        assert!(shallow_pair(dec!(0.7)).is_empty());
    }

    #[test]
    fn test_angle_difference_at_minimum_is_accepted() {
        // atan(1 / 20) * 2 = 5.72 degrees
        let found = shallow_pair(dec!(1));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].angle_diff, dec!(5.72));
        assert_eq!(found[0].indicator_points[1].value, dec!(31));
    }

    #[test]
    fn test_floor_violating_config_is_rejected() {
        let config = DivergenceConfig {
            min_period: 5,
            ..DivergenceConfig::default()
        };
        assert!(matches!(DivergenceDetector::new(config), Err(EngineError::Config(_))));
    }

    #[test]
    fn test_maturity_curve() {
        assert_eq!(maturity(0), Decimal::ZERO);
        assert_eq!(maturity(5), dec!(50));
        assert_eq!(maturity(10), dec!(100));
        assert_eq!(maturity(30), dec!(80));
        assert_eq!(maturity(50), dec!(60));
        assert_eq!(maturity(60), dec!(40));
        assert_eq!(maturity(200), Decimal::ZERO);
    }

    #[test]
    fn test_success_probability_is_capped() {
        assert_eq!(
            success_probability(DivergenceKind::RegularBearish, DivergenceClass::C, dec!(20)),
            dec!(0.45)
        );
        assert!(
            success_probability(DivergenceKind::RegularBullish, DivergenceClass::A, dec!(100))
                <= dec!(0.95)
        );
    }

    #[test]
    fn test_flat_window_is_neutral() {
        let candles: Vec<Candle> = (0..100)
            .map(|i| Candle {
                timestamp: i,
                open: dec!(50),
                high: dec!(50),
                low: dec!(50),
                close: dec!(50),
                volume: dec!(1),
                interval: Timeframe::H4,
            })
            .collect();
        let out = detector().analyze(&candles).unwrap();
        assert_eq!(out.signal, ModuleSignal::Neutral);
        assert_eq!(out.strength, Decimal::ZERO);
        assert!(out.detail.divergences.is_empty());
        assert!(out.detail.target.is_none());
    }
}
