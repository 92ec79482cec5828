//! Retracement ladder over the latest prominent swing.
//!
//! The most recent swing high and swing low define the impulse; whichever
//! came last fixes its direction. Ratios below 1 are pullbacks into the
//! impulse, ratios above 1 are extensions beyond its origin.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use super::analyzer::LeafAnalyzer;
use super::indicators;
use super::swings::{local_maxima, local_minima};
use crate::config::validate::{check_section, validate_retracement};
use crate::config::RetracementConfig;
use crate::constants::{FIB_RATIOS, GOLDEN_RATIO, MODULE_RETRACEMENT, PSYCHOLOGICAL_HALF, SCORE_MAX};
use crate::errors::EngineError;
use crate::types::{
    Candle, Columns, FibonacciLevel, LevelStrength, ModuleOutput, ModuleSignal,
    RetracementAnalysis, SwingDirection, SwingKind, SwingPoint, SwingRange,
};

const TREND_ALIGNMENT_POINTS: Decimal = dec!(15);
const MAX_PROXIMITY_POINTS: Decimal = dec!(15);

pub struct RetracementAnalyzer {
    config: RetracementConfig,
}

impl RetracementAnalyzer {
    pub fn new(config: RetracementConfig) -> Result<Self, EngineError> {
        check_section(&config, validate_retracement)?;
        Ok(Self { config })
    }

    /// Swing highs and lows that stand out from the opposite extreme of
    /// their own neighbourhood by at least `prominence_pct`.
    pub fn prominent_swings(&self, cols: &Columns) -> (Vec<SwingPoint>, Vec<SwingPoint>) {
        let order = self.config.swing_order;
        let min_pct = self.config.prominence_pct;
        let n = cols.closes.len();
        let neighbourhood = |i: usize| i.saturating_sub(order)..(i + order + 1).min(n);

        let highs = local_maxima(&cols.highs, order)
            .into_iter()
            .filter(|&i| {
                let floor = cols.lows[neighbourhood(i)].iter().copied().fold(cols.lows[i], Decimal::min);
                pct_of(cols.highs[i] - floor, cols.highs[i]) >= min_pct
            })
            .map(|i| SwingPoint {
                index: i,
                price: cols.highs[i],
                kind: SwingKind::High,
            })
            .collect();

        let lows = local_minima(&cols.lows, order)
            .into_iter()
            .filter(|&i| {
                let ceiling = cols.highs[neighbourhood(i)].iter().copied().fold(cols.highs[i], Decimal::max);
                pct_of(ceiling - cols.lows[i], cols.lows[i]) >= min_pct
            })
            .map(|i| SwingPoint {
                index: i,
                price: cols.lows[i],
                kind: SwingKind::Low,
            })
            .collect();

        (highs, lows)
    }

    /// The full ratio ladder for a swing, in ratio order.
    pub fn levels(swing: &SwingRange) -> Vec<FibonacciLevel> {
        let range = swing.range();
        FIB_RATIOS
            .iter()
            .map(|&ratio| {
                let price = match swing.direction {
                    SwingDirection::Up => swing.high.price - range * ratio,
                    SwingDirection::Down => swing.low.price + range * ratio,
                };
                let (strength, description) = describe(ratio);
                FibonacciLevel {
                    ratio,
                    price,
                    strength,
                    description: description.to_string(),
                }
            })
            .collect()
    }

    pub fn analyze_levels(&self, candles: &[Candle]) -> Result<RetracementAnalysis, EngineError> {
        let cfg = &self.config;
        if candles.len() < cfg.min_candles {
            return Err(EngineError::InsufficientData {
                module: MODULE_RETRACEMENT.to_string(),
                required: cfg.min_candles,
                available: candles.len(),
            });
        }
        let cols = Columns::from_candles(candles);
        let price = cols.closes[cols.closes.len() - 1];

        let (highs, lows) = self.prominent_swings(&cols);
        let (Some(&high), Some(&low)) = (highs.last(), lows.last()) else {
            debug!("no prominent swing pair");
            return Ok(RetracementAnalysis::empty());
        };
        let direction = if low.index < high.index {
            SwingDirection::Up
        } else {
            SwingDirection::Down
        };
        let swing = SwingRange { high, low, direction };
        if swing.range() <= Decimal::ZERO {
            return Ok(RetracementAnalysis::empty());
        }

        let levels = Self::levels(&swing);
        let closest = levels
            .iter()
            .enumerate()
            .map(|(k, l)| (k, pct_of((price - l.price).abs(), price)))
            .min_by(|a, b| a.1.cmp(&b.1));
        let Some((k, distance_pct)) = closest else {
            return Ok(RetracementAnalysis::empty());
        };

        let mut analysis = RetracementAnalysis {
            swing: Some(swing.clone()),
            levels: levels.clone(),
            nearest_level: None,
            distance_pct: Some(distance_pct.round_dp(4)),
            bounce_potential: Decimal::ZERO,
            target: None,
            stop: None,
        };

        if distance_pct > cfg.level_tolerance_pct {
            return Ok(analysis);
        }

        let level = &levels[k];
        let mut bounce = level.strength.score();
        if level.ratio == GOLDEN_RATIO {
            bounce += dec!(20);
        } else if level.ratio == dec!(0.382) || level.ratio == dec!(0.786) {
            bounce += dec!(10);
        }
        if level.ratio == PSYCHOLOGICAL_HALF {
            bounce += dec!(10);
        }
        let window_mean = indicators::mean(&cols.closes);
        let aligned = match direction {
            SwingDirection::Up => price > window_mean,
            SwingDirection::Down => price < window_mean,
        };
        if aligned {
            bounce += TREND_ALIGNMENT_POINTS;
        }
        bounce += (dec!(1) - distance_pct / cfg.level_tolerance_pct) * MAX_PROXIMITY_POINTS;

        analysis.bounce_potential = bounce.max(Decimal::ZERO).min(SCORE_MAX).round_dp(2);
        analysis.target = k.checked_sub(1).map(|j| levels[j].price);
        analysis.stop = levels.get(k + 1).map(|l| l.price);
        analysis.nearest_level = Some(level.clone());

        debug!(
            direction = ?direction,
            ratio = %level.ratio,
            distance_pct = %distance_pct,
            bounce = %analysis.bounce_potential,
            "retracement level in play"
        );
        Ok(analysis)
    }
}

impl LeafAnalyzer for RetracementAnalyzer {
    type Detail = RetracementAnalysis;
    const NAME: &'static str = MODULE_RETRACEMENT;

    fn min_candles(&self) -> usize {
        self.config.min_candles
    }

    /// Pullbacks into an up-swing are support (buy); into a down-swing,
    /// resistance (sell).
    fn analyze(&self, candles: &[Candle]) -> Result<ModuleOutput<RetracementAnalysis>, EngineError> {
        let a = self.analyze_levels(candles)?;
        let bounce = a.bounce_potential;
        let signal = match a.swing.as_ref().map(|s| s.direction) {
            Some(SwingDirection::Up) if bounce >= self.config.signal_threshold => ModuleSignal::Buy,
            Some(SwingDirection::Down) if bounce >= self.config.signal_threshold => ModuleSignal::Sell,
            _ if bounce >= self.config.watch_threshold => ModuleSignal::Watch,
            _ => ModuleSignal::Wait,
        };
        Ok(ModuleOutput::new(signal, bounce, a))
    }
}

fn describe(ratio: Decimal) -> (LevelStrength, &'static str) {
    match ratio {
        r if r == dec!(0) => (LevelStrength::Strong, "swing extreme"),
        r if r == dec!(0.236) => (LevelStrength::Weak, "shallow retracement"),
        r if r == dec!(0.382) => (LevelStrength::Strong, "moderate retracement"),
        r if r == dec!(0.5) => (LevelStrength::Strong, "half retracement"),
        r if r == dec!(0.618) => (LevelStrength::VeryStrong, "golden retracement"),
        r if r == dec!(0.786) => (LevelStrength::Moderate, "deep retracement"),
        r if r == dec!(1) => (LevelStrength::Strong, "full retracement"),
        r if r == dec!(1.272) => (LevelStrength::Moderate, "first extension"),
        r if r == dec!(1.618) => (LevelStrength::Moderate, "golden extension"),
        _ => (LevelStrength::Weak, "far extension"),
    }
}

fn pct_of(part: Decimal, whole: Decimal) -> Decimal {
    if whole.is_zero() {
        Decimal::ZERO
    } else {
        part / whole * dec!(100)
    }
}
