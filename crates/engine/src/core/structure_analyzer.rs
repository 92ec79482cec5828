//! Smart-money market structure: order blocks, fair value gaps, swing
//! structure with break-of-structure / change-of-character levels, and
//! liquidity pools.
//!
//! Each finding contributes fixed points to a bullish and a bearish score;
//! the larger side decides the module signal once it clears the configured
//! thresholds.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use super::analyzer::LeafAnalyzer;
use super::swings::swing_points;
use crate::config::validate::{check_section, validate_structure};
use crate::config::StructureConfig;
use crate::constants::{MODULE_STRUCTURE, SCORE_MAX};
use crate::errors::EngineError;
use crate::types::{
    Bias, Candle, Columns, FairValueGap, LiquidityZone, MarketStructure, MarketTrend,
    ModuleOutput, ModuleSignal, OrderBlock, StructureAnalysis, SwingKind, SwingPoint,
};

// Score contributions.
const TREND_POINTS: Decimal = dec!(25);
const BOS_INTACT_POINTS: Decimal = dec!(10);
const CHOCH_POINTS: Decimal = dec!(20);
const ORDER_BLOCK_POINTS: Decimal = dec!(20);
const FVG_POINTS: Decimal = dec!(15);
const LIQUIDITY_POINTS: Decimal = dec!(10);
const SWEEP_POINTS: Decimal = dec!(15);

/// Candles after the block candle in which the displacement must happen.
const DISPLACEMENT_WINDOW: usize = 2;

pub struct StructureAnalyzer {
    config: StructureConfig,
}

impl StructureAnalyzer {
    pub fn new(config: StructureConfig) -> Result<Self, EngineError> {
        check_section(&config, validate_structure)?;
        Ok(Self { config })
    }

    // -----------------------------------------------------------------------
    // Order blocks
    // -----------------------------------------------------------------------

    /// Last opposite-colour candle before a displacement close beyond its
    /// extreme, strongest first. A block is broken once the current close
    /// sits beyond its far edge.
    pub fn find_order_blocks(&self, candles: &[Candle]) -> Vec<OrderBlock> {
        let min_move = self.config.order_block_min_move;
        let n = candles.len();
        let mut blocks = Vec::new();
        let Some(current) = candles.last().map(|c| c.close) else {
            return blocks;
        };

        for i in 0..n.saturating_sub(1) {
            let block = &candles[i];
            let window_end = (i + DISPLACEMENT_WINDOW).min(n - 1);
            let follow = &candles[i + 1..=window_end];

            let kind = if block.is_bearish() {
                Bias::Bullish
            } else if block.is_bullish() {
                Bias::Bearish
            } else {
                continue;
            };

            let displacement = follow.iter().enumerate().find_map(|(off, c)| {
                let beyond = match kind {
                    Bias::Bullish => c.close > block.high * (dec!(1) + min_move),
                    _ => c.close < block.low * (dec!(1) - min_move),
                };
                beyond.then_some((i + 1 + off, c.close))
            });
            let Some((disp_index, disp_close)) = displacement else {
                continue;
            };

            let strength = match kind {
                Bias::Bullish => (disp_close - block.high) / block.high * dec!(100),
                _ => (block.low - disp_close) / block.low * dec!(100),
            };

            let later = &candles[disp_index + 1..];
            let (touched, broken) = match kind {
                Bias::Bullish => (
                    later.iter().any(|c| c.low <= block.high),
                    current < block.low,
                ),
                _ => (
                    later.iter().any(|c| c.high >= block.low),
                    current > block.high,
                ),
            };

            blocks.push(OrderBlock {
                kind,
                index: i,
                low: block.low,
                high: block.high,
                strength: strength.round_dp(4),
                touched,
                broken,
            });
        }

        blocks.sort_by(|a, b| b.strength.cmp(&a.strength).then(b.index.cmp(&a.index)));
        blocks.truncate(self.config.max_order_blocks);
        blocks
    }

    // -----------------------------------------------------------------------
    // Fair value gaps
    // -----------------------------------------------------------------------

    /// Three-candle imbalances at least `fvg_min_gap_pct` wide, most recent
    /// first.
    pub fn find_fair_value_gaps(&self, candles: &[Candle]) -> Vec<FairValueGap> {
        let n = candles.len();
        let mut gaps = Vec::new();
        if n < 3 {
            return gaps;
        }

        for i in 1..n - 1 {
            let (prev, mid, next) = (&candles[i - 1], &candles[i], &candles[i + 1]);
            let (kind, low, high) = if next.low > prev.high {
                (Bias::Bullish, prev.high, next.low)
            } else if next.high < prev.low {
                (Bias::Bearish, next.high, prev.low)
            } else {
                continue;
            };
            if mid.close <= Decimal::ZERO {
                continue;
            }
            let size = high - low;
            let size_pct = size / mid.close * dec!(100);
            if size_pct < self.config.fvg_min_gap_pct {
                continue;
            }

            let later = &candles[i + 2..];
            let penetration = match kind {
                Bias::Bullish => later
                    .iter()
                    .map(|c| high - c.low)
                    .fold(Decimal::ZERO, Decimal::max),
                _ => later
                    .iter()
                    .map(|c| c.high - low)
                    .fold(Decimal::ZERO, Decimal::max),
            };
            let fill_pct = (penetration.min(size) / size * dec!(100)).round_dp(2);

            gaps.push(FairValueGap {
                kind,
                index: i,
                low,
                high,
                size_pct: size_pct.round_dp(4),
                filled: fill_pct >= dec!(100),
                fill_pct,
            });
        }

        let keep_from = gaps.len().saturating_sub(self.config.max_fvgs);
        let mut recent = gaps.split_off(keep_from);
        recent.reverse();
        recent
    }

    // -----------------------------------------------------------------------
    // Swing structure
    // -----------------------------------------------------------------------

    pub fn market_structure(&self, cols: &Columns) -> MarketStructure {
        let (swing_highs, swing_lows) = swing_points(&cols.highs, &cols.lows, self.config.swing_window);

        let (higher_highs, lower_highs) = count_steps(&swing_highs);
        let (higher_lows, lower_lows) = count_steps(&swing_lows);

        let bullish = higher_highs + higher_lows;
        let bearish = lower_highs + lower_lows;
        let trend = if bullish > bearish {
            MarketTrend::Bullish
        } else if bearish > bullish {
            MarketTrend::Bearish
        } else {
            MarketTrend::Ranging
        };

        let close = cols.closes.last().copied().unwrap_or(Decimal::ZERO);
        let last_two = |s: &[SwingPoint]| -> Vec<Decimal> {
            s.iter().rev().take(2).map(|p| p.price).collect()
        };

        let (bos_level, choch_level, bos_broken, choch_broken) = match trend {
            MarketTrend::Bullish => {
                let lows = last_two(&swing_lows);
                let bos = lows.first().copied();
                let choch = lows.iter().copied().reduce(Decimal::min);
                (
                    bos,
                    choch,
                    bos.is_some_and(|l| close < l),
                    choch.is_some_and(|l| close < l),
                )
            }
            MarketTrend::Bearish => {
                let highs = last_two(&swing_highs);
                let bos = highs.first().copied();
                let choch = highs.iter().copied().reduce(Decimal::max);
                (
                    bos,
                    choch,
                    bos.is_some_and(|h| close > h),
                    choch.is_some_and(|h| close > h),
                )
            }
            MarketTrend::Ranging => (None, None, false, false),
        };

        MarketStructure {
            trend,
            higher_highs,
            higher_lows,
            lower_highs,
            lower_lows,
            swing_highs,
            swing_lows,
            bos_level,
            choch_level,
            bos_broken,
            choch_broken,
        }
    }

    // -----------------------------------------------------------------------
    // Liquidity
    // -----------------------------------------------------------------------

    /// Clusters of swing extremes within the tolerance band. Single swings
    /// count as one-touch zones. A zone is swept when a later candle trades
    /// through it and closes back on the original side.
    pub fn liquidity_zones(&self, candles: &[Candle], structure: &MarketStructure) -> Vec<LiquidityZone> {
        let mut zones = Vec::new();
        for (side, swings) in [
            (SwingKind::High, &structure.swing_highs),
            (SwingKind::Low, &structure.swing_lows),
        ] {
            let mut sorted: Vec<&SwingPoint> = swings.iter().collect();
            sorted.sort_by(|a, b| a.price.cmp(&b.price));

            let mut clusters: Vec<Vec<&SwingPoint>> = Vec::new();
            for p in sorted {
                match clusters.last_mut() {
                    Some(cluster)
                        if within_pct(cluster[0].price, p.price, self.config.liquidity_tolerance_pct) =>
                    {
                        cluster.push(p)
                    }
                    _ => clusters.push(vec![p]),
                }
            }

            for cluster in clusters {
                let touches = cluster.len();
                let price = cluster.iter().map(|p| p.price).sum::<Decimal>()
                    / Decimal::from(touches as u64);
                let last_index = cluster.iter().map(|p| p.index).max().unwrap_or(0);
                let later = candles.get(last_index + 1..).unwrap_or(&[]);
                let swept = match side {
                    SwingKind::High => later.iter().any(|c| c.high > price && c.close < price),
                    SwingKind::Low => later.iter().any(|c| c.low < price && c.close > price),
                };
                zones.push((
                    last_index,
                    LiquidityZone {
                        price,
                        side,
                        touches,
                        strength: (Decimal::from(touches as u64) * dec!(25)).min(SCORE_MAX),
                        swept,
                    },
                ));
            }
        }

        zones.sort_by(|(ia, a), (ib, b)| b.strength.cmp(&a.strength).then(ib.cmp(ia)));
        zones
            .into_iter()
            .take(self.config.max_liquidity_zones)
            .map(|(_, z)| z)
            .collect()
    }

    // -----------------------------------------------------------------------
    // Composite
    // -----------------------------------------------------------------------

    pub fn analyze_structure(&self, candles: &[Candle]) -> Result<StructureAnalysis, EngineError> {
        let cfg = &self.config;
        if candles.len() < cfg.min_candles {
            return Err(EngineError::InsufficientData {
                module: MODULE_STRUCTURE.to_string(),
                required: cfg.min_candles,
                available: candles.len(),
            });
        }
        let cols = Columns::from_candles(candles);
        let price = cols.closes[cols.closes.len() - 1];

        let order_blocks = self.find_order_blocks(candles);
        let fair_value_gaps = self.find_fair_value_gaps(candles);
        let market_structure = self.market_structure(&cols);
        let liquidity_zones = self.liquidity_zones(candles, &market_structure);

        let mut bull = Decimal::ZERO;
        let mut bear = Decimal::ZERO;
        let mut reasons = Vec::new();

        match market_structure.trend {
            MarketTrend::Bullish => {
                bull += TREND_POINTS;
                reasons.push("bullish swing structure".to_string());
                if !market_structure.bos_broken && market_structure.bos_level.is_some() {
                    bull += BOS_INTACT_POINTS;
                    reasons.push("last swing low holding".to_string());
                }
                if market_structure.choch_broken {
                    bear += CHOCH_POINTS;
                    reasons.push("change of character below prior lows".to_string());
                }
            }
            MarketTrend::Bearish => {
                bear += TREND_POINTS;
                reasons.push("bearish swing structure".to_string());
                if !market_structure.bos_broken && market_structure.bos_level.is_some() {
                    bear += BOS_INTACT_POINTS;
                    reasons.push("last swing high holding".to_string());
                }
                if market_structure.choch_broken {
                    bull += CHOCH_POINTS;
                    reasons.push("change of character above prior highs".to_string());
                }
            }
            MarketTrend::Ranging => {}
        }

        let near_block = |kind: Bias| {
            order_blocks
                .iter()
                .any(|b| b.kind == kind && !b.broken && zone_distance_pct(price, b.low, b.high) <= cfg.proximity_pct)
        };
        if near_block(Bias::Bullish) {
            bull += ORDER_BLOCK_POINTS;
            reasons.push("price at bullish order block".to_string());
        }
        if near_block(Bias::Bearish) {
            bear += ORDER_BLOCK_POINTS;
            reasons.push("price at bearish order block".to_string());
        }

        for (kind, label) in [(Bias::Bullish, "bullish"), (Bias::Bearish, "bearish")] {
            if fair_value_gaps
                .iter()
                .any(|g| g.kind == kind && !g.filled && g.contains(price))
            {
                match kind {
                    Bias::Bullish => bull += FVG_POINTS,
                    _ => bear += FVG_POINTS,
                }
                reasons.push(format!("price inside unfilled {label} fair value gap"));
            }
        }

        let near_zone = |side: SwingKind| {
            liquidity_zones
                .iter()
                .any(|z| z.side == side && within_pct(z.price, price, cfg.proximity_pct))
        };
        if near_zone(SwingKind::Low) {
            bull += LIQUIDITY_POINTS;
            reasons.push("resting liquidity below".to_string());
        }
        if near_zone(SwingKind::High) {
            bear += LIQUIDITY_POINTS;
            reasons.push("resting liquidity above".to_string());
        }
        if liquidity_zones.iter().any(|z| z.side == SwingKind::Low && z.swept) {
            bull += SWEEP_POINTS;
            reasons.push("sell-side liquidity swept".to_string());
        }
        if liquidity_zones.iter().any(|z| z.side == SwingKind::High && z.swept) {
            bear += SWEEP_POINTS;
            reasons.push("buy-side liquidity swept".to_string());
        }

        let bullish_score = bull.min(SCORE_MAX);
        let bearish_score = bear.min(SCORE_MAX);

        let (target, stop) = if bullish_score >= cfg.signal_threshold && bullish_score > bearish_score {
            (
                nearest_above(&market_structure.swing_highs, price),
                nearest_below(&market_structure.swing_lows, price),
            )
        } else if bearish_score >= cfg.signal_threshold && bearish_score > bullish_score {
            (
                nearest_below(&market_structure.swing_lows, price),
                nearest_above(&market_structure.swing_highs, price),
            )
        } else {
            (None, None)
        };

        debug!(
            trend = ?market_structure.trend,
            order_blocks = order_blocks.len(),
            fvgs = fair_value_gaps.len(),
            zones = liquidity_zones.len(),
            bullish = %bullish_score,
            bearish = %bearish_score,
            "structure analyzed"
        );

        Ok(StructureAnalysis {
            order_blocks,
            fair_value_gaps,
            market_structure,
            liquidity_zones,
            bullish_score,
            bearish_score,
            target,
            stop,
            reasons,
        })
    }
}

impl LeafAnalyzer for StructureAnalyzer {
    type Detail = StructureAnalysis;
    const NAME: &'static str = MODULE_STRUCTURE;

    fn min_candles(&self) -> usize {
        self.config.min_candles
    }

    fn analyze(&self, candles: &[Candle]) -> Result<ModuleOutput<StructureAnalysis>, EngineError> {
        let a = self.analyze_structure(candles)?;
        let (bull, bear) = (a.bullish_score, a.bearish_score);
        let top = bull.max(bear);
        let signal = if bull >= self.config.signal_threshold && bull > bear {
            ModuleSignal::Buy
        } else if bear >= self.config.signal_threshold && bear > bull {
            ModuleSignal::Sell
        } else if top >= self.config.watch_threshold {
            ModuleSignal::Watch
        } else {
            ModuleSignal::Wait
        };
        Ok(ModuleOutput::new(signal, top, a))
    }
}

/// `(rising, falling)` steps between consecutive swings.
fn count_steps(swings: &[SwingPoint]) -> (usize, usize) {
    swings.windows(2).fold((0, 0), |(up, down), w| {
        if w[1].price > w[0].price {
            (up + 1, down)
        } else if w[1].price < w[0].price {
            (up, down + 1)
        } else {
            (up, down)
        }
    })
}

fn within_pct(reference: Decimal, price: Decimal, pct: Decimal) -> bool {
    if reference.is_zero() {
        return false;
    }
    ((price - reference) / reference * dec!(100)).abs() <= pct
}

/// Percent distance from `price` to the `[low, high]` band, zero inside.
fn zone_distance_pct(price: Decimal, low: Decimal, high: Decimal) -> Decimal {
    if price.is_zero() {
        return SCORE_MAX;
    }
    let gap = if price < low {
        low - price
    } else if price > high {
        price - high
    } else {
        Decimal::ZERO
    };
    gap / price * dec!(100)
}

fn nearest_above(swings: &[SwingPoint], price: Decimal) -> Option<Decimal> {
    swings.iter().map(|s| s.price).filter(|&p| p > price).reduce(Decimal::min)
}

fn nearest_below(swings: &[SwingPoint], price: Decimal) -> Option<Decimal> {
    swings.iter().map(|s| s.price).filter(|&p| p < price).reduce(Decimal::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Timeframe;

    fn candle(i: i64, o: Decimal, h: Decimal, l: Decimal, c: Decimal) -> Candle {
        Candle {
            timestamp: i,
            open: o,
            high: h,
            low: l,
            close: c,
            volume: dec!(1),
            interval: Timeframe::M15,
        }
    }

    fn analyzer() -> StructureAnalyzer {
        StructureAnalyzer::new(StructureConfig::default()).unwrap()
    }

    fn displacement_series() -> Vec<Candle> {
        vec![
            candle(0, dec!(100), dec!(101), dec!(99), dec!(100.5)),
            candle(1, dec!(100.5), dec!(100.8), dec!(99.5), dec!(99.8)),
            candle(2, dec!(99.8), dec!(102), dec!(99.7), dec!(101.9)),
            candle(3, dec!(101.9), dec!(102.5), dec!(101.5), dec!(102.2)),
            candle(4, dec!(102.2), dec!(102.6), dec!(101.8), dec!(102.4)),
        ]
    }

    #[test]
    fn test_bullish_order_block_before_displacement() {
        let blocks = analyzer().find_order_blocks(&displacement_series());
        assert_eq!(blocks.len(), 1);
        let b = &blocks[0];
        assert_eq!(b.kind, Bias::Bullish);
        assert_eq!(b.index, 1);
        assert_eq!(b.high, dec!(100.8));
        assert!(!b.touched);
        assert!(!b.broken);
    }

    #[test]
    fn test_close_below_block_marks_it_broken() {
        let mut candles = displacement_series();
        candles.push(candle(5, dec!(102.4), dec!(102.4), dec!(99), dec!(99.2)));
        let blocks = analyzer().find_order_blocks(&candles);
        let block = blocks.iter().find(|b| b.index == 1).unwrap();
        assert!(block.touched);
        assert!(block.broken);
    }

    #[test]
    fn test_bullish_fair_value_gap() {
        let gaps = analyzer().find_fair_value_gaps(&displacement_series());
        assert_eq!(gaps.len(), 1);
        let g = &gaps[0];
        assert_eq!(g.kind, Bias::Bullish);
        assert_eq!(g.index, 2);
        assert_eq!(g.low, dec!(100.8));
        assert_eq!(g.high, dec!(101.5));
        assert_eq!(g.fill_pct, Decimal::ZERO);
        assert!(!g.filled);
    }

    #[test]
    fn test_fair_value_gaps_are_most_recent_first() {
        let mut candles = displacement_series();
        candles.push(candle(5, dec!(102.4), dec!(104.6), dec!(102.3), dec!(104.5)));
        candles.push(candle(6, dec!(104.5), dec!(105), dec!(103), dec!(104.8)));
        let gaps = analyzer().find_fair_value_gaps(&candles);
        let indices: Vec<usize> = gaps.iter().map(|g| g.index).collect();
        assert_eq!(indices, vec![5, 2]);
        assert_eq!(gaps[0].low, dec!(102.6));
        assert_eq!(gaps[0].high, dec!(103));
    }

    /// Triangle wave on a rising drift: swing highs at 6, 18, 30...
    fn zigzag_uptrend(n: usize) -> Vec<Candle> {
        let tri = |i: usize| {
            let p = (i % 12) as i64;
            Decimal::from(if p <= 6 { p } else { 12 - p })
        };
        (0..n)
            .map(|i| {
                let close = dec!(100) + Decimal::from(i as u64) * dec!(0.3) + tri(i);
                candle(i as i64, close, close + dec!(0.2), close - dec!(0.2), close)
            })
            .collect()
    }

    #[test]
    fn test_zigzag_uptrend_structure() {
        let candles = zigzag_uptrend(72);
        let cols = Columns::from_candles(&candles);
        let ms = analyzer().market_structure(&cols);
        assert_eq!(ms.trend, MarketTrend::Bullish);
        assert!(ms.higher_highs >= 4);
        assert_eq!(ms.lower_highs, 0);
        assert!(!ms.bos_broken);
        assert!(ms.bos_level.is_some());
    }

    #[test]
    fn test_equal_lows_form_one_zone() {
        let a = analyzer();
        let structure = MarketStructure {
            trend: MarketTrend::Ranging,
            higher_highs: 0,
            higher_lows: 0,
            lower_highs: 0,
            lower_lows: 0,
            swing_highs: vec![],
            swing_lows: vec![
                SwingPoint { index: 2, price: dec!(100), kind: SwingKind::Low },
                SwingPoint { index: 8, price: dec!(100.1), kind: SwingKind::Low },
                SwingPoint { index: 14, price: dec!(95), kind: SwingKind::Low },
            ],
            bos_level: None,
            choch_level: None,
            bos_broken: false,
            choch_broken: false,
        };
        let mut candles: Vec<Candle> = (0..16)
            .map(|i| candle(i, dec!(101), dec!(102), dec!(100.5), dec!(101)))
            .collect();
        // wick through the pool, close back above
        candles[10] = candle(10, dec!(101), dec!(101.5), dec!(99.5), dec!(100.8));

        let zones = a.liquidity_zones(&candles, &structure);
        assert_eq!(zones.len(), 2);
        let pool = &zones[0];
        assert_eq!(pool.touches, 2);
        assert_eq!(pool.price, dec!(100.05));
        assert!(pool.swept);
        assert_eq!(zones[1].touches, 1);
    }

    #[test]
    fn test_flat_window_waits() {
        let candles: Vec<Candle> = (0..100)
            .map(|i| candle(i, dec!(10), dec!(10), dec!(10), dec!(10)))
            .collect();
        let out = analyzer().analyze(&candles).unwrap();
        assert_eq!(out.signal, ModuleSignal::Wait);
        assert_eq!(out.strength, Decimal::ZERO);
        assert!(out.detail.order_blocks.is_empty());
        assert!(out.detail.fair_value_gaps.is_empty());
        assert_eq!(out.detail.market_structure.trend, MarketTrend::Ranging);
    }
}
