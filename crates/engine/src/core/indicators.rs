//! Pure computation module for technical indicators and statistical measures.
//!
//! No I/O, no side effects. Takes price columns and returns indicator values.
//! All computations use `Decimal`; the few routines that need a square root
//! go through `MathematicalOps`.
//!
//! Series functions return values aligned to the END of the input: the last
//! element of every series corresponds to the last input price. Each function
//! documents the index offset of its first element.
//!
//! Indicators implemented:
//! - Averages: SMA, EMA
//! - Oscillators: RSI (Wilder's smoothing), MACD, Stochastic %K/%D
//! - Volatility: Bollinger Bands, true range, ATR (Wilder's smoothing)
//! - Trend: Directional Movement Index (+DI, -DI, ADX)
//! - Statistics: population standard deviation, percentile rank
//!
//! References:
//!     Wilder (1978), "New Concepts in Technical Trading Systems".
//!     Appel (1979), "The Moving Average Convergence-Divergence Method".
//!     Lane (1984), "Lane's Stochastics".

use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use rust_decimal_macros::dec;

use crate::config::IndicatorParams;
use crate::types::{Candle, IndicatorSnapshot};

// ═══════════════════════════════════════════════════════════════════════════
// Averages
// ═══════════════════════════════════════════════════════════════════════════

/// Simple Moving Average series. First element covers `prices[..period]`.
pub fn sma(prices: &[Decimal], period: usize) -> Vec<Decimal> {
    if prices.len() < period || period == 0 {
        return Vec::new();
    }
    let period_d = Decimal::from(period as u64);
    prices
        .windows(period)
        .map(|w| w.iter().copied().sum::<Decimal>() / period_d)
        .collect()
}

/// Exponential Moving Average.
///
/// Multiplier `k = 2 / (period + 1)`. First value seeded with SMA of the
/// first `period` prices. Returns empty `Vec` if insufficient data.
pub fn ema(prices: &[Decimal], period: usize) -> Vec<Decimal> {
    if prices.len() < period || period == 0 {
        return Vec::new();
    }

    let k = dec!(2) / Decimal::from(period as u64 + 1);
    let one_minus_k = dec!(1) - k;

    // Seed with SMA of first `period` values.
    let seed: Decimal =
        prices[..period].iter().copied().sum::<Decimal>() / Decimal::from(period as u64);

    let mut result = Vec::with_capacity(prices.len() - period + 1);
    let mut prev = seed;
    result.push(seed);

    for &price in &prices[period..] {
        prev = price * k + prev * one_minus_k;
        result.push(prev);
    }

    result
}

// ═══════════════════════════════════════════════════════════════════════════
// Oscillators
// ═══════════════════════════════════════════════════════════════════════════

/// RSI series (Wilder's smoothing).
///
/// Element `j` corresponds to `prices[j + period]`. A window with zero
/// average loss resolves to 100; a window with no movement at all also
/// resolves to 100 (no losses), matching the scalar [`rsi`].
pub fn rsi_series(prices: &[Decimal], period: usize) -> Vec<Decimal> {
    if prices.len() < period + 1 || period == 0 {
        return Vec::new();
    }

    let period_d = Decimal::from(period as u64);
    let period_minus_1 = Decimal::from(period as u64 - 1);

    let changes: Vec<Decimal> = prices.windows(2).map(|w| w[1] - w[0]).collect();

    let mut avg_gain = changes[..period]
        .iter()
        .map(|&c| c.max(Decimal::ZERO))
        .sum::<Decimal>()
        / period_d;
    let mut avg_loss = changes[..period]
        .iter()
        .map(|&c| (-c).max(Decimal::ZERO))
        .sum::<Decimal>()
        / period_d;

    let mut out = Vec::with_capacity(changes.len() - period + 1);
    out.push(rsi_from_averages(avg_gain, avg_loss));

    for &c in &changes[period..] {
        let gain = c.max(Decimal::ZERO);
        let loss = (-c).max(Decimal::ZERO);
        avg_gain = (avg_gain * period_minus_1 + gain) / period_d;
        avg_loss = (avg_loss * period_minus_1 + loss) / period_d;
        out.push(rsi_from_averages(avg_gain, avg_loss));
    }

    out
}

fn rsi_from_averages(avg_gain: Decimal, avg_loss: Decimal) -> Decimal {
    if avg_loss == Decimal::ZERO {
        return dec!(100);
    }
    let rs = avg_gain / avg_loss;
    dec!(100) - (dec!(100) / (dec!(1) + rs))
}

/// Relative Strength Index (Wilder's smoothing).
///
/// Uses smoothing factor `1/period` (not the standard EMA `2/(period+1)`).
/// Returns 50 if insufficient data.
pub fn rsi(prices: &[Decimal], period: usize) -> Decimal {
    rsi_series(prices, period).last().copied().unwrap_or(dec!(50))
}

/// MACD line, signal line and histogram, each aligned to the end of the
/// input. `line[j]` corresponds to `prices[j + slow - 1]`; `signal` and
/// `histogram` are shorter by `signal_period - 1`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MacdSeries {
    pub line: Vec<Decimal>,
    pub signal: Vec<Decimal>,
    pub histogram: Vec<Decimal>,
}

impl MacdSeries {
    /// Index offset of the first histogram value within the price input.
    pub fn histogram_offset(&self, price_len: usize) -> usize {
        price_len.saturating_sub(self.histogram.len())
    }
}

/// Full MACD series. Empty if insufficient data.
pub fn macd_series(prices: &[Decimal], fast: usize, slow: usize, signal: usize) -> MacdSeries {
    if fast == 0 || fast >= slow || signal == 0 || prices.len() < slow + signal - 1 {
        return MacdSeries::default();
    }

    let fast_ema = ema(prices, fast);
    let slow_ema = ema(prices, slow);
    if fast_ema.is_empty() || slow_ema.is_empty() {
        return MacdSeries::default();
    }

    // Align: MACD line = fast_ema - slow_ema, from the slow-start onward.
    let offset = slow - fast;
    let line: Vec<Decimal> = (0..slow_ema.len())
        .map(|i| fast_ema[i + offset] - slow_ema[i])
        .collect();

    let signal_line = ema(&line, signal);
    if signal_line.is_empty() {
        return MacdSeries::default();
    }
    let line_offset = line.len() - signal_line.len();
    let histogram = signal_line
        .iter()
        .enumerate()
        .map(|(i, s)| line[i + line_offset] - s)
        .collect();

    MacdSeries {
        line,
        signal: signal_line,
        histogram,
    }
}

/// Moving Average Convergence Divergence.
///
/// Returns `(macd_line, signal_line, histogram)`.
/// Returns `(0, 0, 0)` if insufficient data.
pub fn macd(
    prices: &[Decimal],
    fast: usize,
    slow: usize,
    signal: usize,
) -> (Decimal, Decimal, Decimal) {
    let series = macd_series(prices, fast, slow, signal);
    match (series.line.last(), series.signal.last(), series.histogram.last()) {
        (Some(&m), Some(&s), Some(&h)) => (m, s, h),
        _ => (Decimal::ZERO, Decimal::ZERO, Decimal::ZERO),
    }
}

/// Stochastic oscillator `(%K, %D)`.
///
/// `%K[j]` corresponds to candle `j + k_period - 1`; `%D` is the SMA of %K
/// over `d_period`. A window with zero high-low range resolves to 50.
pub fn stochastic(
    highs: &[Decimal],
    lows: &[Decimal],
    closes: &[Decimal],
    k_period: usize,
    d_period: usize,
) -> (Vec<Decimal>, Vec<Decimal>) {
    let n = closes.len();
    if k_period == 0 || n < k_period || highs.len() != n || lows.len() != n {
        return (Vec::new(), Vec::new());
    }

    let k: Vec<Decimal> = (k_period - 1..n)
        .map(|i| {
            let start = i + 1 - k_period;
            let hh = highs[start..=i].iter().copied().fold(highs[start], Decimal::max);
            let ll = lows[start..=i].iter().copied().fold(lows[start], Decimal::min);
            let range = hh - ll;
            if range == Decimal::ZERO {
                dec!(50)
            } else {
                (closes[i] - ll) / range * dec!(100)
            }
        })
        .collect();

    let d = sma(&k, d_period);
    (k, d)
}

// ═══════════════════════════════════════════════════════════════════════════
// Volatility
// ═══════════════════════════════════════════════════════════════════════════

/// Bollinger Bands (SMA-based with population standard deviation).
///
/// Returns `(upper, middle, lower)`.  Falls back to `(price, price, price)`
/// if insufficient data.
pub fn bollinger_bands(
    prices: &[Decimal],
    period: usize,
    std_mult: Decimal,
) -> (Decimal, Decimal, Decimal) {
    let fallback = prices.last().copied().unwrap_or(Decimal::ZERO);
    if prices.len() < period || period == 0 {
        return (fallback, fallback, fallback);
    }

    let window = &prices[prices.len() - period..];
    let middle = mean(window);
    let sd = std_dev(window);

    (middle + std_mult * sd, middle, middle - std_mult * sd)
}

/// True range series. `tr[j]` corresponds to candle `j + 1`.
///
/// `TR = max(H-L, |H-prevC|, |L-prevC|)`.
pub fn true_range(highs: &[Decimal], lows: &[Decimal], closes: &[Decimal]) -> Vec<Decimal> {
    let n = highs.len();
    if n < 2 || lows.len() != n || closes.len() != n {
        return Vec::new();
    }
    (1..n)
        .map(|i| {
            let hl = highs[i] - lows[i];
            let hc = (highs[i] - closes[i - 1]).abs();
            let lc = (lows[i] - closes[i - 1]).abs();
            hl.max(hc).max(lc)
        })
        .collect()
}

/// ATR series (Wilder's smoothing). Element `j` corresponds to candle
/// `j + period`.
pub fn atr_series(
    highs: &[Decimal],
    lows: &[Decimal],
    closes: &[Decimal],
    period: usize,
) -> Vec<Decimal> {
    if period == 0 || highs.len() < period + 1 {
        return Vec::new();
    }
    let trs = true_range(highs, lows, closes);
    if trs.len() < period {
        return Vec::new();
    }

    let period_d = Decimal::from(period as u64);
    let period_m1 = Decimal::from(period as u64 - 1);

    // First ATR = simple average of first `period` TRs.
    let mut atr_val: Decimal = trs[..period].iter().copied().sum::<Decimal>() / period_d;
    let mut out = Vec::with_capacity(trs.len() - period + 1);
    out.push(atr_val);

    for &tr in &trs[period..] {
        atr_val = (atr_val * period_m1 + tr) / period_d;
        out.push(atr_val);
    }

    out
}

/// Average True Range (Wilder's smoothing).
///
/// Returns `Decimal::ZERO` on mismatched or insufficient data.
pub fn atr(highs: &[Decimal], lows: &[Decimal], closes: &[Decimal], period: usize) -> Decimal {
    atr_series(highs, lows, closes, period)
        .last()
        .copied()
        .unwrap_or(Decimal::ZERO)
}

// ═══════════════════════════════════════════════════════════════════════════
// Trend
// ═══════════════════════════════════════════════════════════════════════════

/// Directional Movement Index series.
///
/// `plus_di[j]` / `minus_di[j]` correspond to candle `j + period`;
/// `adx[j]` corresponds to candle `j + 2 * period - 1`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DmiSeries {
    pub plus_di: Vec<Decimal>,
    pub minus_di: Vec<Decimal>,
    pub adx: Vec<Decimal>,
}

/// Wilder's DMI: smoothed +DM/-DM over smoothed TR, DX, then ADX.
pub fn dmi(highs: &[Decimal], lows: &[Decimal], closes: &[Decimal], period: usize) -> DmiSeries {
    let n = highs.len();
    if period == 0 || n < period + 1 || lows.len() != n || closes.len() != n {
        return DmiSeries::default();
    }

    let trs = true_range(highs, lows, closes);
    let mut plus_dm = Vec::with_capacity(n - 1);
    let mut minus_dm = Vec::with_capacity(n - 1);
    for i in 1..n {
        let up = highs[i] - highs[i - 1];
        let down = lows[i - 1] - lows[i];
        plus_dm.push(if up > down && up > Decimal::ZERO { up } else { Decimal::ZERO });
        minus_dm.push(if down > up && down > Decimal::ZERO { down } else { Decimal::ZERO });
    }

    let period_d = Decimal::from(period as u64);

    // Wilder running sums: first = sum of `period` values, then
    // s = s - s/period + x.
    let smooth = |values: &[Decimal]| -> Vec<Decimal> {
        let mut acc: Decimal = values[..period].iter().copied().sum();
        let mut out = Vec::with_capacity(values.len() - period + 1);
        out.push(acc);
        for &v in &values[period..] {
            acc = acc - acc / period_d + v;
            out.push(acc);
        }
        out
    };

    let s_tr = smooth(&trs);
    let s_plus = smooth(&plus_dm);
    let s_minus = smooth(&minus_dm);

    let mut plus_di = Vec::with_capacity(s_tr.len());
    let mut minus_di = Vec::with_capacity(s_tr.len());
    let mut dx = Vec::with_capacity(s_tr.len());
    for i in 0..s_tr.len() {
        let (p, m) = if s_tr[i] == Decimal::ZERO {
            (Decimal::ZERO, Decimal::ZERO)
        } else {
            (
                dec!(100) * s_plus[i] / s_tr[i],
                dec!(100) * s_minus[i] / s_tr[i],
            )
        };
        plus_di.push(p);
        minus_di.push(m);
        let sum = p + m;
        dx.push(if sum == Decimal::ZERO {
            Decimal::ZERO
        } else {
            dec!(100) * (p - m).abs() / sum
        });
    }

    let mut adx = Vec::new();
    if dx.len() >= period {
        let period_m1 = Decimal::from(period as u64 - 1);
        let mut val = dx[..period].iter().copied().sum::<Decimal>() / period_d;
        adx.reserve(dx.len() - period + 1);
        adx.push(val);
        for &d in &dx[period..] {
            val = (val * period_m1 + d) / period_d;
            adx.push(val);
        }
    }

    DmiSeries {
        plus_di,
        minus_di,
        adx,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Statistics
// ═══════════════════════════════════════════════════════════════════════════

/// Arithmetic mean; zero for an empty slice.
pub fn mean(values: &[Decimal]) -> Decimal {
    if values.is_empty() {
        return Decimal::ZERO;
    }
    values.iter().copied().sum::<Decimal>() / Decimal::from(values.len() as u64)
}

/// Population standard deviation; zero for fewer than two values.
pub fn std_dev(values: &[Decimal]) -> Decimal {
    if values.len() < 2 {
        return Decimal::ZERO;
    }
    let m = mean(values);
    let variance = values
        .iter()
        .map(|&v| {
            let diff = v - m;
            diff * diff
        })
        .sum::<Decimal>()
        / Decimal::from(values.len() as u64);
    variance.sqrt().unwrap_or(Decimal::ZERO)
}

/// Percentage (0-100) of `values` strictly below `value`.
pub fn percentile_rank(values: &[Decimal], value: Decimal) -> Decimal {
    if values.is_empty() {
        return dec!(50);
    }
    let below = values.iter().filter(|&&v| v < value).count();
    Decimal::from(below as u64) / Decimal::from(values.len() as u64) * dec!(100)
}

// ═══════════════════════════════════════════════════════════════════════════
// Composite
// ═══════════════════════════════════════════════════════════════════════════

/// Compute the standard indicator snapshot at the last candle.
pub fn compute_all(candles: &[Candle], config: &IndicatorParams) -> IndicatorSnapshot {
    let closes: Vec<Decimal> = candles.iter().map(|c| c.close).collect();
    let highs: Vec<Decimal> = candles.iter().map(|c| c.high).collect();
    let lows: Vec<Decimal> = candles.iter().map(|c| c.low).collect();
    let volumes: Vec<Decimal> = candles.iter().map(|c| c.volume).collect();

    let price = closes.last().copied().unwrap_or(Decimal::ZERO);

    let last_or = |v: Vec<Decimal>| v.last().copied().unwrap_or(price);
    let ema_20 = last_or(ema(&closes, config.ema_fast as usize));
    let ema_50 = last_or(ema(&closes, config.ema_slow as usize));
    let ema_200 = last_or(ema(&closes, config.ema_trend as usize));

    let rsi_val = rsi(&closes, config.rsi_period as usize);

    let macd = macd_series(
        &closes,
        config.macd_fast as usize,
        config.macd_slow as usize,
        config.macd_signal as usize,
    );
    let hist_len = macd.histogram.len();
    let macd_histogram = macd.histogram.last().copied().unwrap_or(Decimal::ZERO);
    let macd_histogram_prev = if hist_len >= 2 {
        macd.histogram[hist_len - 2]
    } else {
        macd_histogram
    };

    let (bb_upper, bb_middle, bb_lower) =
        bollinger_bands(&closes, config.bb_period as usize, config.bb_std);

    let atr_val = atr(&highs, &lows, &closes, config.atr_period as usize);
    let atr_pct = if price > Decimal::ZERO {
        atr_val / price * dec!(100)
    } else {
        Decimal::ZERO
    };

    let vol_window = volumes.len().min(config.volume_avg_period as usize);
    let volume_20_avg = mean(&volumes[volumes.len() - vol_window..]);

    IndicatorSnapshot {
        price,
        ema_20,
        ema_50,
        ema_200,
        rsi_14: rsi_val,
        macd_line: macd.line.last().copied().unwrap_or(Decimal::ZERO),
        macd_signal: macd.signal.last().copied().unwrap_or(Decimal::ZERO),
        macd_histogram,
        macd_histogram_prev,
        bb_upper,
        bb_middle,
        bb_lower,
        atr_14: atr_val,
        atr_pct,
        volume: volumes.last().copied().unwrap_or(Decimal::ZERO),
        volume_20_avg,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // -- Averages ----------------------------------------------------------

    #[test]
    fn test_sma_basic() {
        let prices: Vec<Decimal> = (1..=5).map(Decimal::from).collect();
        assert_eq!(sma(&prices, 2), vec![dec!(1.5), dec!(2.5), dec!(3.5), dec!(4.5)]);
    }

    #[test]
    fn test_ema_basic() {
        let prices: Vec<Decimal> = (1..=10).map(Decimal::from).collect();
        let result = ema(&prices, 3);
        // First value = SMA of [1,2,3] = 2
        assert_eq!(result[0], dec!(2));
        assert_eq!(result.len(), 8); // 10 - 3 + 1
    }

    #[test]
    fn test_ema_insufficient_data() {
        let prices = vec![dec!(1), dec!(2)];
        assert!(ema(&prices, 5).is_empty());
        assert!(ema(&prices, 0).is_empty());
    }

    // -- RSI ---------------------------------------------------------------

    #[test]
    fn test_rsi_all_gains() {
        // Monotonically increasing -> RSI should be 100.
        let prices: Vec<Decimal> = (1..=20).map(Decimal::from).collect();
        assert_eq!(rsi(&prices, 14), dec!(100));
    }

    #[test]
    fn test_rsi_all_losses() {
        let prices: Vec<Decimal> = (0..20).rev().map(|i| Decimal::from(i + 1)).collect();
        let val = rsi(&prices, 14);
        assert!(val < dec!(1), "expected near-zero RSI, got {val}");
    }

    #[test]
    fn test_rsi_insufficient_data() {
        let prices = vec![dec!(10), dec!(11)];
        assert_eq!(rsi(&prices, 14), dec!(50));
        assert!(rsi_series(&prices, 14).is_empty());
    }

    #[test]
    fn test_rsi_series_alignment() {
        let prices: Vec<Decimal> = (1..=30).map(Decimal::from).collect();
        let series = rsi_series(&prices, 14);
        assert_eq!(series.len(), 30 - 14);
        assert_eq!(*series.last().unwrap(), rsi(&prices, 14));
    }

    // -- MACD --------------------------------------------------------------

    #[test]
    fn test_macd_insufficient_data() {
        let prices: Vec<Decimal> = (1..=10).map(Decimal::from).collect();
        assert_eq!(
            macd(&prices, 12, 26, 9),
            (Decimal::ZERO, Decimal::ZERO, Decimal::ZERO)
        );
    }

    #[test]
    fn test_macd_flat_prices() {
        let prices: Vec<Decimal> = vec![dec!(100); 50];
        let (m, s, h) = macd(&prices, 12, 26, 9);
        assert_eq!(m, Decimal::ZERO);
        assert_eq!(s, Decimal::ZERO);
        assert_eq!(h, Decimal::ZERO);
    }

    #[test]
    fn test_macd_series_lengths() {
        let prices: Vec<Decimal> = (0..60).map(|i| Decimal::from(100 + i)).collect();
        let series = macd_series(&prices, 12, 26, 9);
        assert_eq!(series.line.len(), 60 - 26 + 1);
        assert_eq!(series.histogram.len(), series.line.len() - 8);
        assert_eq!(series.histogram_offset(60), 60 - series.histogram.len());
    }

    // -- Stochastic --------------------------------------------------------

    #[test]
    fn test_stochastic_flat_range_is_neutral() {
        let flat = vec![dec!(10); 20];
        let (k, d) = stochastic(&flat, &flat, &flat, 14, 3);
        assert_eq!(k.len(), 7);
        assert!(k.iter().all(|&v| v == dec!(50)));
        assert_eq!(d.len(), 5);
    }

    #[test]
    fn test_stochastic_close_at_high() {
        let highs: Vec<Decimal> = (0..20).map(|i| Decimal::from(11 + i)).collect();
        let lows: Vec<Decimal> = (0..20).map(|i| Decimal::from(9 + i)).collect();
        let closes = highs.clone();
        let (k, _) = stochastic(&highs, &lows, &closes, 14, 3);
        assert_eq!(*k.last().unwrap(), dec!(100));
    }

    // -- Bollinger Bands ---------------------------------------------------

    #[test]
    fn test_bb_flat_prices() {
        let prices = vec![dec!(100); 20];
        assert_eq!(
            bollinger_bands(&prices, 20, dec!(2)),
            (dec!(100), dec!(100), dec!(100))
        );
    }

    #[test]
    fn test_bb_insufficient_data() {
        let prices = vec![dec!(50), dec!(51)];
        assert_eq!(
            bollinger_bands(&prices, 20, dec!(2)),
            (dec!(51), dec!(51), dec!(51))
        );
    }

    // -- ATR ---------------------------------------------------------------

    #[test]
    fn test_atr_mismatched_lengths() {
        let highs = vec![dec!(10), dec!(11)];
        let lows = vec![dec!(9)];
        let closes = vec![dec!(10), dec!(10)];
        assert_eq!(atr(&highs, &lows, &closes, 14), Decimal::ZERO);
    }

    #[test]
    fn test_atr_constant_range() {
        let highs = vec![dec!(101); 30];
        let lows = vec![dec!(99); 30];
        let closes = vec![dec!(100); 30];
        let series = atr_series(&highs, &lows, &closes, 14);
        assert_eq!(series.len(), 30 - 14);
        assert!(series.iter().all(|&v| v == dec!(2)));
    }

    // -- DMI ---------------------------------------------------------------

    #[test]
    fn test_dmi_uptrend_has_plus_dominance() {
        let highs: Vec<Decimal> = (0..60).map(|i| Decimal::from(101 + i)).collect();
        let lows: Vec<Decimal> = (0..60).map(|i| Decimal::from(99 + i)).collect();
        let closes: Vec<Decimal> = (0..60).map(|i| Decimal::from(100 + i)).collect();
        let dmi = dmi(&highs, &lows, &closes, 14);
        assert_eq!(dmi.plus_di.len(), 60 - 14);
        assert_eq!(dmi.adx.len(), 60 - 28 + 1);
        assert!(dmi.plus_di.last().unwrap() > dmi.minus_di.last().unwrap());
        assert!(*dmi.adx.last().unwrap() > dec!(25));
    }

    #[test]
    fn test_dmi_flat_series_is_zero() {
        let flat = vec![dec!(100); 40];
        let dmi = dmi(&flat, &flat, &flat, 14);
        assert!(dmi.adx.iter().all(|&v| v == Decimal::ZERO));
    }

    // -- Statistics --------------------------------------------------------

    #[test]
    fn test_std_dev_and_percentile() {
        let values = vec![dec!(2), dec!(4), dec!(4), dec!(4), dec!(5), dec!(5), dec!(7), dec!(9)];
        assert!((std_dev(&values) - dec!(2)).abs() < dec!(0.000001));
        assert_eq!(percentile_rank(&values, dec!(5)), dec!(50));
        assert_eq!(percentile_rank(&[], dec!(5)), dec!(50));
    }

    proptest! {
        #[test]
        fn prop_rsi_within_bounds(raw in proptest::collection::vec(1u32..10_000, 16..80)) {
            let prices: Vec<Decimal> = raw.into_iter().map(Decimal::from).collect();
            for v in rsi_series(&prices, 14) {
                prop_assert!(v >= Decimal::ZERO && v <= dec!(100));
            }
        }

        #[test]
        fn prop_stochastic_within_bounds(raw in proptest::collection::vec(10u32..1_000, 20..60)) {
            let closes: Vec<Decimal> = raw.iter().map(|&v| Decimal::from(v)).collect();
            let highs: Vec<Decimal> = closes.iter().map(|c| c + dec!(2)).collect();
            let lows: Vec<Decimal> = closes.iter().map(|c| c - dec!(2)).collect();
            let (k, _) = stochastic(&highs, &lows, &closes, 14, 3);
            for v in k {
                prop_assert!(v >= Decimal::ZERO && v <= dec!(100));
            }
        }
    }
}
