//! Fractional-Kelly position sizing with drawdown and portfolio guards.
//!
//! - Kelly criterion over a bounded history of closed trades, falling back
//!   to conservative defaults until enough trades exist
//! - Fractional multiplier plus a hard per-trade ceiling on capital at risk
//! - Stop-distance conversion from risk fraction to notional, units and lots
//! - ATR-based default stop/take-profit and risk/reward helpers
//!
//! References:
//! - Kelly (1956): "A New Interpretation of Information Rate"
//! - Thorp (2008): "The Kelly Criterion in Blackjack, Sports Betting, and the Stock Market"
//! - Welles Wilder (1978): "New Concepts in Technical Trading Systems" (ATR)

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, info};

use super::ring_buffer::RingBuffer;
use crate::config::validate::{check_section, validate_risk};
use crate::config::RiskConfig;
use crate::errors::EngineError;
use crate::types::{PositionSize, TradeDirection, TradeRecord, TradeStats};

/// Inputs for one sizing decision.
#[derive(Debug, Clone)]
pub struct SizingRequest {
    pub capital: Decimal,
    pub entry_price: Decimal,
    pub stop_loss: Decimal,
    /// Signal confidence, 0-1.
    pub confidence: Decimal,
    /// Regime and volatility scaling applied before the per-trade ceiling.
    pub size_multiplier: Decimal,
    pub lot_size: Decimal,
    pub lot_step: Decimal,
}

// ═══════════════════════════════════════════════════════════════════════════
// Risk Sizer
// ═══════════════════════════════════════════════════════════════════════════

pub struct RiskSizer {
    config: RiskConfig,
    trades: RingBuffer<TradeRecord>,
    peak_capital: Decimal,
    current_capital: Decimal,
}

impl RiskSizer {
    pub fn new(config: RiskConfig) -> Result<Self, EngineError> {
        check_section(&config, validate_risk)?;
        let trades = RingBuffer::new(config.history_capacity);
        Ok(Self {
            config,
            trades,
            peak_capital: Decimal::ZERO,
            current_capital: Decimal::ZERO,
        })
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Trade history
    // -----------------------------------------------------------------------

    /// Record a closed trade. The oldest record is evicted at capacity.
    pub fn record_trade(&mut self, trade: TradeRecord) {
        let pnl = trade.pnl();
        if self.trades.push(trade).is_some() {
            debug!("trade history full, evicted oldest record");
        }
        debug!(pnl = %pnl, trades = self.trades.len(), "trade recorded");
    }

    pub fn trade_count(&self) -> usize {
        self.trades.len()
    }

    /// Win rate, win/loss ratio and expectancy over the recorded trades, or
    /// the configured defaults below `min_trades_for_stats`.
    pub fn stats(&self) -> TradeStats {
        let cfg = &self.config;
        let trades = self.trades.len();
        if trades < cfg.min_trades_for_stats {
            return TradeStats {
                trades,
                win_rate: cfg.default_win_rate,
                avg_win_loss_ratio: cfg.default_win_loss_ratio,
                expectancy: expectancy(cfg.default_win_rate, cfg.default_win_loss_ratio),
                using_defaults: true,
            };
        }

        let mut wins = 0u64;
        let mut losses = 0u64;
        let mut total_win = Decimal::ZERO;
        let mut total_loss = Decimal::ZERO;
        for t in self.trades.iter() {
            let pnl = t.pnl();
            if pnl > Decimal::ZERO {
                wins += 1;
                total_win += pnl;
            } else if pnl < Decimal::ZERO {
                losses += 1;
                total_loss += pnl.abs();
            }
        }

        let win_rate = Decimal::from(wins) / Decimal::from(trades as u64);
        let ratio = if losses == 0 || total_loss.is_zero() {
            cfg.default_win_loss_ratio
        } else if wins == 0 {
            Decimal::ZERO
        } else {
            (total_win / Decimal::from(wins)) / (total_loss / Decimal::from(losses))
        };

        TradeStats {
            trades,
            win_rate,
            avg_win_loss_ratio: ratio,
            expectancy: expectancy(win_rate, ratio),
            using_defaults: false,
        }
    }

    /// Kelly % = (W × R - L) / R, clipped to [0, 1].
    pub fn kelly_fraction(win_rate: Decimal, win_loss_ratio: Decimal) -> Decimal {
        if win_loss_ratio <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let loss_rate = dec!(1) - win_rate;
        let kelly = (win_rate * win_loss_ratio - loss_rate) / win_loss_ratio;
        kelly.max(Decimal::ZERO).min(dec!(1))
    }

    // -----------------------------------------------------------------------
    // Capital tracking
    // -----------------------------------------------------------------------

    /// Update current capital and the running peak.
    pub fn update_capital(&mut self, capital: Decimal) {
        self.current_capital = capital;
        if capital > self.peak_capital {
            self.peak_capital = capital;
        }
    }

    pub fn peak_capital(&self) -> Decimal {
        self.peak_capital
    }

    /// Fractional decline from the peak, 0 when no peak is known.
    pub fn drawdown(&self) -> Decimal {
        if self.peak_capital <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        ((self.peak_capital - self.current_capital) / self.peak_capital).max(Decimal::ZERO)
    }

    pub fn can_take_risk(&self) -> bool {
        self.drawdown() < self.config.max_drawdown
    }

    /// Whether adding `new_risk` (fraction of capital) to the open
    /// positions' risk fractions stays within the portfolio ceiling.
    pub fn portfolio_risk_ok(&self, open_risks: &[Decimal], new_risk: Decimal) -> bool {
        let total: Decimal = open_risks.iter().copied().sum::<Decimal>() + new_risk;
        total <= self.config.max_portfolio_risk
    }

    // -----------------------------------------------------------------------
    // Sizing
    // -----------------------------------------------------------------------

    /// Convert a signal into a position.
    ///
    /// final risk = min(kelly × fraction × multiplier, ceiling) × confidence;
    /// notional = capital × final risk / stop distance fraction.
    pub fn size_position(&self, req: &SizingRequest) -> PositionSize {
        let cfg = &self.config;

        if !self.can_take_risk() {
            info!(drawdown = %self.drawdown(), limit = %cfg.max_drawdown, "sizing refused: drawdown limit");
            return PositionSize::zero(format!(
                "drawdown {}% at or above {}% limit",
                (self.drawdown() * dec!(100)).round_dp(2),
                cfg.max_drawdown * dec!(100)
            ));
        }
        if req.capital <= Decimal::ZERO {
            return PositionSize::zero("no capital available");
        }
        if req.entry_price <= Decimal::ZERO {
            return PositionSize::zero("entry price must be positive");
        }
        let stop_fraction = (req.entry_price - req.stop_loss).abs() / req.entry_price;
        if stop_fraction.is_zero() {
            return PositionSize::zero("stop distance is zero");
        }

        let stats = self.stats();
        let kelly = Self::kelly_fraction(stats.win_rate, stats.avg_win_loss_ratio);
        let confidence = req.confidence.max(Decimal::ZERO).min(dec!(1));
        let multiplier = req.size_multiplier.max(Decimal::ZERO);
        let risk_fraction =
            (kelly * cfg.kelly_fraction * multiplier).min(cfg.max_risk_per_trade) * confidence;

        let risk_amount = req.capital * risk_fraction;
        let notional = risk_amount / stop_fraction;
        let units = notional / req.entry_price;
        let lots = if req.lot_size > Decimal::ZERO {
            floor_to_step(units / req.lot_size, req.lot_step)
        } else {
            Decimal::ZERO
        };

        debug!(
            kelly = %kelly,
            risk_fraction = %risk_fraction,
            stop_fraction = %stop_fraction,
            notional = %notional,
            lots = %lots,
            defaults = stats.using_defaults,
            "position sized"
        );

        PositionSize {
            kelly_fraction: kelly,
            risk_fraction,
            risk_amount,
            notional,
            units,
            lots,
            refused_reason: if kelly.is_zero() {
                Some("no positive edge in trade statistics".to_string())
            } else {
                None
            },
        }
    }

    // -----------------------------------------------------------------------
    // Protective levels
    // -----------------------------------------------------------------------

    pub fn default_stop_loss(entry: Decimal, atr: Decimal, multiplier: Decimal, direction: TradeDirection) -> Decimal {
        let distance = atr * multiplier;
        match direction {
            TradeDirection::Long => entry - distance,
            TradeDirection::Short => entry + distance,
        }
    }

    pub fn default_take_profit(entry: Decimal, atr: Decimal, multiplier: Decimal, direction: TradeDirection) -> Decimal {
        let distance = atr * multiplier;
        match direction {
            TradeDirection::Long => entry + distance,
            TradeDirection::Short => entry - distance,
        }
    }

    /// Reward over risk; zero when the stop sits on the entry.
    pub fn risk_reward(entry: Decimal, stop_loss: Decimal, take_profit: Decimal) -> Decimal {
        let risk = (entry - stop_loss).abs();
        let reward = (take_profit - entry).abs();
        if risk > Decimal::ZERO {
            reward / risk
        } else {
            Decimal::ZERO
        }
    }

    /// Shrinks size as ATR% rises above the high-volatility mark, never
    /// below half.
    pub fn volatility_multiplier(&self, atr_pct: Decimal) -> Decimal {
        let high = self.config.high_volatility_pct;
        if atr_pct <= high || atr_pct <= Decimal::ZERO {
            return dec!(1);
        }
        (high / atr_pct).max(dec!(0.5))
    }
}

fn expectancy(win_rate: Decimal, win_loss_ratio: Decimal) -> Decimal {
    win_rate * win_loss_ratio - (dec!(1) - win_rate)
}

/// Round `value` down to a multiple of `step`; a non-positive step leaves it
/// unchanged.
pub fn floor_to_step(value: Decimal, step: Decimal) -> Decimal {
    if step <= Decimal::ZERO {
        return value;
    }
    (value / step).floor() * step
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sizer() -> RiskSizer {
        RiskSizer::new(RiskConfig::default()).unwrap()
    }

    fn request(confidence: Decimal) -> SizingRequest {
        SizingRequest {
            capital: dec!(10000),
            entry_price: dec!(100),
            stop_loss: dec!(98),
            confidence,
            size_multiplier: dec!(1),
            lot_size: dec!(1),
            lot_step: dec!(0.01),
        }
    }

    fn trade(entry: Decimal, exit: Decimal) -> TradeRecord {
        TradeRecord {
            entry_price: entry,
            exit_price: exit,
            size: dec!(1),
            direction: TradeDirection::Long,
        }
    }

    #[test]
    fn test_kelly_fraction() {
        // 60% win rate, 2:1 → (1.2 - 0.4) / 2
        assert_eq!(RiskSizer::kelly_fraction(dec!(0.60), dec!(2.0)), dec!(0.4));
        // Negative expectancy clips to zero
        assert_eq!(RiskSizer::kelly_fraction(dec!(0.40), dec!(1.0)), Decimal::ZERO);
        assert_eq!(RiskSizer::kelly_fraction(dec!(0.9), Decimal::ZERO), Decimal::ZERO);
    }

    #[test]
    fn test_defaults_until_enough_trades() {
        let mut s = sizer();
        for _ in 0..29 {
            s.record_trade(trade(dec!(100), dec!(110)));
        }
        let stats = s.stats();
        assert!(stats.using_defaults);
        assert_eq!(stats.win_rate, dec!(0.45));
        assert_eq!(stats.avg_win_loss_ratio, dec!(1.5));

        s.record_trade(trade(dec!(100), dec!(95)));
        let stats = s.stats();
        assert!(!stats.using_defaults);
        assert_eq!(stats.trades, 30);
        // 29 wins of 10 vs one loss of 5
        assert_eq!(stats.avg_win_loss_ratio, dec!(2));
    }

    #[test]
    fn test_history_is_bounded() {
        let mut s = sizer();
        for _ in 0..150 {
            s.record_trade(trade(dec!(100), dec!(101)));
        }
        assert_eq!(s.trade_count(), 100);
    }

    #[test]
    fn test_default_sizing_hits_ceiling() {
        // Default stats: kelly = (0.675 - 0.55) / 1.5, quarter of that > 2%
        let p = sizer().size_position(&request(dec!(1)));
        assert_eq!(p.risk_fraction, dec!(0.02));
        assert_eq!(p.risk_amount, dec!(200));
        // 200 risked over a 2% stop
        assert_eq!(p.notional, dec!(10000));
        assert_eq!(p.units, dec!(100));
        assert_eq!(p.lots, dec!(100));
        assert!(p.refused_reason.is_none());
    }

    #[test]
    fn test_drawdown_refuses_new_risk() {
        let mut s = sizer();
        s.update_capital(dec!(10000));
        s.update_capital(dec!(8400));
        assert_eq!(s.drawdown(), dec!(0.16));
        assert!(!s.can_take_risk());
        let p = s.size_position(&request(dec!(0.9)));
        assert_eq!(p.lots, Decimal::ZERO);
        assert!(p.refused_reason.unwrap().contains("drawdown"));

        s.update_capital(dec!(9000));
        assert!(s.can_take_risk());
    }

    #[test]
    fn test_portfolio_risk_check() {
        let s = sizer();
        assert!(s.portfolio_risk_ok(&[dec!(0.02), dec!(0.02)], dec!(0.02)));
        assert!(!s.portfolio_risk_ok(&[dec!(0.02), dec!(0.03)], dec!(0.02)));
    }

    #[test]
    fn test_atr_levels_and_risk_reward() {
        let entry = dec!(100);
        let sl = RiskSizer::default_stop_loss(entry, dec!(2), dec!(2), TradeDirection::Long);
        let tp = RiskSizer::default_take_profit(entry, dec!(2), dec!(3), TradeDirection::Long);
        assert_eq!(sl, dec!(96));
        assert_eq!(tp, dec!(106));
        assert_eq!(RiskSizer::risk_reward(entry, sl, tp), dec!(1.5));
        assert!(RiskSizer::default_stop_loss(entry, dec!(2), dec!(2), TradeDirection::Short) > entry);
    }

    #[test]
    fn test_volatility_multiplier() {
        let s = sizer();
        assert_eq!(s.volatility_multiplier(dec!(1)), dec!(1));
        assert_eq!(s.volatility_multiplier(dec!(7)), dec!(0.5));
        assert_eq!(s.volatility_multiplier(dec!(20)), dec!(0.5));
    }

    #[test]
    fn test_floor_to_step() {
        assert_eq!(floor_to_step(dec!(1.239), dec!(0.01)), dec!(1.23));
        assert_eq!(floor_to_step(dec!(7), dec!(5)), dec!(5));
    }

    proptest! {
        #[test]
        fn prop_size_monotonic_in_confidence(a in 0u32..=100, b in 0u32..=100) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let s = sizer();
            let p_lo = s.size_position(&request(Decimal::new(lo as i64, 2)));
            let p_hi = s.size_position(&request(Decimal::new(hi as i64, 2)));
            prop_assert!(p_lo.notional <= p_hi.notional);
            prop_assert!(p_lo.lots <= p_hi.lots);
        }

        #[test]
        fn prop_risk_never_exceeds_ceiling(
            conf in 0u32..=100,
            mult in 0u32..=300,
            wins in 0usize..60,
        ) {
            let mut s = sizer();
            for i in 0..60 {
                let exit = if i < wins { dec!(120) } else { dec!(99) };
                s.record_trade(trade(dec!(100), exit));
            }
            let mut req = request(Decimal::new(conf as i64, 2));
            req.size_multiplier = Decimal::new(mult as i64, 2);
            let p = s.size_position(&req);
            prop_assert!(p.risk_fraction <= s.config().max_risk_per_trade);
            prop_assert!(p.risk_fraction >= Decimal::ZERO);
        }
    }
}
