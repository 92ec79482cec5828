use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// ---------------------------------------------------------------------------
// Scales
// ---------------------------------------------------------------------------

/// Upper bound of every module strength, quality and probability score.
pub const SCORE_MAX: Decimal = dec!(100);

/// Upper bound of every confidence value.
pub const CONFIDENCE_MAX: Decimal = dec!(1);

// ---------------------------------------------------------------------------
// Module names (keys in the result record and the weight table)
// ---------------------------------------------------------------------------

pub const MODULE_INSTRUMENT_TREND: &str = "instrument_trend";
pub const MODULE_CROSS_ASSET: &str = "cross_asset";
pub const MODULE_CURRENCY_RISK: &str = "currency_risk";
pub const MODULE_SIGNAL_COMBINER: &str = "signal_combiner";
pub const MODULE_REGIME: &str = "regime";
pub const MODULE_DIVERGENCE: &str = "divergence";
pub const MODULE_STRUCTURE: &str = "structure";
pub const MODULE_RETRACEMENT: &str = "retracement";

// ---------------------------------------------------------------------------
// Oscillator names
// ---------------------------------------------------------------------------

pub const OSC_RSI: &str = "rsi";
pub const OSC_MACD: &str = "macd";
pub const OSC_STOCHASTIC: &str = "stochastic";

/// Number of oscillators the divergence detector scans.
pub const OSCILLATOR_COUNT: u32 = 3;

/// Floors below which no divergence is accepted. Config may only raise them.
pub const DIVERGENCE_MIN_PERIOD_FLOOR: usize = 10;
pub const DIVERGENCE_MIN_ANGLE_FLOOR: Decimal = dec!(5);

// ---------------------------------------------------------------------------
// Retracement ladder
// ---------------------------------------------------------------------------

/// Canonical ratio ladder, retracements then extensions.
pub const FIB_RATIOS: [Decimal; 11] = [
    dec!(0),
    dec!(0.236),
    dec!(0.382),
    dec!(0.5),
    dec!(0.618),
    dec!(0.786),
    dec!(1),
    dec!(1.272),
    dec!(1.618),
    dec!(2),
    dec!(2.618),
];

pub const GOLDEN_RATIO: Decimal = dec!(0.618);
pub const PSYCHOLOGICAL_HALF: Decimal = dec!(0.5);

// ---------------------------------------------------------------------------
// Default risk values
// ---------------------------------------------------------------------------

pub const DEFAULT_KELLY_FRACTION: Decimal = dec!(0.25);
pub const DEFAULT_MAX_RISK_PER_TRADE: Decimal = dec!(0.02);
pub const DEFAULT_MAX_PORTFOLIO_RISK: Decimal = dec!(0.06);
pub const DEFAULT_MAX_DRAWDOWN: Decimal = dec!(0.15);
pub const DEFAULT_TRADE_HISTORY_CAPACITY: usize = 100;
pub const DEFAULT_REGIME_HISTORY_CAPACITY: usize = 100;

/// Round-trip transaction cost as a percentage of notional.
pub const DEFAULT_TRANSACTION_COST_PCT: Decimal = dec!(0.1);
