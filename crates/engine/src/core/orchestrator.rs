//! Per-cycle fusion of every analyzer into one trade decision.
//!
//! Pipeline:
//! 1. Fan out the four leaf analyzers in parallel, each isolated so a short
//!    window, an error or a panic becomes a sentinel instead of an abort.
//! 2. Collect the first-line readings (registered analyzers first, then
//!    precomputed outputs on the request) and run the signal combiner.
//! 3. Fuse the normalized module signals under the weight table.
//! 4. Regime filters, quality score, dip/peak override and the
//!    transaction-cost check.
//! 5. Protective levels and fractional-Kelly sizing.
//!
//! The orchestrator always returns a well-formed [`FusionResult`] for a
//! valid window; only malformed input is rejected.

use std::time::{SystemTime, UNIX_EPOCH};

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, info, info_span, warn};

use super::analyzer::{first_line_result, run_first_line, run_isolated, FirstLineAnalyzer, FirstLineRole};
use super::baseline::TechnicalBaseline;
use super::divergence_detector::DivergenceDetector;
use super::indicators;
use super::regime_detector::RegimeDetector;
use super::retracement_analyzer::RetracementAnalyzer;
use super::risk_sizer::{RiskSizer, SizingRequest};
use super::signal_combiner::{CombinerInputs, SignalCombiner};
use super::structure_analyzer::StructureAnalyzer;
use crate::config::validate::{check_section, validate_indicators, validate_orchestrator, validate_weights};
use crate::config::{FusionConfig, IndicatorParams, ModuleWeights, OrchestratorConfig};
use crate::constants::{
    CONFIDENCE_MAX, MODULE_CROSS_ASSET, MODULE_CURRENCY_RISK, MODULE_DIVERGENCE,
    MODULE_INSTRUMENT_TREND, MODULE_REGIME, MODULE_RETRACEMENT, MODULE_SIGNAL_COMBINER,
    MODULE_STRUCTURE, SCORE_MAX,
};
use crate::errors::EngineError;
use crate::types::{
    validate_candles, AnalysisRequest, Bias, CombinedSignal, CostCheck, DipPeakCheck,
    DivergenceAnalysis, DivergenceClass, FirstLineAnalysis, FusionResult, IndicatorSnapshot,
    ModuleOutput, ModuleReports, ModuleResult, PositionSize, RiskLevel, StrengthTier,
    TradeAction, TradeDirection, VolatilityRegime,
};

/// Weight of |fused score| in the confidence blend; confluence takes the rest.
const FUSED_CONFIDENCE_WEIGHT: Decimal = dec!(0.7);
const CONFLUENCE_CONFIDENCE_WEIGHT: Decimal = dec!(0.3);

// Quality score caps.
const QUALITY_CONFLUENCE: Decimal = dec!(30);
const QUALITY_STRENGTH: Decimal = dec!(25);
const QUALITY_REGIME: Decimal = dec!(20);
const QUALITY_CONSISTENCY: Decimal = dec!(10);

// Dip/peak criteria points, out of 100.
const DP_RSI: Decimal = dec!(25);
const DP_BAND: Decimal = dec!(20);
const DP_DIVERGENCE: Decimal = dec!(20);
const DP_LEVEL: Decimal = dec!(15);
const DP_VOLUME: Decimal = dec!(10);
const DP_PATTERN: Decimal = dec!(10);
const DP_LEVEL_PROXIMITY_PCT: Decimal = dec!(1);
const DP_VOLUME_RATIO: Decimal = dec!(1.5);
const DP_PATTERN_CONFIDENCE: Decimal = dec!(0.6);

/// Fallback RSI extremes when the regime module produced nothing.
const RSI_OVERSOLD: Decimal = dec!(30);
const RSI_OVERBOUGHT: Decimal = dec!(70);

const MODULE_COUNT: usize = 8;

/// One module's contribution to the fused score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModuleVote {
    pub module: &'static str,
    pub success: bool,
    pub direction: i8,
    /// Strength normalized to 0-1.
    pub strength: Decimal,
}

impl ModuleVote {
    fn of<T>(module: &'static str, result: &ModuleResult<T>) -> Self {
        Self {
            module,
            success: result.is_success(),
            direction: result.signal().direction(),
            strength: result.strength() / SCORE_MAX,
        }
    }
}

/// Weighted fusion over the successful modules.
#[derive(Debug, Clone, PartialEq)]
pub struct Fusion {
    /// In `[-1, 1]`.
    pub score: Decimal,
    /// In `[0, 1]`.
    pub confluence: Decimal,
    pub successful: usize,
    /// Mean normalized strength of the successful modules.
    pub avg_strength: Decimal,
}

pub fn module_votes(modules: &ModuleReports) -> [ModuleVote; MODULE_COUNT] {
    [
        ModuleVote::of(MODULE_INSTRUMENT_TREND, &modules.instrument_trend),
        ModuleVote::of(MODULE_CROSS_ASSET, &modules.cross_asset),
        ModuleVote::of(MODULE_CURRENCY_RISK, &modules.currency_risk),
        ModuleVote::of(MODULE_SIGNAL_COMBINER, &modules.signal_combiner),
        ModuleVote::of(MODULE_REGIME, &modules.regime),
        ModuleVote::of(MODULE_DIVERGENCE, &modules.divergence),
        ModuleVote::of(MODULE_STRUCTURE, &modules.structure),
        ModuleVote::of(MODULE_RETRACEMENT, &modules.retracement),
    ]
}

/// `Σ(direction × strength × weight) / Σweight` over modules that
/// succeeded, plus agreement on the dominant direction.
pub fn fuse(votes: &[ModuleVote], weights: &ModuleWeights) -> Fusion {
    let mut weighted = Decimal::ZERO;
    let mut total_weight = Decimal::ZERO;
    let successful: Vec<&ModuleVote> = votes.iter().filter(|v| v.success).collect();
    for v in &successful {
        let w = weights.get(v.module);
        weighted += Decimal::from(v.direction) * v.strength * w;
        total_weight += w;
    }
    let score = if total_weight > Decimal::ZERO {
        (weighted / total_weight).max(dec!(-1)).min(dec!(1))
    } else {
        Decimal::ZERO
    };

    let dominant = sign(score);
    let agreeing: Vec<Decimal> = successful
        .iter()
        .filter(|v| dominant != 0 && v.direction == dominant)
        .map(|v| v.strength)
        .collect();
    let confluence = if agreeing.is_empty() {
        Decimal::ZERO
    } else {
        let share = Decimal::from(agreeing.len()) / Decimal::from(successful.len());
        (share * indicators::mean(&agreeing)).min(dec!(1))
    };
    let strengths: Vec<Decimal> = successful.iter().map(|v| v.strength).collect();

    Fusion {
        score,
        confluence,
        successful: successful.len(),
        avg_strength: indicators::mean(&strengths),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Orchestrator
// ═══════════════════════════════════════════════════════════════════════════

pub struct Orchestrator {
    weights: ModuleWeights,
    config: OrchestratorConfig,
    indicator_params: IndicatorParams,
    regime: RegimeDetector,
    divergence: DivergenceDetector,
    structure: StructureAnalyzer,
    retracement: RetracementAnalyzer,
    combiner: SignalCombiner,
    risk: RiskSizer,
    first_line: Vec<(FirstLineRole, Box<dyn FirstLineAnalyzer>)>,
}

impl Orchestrator {
    pub fn new(config: &FusionConfig) -> Result<Self, EngineError> {
        check_section(&config.analyzers.indicators, validate_indicators)?;
        check_section(&config.fusion.weights, validate_weights)?;
        check_section(&config.fusion.orchestrator, validate_orchestrator)?;

        Ok(Self {
            weights: config.fusion.weights.clone(),
            config: config.fusion.orchestrator.clone(),
            indicator_params: config.analyzers.indicators.clone(),
            regime: RegimeDetector::new(config.analyzers.regime.clone())?,
            divergence: DivergenceDetector::new(config.analyzers.divergence.clone())?,
            structure: StructureAnalyzer::new(config.analyzers.structure.clone())?,
            retracement: RetracementAnalyzer::new(config.analyzers.retracement.clone())?,
            combiner: SignalCombiner::new(config.fusion.combiner.clone())?,
            risk: RiskSizer::new(config.risk.clone())?,
            first_line: Vec::new(),
        })
    }

    /// Attach an external analyzer to a first-line slot, replacing any
    /// analyzer already registered for that role.
    pub fn register(&mut self, role: FirstLineRole, analyzer: Box<dyn FirstLineAnalyzer>) {
        info!(role = role.module_name(), analyzer = analyzer.name(), "first-line analyzer registered");
        self.first_line.retain(|(r, _)| *r != role);
        self.first_line.push((role, analyzer));
    }

    pub fn regime_detector(&self) -> &RegimeDetector {
        &self.regime
    }

    pub fn risk_sizer(&self) -> &RiskSizer {
        &self.risk
    }

    pub fn risk_sizer_mut(&mut self) -> &mut RiskSizer {
        &mut self.risk
    }

    /// Candles the indicator snapshot needs before the combiner can run.
    pub fn snapshot_window(&self) -> usize {
        let p = &self.indicator_params;
        [
            (p.macd_slow + p.macd_signal) as usize,
            p.bb_period as usize,
            p.rsi_period as usize + 1,
            p.atr_period as usize + 1,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }

    // -----------------------------------------------------------------------
    // Cycle
    // -----------------------------------------------------------------------

    /// Run one analysis cycle.
    ///
    /// Fails only on malformed input (unordered or inconsistent candles,
    /// negative capital). Every module failure is absorbed into its sentinel.
    pub fn analyze(&mut self, request: &AnalysisRequest) -> Result<FusionResult, EngineError> {
        validate_candles(&request.candles)?;
        if request.capital < Decimal::ZERO {
            return Err(EngineError::invalid_input(format!(
                "capital {} is negative",
                request.capital
            )));
        }

        let span = info_span!(
            "cycle",
            symbol = %request.symbol,
            timeframe = request.timeframe.label(),
            candles = request.candles.len()
        );
        let _enter = span.enter();

        let candles = request.candles.as_slice();
        let ((regime, divergence), (structure, retracement)) = rayon::join(
            || {
                rayon::join(
                    || run_isolated(&self.regime, candles),
                    || run_isolated(&self.divergence, candles),
                )
            },
            || {
                rayon::join(
                    || run_isolated(&self.structure, candles),
                    || run_isolated(&self.retracement, candles),
                )
            },
        );

        let instrument_trend = self.first_line_reading(FirstLineRole::InstrumentTrend, request);
        let cross_asset = self.first_line_reading(FirstLineRole::CrossAsset, request);
        let currency_risk = self.first_line_reading(FirstLineRole::CurrencyRisk, request);

        let snapshot = indicators::compute_all(candles, &self.indicator_params);
        let signal_combiner = self.run_combiner(
            request,
            &snapshot,
            &instrument_trend,
            &cross_asset,
            &currency_risk,
            &divergence,
        );

        let modules = ModuleReports {
            instrument_trend,
            cross_asset,
            currency_risk,
            signal_combiner,
            regime,
            divergence,
            structure,
            retracement,
        };

        if let Some(analysis) = modules.regime.detail() {
            self.regime.record(analysis);
        }
        self.risk.update_capital(request.capital);

        Ok(self.decide(request, &snapshot, modules))
    }

    fn first_line_reading(&self, role: FirstLineRole, request: &AnalysisRequest) -> ModuleResult<FirstLineAnalysis> {
        if let Some((_, analyzer)) = self.first_line.iter().find(|(r, _)| *r == role) {
            return run_first_line(role, analyzer.as_ref(), &request.candles, &request.market_data);
        }
        let supplied = match role {
            FirstLineRole::InstrumentTrend => &request.first_line.instrument,
            FirstLineRole::CrossAsset => &request.first_line.cross_asset,
            FirstLineRole::CurrencyRisk => &request.first_line.currency_risk,
        };
        match supplied {
            Some(analysis) => first_line_result(analysis.clone()),
            None => {
                debug!(module = role.module_name(), "no first-line output available");
                ModuleResult::error("no output available")
            }
        }
    }

    fn run_combiner(
        &self,
        request: &AnalysisRequest,
        snapshot: &IndicatorSnapshot,
        instrument_trend: &ModuleResult<FirstLineAnalysis>,
        cross_asset: &ModuleResult<FirstLineAnalysis>,
        currency_risk: &ModuleResult<FirstLineAnalysis>,
        divergence: &ModuleResult<DivergenceAnalysis>,
    ) -> ModuleResult<CombinedSignal> {
        let required = self.snapshot_window();
        if request.candles.len() < required {
            warn!(
                module = MODULE_SIGNAL_COMBINER,
                required,
                available = request.candles.len(),
                "insufficient data"
            );
            return ModuleResult::InsufficientData {
                required,
                available: request.candles.len(),
            };
        }

        let baseline;
        let base = match instrument_trend.detail() {
            Some(analysis) => analysis,
            None => {
                baseline = TechnicalBaseline::from_snapshot(snapshot);
                debug!(signal = ?baseline.signal, "technical baseline stands in for instrument trend");
                &baseline
            }
        };

        let combined = self.combiner.combine(&CombinerInputs {
            base,
            snapshot,
            divergence: divergence.detail(),
            cross_asset: cross_asset.detail(),
            currency_risk: currency_risk.detail(),
            pattern: request.pattern.as_ref(),
            timeframe: request.timeframe,
        });
        ModuleResult::success(ModuleOutput::new(
            combined.signal.as_module_signal(),
            combined.confidence * SCORE_MAX,
            combined,
        ))
    }

    // -----------------------------------------------------------------------
    // Decision
    // -----------------------------------------------------------------------

    fn decide(&self, request: &AnalysisRequest, snapshot: &IndicatorSnapshot, modules: ModuleReports) -> FusionResult {
        let cfg = &self.config;
        let votes = module_votes(&modules);
        let fusion = fuse(&votes, &self.weights);

        let mut signal = if fusion.score >= cfg.signal_threshold {
            TradeAction::Buy
        } else if fusion.score <= -cfg.signal_threshold {
            TradeAction::Sell
        } else {
            TradeAction::Hold
        };
        let mut confidence = FUSED_CONFIDENCE_WEIGHT * fusion.score.abs()
            + CONFLUENCE_CONFIDENCE_WEIGHT * fusion.confluence;
        let mut notes = Vec::new();

        // Regime filters.
        if let Some(regime) = modules.regime.detail() {
            if regime.volatility.regime == VolatilityRegime::Extreme {
                confidence *= cfg.extreme_volatility_derate;
                notes.push("confidence de-rated for extreme volatility".to_string());
            }
            if regime.risk_level == RiskLevel::High && confidence < cfg.high_risk_min_confidence {
                signal = TradeAction::Hold;
                notes.push("high regime risk without enough confidence".to_string());
            }
            if regime.volatility.squeeze_potential && confidence < cfg.squeeze_min_confidence {
                signal = TradeAction::Hold;
                notes.push("volatility squeeze active".to_string());
            }
            if fusion.score.abs() < regime.adaptive.signal_threshold {
                confidence *= cfg.below_threshold_derate;
            }
        }

        let quality_score = quality_score(&fusion, &votes, &modules, signal);

        let dip_peak = self.dip_peak_check(request, snapshot, &modules);
        if let Some(forced) = dip_peak.applied {
            signal = forced;
            confidence = (confidence * cfg.dip_peak_boost).min(CONFIDENCE_MAX);
            notes.push(format!("{} override from dip/peak check", forced.as_str()));
        }

        let cost_check = self.cost_check(snapshot.atr_pct);
        if signal != TradeAction::Hold && !cost_check.viable {
            confidence *= dec!(1) - cost_check.penalty;
            if confidence < cfg.cost_hold_confidence {
                signal = TradeAction::Hold;
                notes.push("expected move does not cover transaction costs".to_string());
            }
        }
        let confidence = confidence.max(Decimal::ZERO).min(CONFIDENCE_MAX);

        let levels = self.protective_levels(signal, snapshot, &modules);
        let position = match levels {
            Some((stop_loss, _)) => {
                let size_multiplier = modules
                    .regime
                    .detail()
                    .map(|r| r.adaptive.position_size_multiplier)
                    .unwrap_or(dec!(1))
                    * self.risk.volatility_multiplier(snapshot.atr_pct);
                self.risk.size_position(&SizingRequest {
                    capital: request.capital,
                    entry_price: snapshot.price,
                    stop_loss,
                    confidence,
                    size_multiplier,
                    lot_size: cfg.lot_size,
                    lot_step: cfg.lot_step,
                })
            }
            None => PositionSize::zero("no trade signal"),
        };
        let risk_reward = levels.map(|(stop, tp)| RiskSizer::risk_reward(snapshot.price, stop, tp).round_dp(2));

        let summary = summary(request, signal, confidence, &fusion, &notes);
        let recommendations = recommendations(signal, &modules, &dip_peak, &cost_check, &position, risk_reward);

        info!(
            signal = signal.as_str(),
            confidence = %confidence.round_dp(4),
            fused = %fusion.score.round_dp(4),
            confluence = %fusion.confluence.round_dp(4),
            quality = %quality_score,
            modules_ok = fusion.successful,
            "cycle complete"
        );

        FusionResult {
            symbol: request.symbol.clone(),
            timeframe: request.timeframe,
            signal,
            confidence,
            strength_tier: StrengthTier::from_confidence(confidence),
            fused_score: fusion.score,
            confluence: fusion.confluence,
            quality_score,
            modules,
            dip_peak,
            cost_check,
            stop_loss: levels.map(|(stop, _)| stop),
            take_profit: levels.map(|(_, tp)| tp),
            risk_reward,
            position,
            summary,
            recommendations,
            generated_at: now_millis(),
        }
    }

    // -----------------------------------------------------------------------
    // Dip / peak
    // -----------------------------------------------------------------------

    /// Independent six-criterion reversal check; forces BUY or SELL when one
    /// side reaches the threshold and outscores the other.
    pub fn dip_peak_check(&self, request: &AnalysisRequest, ind: &IndicatorSnapshot, modules: &ModuleReports) -> DipPeakCheck {
        let (oversold, overbought) = modules
            .regime
            .detail()
            .map(|r| (r.adaptive.rsi_oversold, r.adaptive.rsi_overbought))
            .unwrap_or((RSI_OVERSOLD, RSI_OVERBOUGHT));
        let mut criteria = Vec::new();
        let price = ind.price;
        let banded = ind.bb_upper > ind.bb_lower;
        let volume_spike = ind.volume_20_avg > Decimal::ZERO && ind.volume >= ind.volume_20_avg * DP_VOLUME_RATIO;
        let dominant = modules
            .divergence
            .detail()
            .and_then(|d| d.dominant.as_ref())
            .filter(|d| !d.invalidated);
        let (supports, resistances) = key_levels(modules);

        let mut dip = Decimal::ZERO;
        if ind.rsi_14 < oversold {
            dip += DP_RSI;
            criteria.push(format!("dip: RSI {} below {}", ind.rsi_14.round_dp(1), oversold));
        }
        if banded && price <= ind.bb_lower {
            dip += DP_BAND;
            criteria.push("dip: lower band touch".to_string());
        }
        if dominant.is_some_and(|d| d.kind.bias() == Bias::Bullish) {
            dip += DP_DIVERGENCE;
            criteria.push("dip: bullish divergence".to_string());
        }
        if supports.iter().any(|&s| within_pct(price - s, price, DP_LEVEL_PROXIMITY_PCT)) {
            dip += DP_LEVEL;
            criteria.push("dip: support nearby".to_string());
        }
        if volume_spike && ind.rsi_14 < dec!(50) {
            dip += DP_VOLUME;
            criteria.push("dip: volume spike".to_string());
        }
        if request
            .pattern
            .as_ref()
            .is_some_and(|p| p.bias == Bias::Bullish && p.confidence >= DP_PATTERN_CONFIDENCE)
        {
            dip += DP_PATTERN;
            criteria.push("dip: bullish pattern".to_string());
        }

        let mut peak = Decimal::ZERO;
        if ind.rsi_14 > overbought {
            peak += DP_RSI;
            criteria.push(format!("peak: RSI {} above {}", ind.rsi_14.round_dp(1), overbought));
        }
        if banded && price >= ind.bb_upper {
            peak += DP_BAND;
            criteria.push("peak: upper band touch".to_string());
        }
        if dominant.is_some_and(|d| d.kind.bias() == Bias::Bearish) {
            peak += DP_DIVERGENCE;
            criteria.push("peak: bearish divergence".to_string());
        }
        if resistances.iter().any(|&r| within_pct(r - price, price, DP_LEVEL_PROXIMITY_PCT)) {
            peak += DP_LEVEL;
            criteria.push("peak: resistance nearby".to_string());
        }
        if volume_spike && ind.rsi_14 > dec!(50) {
            peak += DP_VOLUME;
            criteria.push("peak: volume spike".to_string());
        }
        if request
            .pattern
            .as_ref()
            .is_some_and(|p| p.bias == Bias::Bearish && p.confidence >= DP_PATTERN_CONFIDENCE)
        {
            peak += DP_PATTERN;
            criteria.push("peak: bearish pattern".to_string());
        }

        let threshold = self.config.dip_peak_threshold;
        let applied = if dip >= threshold && dip > peak {
            Some(TradeAction::Buy)
        } else if peak >= threshold && peak > dip {
            Some(TradeAction::Sell)
        } else {
            None
        };
        if applied.is_some() {
            debug!(dip = %dip, peak = %peak, applied = ?applied, "dip/peak override");
        }

        DipPeakCheck {
            dip_score: dip,
            peak_score: peak,
            applied,
            criteria,
        }
    }

    // -----------------------------------------------------------------------
    // Costs and levels
    // -----------------------------------------------------------------------

    /// The expected move (half the ATR percentage) must cover twice the
    /// round-trip cost; the shortfall scales a confidence penalty.
    pub fn cost_check(&self, atr_pct: Decimal) -> CostCheck {
        let expected_move_pct = atr_pct / dec!(2);
        let round_trip_cost_pct = self.config.transaction_cost_pct;
        let required = round_trip_cost_pct * dec!(2);
        let (viable, penalty) = if required.is_zero() || expected_move_pct >= required {
            (true, Decimal::ZERO)
        } else {
            let shortfall = dec!(1) - expected_move_pct / required;
            (false, (shortfall * self.config.max_cost_penalty).round_dp(4))
        };
        CostCheck {
            expected_move_pct,
            round_trip_cost_pct,
            viable,
            penalty,
        }
    }

    /// ATR-based stop and target, refined onto nearby structure and
    /// retracement levels. `None` for HOLD or a degenerate window.
    fn protective_levels(&self, signal: TradeAction, ind: &IndicatorSnapshot, modules: &ModuleReports) -> Option<(Decimal, Decimal)> {
        let direction = match signal {
            TradeAction::Buy => TradeDirection::Long,
            TradeAction::Sell => TradeDirection::Short,
            TradeAction::Hold => return None,
        };
        let price = ind.price;
        if price <= Decimal::ZERO || ind.atr_14 <= Decimal::ZERO {
            return None;
        }
        let cfg = &self.config;
        let (stop_mult, tp_mult) = modules
            .regime
            .detail()
            .map(|r| (r.adaptive.stop_loss_multiplier, r.adaptive.take_profit_multiplier))
            .unwrap_or((cfg.stop_atr_multiplier, cfg.take_profit_atr_multiplier));
        let default_stop = RiskSizer::default_stop_loss(price, ind.atr_14, stop_mult, direction);
        let default_tp = RiskSizer::default_take_profit(price, ind.atr_14, tp_mult, direction);

        let long = direction == TradeDirection::Long;
        let mut stop_candidates = Vec::new();
        let mut tp_candidates = Vec::new();
        if let Some(s) = modules.structure.detail() {
            for block in s.order_blocks.iter().filter(|b| !b.broken) {
                match (block.kind, long) {
                    (Bias::Bullish, true) => stop_candidates.push(block.low),
                    (Bias::Bearish, true) => tp_candidates.push(block.low),
                    (Bias::Bearish, false) => stop_candidates.push(block.high),
                    (Bias::Bullish, false) => tp_candidates.push(block.high),
                    _ => {}
                }
            }
            tp_candidates.extend(s.target);
        }
        if let Some(r) = modules.retracement.detail() {
            stop_candidates.extend(r.stop);
            tp_candidates.extend(r.target);
        }

        let stop_side = |c: Decimal| if long { c < price } else { c > price };
        let tp_side = |c: Decimal| if long { c > price } else { c < price };
        let mut stop = refine_level(default_stop, &stop_candidates, stop_side, cfg.level_refine_pct);
        let take_profit = refine_level(default_tp, &tp_candidates, tp_side, cfg.level_refine_pct);

        let high_currency_risk = modules
            .currency_risk
            .detail()
            .is_some_and(|c| c.risk_level == Some(RiskLevel::High));
        if high_currency_risk {
            stop = price - (price - stop) * cfg.high_currency_risk_tightening;
        }

        Some((stop, take_profit))
    }
}

/// Snap `default` onto the closest candidate that sits on the right side of
/// price and within `max_pct` percent of `default`.
pub fn refine_level(
    default: Decimal,
    candidates: &[Decimal],
    on_side: impl Fn(Decimal) -> bool,
    max_pct: Decimal,
) -> Decimal {
    if default <= Decimal::ZERO {
        return default;
    }
    candidates
        .iter()
        .copied()
        .filter(|&c| on_side(c))
        .filter(|&c| (c - default).abs() / default * dec!(100) <= max_pct)
        .min_by_key(|&c| (c - default).abs())
        .unwrap_or(default)
}

/// Support and resistance candidates from the structure module and the
/// instrument-trend collaborator.
fn key_levels(modules: &ModuleReports) -> (Vec<Decimal>, Vec<Decimal>) {
    let mut supports = Vec::new();
    let mut resistances = Vec::new();
    if let Some(s) = modules.structure.detail() {
        supports.extend(s.market_structure.swing_lows.iter().map(|p| p.price));
        resistances.extend(s.market_structure.swing_highs.iter().map(|p| p.price));
    }
    if let Some(t) = modules.instrument_trend.detail() {
        supports.extend(t.support);
        resistances.extend(t.resistance);
    }
    (supports, resistances)
}

fn quality_score(fusion: &Fusion, votes: &[ModuleVote], modules: &ModuleReports, signal: TradeAction) -> Decimal {
    let mut quality = fusion.confluence * QUALITY_CONFLUENCE + fusion.avg_strength * QUALITY_STRENGTH;

    if let Some(regime) = modules.regime.detail() {
        quality += regime.overall_score / SCORE_MAX * QUALITY_REGIME;
    }

    if let Some(d) = modules
        .divergence
        .detail()
        .and_then(|d| d.dominant.as_ref())
        .filter(|d| !d.invalidated)
    {
        quality += match d.class {
            DivergenceClass::A => dec!(15),
            DivergenceClass::B => dec!(10),
            DivergenceClass::C => dec!(5),
        };
    }

    let dir = signal.direction();
    if dir != 0 {
        let directional: Vec<&ModuleVote> = votes.iter().filter(|v| v.success && v.direction != 0).collect();
        if !directional.is_empty() {
            let agreeing = directional.iter().filter(|v| v.direction == dir).count();
            quality += Decimal::from(agreeing) / Decimal::from(directional.len()) * QUALITY_CONSISTENCY;
        }
    }

    quality.max(Decimal::ZERO).min(SCORE_MAX).round_dp(2)
}

fn summary(request: &AnalysisRequest, signal: TradeAction, confidence: Decimal, fusion: &Fusion, notes: &[String]) -> String {
    if fusion.successful == 0 {
        return format!(
            "HOLD {} {}: no module produced a usable reading from {} candles",
            request.symbol,
            request.timeframe.label(),
            request.candles.len()
        );
    }
    let mut text = format!(
        "{} {} {}: confidence {}%, fused score {}, confluence {}%, {}/{} modules reporting",
        signal.as_str(),
        request.symbol,
        request.timeframe.label(),
        (confidence * dec!(100)).round_dp(1),
        fusion.score.round_dp(3),
        (fusion.confluence * dec!(100)).round_dp(1),
        fusion.successful,
        MODULE_COUNT
    );
    if !notes.is_empty() {
        text.push_str(" (");
        text.push_str(&notes.join("; "));
        text.push(')');
    }
    text
}

fn recommendations(
    signal: TradeAction,
    modules: &ModuleReports,
    dip_peak: &DipPeakCheck,
    cost: &CostCheck,
    position: &PositionSize,
    risk_reward: Option<Decimal>,
) -> Vec<String> {
    let mut out = Vec::new();

    if let Some(regime) = modules.regime.detail() {
        match regime.volatility.regime {
            VolatilityRegime::Extreme => out.push("Extreme volatility: reduce size or stand aside".to_string()),
            VolatilityRegime::High => out.push("High volatility: widen stops and reduce size".to_string()),
            _ => {}
        }
        if regime.volatility.squeeze_potential {
            out.push("Volatility squeeze: prepare for a breakout".to_string());
        }
        if regime.transition.early_warning {
            out.push(format!(
                "Regime change likely ({}% probability)",
                regime.transition.probability.round_dp(0)
            ));
        }
    }

    if let Some(d) = modules.divergence.detail().and_then(|d| d.dominant.as_ref()) {
        if !d.invalidated {
            out.push(format!(
                "{:?} divergence on {} (class {:?}, {}% success probability)",
                d.kind,
                d.indicator,
                d.class,
                (d.success_probability * dec!(100)).round_dp(0)
            ));
        }
    }

    if let Some(action) = dip_peak.applied {
        let label = if action == TradeAction::Buy { "Dip" } else { "Peak" };
        out.push(format!("{label} opportunity: {} criteria met", dip_peak.criteria.len()));
    }

    if !cost.viable {
        out.push(format!(
            "Expected move {}% is thin against {}% round-trip cost",
            cost.expected_move_pct.round_dp(3),
            cost.round_trip_cost_pct
        ));
    }

    if signal == TradeAction::Hold {
        out.push("No trade: wait for stronger agreement across modules".to_string());
    } else {
        if let Some(rr) = risk_reward {
            if rr < dec!(1.5) {
                out.push(format!("Risk/reward {rr} is below 1.5"));
            }
        }
        if let Some(reason) = &position.refused_reason {
            out.push(format!("Sizing: {reason}"));
        }
    }

    out
}

fn within_pct(gap: Decimal, price: Decimal, max_pct: Decimal) -> bool {
    price > Decimal::ZERO && gap >= Decimal::ZERO && gap / price * dec!(100) <= max_pct
}

fn sign(v: Decimal) -> i8 {
    if v > Decimal::ZERO {
        1
    } else if v < Decimal::ZERO {
        -1
    } else {
        0
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
