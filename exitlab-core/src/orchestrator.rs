//! Exit orchestrator: runs the configured rules against one position in a
//! fixed priority order and folds their verdicts into one action.
//!
//! Order:
//!
//! | # | Rule            | Kind        | Action on trigger              |
//! |---|-----------------|-------------|--------------------------------|
//! | 1 | stop loss       | exclusive   | close all                      |
//! | 2 | take profit     | exclusive   | close all                      |
//! | 3 | trailing stop   | exclusive   | close all (if enabled)         |
//! | 4 | signal reversal | exclusive   | close all (if signals given)   |
//! | 5 | time limit      | accumulates | close partial                  |
//! | 6 | equity target   | accumulates | close all (if equity given)    |
//! | 7 | ATR stop        | accumulates | close all if still undecided   |
//! | 8 | breakeven       | accumulates | close all if still undecided   |
//!
//! An exclusive trigger ends the pass. The result always lists every signal
//! produced, in evaluation order.

use std::ops::ControlFlow;

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, RiskConfig};
use crate::domain::PositionSide;
use crate::exits::{
    AtrLevels, Breakeven, EquityTarget, ExitContext, ExitRule, ExitSignal, ExitType,
    FixedStopLoss, FixedTakeProfit, PeakTracker, RuleError, SignalReversal, TimeLimit,
    TrailingStop, VolatilityStop,
};

/// What the caller should do with the position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    Hold,
    ClosePartial,
    CloseAll,
}

impl RecommendedAction {
    pub fn as_str(self) -> &'static str {
        match self {
            RecommendedAction::Hold => "hold",
            RecommendedAction::ClosePartial => "close_partial",
            RecommendedAction::CloseAll => "close_all",
        }
    }
}

impl std::fmt::Display for RecommendedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one orchestrator pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub should_exit: bool,
    /// First rule that triggered, if any.
    pub primary_exit: Option<ExitType>,
    pub recommended_action: RecommendedAction,
    /// Every signal produced during the pass, in evaluation order.
    pub exits: Vec<ExitSignal>,
    /// ATR stop/target levels when the ATR stop ran successfully.
    pub atr_levels: Option<AtrLevels>,
}

impl EvaluationResult {
    fn empty() -> Self {
        Self {
            should_exit: false,
            primary_exit: None,
            recommended_action: RecommendedAction::Hold,
            exits: Vec::new(),
            atr_levels: None,
        }
    }

    pub fn triggered(&self) -> impl Iterator<Item = &ExitSignal> {
        self.exits.iter().filter(|s| s.is_triggered())
    }

    /// Signal of the primary exit.
    pub fn primary_signal(&self) -> Option<&ExitSignal> {
        let primary = self.primary_exit?;
        self.triggered().find(|s| s.exit_type() == primary)
    }

    pub fn signal(&self, exit_type: ExitType) -> Option<&ExitSignal> {
        self.exits.iter().find(|s| s.exit_type() == exit_type)
    }

    /// Share of the position to close: 100 for close-all, the partial
    /// signal's percent for close-partial, 0 for hold.
    pub fn close_percent(&self) -> f64 {
        match self.recommended_action {
            RecommendedAction::Hold => 0.0,
            RecommendedAction::CloseAll => 100.0,
            RecommendedAction::ClosePartial => self
                .triggered()
                .find(|s| s.close_percent() < 100.0)
                .map_or(100.0, |s| s.close_percent()),
        }
    }
}

/// How a trigger affects the running decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Effect {
    /// Close all and stop the pass.
    Exclusive,
    /// Close partially unless something stronger already decided.
    Partial,
    /// Close all, continue the pass.
    CloseAll,
    /// Close all only if nothing decided yet.
    Fallback,
}

/// Evaluates the rule set built from one [`RiskConfig`].
#[derive(Debug, Clone)]
pub struct ExitOrchestrator {
    config: RiskConfig,
    stop_loss: FixedStopLoss,
    take_profit: FixedTakeProfit,
    trailing: Option<TrailingStop>,
    reversal: SignalReversal,
    time_limit: TimeLimit,
    equity_target: EquityTarget,
    volatility: Option<VolatilityStop>,
    breakeven: Option<Breakeven>,
}

impl ExitOrchestrator {
    /// Build the rule set. Fails if the config does not validate.
    pub fn from_config(config: RiskConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    /// Construct the rules from an already validated config.
    fn build(config: RiskConfig) -> Self {
        Self {
            stop_loss: FixedStopLoss::new(config.stop_loss_percent),
            take_profit: FixedTakeProfit::new(config.take_profit_percent),
            trailing: config.trailing_stop.then(|| {
                TrailingStop::new(
                    config.trailing_stop_percent,
                    config.trailing_activation_percent,
                )
            }),
            reversal: SignalReversal::new(),
            time_limit: TimeLimit::with_close_percent(
                config.max_hold_bars,
                config.time_exit_close_percent,
            ),
            equity_target: EquityTarget::new(config.equity_target_percent),
            volatility: config
                .atr_stop
                .then(|| VolatilityStop::new(config.atr_period, config.atr_multiplier)),
            breakeven: config.breakeven_spread.map(Breakeven::new),
            config,
        }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn trailing(&self) -> Option<&TrailingStop> {
        self.trailing.as_ref()
    }

    pub fn volatility(&self) -> Option<&VolatilityStop> {
        self.volatility.as_ref()
    }

    /// Run the priority pass for one position.
    pub fn evaluate(
        &self,
        entry_price: f64,
        current_price: f64,
        side: PositionSide,
        ctx: &ExitContext<'_>,
    ) -> EvaluationResult {
        let mut result = EvaluationResult::empty();
        // The pass only breaks on an exclusive trigger; the payload is unused.
        let _ = self.run_pass(&mut result, entry_price, current_price, side, ctx);

        tracing::debug!(
            position_id = ctx.position_id.unwrap_or("-"),
            action = %result.recommended_action,
            primary = ?result.primary_exit,
            rules = result.exits.len(),
            "exit evaluation"
        );
        result
    }

    /// Like [`evaluate`](Self::evaluate), with `tracker` standing in for the
    /// trailing peak when `ctx` carries none.
    pub fn evaluate_tracked(
        &self,
        tracker: &mut PeakTracker,
        position_id: &str,
        entry_price: f64,
        current_price: f64,
        side: PositionSide,
        ctx: &ExitContext<'_>,
    ) -> EvaluationResult {
        let peak = match &self.trailing {
            Some(trailing) => {
                trailing.resolve_peak(tracker, position_id, entry_price, current_price, side, ctx)
            }
            None => ctx.trailing_peak,
        };
        let ctx = ExitContext {
            position_id: Some(position_id),
            trailing_peak: peak,
            ..ctx.clone()
        };
        self.evaluate(entry_price, current_price, side, &ctx)
    }

    fn run_pass(
        &self,
        result: &mut EvaluationResult,
        entry_price: f64,
        current_price: f64,
        side: PositionSide,
        ctx: &ExitContext<'_>,
    ) -> ControlFlow<()> {
        let eval = |rule: &dyn ExitRule| rule.evaluate(entry_price, current_price, side, ctx);

        apply(result, ExitType::StopLoss, eval(&self.stop_loss), Effect::Exclusive, ctx)?;
        apply(result, ExitType::TakeProfit, eval(&self.take_profit), Effect::Exclusive, ctx)?;
        if let Some(trailing) = &self.trailing {
            apply(result, ExitType::TrailingStop, eval(trailing), Effect::Exclusive, ctx)?;
        }
        if ctx.has_signals() {
            apply(result, ExitType::SignalReversal, eval(&self.reversal), Effect::Exclusive, ctx)?;
        }

        apply(result, ExitType::TimeBased, eval(&self.time_limit), Effect::Partial, ctx)?;
        if ctx.has_equity() {
            apply(result, ExitType::EquityTarget, eval(&self.equity_target), Effect::CloseAll, ctx)?;
        }
        if let Some(volatility) = self.volatility.as_ref().filter(|_| !ctx.history.is_empty()) {
            let outcome = volatility
                .assess(entry_price, current_price, side, ctx)
                .map(|assessment| {
                    result.atr_levels = assessment.levels;
                    assessment.signal
                });
            apply(result, ExitType::AtrBased, outcome, Effect::Fallback, ctx)?;
        }
        if let Some(breakeven) = &self.breakeven {
            apply(result, ExitType::Breakeven, eval(breakeven), Effect::Fallback, ctx)?;
        }
        ControlFlow::Continue(())
    }
}

impl Default for ExitOrchestrator {
    fn default() -> Self {
        Self::build(RiskConfig::default())
    }
}

/// Record one rule's outcome and fold it into the decision.
fn apply(
    result: &mut EvaluationResult,
    rule: ExitType,
    outcome: Result<ExitSignal, RuleError>,
    effect: Effect,
    ctx: &ExitContext<'_>,
) -> ControlFlow<()> {
    let signal = match outcome {
        Ok(signal) => signal,
        Err(e) => {
            tracing::error!(
                rule = %rule,
                error = %e,
                position_id = ctx.position_id.unwrap_or("-"),
                "exit rule failed"
            );
            ExitSignal::hold(rule, format!("Rule failed: {e}"))
        }
    };
    let triggered = signal.is_triggered();
    result.exits.push(signal);
    if !triggered {
        return ControlFlow::Continue(());
    }

    result.should_exit = true;
    result.primary_exit.get_or_insert(rule);
    let undecided = result.recommended_action == RecommendedAction::Hold;
    match effect {
        Effect::Exclusive => {
            result.recommended_action = RecommendedAction::CloseAll;
            return ControlFlow::Break(());
        }
        Effect::Partial if undecided => {
            result.recommended_action = RecommendedAction::ClosePartial;
        }
        Effect::CloseAll => result.recommended_action = RecommendedAction::CloseAll,
        Effect::Fallback if undecided => {
            result.recommended_action = RecommendedAction::CloseAll;
        }
        Effect::Partial | Effect::Fallback => {}
    }
    ControlFlow::Continue(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TradeSignal;

    fn orchestrator(config: RiskConfig) -> ExitOrchestrator {
        ExitOrchestrator::from_config(config).unwrap()
    }

    fn base_config() -> RiskConfig {
        RiskConfig {
            stop_loss_percent: 1.0,
            take_profit_percent: 2.0,
            ..RiskConfig::default()
        }
    }

    fn types(result: &EvaluationResult) -> Vec<ExitType> {
        result.exits.iter().map(|s| s.exit_type()).collect()
    }

    #[test]
    fn quiet_market_holds() {
        let orch = orchestrator(base_config());
        let r = orch.evaluate(1.2500, 1.2510, PositionSide::Long, &ExitContext::new());
        assert!(!r.should_exit);
        assert_eq!(r.primary_exit, None);
        assert_eq!(r.recommended_action, RecommendedAction::Hold);
        assert_eq!(r.close_percent(), 0.0);
        // Only the unconditional rules run without optional inputs.
        assert_eq!(
            types(&r),
            vec![ExitType::StopLoss, ExitType::TakeProfit, ExitType::TimeBased]
        );
    }

    #[test]
    fn stop_loss_short_circuits() {
        let orch = orchestrator(base_config());
        let ctx = ExitContext::new().with_signals(TradeSignal::Buy, TradeSignal::Sell);
        let r = orch.evaluate(1.2500, 1.2370, PositionSide::Long, &ctx);
        assert!(r.should_exit);
        assert_eq!(r.primary_exit, Some(ExitType::StopLoss));
        assert_eq!(r.recommended_action, RecommendedAction::CloseAll);
        assert_eq!(r.exits.len(), 1);
    }

    #[test]
    fn reversal_runs_after_price_rules() {
        let orch = orchestrator(base_config());
        let ctx = ExitContext::new().with_signals(TradeSignal::Buy, TradeSignal::Sell);
        let r = orch.evaluate(1.2500, 1.2490, PositionSide::Long, &ctx);
        assert_eq!(r.primary_exit, Some(ExitType::SignalReversal));
        assert_eq!(
            types(&r),
            vec![ExitType::StopLoss, ExitType::TakeProfit, ExitType::SignalReversal]
        );
    }

    #[test]
    fn time_limit_is_partial_and_accumulates() {
        let orch = orchestrator(base_config());
        let ctx = ExitContext::new()
            .with_bars_held(100)
            .with_equity(10_000.0, 10_100.0);
        let r = orch.evaluate(1.2500, 1.2510, PositionSide::Long, &ctx);
        assert!(r.should_exit);
        assert_eq!(r.primary_exit, Some(ExitType::TimeBased));
        assert_eq!(r.recommended_action, RecommendedAction::ClosePartial);
        assert_eq!(r.close_percent(), 50.0);
        assert_eq!(r.exits.last().map(|s| s.exit_type()), Some(ExitType::EquityTarget));
    }

    #[test]
    fn equity_target_upgrades_partial_to_close_all() {
        let orch = orchestrator(base_config());
        let ctx = ExitContext::new()
            .with_bars_held(150)
            .with_equity(10_000.0, 10_500.0);
        let r = orch.evaluate(1.2500, 1.2510, PositionSide::Long, &ctx);
        assert_eq!(r.primary_exit, Some(ExitType::TimeBased));
        assert_eq!(r.recommended_action, RecommendedAction::CloseAll);
        assert_eq!(r.triggered().count(), 2);
    }

    #[test]
    fn breakeven_does_not_override_partial() {
        let config = RiskConfig {
            breakeven_spread: Some(0.001),
            atr_stop: false,
            ..base_config()
        };
        let orch = orchestrator(config);
        let ctx = ExitContext::new().with_bars_held(100);
        let r = orch.evaluate(100.0, 99.95, PositionSide::Long, &ctx);
        assert_eq!(r.recommended_action, RecommendedAction::ClosePartial);
        assert!(r.signal(ExitType::Breakeven).unwrap().is_triggered());
    }

    #[test]
    fn breakeven_closes_when_undecided() {
        let config = RiskConfig {
            breakeven_spread: Some(0.001),
            ..base_config()
        };
        let orch = orchestrator(config);
        let r = orch.evaluate(100.0, 99.95, PositionSide::Long, &ExitContext::new());
        assert_eq!(r.primary_exit, Some(ExitType::Breakeven));
        assert_eq!(r.recommended_action, RecommendedAction::CloseAll);
    }

    #[test]
    fn trailing_disabled_is_skipped() {
        let orch = orchestrator(base_config());
        let ctx = ExitContext::new().with_peak(1.2750);
        let r = orch.evaluate(1.2500, 1.2686, PositionSide::Long, &ctx);
        assert!(r.signal(ExitType::TrailingStop).is_none());
    }

    #[test]
    fn rule_error_is_recorded_and_pass_continues() {
        let orch = orchestrator(base_config());
        let ctx = ExitContext::new().with_bars_held(100);
        let r = orch.evaluate(1.25, f64::NAN, PositionSide::Long, &ctx);
        let sl = r.signal(ExitType::StopLoss).unwrap();
        assert!(!sl.is_triggered());
        assert!(sl.reason().starts_with("Rule failed"));
        // Time limit does not look at prices and still fires.
        assert_eq!(r.primary_exit, Some(ExitType::TimeBased));
    }

    #[test]
    fn default_matches_default_config() {
        let orch = ExitOrchestrator::default();
        assert_eq!(orch.config(), &RiskConfig::default());
        assert!(orch.trailing().is_none());
        assert!(orch.volatility().is_some());
        let built = orchestrator(RiskConfig::default());
        let ctx = ExitContext::new().with_bars_held(100);
        for price in [1.2300, 1.2500, 1.2800] {
            let a = orch.evaluate(1.2500, price, PositionSide::Long, &ctx);
            let b = built.evaluate(1.2500, price, PositionSide::Long, &ctx);
            assert_eq!(a.primary_exit, b.primary_exit, "price {price}");
            assert_eq!(a.recommended_action, b.recommended_action, "price {price}");
        }
    }

    #[test]
    fn from_config_rejects_invalid() {
        let config = RiskConfig {
            stop_loss_percent: 0.0,
            ..RiskConfig::default()
        };
        assert!(ExitOrchestrator::from_config(config).is_err());
    }

    #[test]
    fn tracked_evaluation_uses_peak_tracker() {
        let config = RiskConfig {
            trailing_stop: true,
            trailing_stop_percent: 0.5,
            trailing_activation_percent: 0.0,
            take_profit_percent: 10.0,
            ..base_config()
        };
        let orch = orchestrator(config);
        let mut tracker = PeakTracker::new();
        let ctx = ExitContext::new();
        for price in [1.2500, 1.2700, 1.2650] {
            let r = orch.evaluate_tracked(&mut tracker, "pos1", 1.2500, price, PositionSide::Long, &ctx);
            assert!(!r.should_exit, "price {price}");
        }
        // 1.27 * 0.995 = 1.26365
        let r = orch.evaluate_tracked(&mut tracker, "pos1", 1.2500, 1.2630, PositionSide::Long, &ctx);
        assert_eq!(r.primary_exit, Some(ExitType::TrailingStop));
    }
}
