//! Exit rules: independent risk-management strategies evaluated against one
//! open position.
//!
//! Every rule implements [`ExitRule`] and is stateless: anything that changes
//! between calls (trailing peak, bars held, equity, signal categories) arrives
//! through [`ExitContext`]. Two calls with the same arguments return the same
//! [`ExitSignal`].
//!
//! ## Concrete implementations
//!
//! - [`FixedStopLoss`]: exit when the loss reaches a fixed percentage
//! - [`FixedTakeProfit`]: exit when the gain reaches a fixed percentage
//! - [`TrailingStop`]: trail a percentage behind the peak once activated
//! - [`EquityTarget`]: portfolio-wide kill switch on account growth
//! - [`TimeLimit`]: exit after N bars in the trade
//! - [`Breakeven`]: flatten small residual losses
//! - [`VolatilityStop`]: ATR-derived stop below/above entry
//! - [`SignalReversal`]: exit when the entry signal flips against the side

pub mod breakeven;
pub mod equity_target;
pub mod signal;
pub mod signal_reversal;
pub mod stop_loss;
pub mod take_profit;
pub mod time_limit;
pub mod trailing;
pub mod volatility;

pub use breakeven::Breakeven;
pub use equity_target::EquityTarget;
pub use signal::{ExitSignal, ExitType};
pub use signal_reversal::SignalReversal;
pub use stop_loss::FixedStopLoss;
pub use take_profit::FixedTakeProfit;
pub use time_limit::TimeLimit;
pub use trailing::{PeakTracker, TrailingStop};
pub use volatility::{AtrAssessment, AtrLevels, LadderLevel, VolatilityStop};

use std::fmt;

use crate::domain::{Bar, PositionSide, TradeSignal};

/// Signed percentage profit/loss relative to entry.
///
/// long: (current - entry) / entry * 100; short: (entry - current) / entry * 100.
/// A non-positive entry yields 0 rather than an error.
pub fn pnl_pct(entry_price: f64, current_price: f64, side: PositionSide) -> f64 {
    if entry_price <= 0.0 {
        return 0.0;
    }
    match side {
        PositionSide::Long => (current_price - entry_price) / entry_price * 100.0,
        PositionSide::Short => (entry_price - current_price) / entry_price * 100.0,
    }
}

/// Everything a rule may need besides entry/current price and side.
///
/// Built by the caller (usually the position ledger) for each evaluation.
/// Absent values mean "not supplied"; rules that need them degrade to a
/// non-triggered signal.
#[derive(Debug, Clone, Default)]
pub struct ExitContext<'a> {
    pub position_id: Option<&'a str>,
    pub bars_held: usize,
    /// Highest (long) or lowest (short) price seen. Authoritative when present.
    pub trailing_peak: Option<f64>,
    pub initial_equity: Option<f64>,
    pub current_equity: Option<f64>,
    /// OHLC window for the ATR stop, oldest first.
    pub history: &'a [Bar],
    pub entry_signal: Option<TradeSignal>,
    pub current_signal: Option<TradeSignal>,
}

impl<'a> ExitContext<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_position_id(mut self, id: &'a str) -> Self {
        self.position_id = Some(id);
        self
    }

    pub fn with_bars_held(mut self, bars_held: usize) -> Self {
        self.bars_held = bars_held;
        self
    }

    pub fn with_peak(mut self, peak: f64) -> Self {
        self.trailing_peak = Some(peak);
        self
    }

    pub fn with_equity(mut self, initial: f64, current: f64) -> Self {
        self.initial_equity = Some(initial);
        self.current_equity = Some(current);
        self
    }

    pub fn with_history(mut self, history: &'a [Bar]) -> Self {
        self.history = history;
        self
    }

    pub fn with_signals(mut self, entry: TradeSignal, current: TradeSignal) -> Self {
        self.entry_signal = Some(entry);
        self.current_signal = Some(current);
        self
    }

    pub fn has_equity(&self) -> bool {
        self.initial_equity.is_some() && self.current_equity.is_some()
    }

    pub fn has_signals(&self) -> bool {
        self.entry_signal.is_some() && self.current_signal.is_some()
    }
}

/// A rule could not produce a verdict at all.
///
/// Invalid-but-finite inputs (zero or negative prices) are not errors: rules
/// answer those with a non-triggered signal and an explanatory reason.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuleError {
    #[error("{rule}: non-finite {field} ({value})")]
    NonFinite {
        rule: ExitType,
        field: &'static str,
        value: f64,
    },
}

/// Fail with [`RuleError::NonFinite`] if `value` is NaN or infinite.
pub(crate) fn ensure_finite(rule: ExitType, field: &'static str, value: f64) -> Result<(), RuleError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(RuleError::NonFinite { rule, field, value })
    }
}

/// Finite-check both prices, then return a reason string if either is non-positive.
pub(crate) fn check_prices(
    rule: ExitType,
    entry_price: f64,
    current_price: f64,
) -> Result<Option<String>, RuleError> {
    ensure_finite(rule, "entry_price", entry_price)?;
    ensure_finite(rule, "current_price", current_price)?;
    if entry_price <= 0.0 || current_price <= 0.0 {
        return Ok(Some(format!(
            "Invalid prices: entry={entry_price}, current={current_price}"
        )));
    }
    Ok(None)
}

/// Trait for exit rules.
///
/// # Contract
/// - Pure: no interior mutability, no I/O. Identical inputs give identical signals.
/// - Never signals an exit on bad input: invalid values produce a
///   non-triggered signal, non-finite values produce [`RuleError`].
pub trait ExitRule: Send + Sync + fmt::Debug {
    /// Which rule kind this is; also the name used by the factory and audit trail.
    fn exit_type(&self) -> ExitType;

    fn name(&self) -> &'static str {
        self.exit_type().as_str()
    }

    /// Evaluate the rule for one position at the current price.
    fn evaluate(
        &self,
        entry_price: f64,
        current_price: f64,
        side: PositionSide,
        ctx: &ExitContext<'_>,
    ) -> Result<ExitSignal, RuleError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pnl_long_profit_and_loss() {
        assert!((pnl_pct(100.0, 101.0, PositionSide::Long) - 1.0).abs() < 1e-9);
        assert!((pnl_pct(100.0, 99.0, PositionSide::Long) + 1.0).abs() < 1e-9);
    }

    #[test]
    fn pnl_short_profit_and_loss() {
        assert!((pnl_pct(100.0, 99.0, PositionSide::Short) - 1.0).abs() < 1e-9);
        assert!((pnl_pct(100.0, 101.0, PositionSide::Short) + 1.0).abs() < 1e-9);
    }

    #[test]
    fn pnl_degenerate_entry_is_zero() {
        assert_eq!(pnl_pct(0.0, 1.25, PositionSide::Long), 0.0);
        assert_eq!(pnl_pct(-1.0, 1.25, PositionSide::Short), 0.0);
    }

    #[test]
    fn check_prices_flags_non_positive() {
        let reason = check_prices(ExitType::StopLoss, 0.0, 1.0).unwrap();
        assert!(reason.unwrap().contains("Invalid prices"));
        assert!(check_prices(ExitType::StopLoss, 1.0, 1.0).unwrap().is_none());
    }

    #[test]
    fn check_prices_rejects_nan() {
        let err = check_prices(ExitType::TakeProfit, 1.0, f64::NAN).unwrap_err();
        assert!(matches!(
            err,
            RuleError::NonFinite {
                field: "current_price",
                ..
            }
        ));
    }

    #[test]
    fn context_builder_sets_fields() {
        let ctx = ExitContext::new()
            .with_position_id("pos1")
            .with_bars_held(7)
            .with_peak(1.3)
            .with_equity(10_000.0, 10_100.0)
            .with_signals(TradeSignal::Buy, TradeSignal::Hold);
        assert_eq!(ctx.position_id, Some("pos1"));
        assert_eq!(ctx.bars_held, 7);
        assert_eq!(ctx.trailing_peak, Some(1.3));
        assert!(ctx.has_equity());
        assert!(ctx.has_signals());
        assert!(ctx.history.is_empty());
    }
}
