//! Account-equity target: a portfolio-wide kill switch.
//!
//! Triggers when account growth since the start reaches `target_percent`,
//! regardless of the individual position's pnl.

use crate::domain::PositionSide;

use super::{ensure_finite, ExitContext, ExitRule, ExitSignal, ExitType, RuleError};

#[derive(Debug, Clone)]
pub struct EquityTarget {
    /// Required account growth in percent (e.g., 5.0 for 5%).
    pub target_percent: f64,
}

impl EquityTarget {
    pub fn new(target_percent: f64) -> Self {
        assert!(
            target_percent.is_finite() && target_percent > 0.0,
            "target_percent must be positive"
        );
        Self { target_percent }
    }

    /// Percentage growth from `initial` to `current`.
    pub fn growth_pct(initial: f64, current: f64) -> f64 {
        (current - initial) / initial * 100.0
    }
}

impl ExitRule for EquityTarget {
    fn exit_type(&self) -> ExitType {
        ExitType::EquityTarget
    }

    fn evaluate(
        &self,
        _entry_price: f64,
        _current_price: f64,
        _side: PositionSide,
        ctx: &ExitContext<'_>,
    ) -> Result<ExitSignal, RuleError> {
        let (initial, current) = match (ctx.initial_equity, ctx.current_equity) {
            (Some(i), Some(c)) => (i, c),
            _ => {
                return Ok(ExitSignal::hold(
                    self.exit_type(),
                    "Invalid equity: initial and current equity are required",
                ))
            }
        };
        ensure_finite(self.exit_type(), "initial_equity", initial)?;
        ensure_finite(self.exit_type(), "current_equity", current)?;
        if initial <= 0.0 || current <= 0.0 {
            return Ok(ExitSignal::hold(
                self.exit_type(),
                format!("Invalid equity: initial={initial}, current={current}"),
            ));
        }

        let growth = Self::growth_pct(initial, current);
        if growth >= self.target_percent {
            Ok(ExitSignal::trigger(
                self.exit_type(),
                None,
                format!(
                    "Equity target reached: growth {growth:.3}% >= {}%",
                    self.target_percent
                ),
            )
            .with_close_percent(100.0))
        } else {
            Ok(ExitSignal::hold(
                self.exit_type(),
                format!(
                    "Equity target not reached: growth {growth:.3}% < {}%",
                    self.target_percent
                ),
            ))
        }
    }
}
