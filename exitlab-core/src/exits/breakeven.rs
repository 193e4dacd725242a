//! Breakeven exit: flatten a losing position that has drifted back to
//! within `spread` (fraction of entry) of the entry price.

use crate::domain::PositionSide;

use super::{check_prices, pnl_pct, ExitContext, ExitRule, ExitSignal, ExitType, RuleError};

#[derive(Debug, Clone)]
pub struct Breakeven {
    /// Allowed distance from entry as a fraction of entry (0.001 = 0.1%).
    pub spread: f64,
}

impl Breakeven {
    pub fn new(spread: f64) -> Self {
        assert!(
            spread.is_finite() && spread > 0.0,
            "spread must be positive"
        );
        Self { spread }
    }
}

impl ExitRule for Breakeven {
    fn exit_type(&self) -> ExitType {
        ExitType::Breakeven
    }

    fn evaluate(
        &self,
        entry_price: f64,
        current_price: f64,
        side: PositionSide,
        _ctx: &ExitContext<'_>,
    ) -> Result<ExitSignal, RuleError> {
        if let Some(reason) = check_prices(self.exit_type(), entry_price, current_price)? {
            return Ok(ExitSignal::hold(self.exit_type(), reason));
        }

        let pnl = pnl_pct(entry_price, current_price, side);
        if pnl >= 0.0 {
            return Ok(ExitSignal::hold(
                self.exit_type(),
                format!("Breakeven not applicable: pnl {pnl:.3}% is not a loss"),
            ));
        }

        let distance = (current_price - entry_price).abs();
        let band = entry_price * self.spread;
        if distance <= band {
            Ok(ExitSignal::trigger(
                self.exit_type(),
                Some(current_price),
                format!("Breakeven exit: price {current_price} within {band:.6} of entry {entry_price}"),
            ))
        } else {
            Ok(ExitSignal::hold(
                self.exit_type(),
                format!("Breakeven not reached: distance {distance:.6} > {band:.6}"),
            ))
        }
    }
}
