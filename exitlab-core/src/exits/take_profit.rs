//! Fixed-percentage take profit.
//!
//! Triggers when pnl_pct >= T.
//! For longs: exit price = entry * (1 + T/100).
//! For shorts: exit price = entry * (1 - T/100).

use crate::domain::PositionSide;

use super::{check_prices, pnl_pct, ExitContext, ExitRule, ExitSignal, ExitType, RuleError};

#[derive(Debug, Clone)]
pub struct FixedTakeProfit {
    /// Profit threshold in percent (e.g., 2.0 for 2%).
    pub take_profit_percent: f64,
}

impl FixedTakeProfit {
    pub fn new(take_profit_percent: f64) -> Self {
        assert!(
            take_profit_percent.is_finite() && take_profit_percent > 0.0,
            "take_profit_percent must be positive"
        );
        Self {
            take_profit_percent,
        }
    }

    pub fn target_price(&self, entry_price: f64, side: PositionSide) -> f64 {
        match side {
            PositionSide::Long => entry_price * (1.0 + self.take_profit_percent / 100.0),
            PositionSide::Short => entry_price * (1.0 - self.take_profit_percent / 100.0),
        }
    }
}

impl ExitRule for FixedTakeProfit {
    fn exit_type(&self) -> ExitType {
        ExitType::TakeProfit
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
        let threshold = self.take_profit_percent;
        if pnl >= threshold {
            Ok(ExitSignal::trigger(
                self.exit_type(),
                Some(self.target_price(entry_price, side)),
                format!("Take profit hit: pnl {pnl:.3}% >= {threshold}%"),
            ))
        } else {
            Ok(ExitSignal::hold(
                self.exit_type(),
                format!("Take profit not reached: pnl {pnl:.3}% < {threshold}%"),
            ))
        }
    }
}
