//! Fixed-percentage stop loss.
//!
//! Triggers when pnl_pct <= -T.
//! For longs: exit price = entry * (1 - T/100).
//! For shorts: exit price = entry * (1 + T/100).

use crate::domain::PositionSide;

use super::{check_prices, pnl_pct, ExitContext, ExitRule, ExitSignal, ExitType, RuleError};

#[derive(Debug, Clone)]
pub struct FixedStopLoss {
    /// Loss threshold in percent (e.g., 1.0 for 1%).
    pub stop_loss_percent: f64,
}

impl FixedStopLoss {
    pub fn new(stop_loss_percent: f64) -> Self {
        assert!(
            stop_loss_percent.is_finite() && stop_loss_percent > 0.0,
            "stop_loss_percent must be positive"
        );
        Self { stop_loss_percent }
    }

    /// Price at which the stop sits for a position entered at `entry_price`.
    pub fn stop_price(&self, entry_price: f64, side: PositionSide) -> f64 {
        match side {
            PositionSide::Long => entry_price * (1.0 - self.stop_loss_percent / 100.0),
            PositionSide::Short => entry_price * (1.0 + self.stop_loss_percent / 100.0),
        }
    }
}

impl ExitRule for FixedStopLoss {
    fn exit_type(&self) -> ExitType {
        ExitType::StopLoss
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
        let threshold = self.stop_loss_percent;
        if pnl <= -threshold {
            Ok(ExitSignal::trigger(
                self.exit_type(),
                Some(self.stop_price(entry_price, side)),
                format!("Stop loss hit: pnl {pnl:.3}% <= -{threshold}%"),
            ))
        } else {
            Ok(ExitSignal::hold(
                self.exit_type(),
                format!("Stop loss not hit: pnl {pnl:.3}% > -{threshold}%"),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(rule: &FixedStopLoss, entry: f64, current: f64, side: PositionSide) -> ExitSignal {
        rule.evaluate(entry, current, side, &ExitContext::new()).unwrap()
    }

    #[test]
    fn not_triggered_long() {
        let rule = FixedStopLoss::new(1.0);
        let s = eval(&rule, 1.2500, 1.2450, PositionSide::Long); // -0.4%
        assert!(!s.is_triggered());
        assert_eq!(s.exit_type(), ExitType::StopLoss);
        assert_eq!(s.confidence(), 0.0);
    }

    #[test]
    fn triggered_long() {
        let rule = FixedStopLoss::new(1.0);
        let s = eval(&rule, 1.2500, 1.2313, PositionSide::Long); // -1.496%
        assert!(s.is_triggered());
        assert_eq!(s.confidence(), 1.0);
        assert!((s.exit_price().unwrap() - 1.2375).abs() < 1e-9);
        assert!(s.reason().contains("1%"));
        assert!(s.reason().contains("-1.496"));
    }

    #[test]
    fn triggered_short() {
        let rule = FixedStopLoss::new(1.0);
        let s = eval(&rule, 1.2500, 1.2650, PositionSide::Short); // -1.2%
        assert!(s.is_triggered());
        assert!((s.exit_price().unwrap() - 1.2625).abs() < 1e-9);
    }

    #[test]
    fn not_triggered_short_in_profit() {
        let rule = FixedStopLoss::new(1.0);
        let s = eval(&rule, 1.2500, 1.2400, PositionSide::Short);
        assert!(!s.is_triggered());
    }

    #[test]
    fn triggers_exactly_at_threshold() {
        let rule = FixedStopLoss::new(1.0);
        let s = eval(&rule, 100.0, 99.0, PositionSide::Long);
        assert!(s.is_triggered());
    }

    #[test]
    fn invalid_prices_do_not_trigger() {
        let rule = FixedStopLoss::new(1.0);
        let s = eval(&rule, 0.0, 1.0, PositionSide::Long);
        assert!(!s.is_triggered());
        assert!(s.reason().contains("Invalid"));
    }

    #[test]
    fn nan_price_is_an_error() {
        let rule = FixedStopLoss::new(1.0);
        let err = rule
            .evaluate(1.25, f64::NAN, PositionSide::Long, &ExitContext::new())
            .unwrap_err();
        assert!(err.to_string().contains("stop_loss"));
    }

    #[test]
    #[should_panic(expected = "stop_loss_percent must be positive")]
    fn rejects_zero_threshold() {
        FixedStopLoss::new(0.0);
    }
}
