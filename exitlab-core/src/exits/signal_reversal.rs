//! Signal-reversal exit: close when the signal that opened the position
//! flips against it (BUY to SELL for longs, SELL to BUY for shorts).

use crate::domain::PositionSide;

use super::{ensure_finite, ExitContext, ExitRule, ExitSignal, ExitType, RuleError};

#[derive(Debug, Clone, Default)]
pub struct SignalReversal;

impl SignalReversal {
    pub fn new() -> Self {
        Self
    }
}

impl ExitRule for SignalReversal {
    fn exit_type(&self) -> ExitType {
        ExitType::SignalReversal
    }

    fn evaluate(
        &self,
        _entry_price: f64,
        current_price: f64,
        side: PositionSide,
        ctx: &ExitContext<'_>,
    ) -> Result<ExitSignal, RuleError> {
        let (entry, current) = match (ctx.entry_signal, ctx.current_signal) {
            (Some(e), Some(c)) => (e, c),
            _ => {
                return Ok(ExitSignal::hold(
                    self.exit_type(),
                    "Missing signal data: entry and current signals are required",
                ))
            }
        };

        if entry == current {
            return Ok(ExitSignal::hold(
                self.exit_type(),
                format!("Signal unchanged: {entry}"),
            ));
        }

        if entry.reverses(current, side) {
            ensure_finite(self.exit_type(), "current_price", current_price)?;
            Ok(ExitSignal::trigger(
                self.exit_type(),
                Some(current_price),
                format!("Signal reversed: {entry} → {current}"),
            ))
        } else {
            Ok(ExitSignal::hold(
                self.exit_type(),
                format!("Position direction unchanged: {entry} → {current}"),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TradeSignal;

    fn eval(side: PositionSide, entry: TradeSignal, current: TradeSignal) -> ExitSignal {
        let ctx = ExitContext::new().with_signals(entry, current);
        SignalReversal.evaluate(1.25, 1.24, side, &ctx).unwrap()
    }

    #[test]
    fn long_buy_to_sell_triggers() {
        let s = eval(PositionSide::Long, TradeSignal::Buy, TradeSignal::Sell);
        assert!(s.is_triggered());
        assert_eq!(s.exit_price(), Some(1.24));
        assert_eq!(s.close_percent(), 100.0);
        assert!(s.reason().contains("BUY → SELL"));
    }

    #[test]
    fn short_sell_to_buy_triggers() {
        assert!(eval(PositionSide::Short, TradeSignal::Sell, TradeSignal::Buy).is_triggered());
    }

    #[test]
    fn hold_does_not_trigger() {
        let s = eval(PositionSide::Long, TradeSignal::Buy, TradeSignal::Hold);
        assert!(!s.is_triggered());
        assert_eq!(s.exit_price(), None);
    }

    #[test]
    fn unchanged_signal() {
        let s = eval(PositionSide::Long, TradeSignal::Buy, TradeSignal::Buy);
        assert!(!s.is_triggered());
        assert!(s.reason().contains("unchanged"));
    }

    #[test]
    fn wrong_side_does_not_trigger() {
        assert!(!eval(PositionSide::Short, TradeSignal::Buy, TradeSignal::Sell).is_triggered());
    }

    #[test]
    fn missing_signal() {
        let s = SignalReversal
            .evaluate(1.25, 1.24, PositionSide::Long, &ExitContext::new())
            .unwrap();
        assert!(!s.is_triggered());
        assert!(s.reason().contains("Missing"));
    }

    #[test]
    fn parsed_signals_are_case_insensitive() {
        let entry: TradeSignal = "buy".parse().unwrap();
        let current: TradeSignal = "SeLl".parse().unwrap();
        assert!(eval(PositionSide::Long, entry, current).is_triggered());
    }
}
