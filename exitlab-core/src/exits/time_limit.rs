//! Time-in-trade limit.
//!
//! Triggers once the position has been held for `max_bars` bars. The signal
//! asks for a partial close (`close_percent`, 50% unless configured).

use crate::domain::PositionSide;

use super::{ExitContext, ExitRule, ExitSignal, ExitType, RuleError};

#[derive(Debug, Clone)]
pub struct TimeLimit {
    pub max_bars: usize,
    /// Share of the position to close when the limit is reached, in (0, 100].
    pub close_percent: f64,
}

impl TimeLimit {
    pub fn new(max_bars: usize) -> Self {
        Self::with_close_percent(max_bars, 50.0)
    }

    pub fn with_close_percent(max_bars: usize, close_percent: f64) -> Self {
        assert!(max_bars >= 1, "max_bars must be >= 1");
        assert!(
            close_percent > 0.0 && close_percent <= 100.0,
            "close_percent must be in (0, 100]"
        );
        Self {
            max_bars,
            close_percent,
        }
    }
}

impl ExitRule for TimeLimit {
    fn exit_type(&self) -> ExitType {
        ExitType::TimeBased
    }

    fn evaluate(
        &self,
        _entry_price: f64,
        _current_price: f64,
        _side: PositionSide,
        ctx: &ExitContext<'_>,
    ) -> Result<ExitSignal, RuleError> {
        let held = ctx.bars_held;
        if held >= self.max_bars {
            Ok(ExitSignal::trigger(
                self.exit_type(),
                None,
                format!("Max hold time reached: {held} bars >= {}", self.max_bars),
            )
            .with_close_percent(self.close_percent))
        } else {
            Ok(ExitSignal::hold(
                self.exit_type(),
                format!("Held {held} of {} bars", self.max_bars),
            ))
        }
    }
}
