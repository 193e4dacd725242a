//! Volatility (ATR) stop and profit ladder.
//!
//! For longs: stop = entry - k*ATR, target = entry + 1.5k*ATR.
//! For shorts: stop = entry + k*ATR, target = entry - 1.5k*ATR.
//!
//! ATR is computed from the history window in [`ExitContext::history`]. Any
//! failure to compute it yields a non-triggered signal, never an exit.

use serde::{Deserialize, Serialize};

use crate::domain::{Bar, PositionSide};
use crate::indicators::{latest_atr, IndicatorError};

use super::{check_prices, pnl_pct, ExitContext, ExitRule, ExitSignal, ExitType, RuleError};

/// Target distance as a multiple of the stop distance.
const TARGET_RATIO: f64 = 1.5;

/// Number of rungs in the profit ladder.
const LADDER_STEPS: usize = 3;

/// Stop/target levels derived from the latest ATR.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AtrLevels {
    pub atr: f64,
    pub stop: f64,
    pub target: f64,
}

/// One take-profit rung of the ATR ladder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LadderLevel {
    /// 1-based rung number; the target sits `level` ATRs from entry.
    pub level: usize,
    pub target: f64,
    pub quantity: f64,
    pub pct_profit: f64,
}

/// Signal plus the levels it was computed from (absent on ATR failure).
#[derive(Debug, Clone)]
pub struct AtrAssessment {
    pub signal: ExitSignal,
    pub levels: Option<AtrLevels>,
}

#[derive(Debug, Clone)]
pub struct VolatilityStop {
    pub atr_period: usize,
    /// Stop distance in ATRs (k).
    pub multiplier: f64,
}

impl VolatilityStop {
    pub fn new(atr_period: usize, multiplier: f64) -> Self {
        assert!(atr_period >= 1, "atr_period must be >= 1");
        assert!(
            multiplier.is_finite() && multiplier > 0.0,
            "multiplier must be positive"
        );
        Self {
            atr_period,
            multiplier,
        }
    }

    pub fn levels(
        &self,
        history: &[Bar],
        entry_price: f64,
        side: PositionSide,
    ) -> Result<AtrLevels, IndicatorError> {
        let atr = latest_atr(history, self.atr_period)?;
        let stop_distance = self.multiplier * atr;
        let target_distance = TARGET_RATIO * stop_distance;
        let (stop, target) = match side {
            PositionSide::Long => (entry_price - stop_distance, entry_price + target_distance),
            PositionSide::Short => (entry_price + stop_distance, entry_price - target_distance),
        };
        Ok(AtrLevels { atr, stop, target })
    }

    /// Evaluate and keep the computed levels for reporting.
    pub fn assess(
        &self,
        entry_price: f64,
        current_price: f64,
        side: PositionSide,
        ctx: &ExitContext<'_>,
    ) -> Result<AtrAssessment, RuleError> {
        if let Some(reason) = check_prices(self.exit_type(), entry_price, current_price)? {
            return Ok(AtrAssessment {
                signal: ExitSignal::hold(self.exit_type(), reason),
                levels: None,
            });
        }

        let levels = match self.levels(ctx.history, entry_price, side) {
            Ok(levels) => levels,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    bars = ctx.history.len(),
                    period = self.atr_period,
                    position_id = ctx.position_id.unwrap_or("-"),
                    "ATR computation failed"
                );
                return Ok(AtrAssessment {
                    signal: ExitSignal::hold(
                        self.exit_type(),
                        format!("ATR stop unavailable: {e}"),
                    ),
                    levels: None,
                });
            }
        };

        let hit = match side {
            PositionSide::Long => current_price <= levels.stop,
            PositionSide::Short => current_price >= levels.stop,
        };
        let signal = if hit {
            ExitSignal::trigger(
                self.exit_type(),
                Some(levels.stop),
                format!(
                    "ATR stop hit: price {current_price} crossed {:.6} ({}x ATR {:.6})",
                    levels.stop, self.multiplier, levels.atr
                ),
            )
        } else {
            ExitSignal::hold(
                self.exit_type(),
                format!(
                    "ATR stop not hit: stop {:.6}, target {:.6}, price {current_price}",
                    levels.stop, levels.target
                ),
            )
        };
        Ok(AtrAssessment {
            signal,
            levels: Some(levels),
        })
    }

    /// Three take-profit rungs at 1, 2 and 3 ATRs from entry, each carrying a
    /// third of `size`. Empty when ATR cannot be computed.
    pub fn profit_ladder(
        &self,
        history: &[Bar],
        entry_price: f64,
        side: PositionSide,
        size: f64,
    ) -> Vec<LadderLevel> {
        let atr = match latest_atr(history, self.atr_period) {
            Ok(atr) => atr,
            Err(e) => {
                tracing::warn!(error = %e, "ATR profit ladder unavailable");
                return Vec::new();
            }
        };
        let quantity = size / LADDER_STEPS as f64;
        (1..=LADDER_STEPS)
            .map(|level| {
                let offset = level as f64 * atr;
                let target = match side {
                    PositionSide::Long => entry_price + offset,
                    PositionSide::Short => entry_price - offset,
                };
                LadderLevel {
                    level,
                    target,
                    quantity,
                    pct_profit: pnl_pct(entry_price, target, side),
                }
            })
            .collect()
    }
}

impl ExitRule for VolatilityStop {
    fn exit_type(&self) -> ExitType {
        ExitType::AtrBased
    }

    fn evaluate(
        &self,
        entry_price: f64,
        current_price: f64,
        side: PositionSide,
        ctx: &ExitContext<'_>,
    ) -> Result<ExitSignal, RuleError> {
        self.assess(entry_price, current_price, side, ctx)
            .map(|a| a.signal)
    }
}
