//! Trailing stop with an activation threshold.
//!
//! For longs: stop = peak * (1 - trail/100), exit when current <= stop.
//! For shorts: stop = trough * (1 + trail/100), exit when current >= stop.
//!
//! The rule holds no state. The peak comes from the caller (normally the
//! position ledger). Callers without their own extreme tracking can keep a
//! [`PeakTracker`] and go through [`TrailingStop::evaluate_tracked`].

use std::collections::HashMap;

use crate::domain::PositionSide;

use super::{
    check_prices, ensure_finite, pnl_pct, ExitContext, ExitRule, ExitSignal, ExitType, RuleError,
};

/// Confidence reported once the stop is armed but not yet hit.
const ARMED_CONFIDENCE: f64 = 0.5;

#[derive(Debug, Clone)]
pub struct TrailingStop {
    /// Trail distance in percent of the peak (e.g., 0.5 for 0.5%).
    pub trail_percent: f64,
    /// Minimum profit in percent before the stop arms. 0 = always armed.
    pub activation_percent: f64,
}

impl TrailingStop {
    pub fn new(trail_percent: f64, activation_percent: f64) -> Self {
        assert!(
            trail_percent > 0.0 && trail_percent < 100.0,
            "trail_percent must be in (0, 100)"
        );
        assert!(
            activation_percent.is_finite() && activation_percent >= 0.0,
            "activation_percent must be >= 0"
        );
        Self {
            trail_percent,
            activation_percent,
        }
    }

    pub fn stop_level(&self, peak: f64, side: PositionSide) -> f64 {
        match side {
            PositionSide::Long => peak * (1.0 - self.trail_percent / 100.0),
            PositionSide::Short => peak * (1.0 + self.trail_percent / 100.0),
        }
    }

    pub fn is_active(&self, entry_price: f64, current_price: f64, side: PositionSide) -> bool {
        pnl_pct(entry_price, current_price, side) >= self.activation_percent
    }

    /// Evaluate using `tracker` as the peak source when `ctx` carries no peak.
    ///
    /// A caller-supplied peak always wins and leaves the tracker untouched.
    /// The tracker is only advanced while the stop is active, so its peak
    /// starts at the first armed observation.
    pub fn evaluate_tracked(
        &self,
        tracker: &mut PeakTracker,
        position_id: &str,
        entry_price: f64,
        current_price: f64,
        side: PositionSide,
        ctx: &ExitContext<'_>,
    ) -> Result<ExitSignal, RuleError> {
        let peak = self.resolve_peak(tracker, position_id, entry_price, current_price, side, ctx);
        let ctx = ExitContext {
            trailing_peak: peak,
            ..ctx.clone()
        };
        self.evaluate(entry_price, current_price, side, &ctx)
    }

    /// Peak to feed into [`ExitRule::evaluate`]: the supplied one, else the
    /// tracker's (advanced with `current_price` if the stop is active).
    pub fn resolve_peak(
        &self,
        tracker: &mut PeakTracker,
        position_id: &str,
        entry_price: f64,
        current_price: f64,
        side: PositionSide,
        ctx: &ExitContext<'_>,
    ) -> Option<f64> {
        if ctx.trailing_peak.is_some() {
            return ctx.trailing_peak;
        }
        let usable = entry_price > 0.0 && current_price.is_finite() && current_price > 0.0;
        if usable && self.is_active(entry_price, current_price, side) {
            Some(tracker.observe(position_id, current_price, side))
        } else {
            tracker.get(position_id)
        }
    }
}

impl ExitRule for TrailingStop {
    fn exit_type(&self) -> ExitType {
        ExitType::TrailingStop
    }

    fn evaluate(
        &self,
        entry_price: f64,
        current_price: f64,
        side: PositionSide,
        ctx: &ExitContext<'_>,
    ) -> Result<ExitSignal, RuleError> {
        if let Some(reason) = check_prices(self.exit_type(), entry_price, current_price)? {
            return Ok(ExitSignal::hold(self.exit_type(), reason));
        }

        let pnl = pnl_pct(entry_price, current_price, side);
        if pnl < self.activation_percent {
            return Ok(ExitSignal::hold(
                self.exit_type(),
                format!(
                    "Trailing stop not active: pnl {pnl:.3}% < activation {}%",
                    self.activation_percent
                ),
            ));
        }

        let supplied = match ctx.trailing_peak {
            Some(p) => {
                ensure_finite(self.exit_type(), "trailing_peak", p)?;
                (p > 0.0).then_some(p)
            }
            None => None,
        };
        let peak = match (side, supplied) {
            (PositionSide::Long, Some(p)) => p.max(current_price),
            (PositionSide::Short, Some(p)) => p.min(current_price),
            (_, None) => current_price,
        };

        let stop = self.stop_level(peak, side);
        let hit = match side {
            PositionSide::Long => current_price <= stop,
            PositionSide::Short => current_price >= stop,
        };

        if hit {
            Ok(ExitSignal::trigger(
                self.exit_type(),
                Some(stop),
                format!(
                    "Trailing stop hit: price {current_price} crossed stop {stop:.6} ({}% from peak {peak})",
                    self.trail_percent
                ),
            ))
        } else {
            Ok(ExitSignal::hold(
                self.exit_type(),
                format!("Trailing stop active: stop {stop:.6}, peak {peak}, price {current_price}"),
            )
            .with_confidence(ARMED_CONFIDENCE))
        }
    }
}

/// Fallback per-position peak map for callers that do not track extremes.
///
/// Long positions keep the highest observed price, shorts the lowest.
#[derive(Debug, Clone, Default)]
pub struct PeakTracker {
    peaks: HashMap<String, f64>,
}

impl PeakTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold `price` into the position's peak and return the updated peak.
    pub fn observe(&mut self, position_id: &str, price: f64, side: PositionSide) -> f64 {
        let peak = self
            .peaks
            .entry(position_id.to_string())
            .or_insert(price);
        *peak = match side {
            PositionSide::Long => peak.max(price),
            PositionSide::Short => peak.min(price),
        };
        *peak
    }

    pub fn get(&self, position_id: &str) -> Option<f64> {
        self.peaks.get(position_id).copied()
    }

    pub fn contains(&self, position_id: &str) -> bool {
        self.peaks.contains_key(position_id)
    }

    /// Forget one position's peak.
    pub fn reset(&mut self, position_id: &str) {
        self.peaks.remove(position_id);
    }

    pub fn reset_all(&mut self) {
        self.peaks.clear();
    }

    pub fn len(&self) -> usize {
        self.peaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }
}
