//! Position ledger: per-position tracking state between evaluations.
//!
//! The ledger owns every mutable piece of exit state (entry, bar counter,
//! high/low extremes). The orchestrator and rules stay pure; the ledger
//! turns its records into an [`ExitContext`] for each evaluation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{Bar, PositionSide, TradeSignal};
use crate::exits::{pnl_pct, ExitContext};
use crate::orchestrator::{EvaluationResult, ExitOrchestrator};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LedgerError {
    #[error("position {0} is not tracked")]
    Untracked(String),
    #[error("invalid price for position {id}: {price}")]
    InvalidPrice { id: String, price: f64 },
}

fn valid_price(price: f64) -> bool {
    price.is_finite() && price > 0.0
}

/// Parameters for opening a tracked position.
#[derive(Debug, Clone)]
pub struct NewPosition {
    pub id: String,
    pub entry_price: f64,
    pub side: PositionSide,
    pub entry_bar: usize,
    pub entry_signal: Option<TradeSignal>,
}

impl NewPosition {
    pub fn new(id: impl Into<String>, entry_price: f64, side: PositionSide) -> Self {
        Self {
            id: id.into(),
            entry_price,
            side,
            entry_bar: 0,
            entry_signal: None,
        }
    }

    pub fn at_bar(mut self, entry_bar: usize) -> Self {
        self.entry_bar = entry_bar;
        self
    }

    pub fn with_entry_signal(mut self, signal: TradeSignal) -> Self {
        self.entry_signal = Some(signal);
        self
    }
}

/// One open position as seen by the exit engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedPosition {
    id: String,
    entry_price: f64,
    side: PositionSide,
    entry_bar: usize,
    current_bar: usize,
    max_price_seen: f64,
    min_price_seen: f64,
    last_price: f64,
    entry_signal: Option<TradeSignal>,
}

impl TrackedPosition {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn entry_price(&self) -> f64 {
        self.entry_price
    }

    pub fn side(&self) -> PositionSide {
        self.side
    }

    pub fn entry_bar(&self) -> usize {
        self.entry_bar
    }

    pub fn current_bar(&self) -> usize {
        self.current_bar
    }

    pub fn bars_held(&self) -> usize {
        self.current_bar.saturating_sub(self.entry_bar)
    }

    pub fn max_price_seen(&self) -> f64 {
        self.max_price_seen
    }

    pub fn min_price_seen(&self) -> f64 {
        self.min_price_seen
    }

    pub fn last_price(&self) -> f64 {
        self.last_price
    }

    pub fn entry_signal(&self) -> Option<TradeSignal> {
        self.entry_signal
    }

    /// Favourable extreme: the high for longs, the low for shorts.
    pub fn trailing_peak(&self) -> f64 {
        match self.side {
            PositionSide::Long => self.max_price_seen,
            PositionSide::Short => self.min_price_seen,
        }
    }

    fn observe(&mut self, high: f64, low: f64) {
        self.max_price_seen = self.max_price_seen.max(high);
        self.min_price_seen = self.min_price_seen.min(low);
    }

    /// Bar time only moves forward.
    fn set_bar(&mut self, bar: Option<usize>) {
        if let Some(bar) = bar {
            self.current_bar = self.current_bar.max(bar);
        }
    }
}

/// Market inputs for one evaluation that the ledger does not track itself.
#[derive(Debug, Clone, Default)]
pub struct MarketSnapshot<'a> {
    pub current_price: f64,
    pub history: &'a [Bar],
    pub initial_equity: Option<f64>,
    pub current_equity: Option<f64>,
    pub current_signal: Option<TradeSignal>,
}

impl<'a> MarketSnapshot<'a> {
    pub fn at_price(current_price: f64) -> Self {
        Self {
            current_price,
            ..Self::default()
        }
    }

    pub fn with_history(mut self, history: &'a [Bar]) -> Self {
        self.history = history;
        self
    }

    pub fn with_equity(mut self, initial: f64, current: f64) -> Self {
        self.initial_equity = Some(initial);
        self.current_equity = Some(current);
        self
    }

    pub fn with_signal(mut self, signal: TradeSignal) -> Self {
        self.current_signal = Some(signal);
        self
    }
}

/// Profit summary for one tracked position, in price units and percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionProfit {
    pub pnl: f64,
    pub pnl_pct: f64,
    pub is_profitable: bool,
    pub bars_held: usize,
    /// Best excursion since tracking began (>= 0 unless reset).
    pub max_favorable: f64,
    /// Worst excursion since tracking began (<= 0 unless reset).
    pub max_adverse: f64,
}

#[derive(Debug, Clone, Default)]
pub struct PositionLedger {
    positions: BTreeMap<String, TrackedPosition>,
}

impl PositionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin tracking a position. Re-using a live id replaces the old record.
    pub fn start_tracking(&mut self, position: NewPosition) -> Result<&TrackedPosition, LedgerError> {
        if !valid_price(position.entry_price) {
            return Err(LedgerError::InvalidPrice {
                id: position.id,
                price: position.entry_price,
            });
        }
        let id = position.id.clone();
        let record = TrackedPosition {
            id: position.id,
            entry_price: position.entry_price,
            side: position.side,
            entry_bar: position.entry_bar,
            current_bar: position.entry_bar,
            max_price_seen: position.entry_price,
            min_price_seen: position.entry_price,
            last_price: position.entry_price,
            entry_signal: position.entry_signal,
        };
        if self.positions.insert(id.clone(), record).is_some() {
            tracing::warn!(position_id = %id, "replaced tracked position");
        }
        self.get(&id)
    }

    /// Fold a new price (and optionally the current bar number) into the record.
    pub fn update(
        &mut self,
        id: &str,
        price: f64,
        bar: Option<usize>,
    ) -> Result<&TrackedPosition, LedgerError> {
        let position = self.get_mut(id)?;
        if !valid_price(price) {
            return Err(LedgerError::InvalidPrice {
                id: id.to_string(),
                price,
            });
        }
        position.observe(price, price);
        position.last_price = price;
        position.set_bar(bar);
        Ok(&*position)
    }

    /// Fold a full candle: high/low into the extremes, close as the last price.
    pub fn update_bar(
        &mut self,
        id: &str,
        bar: &Bar,
        bar_index: usize,
    ) -> Result<&TrackedPosition, LedgerError> {
        let position = self.get_mut(id)?;
        if !bar.is_sane() {
            return Err(LedgerError::InvalidPrice {
                id: id.to_string(),
                price: bar.close,
            });
        }
        position.observe(bar.high, bar.low);
        position.last_price = bar.close;
        position.set_bar(Some(bar_index));
        Ok(&*position)
    }

    /// Restart extreme tracking from the last observed price.
    pub fn reset_extremes(&mut self, id: &str) -> Result<(), LedgerError> {
        let position = self.get_mut(id)?;
        position.max_price_seen = position.last_price;
        position.min_price_seen = position.last_price;
        Ok(())
    }

    pub fn stop_tracking(&mut self, id: &str) -> Result<TrackedPosition, LedgerError> {
        self.positions
            .remove(id)
            .ok_or_else(|| LedgerError::Untracked(id.to_string()))
    }

    pub fn get(&self, id: &str) -> Result<&TrackedPosition, LedgerError> {
        self.positions
            .get(id)
            .ok_or_else(|| LedgerError::Untracked(id.to_string()))
    }

    fn get_mut(&mut self, id: &str) -> Result<&mut TrackedPosition, LedgerError> {
        self.positions
            .get_mut(id)
            .ok_or_else(|| LedgerError::Untracked(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.positions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Tracked ids in sorted order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.positions.keys().map(String::as_str)
    }

    /// Context for evaluating `id` against `snapshot`.
    pub fn context<'a>(
        &'a self,
        id: &str,
        snapshot: &MarketSnapshot<'a>,
    ) -> Result<ExitContext<'a>, LedgerError> {
        let position = self.get(id)?;
        Ok(ExitContext {
            position_id: Some(position.id()),
            bars_held: position.bars_held(),
            trailing_peak: Some(position.trailing_peak()),
            initial_equity: snapshot.initial_equity,
            current_equity: snapshot.current_equity,
            history: snapshot.history,
            entry_signal: position.entry_signal,
            current_signal: snapshot.current_signal,
        })
    }

    /// Run the orchestrator for a tracked position. Does not mutate the ledger.
    pub fn evaluate_exit(
        &self,
        id: &str,
        orchestrator: &ExitOrchestrator,
        snapshot: &MarketSnapshot<'_>,
    ) -> Result<EvaluationResult, LedgerError> {
        let position = self.get(id)?;
        let ctx = self.context(id, snapshot)?;
        Ok(orchestrator.evaluate(
            position.entry_price,
            snapshot.current_price,
            position.side,
            &ctx,
        ))
    }

    pub fn position_profit(&self, id: &str, current_price: f64) -> Result<PositionProfit, LedgerError> {
        let position = self.get(id)?;
        if !valid_price(current_price) {
            return Err(LedgerError::InvalidPrice {
                id: id.to_string(),
                price: current_price,
            });
        }
        let entry = position.entry_price;
        let (pnl, max_favorable, max_adverse) = match position.side {
            PositionSide::Long => (
                current_price - entry,
                position.max_price_seen - entry,
                position.min_price_seen - entry,
            ),
            PositionSide::Short => (
                entry - current_price,
                entry - position.min_price_seen,
                entry - position.max_price_seen,
            ),
        };
        Ok(PositionProfit {
            pnl,
            pnl_pct: pnl_pct(entry, current_price, position.side),
            is_profitable: pnl > 0.0,
            bars_held: position.bars_held(),
            max_favorable,
            max_adverse,
        })
    }
}

/// Lower and upper limits for a sized volume.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumeBounds {
    pub min: f64,
    pub max: f64,
}

impl Default for VolumeBounds {
    fn default() -> Self {
        Self { min: 0.01, max: 1.0 }
    }
}

/// Volume that risks `risk_pct` of `equity` if the stop is hit.
///
/// `equity * risk_pct / 100 / |entry - stop|`, clamped to `bounds`. A zero
/// stop distance or any invalid input yields `bounds.min`.
pub fn risk_sized_volume(
    equity: f64,
    entry_price: f64,
    stop_price: f64,
    risk_pct: f64,
    bounds: VolumeBounds,
) -> f64 {
    let distance = (entry_price - stop_price).abs();
    let inputs_ok = [equity, entry_price, stop_price, risk_pct]
        .iter()
        .all(|v| v.is_finite() && *v > 0.0);
    if !inputs_ok || distance == 0.0 {
        return bounds.min;
    }
    let volume = equity * (risk_pct / 100.0) / distance;
    volume.clamp(bounds.min, bounds.max.max(bounds.min))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger_with(id: &str, entry: f64, side: PositionSide) -> PositionLedger {
        let mut ledger = PositionLedger::new();
        ledger.start_tracking(NewPosition::new(id, entry, side)).unwrap();
        ledger
    }

    #[test]
    fn start_tracking_initializes_extremes() {
        let ledger = ledger_with("pos1", 1.25, PositionSide::Long);
        let p = ledger.get("pos1").unwrap();
        assert_eq!(p.max_price_seen(), 1.25);
        assert_eq!(p.min_price_seen(), 1.25);
        assert_eq!(p.bars_held(), 0);
    }

    #[test]
    fn update_moves_extremes_and_bar() {
        let mut ledger = ledger_with("pos1", 1.25, PositionSide::Long);
        ledger.update("pos1", 1.27, Some(3)).unwrap();
        ledger.update("pos1", 1.24, None).unwrap();
        let p = ledger.get("pos1").unwrap();
        assert_eq!(p.max_price_seen(), 1.27);
        assert_eq!(p.min_price_seen(), 1.24);
        assert_eq!(p.bars_held(), 3);
        assert_eq!(p.last_price(), 1.24);
    }

    #[test]
    fn bar_counter_never_moves_backwards() {
        let mut ledger = ledger_with("pos1", 1.25, PositionSide::Long);
        ledger.update("pos1", 1.26, Some(5)).unwrap();
        let p = ledger.update("pos1", 1.27, Some(3)).unwrap();
        assert_eq!(p.bars_held(), 5);
        assert_eq!(p.last_price(), 1.27);
    }

    #[test]
    fn invalid_update_does_not_mutate() {
        let mut ledger = ledger_with("pos1", 1.25, PositionSide::Long);
        let before = ledger.get("pos1").unwrap().clone();
        assert!(matches!(
            ledger.update("pos1", -1.0, Some(9)),
            Err(LedgerError::InvalidPrice { .. })
        ));
        assert!(ledger.update("pos1", f64::NAN, None).is_err());
        assert_eq!(ledger.get("pos1").unwrap(), &before);
    }

    #[test]
    fn untracked_id_errors() {
        let mut ledger = PositionLedger::new();
        assert_eq!(
            ledger.update("ghost", 1.0, None).unwrap_err(),
            LedgerError::Untracked("ghost".into())
        );
        assert!(ledger.stop_tracking("ghost").is_err());
        assert!(ledger.position_profit("ghost", 1.0).is_err());
    }

    #[test]
    fn reset_extremes_uses_last_price() {
        let mut ledger = ledger_with("pos1", 1.25, PositionSide::Long);
        ledger.update("pos1", 1.30, None).unwrap();
        ledger.update("pos1", 1.28, None).unwrap();
        ledger.reset_extremes("pos1").unwrap();
        let p = ledger.get("pos1").unwrap();
        assert_eq!(p.max_price_seen(), 1.28);
        assert_eq!(p.min_price_seen(), 1.28);
    }

    #[test]
    fn short_peak_is_the_low() {
        let mut ledger = ledger_with("pos1", 100.0, PositionSide::Short);
        ledger.update("pos1", 95.0, None).unwrap();
        ledger.update("pos1", 97.0, None).unwrap();
        assert_eq!(ledger.get("pos1").unwrap().trailing_peak(), 95.0);
    }

    #[test]
    fn profit_summary_long_and_short() {
        let mut ledger = ledger_with("long", 100.0, PositionSide::Long);
        ledger.update("long", 110.0, Some(4)).unwrap();
        ledger.update("long", 95.0, Some(5)).unwrap();
        let p = ledger.position_profit("long", 105.0).unwrap();
        assert_eq!(p.pnl, 5.0);
        assert!((p.pnl_pct - 5.0).abs() < 1e-12);
        assert!(p.is_profitable);
        assert_eq!(p.bars_held, 5);
        assert_eq!(p.max_favorable, 10.0);
        assert_eq!(p.max_adverse, -5.0);

        ledger
            .start_tracking(NewPosition::new("short", 100.0, PositionSide::Short))
            .unwrap();
        ledger.update("short", 90.0, None).unwrap();
        ledger.update("short", 104.0, None).unwrap();
        let p = ledger.position_profit("short", 102.0).unwrap();
        assert_eq!(p.pnl, -2.0);
        assert!(!p.is_profitable);
        assert_eq!(p.max_favorable, 10.0);
        assert_eq!(p.max_adverse, -4.0);
    }

    #[test]
    fn stop_tracking_removes_record() {
        let mut ledger = ledger_with("pos1", 1.25, PositionSide::Long);
        let removed = ledger.stop_tracking("pos1").unwrap();
        assert_eq!(removed.id(), "pos1");
        assert!(ledger.is_empty());
    }

    #[test]
    fn ids_are_sorted() {
        let mut ledger = PositionLedger::new();
        for id in ["b", "a", "c"] {
            ledger
                .start_tracking(NewPosition::new(id, 1.0, PositionSide::Long))
                .unwrap();
        }
        assert_eq!(ledger.ids().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert_eq!(ledger.len(), 3);
    }

    #[test]
    fn risk_sizing_clamps() {
        let bounds = VolumeBounds::default();
        // 10_000 * 2% / 500 = 0.4
        assert!((risk_sized_volume(10_000.0, 1500.0, 1000.0, 2.0, bounds) - 0.4).abs() < 1e-12);
        assert_eq!(risk_sized_volume(10_000.0, 1.25, 1.2375, 2.0, bounds), 1.0);
        assert_eq!(risk_sized_volume(10_000.0, 1.25, 1.25, 2.0, bounds), 0.01);
        assert_eq!(risk_sized_volume(f64::NAN, 1.25, 1.24, 2.0, bounds), 0.01);
    }
}
