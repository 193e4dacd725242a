//! Property tests for exit-engine invariants.
//!
//! Uses proptest to verify:
//! 1. pnl symmetry: long and short pnl are negatives of each other
//! 2. Peak monotonicity: ledger and tracker peaks only move in the favourable direction
//! 3. Determinism: identical inputs give identical results
//! 4. Stop-loss precedence: a stop-loss breach is always the primary exit
//! 5. Bad input never exits

use proptest::prelude::*;
use exitlab_core::{
    pnl_pct, ExitContext, ExitOrchestrator, ExitType, NewPosition, PeakTracker, PositionLedger,
    PositionSide, RiskConfig, TradeSignal,
};

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_price() -> impl Strategy<Value = f64> {
    (0.5..500.0_f64).prop_map(|p| (p * 10_000.0).round() / 10_000.0)
}

fn arb_side() -> impl Strategy<Value = PositionSide> {
    prop_oneof![Just(PositionSide::Long), Just(PositionSide::Short)]
}

fn arb_signal() -> impl Strategy<Value = TradeSignal> {
    prop_oneof![
        Just(TradeSignal::Buy),
        Just(TradeSignal::Sell),
        Just(TradeSignal::Hold)
    ]
}

fn full_config() -> RiskConfig {
    RiskConfig {
        stop_loss_percent: 1.0,
        take_profit_percent: 2.0,
        trailing_stop: true,
        trailing_stop_percent: 0.5,
        trailing_activation_percent: 0.5,
        breakeven_spread: Some(0.001),
        ..RiskConfig::default()
    }
}

// ── 1. pnl symmetry ──────────────────────────────────────────────────

proptest! {
    #[test]
    fn pnl_long_short_symmetry(entry in arb_price(), current in arb_price()) {
        let long = pnl_pct(entry, current, PositionSide::Long);
        let short = pnl_pct(entry, current, PositionSide::Short);
        prop_assert!((long + short).abs() < 1e-9);
    }

    #[test]
    fn pnl_degenerate_entry(entry in -100.0..=0.0_f64, current in arb_price(), side in arb_side()) {
        prop_assert_eq!(pnl_pct(entry, current, side), 0.0);
    }
}

// ── 2. Peak monotonicity ─────────────────────────────────────────────

proptest! {
    #[test]
    fn ledger_peak_monotonic(
        entry in arb_price(),
        path in prop::collection::vec(arb_price(), 1..50),
        side in arb_side(),
    ) {
        let mut ledger = PositionLedger::new();
        ledger.start_tracking(NewPosition::new("pos", entry, side)).unwrap();
        let mut prev_max = entry;
        let mut prev_min = entry;
        for (bar, price) in path.into_iter().enumerate() {
            let p = ledger.update("pos", price, Some(bar)).unwrap();
            prop_assert!(p.max_price_seen() >= prev_max);
            prop_assert!(p.min_price_seen() <= prev_min);
            prop_assert!(p.max_price_seen() >= price && p.min_price_seen() <= price);
            prev_max = p.max_price_seen();
            prev_min = p.min_price_seen();
        }
    }

    #[test]
    fn tracker_peak_monotonic(
        path in prop::collection::vec(arb_price(), 1..50),
        side in arb_side(),
    ) {
        let mut tracker = PeakTracker::new();
        let mut prev: Option<f64> = None;
        for price in path {
            let peak = tracker.observe("pos", price, side);
            if let Some(prev) = prev {
                match side {
                    PositionSide::Long => prop_assert!(peak >= prev),
                    PositionSide::Short => prop_assert!(peak <= prev),
                }
            }
            prev = Some(peak);
        }
    }
}

// ── 3. Determinism ───────────────────────────────────────────────────

proptest! {
    #[test]
    fn evaluation_is_deterministic(
        entry in arb_price(),
        current in arb_price(),
        side in arb_side(),
        bars_held in 0usize..200,
        entry_signal in arb_signal(),
        current_signal in arb_signal(),
        peak in arb_price(),
    ) {
        let orch = ExitOrchestrator::from_config(full_config()).unwrap();
        let ctx = ExitContext::new()
            .with_bars_held(bars_held)
            .with_peak(peak)
            .with_equity(10_000.0, 10_000.0 + current)
            .with_signals(entry_signal, current_signal);
        let a = orch.evaluate(entry, current, side, &ctx);
        let b = orch.evaluate(entry, current, side, &ctx);
        prop_assert_eq!(a.exits, b.exits);
        prop_assert_eq!(a.primary_exit, b.primary_exit);
        prop_assert_eq!(a.recommended_action, b.recommended_action);
    }
}

// ── 4. Stop-loss precedence ──────────────────────────────────────────

proptest! {
    #[test]
    fn stop_loss_breach_is_primary(
        entry in arb_price(),
        loss in 1.01..50.0_f64,
        side in arb_side(),
        bars_held in 0usize..500,
        entry_signal in arb_signal(),
        current_signal in arb_signal(),
    ) {
        let current = match side {
            PositionSide::Long => entry * (1.0 - loss / 100.0),
            PositionSide::Short => entry * (1.0 + loss / 100.0),
        };
        let orch = ExitOrchestrator::from_config(full_config()).unwrap();
        let ctx = ExitContext::new()
            .with_bars_held(bars_held)
            .with_equity(10_000.0, 20_000.0)
            .with_signals(entry_signal, current_signal);
        let r = orch.evaluate(entry, current, side, &ctx);
        prop_assert_eq!(r.primary_exit, Some(ExitType::StopLoss));
        prop_assert_eq!(r.exits.len(), 1);
    }
}

// ── 5. Bad input never exits ─────────────────────────────────────────

proptest! {
    #[test]
    fn non_positive_prices_never_exit(
        entry in -10.0..=0.0_f64,
        current in arb_price(),
        side in arb_side(),
    ) {
        let orch = ExitOrchestrator::from_config(full_config()).unwrap();
        let r = orch.evaluate(entry, current, side, &ExitContext::new());
        prop_assert!(!r.should_exit);
        let price_rules = r.exits.iter().filter(|s| s.exit_type() != ExitType::TimeBased);
        for s in price_rules {
            prop_assert!(s.reason().contains("Invalid"), "{}", s.reason());
        }
    }
}
