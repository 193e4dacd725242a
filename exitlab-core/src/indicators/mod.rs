//! Volatility indicators used by the ATR stop.
//!
//! Indicators are pure functions: bar history in, numeric series out. The
//! exit engine computes them on demand from the window the caller supplies.

pub mod atr;

pub use atr::{latest_atr, true_range, wilder_smooth, Atr};

/// Reasons an indicator value could not be produced.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IndicatorError {
    #[error("insufficient history: need {needed} bars, got {got}")]
    InsufficientHistory { needed: usize, got: usize },
    #[error("malformed bar at index {index}: {detail}")]
    MalformedBar { index: usize, detail: String },
    #[error("indicator produced a non-finite value")]
    NonFinite,
}

/// Create synthetic bars from close prices for testing.
///
/// open = prev_close (or close for the first bar), high = max(open, close) + spread,
/// low = min(open, close) - spread.
#[cfg(test)]
pub fn make_bars(closes: &[f64], spread: f64) -> Vec<crate::domain::Bar> {
    use crate::domain::Bar;
    let base = chrono::NaiveDate::from_ymd_opt(2024, 1, 2)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Bar::new(
                base + chrono::Duration::hours(i as i64),
                open,
                open.max(close) + spread,
                open.min(close) - spread,
                close,
            )
        })
        .collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
