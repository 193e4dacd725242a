//! Average True Range (ATR).
//!
//! True Range: max(high-low, |high-prev_close|, |low-prev_close|)
//! ATR uses Wilder smoothing (EMA with alpha = 1/period).
//! Seed: mean of TR[0..period], with TR[0] = high-low. The first value is
//! available after `period` bars.

use crate::domain::Bar;

use super::IndicatorError;

#[derive(Debug, Clone)]
pub struct Atr {
    period: usize,
    name: String,
}

impl Atr {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "ATR period must be >= 1");
        Self {
            period,
            name: format!("atr_{period}"),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn period(&self) -> usize {
        self.period
    }

    /// Number of warmup bars before the first valid value.
    pub fn lookback(&self) -> usize {
        self.period - 1
    }

    /// Full ATR series, same length as `bars`. Warmup values are NaN.
    pub fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        wilder_smooth(&true_range(bars), self.period)
    }
}

/// Compute the True Range series from bars.
/// TR[0] = high[0] - low[0] (no previous close).
/// TR[t] = max(high[t]-low[t], |high[t]-close[t-1]|, |low[t]-close[t-1]|).
pub fn true_range(bars: &[Bar]) -> Vec<f64> {
    let mut tr = Vec::with_capacity(bars.len());
    for (i, bar) in bars.iter().enumerate() {
        let range = bar.high - bar.low;
        let value = if i == 0 {
            range
        } else {
            let pc = bars[i - 1].close;
            range.max((bar.high - pc).abs()).max((bar.low - pc).abs())
        };
        // NaN in any input poisons the value; f64::max would otherwise hide it.
        if bar.high.is_nan() || bar.low.is_nan() || (i > 0 && bars[i - 1].close.is_nan()) {
            tr.push(f64::NAN);
        } else {
            tr.push(value);
        }
    }
    tr
}

/// Apply Wilder smoothing to a series. Alpha = 1/period.
///
/// Seed: mean of the first `period` consecutive non-NaN values. A NaN after
/// the seed invalidates the rest of the series.
pub fn wilder_smooth(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period {
        return result;
    }

    let mut run = 0;
    let mut seed_end = None;
    for (i, v) in values.iter().enumerate() {
        if v.is_nan() {
            run = 0;
            continue;
        }
        run += 1;
        if run == period {
            seed_end = Some(i + 1);
            break;
        }
    }
    let Some(seed_end) = seed_end else {
        return result;
    };

    let seed = values[seed_end - period..seed_end].iter().sum::<f64>() / period as f64;
    result[seed_end - 1] = seed;

    let alpha = 1.0 / period as f64;
    let mut prev = seed;
    for i in seed_end..n {
        if values[i].is_nan() {
            // Remaining slots are still NaN from initialization.
            return result;
        }
        prev = alpha * values[i] + (1.0 - alpha) * prev;
        result[i] = prev;
    }
    result
}

/// Latest ATR value over `bars`, validating the window first.
///
/// Fails on a window shorter than `period`, on any void or inverted bar,
/// or when the final value is not finite and positive.
pub fn latest_atr(bars: &[Bar], period: usize) -> Result<f64, IndicatorError> {
    let needed = period.max(1);
    if bars.len() < needed {
        return Err(IndicatorError::InsufficientHistory {
            needed,
            got: bars.len(),
        });
    }
    for (index, bar) in bars.iter().enumerate() {
        if !bar.is_sane() {
            return Err(IndicatorError::MalformedBar {
                index,
                detail: format!(
                    "o={} h={} l={} c={}",
                    bar.open, bar.high, bar.low, bar.close
                ),
            });
        }
    }

    let series = Atr::new(period.max(1)).compute(bars);
    match series.last().copied() {
        Some(v) if v.is_finite() && v > 0.0 => Ok(v),
        _ => Err(IndicatorError::NonFinite),
    }
}
