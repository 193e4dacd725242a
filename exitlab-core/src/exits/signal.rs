//! Exit signal: the verdict of one rule for one evaluation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which rule produced a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitType {
    StopLoss,
    TakeProfit,
    TrailingStop,
    EquityTarget,
    TimeBased,
    Breakeven,
    AtrBased,
    SignalReversal,
}

impl ExitType {
    pub const ALL: [ExitType; 8] = [
        ExitType::StopLoss,
        ExitType::TakeProfit,
        ExitType::TrailingStop,
        ExitType::EquityTarget,
        ExitType::TimeBased,
        ExitType::Breakeven,
        ExitType::AtrBased,
        ExitType::SignalReversal,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ExitType::StopLoss => "stop_loss",
            ExitType::TakeProfit => "take_profit",
            ExitType::TrailingStop => "trailing_stop",
            ExitType::EquityTarget => "equity_target",
            ExitType::TimeBased => "time_based",
            ExitType::Breakeven => "breakeven",
            ExitType::AtrBased => "atr_based",
            ExitType::SignalReversal => "signal_reversal",
        }
    }
}

impl fmt::Display for ExitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable result of a single rule evaluation.
///
/// Fields are private: a signal is built once through [`ExitSignal::trigger`] or
/// [`ExitSignal::hold`] (optionally refined with the `with_*` builders) and only
/// read afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitSignal {
    triggered: bool,
    exit_type: ExitType,
    exit_price: Option<f64>,
    reason: String,
    /// In [0, 1].
    confidence: f64,
    /// In (0, 100].
    close_percent: f64,
}

impl ExitSignal {
    /// Triggered signal: full confidence, close the whole position.
    pub fn trigger(exit_type: ExitType, exit_price: Option<f64>, reason: impl Into<String>) -> Self {
        Self {
            triggered: true,
            exit_type,
            exit_price,
            reason: reason.into(),
            confidence: 1.0,
            close_percent: 100.0,
        }
    }

    /// Non-triggered signal: zero confidence, no exit price.
    pub fn hold(exit_type: ExitType, reason: impl Into<String>) -> Self {
        Self {
            triggered: false,
            exit_type,
            exit_price: None,
            reason: reason.into(),
            confidence: 0.0,
            close_percent: 100.0,
        }
    }

    /// Override confidence, clamped to [0, 1]. NaN is treated as 0.
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        self
    }

    /// Override close percent, clamped to (0, 100]. Non-positive or NaN falls back to 100.
    pub fn with_close_percent(mut self, close_percent: f64) -> Self {
        self.close_percent = if close_percent > 0.0 {
            close_percent.min(100.0)
        } else {
            100.0
        };
        self
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered
    }

    pub fn exit_type(&self) -> ExitType {
        self.exit_type
    }

    pub fn exit_price(&self) -> Option<f64> {
        self.exit_price
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn close_percent(&self) -> f64 {
        self.close_percent
    }
}

impl fmt::Display for ExitSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.triggered { "EXIT" } else { "hold" };
        write!(f, "[{mark}] {}: {}", self.exit_type, self.reason)
    }
}
