//! Position side and trade-signal categories.
//!
//! Both parse case-insensitively from the strings the trade-management loop
//! hands over ("long"/"short", "BUY"/"SELL"/"HOLD").

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("unknown position side: {0:?} (expected long or short)")]
    Side(String),
    #[error("unknown signal category: {0:?} (expected buy, sell or hold)")]
    Signal(String),
}

/// Direction of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    pub fn as_str(self) -> &'static str {
        match self {
            PositionSide::Long => "long",
            PositionSide::Short => "short",
        }
    }

    /// The signal category a position on this side is normally opened on.
    pub fn entry_signal(self) -> TradeSignal {
        match self {
            PositionSide::Long => TradeSignal::Buy,
            PositionSide::Short => TradeSignal::Sell,
        }
    }
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PositionSide {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "long" | "buy" => Ok(PositionSide::Long),
            "short" | "sell" => Ok(PositionSide::Short),
            _ => Err(ParseError::Side(s.to_string())),
        }
    }
}

/// Signal category emitted by the (external) signal generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSignal {
    Buy,
    Sell,
    Hold,
}

impl TradeSignal {
    pub fn as_str(self) -> &'static str {
        match self {
            TradeSignal::Buy => "BUY",
            TradeSignal::Sell => "SELL",
            TradeSignal::Hold => "HOLD",
        }
    }

    /// True when moving from `self` (entry) to `current` invalidates a
    /// position held on `side`. A move to HOLD never invalidates.
    pub fn reverses(self, current: TradeSignal, side: PositionSide) -> bool {
        matches!(
            (side, self, current),
            (PositionSide::Long, TradeSignal::Buy, TradeSignal::Sell)
                | (PositionSide::Short, TradeSignal::Sell, TradeSignal::Buy)
        )
    }
}

impl fmt::Display for TradeSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradeSignal {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" => Ok(TradeSignal::Buy),
            "sell" => Ok(TradeSignal::Sell),
            "hold" => Ok(TradeSignal::Hold),
            _ => Err(ParseError::Signal(s.to_string())),
        }
    }
}
