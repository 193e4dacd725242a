//! ExitLab Core: exit rules, priority orchestrator, position ledger, rule factory.
//!
//! This crate decides when an open position should be closed:
//! - Domain types (bars, position side, trade-signal categories)
//! - Independent exit rules behind the `ExitRule` trait
//! - Fixed-priority orchestrator that folds rule verdicts into one action
//! - Position ledger holding per-position extremes and bar counters
//! - Rule factory keyed by rule name
//! - TOML configuration with validation and fingerprinting
//!
//! It places no orders and persists nothing. Callers feed prices in and act
//! on the returned [`EvaluationResult`].

pub mod config;
pub mod domain;
pub mod exits;
pub mod factory;
pub mod indicators;
pub mod ledger;
pub mod orchestrator;

pub use config::{ConfigError, ExitConfig, LoggingConfig, RiskConfig};
pub use domain::{Bar, PositionSide, TradeSignal};
pub use exits::{pnl_pct, ExitContext, ExitRule, ExitSignal, ExitType, PeakTracker, RuleError};
pub use factory::{create_rule, try_create_rule, FactoryError, RuleSpec};
pub use ledger::{
    risk_sized_volume, LedgerError, MarketSnapshot, NewPosition, PositionLedger, PositionProfit,
    TrackedPosition, VolumeBounds,
};
pub use orchestrator::{EvaluationResult, ExitOrchestrator, RecommendedAction};
