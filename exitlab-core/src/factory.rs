//! Rule factory: converts a rule name (plus optional parameter overrides) into
//! a boxed [`ExitRule`], taking defaults from a [`RiskConfig`].
//!
//! Recognized names: `stop_loss`, `take_profit`, `trailing_stop`,
//! `equity_target`, `time_based`, `breakeven`, `atr_based`, `signal_change`
//! (alias `signal_reversal`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::RiskConfig;
use crate::exits::{
    Breakeven, EquityTarget, ExitRule, FixedStopLoss, FixedTakeProfit, SignalReversal, TimeLimit,
    TrailingStop, VolatilityStop,
};

/// Default breakeven band when neither the config nor the overrides set one.
pub const DEFAULT_BREAKEVEN_SPREAD: f64 = 0.001;

/// Names accepted by [`create_rule`], in orchestrator priority order.
pub const RULE_NAMES: &[&str] = &[
    "stop_loss",
    "take_profit",
    "trailing_stop",
    "signal_change",
    "time_based",
    "equity_target",
    "atr_based",
    "breakeven",
];

// ─── Error type ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FactoryError {
    #[error("Unknown exit rule type: {0}")]
    UnknownRule(String),
    #[error("Invalid parameter {param} for {rule}: {value}")]
    InvalidParam {
        rule: String,
        param: String,
        value: f64,
    },
}

/// A rule name plus parameter overrides.
///
/// `BTreeMap` keeps serialization order stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub rule_type: String,
    #[serde(default)]
    pub params: BTreeMap<String, f64>,
}

impl RuleSpec {
    pub fn new(rule_type: impl Into<String>) -> Self {
        Self {
            rule_type: rule_type.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: f64) -> Self {
        self.params.insert(name.into(), value);
        self
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────

/// Read a named f64 parameter, falling back to `default`.
fn param(spec: &RuleSpec, name: &str, default: f64) -> f64 {
    spec.params.get(name).copied().unwrap_or(default)
}

fn invalid(spec: &RuleSpec, name: &str, value: f64) -> FactoryError {
    FactoryError::InvalidParam {
        rule: spec.rule_type.clone(),
        param: name.to_string(),
        value,
    }
}

/// Positive, finite f64 parameter.
fn positive(spec: &RuleSpec, name: &str, default: f64) -> Result<f64, FactoryError> {
    let value = param(spec, name, default);
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(invalid(spec, name, value))
    }
}

/// Whole-number parameter >= 1. The config default is checked like an
/// override since `RiskConfig` may not have been validated.
fn count(spec: &RuleSpec, name: &str, default: usize) -> Result<usize, FactoryError> {
    match spec.params.get(name).copied() {
        None if default >= 1 => Ok(default),
        None => Err(invalid(spec, name, default as f64)),
        Some(v) if v.is_finite() && v >= 1.0 && v.fract() == 0.0 => Ok(v as usize),
        Some(v) => Err(invalid(spec, name, v)),
    }
}

// ─── Rule factory ────────────────────────────────────────────────────

/// Build a rule from `spec`, with `config` supplying every parameter that
/// `spec.params` leaves out.
pub fn try_create_rule(
    spec: &RuleSpec,
    config: &RiskConfig,
) -> Result<Box<dyn ExitRule>, FactoryError> {
    match spec.rule_type.trim().to_ascii_lowercase().as_str() {
        "stop_loss" => {
            let pct = positive(spec, "stop_loss_percent", config.stop_loss_percent)?;
            Ok(Box::new(FixedStopLoss::new(pct)))
        }
        "take_profit" => {
            let pct = positive(spec, "take_profit_percent", config.take_profit_percent)?;
            Ok(Box::new(FixedTakeProfit::new(pct)))
        }
        "trailing_stop" => {
            let trail = positive(spec, "trailing_stop_percent", config.trailing_stop_percent)?;
            if trail >= 100.0 {
                return Err(invalid(spec, "trailing_stop_percent", trail));
            }
            let activation = param(
                spec,
                "trailing_activation_percent",
                config.trailing_activation_percent,
            );
            if !activation.is_finite() || activation < 0.0 {
                return Err(invalid(spec, "trailing_activation_percent", activation));
            }
            Ok(Box::new(TrailingStop::new(trail, activation)))
        }
        "equity_target" => {
            let pct = positive(spec, "equity_target_percent", config.equity_target_percent)?;
            Ok(Box::new(EquityTarget::new(pct)))
        }
        "time_based" => {
            let max_bars = count(spec, "max_hold_bars", config.max_hold_bars)?;
            let close = positive(spec, "time_exit_close_percent", config.time_exit_close_percent)?;
            if close > 100.0 {
                return Err(invalid(spec, "time_exit_close_percent", close));
            }
            Ok(Box::new(TimeLimit::with_close_percent(max_bars, close)))
        }
        "breakeven" => {
            let default = config.breakeven_spread.unwrap_or(DEFAULT_BREAKEVEN_SPREAD);
            let spread = positive(spec, "breakeven_spread", default)?;
            Ok(Box::new(Breakeven::new(spread)))
        }
        "atr_based" => {
            let period = count(spec, "atr_period", config.atr_period)?;
            let multiplier = positive(spec, "atr_multiplier", config.atr_multiplier)?;
            Ok(Box::new(VolatilityStop::new(period, multiplier)))
        }
        "signal_change" | "signal_reversal" => Ok(Box::new(SignalReversal::new())),
        other => Err(FactoryError::UnknownRule(other.to_string())),
    }
}

/// Build a rule by name with parameters from `config`.
///
/// Unknown names and configs that cannot produce a valid rule are logged and
/// yield `None`.
pub fn create_rule(rule_type: &str, config: &RiskConfig) -> Option<Box<dyn ExitRule>> {
    match try_create_rule(&RuleSpec::new(rule_type), config) {
        Ok(rule) => Some(rule),
        Err(e) => {
            tracing::warn!(rule_type, error = %e, "cannot create exit rule");
            None
        }
    }
}
