//! Exit-engine configuration: the `[risk_management]` and `[logging]` blocks.
//!
//! Every field has a default, so a partial (or empty) TOML file is valid.
//! Validation is a separate step so callers can report all of a file's
//! problems at load time instead of panicking inside a rule constructor.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::ConfigHash;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExitConfig {
    pub risk_management: RiskConfig,
    pub logging: LoggingConfig,
}

/// Per-rule thresholds. Percentages are in percent units (1.0 = 1%) except
/// `breakeven_spread`, which is a fraction of the entry price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub stop_loss_percent: f64,
    pub take_profit_percent: f64,
    pub trailing_stop: bool,
    pub trailing_stop_percent: f64,
    pub trailing_activation_percent: f64,
    pub max_hold_bars: usize,
    pub time_exit_close_percent: f64,
    pub equity_target_percent: f64,
    pub atr_stop: bool,
    pub atr_period: usize,
    pub atr_multiplier: f64,
    /// Breakeven band; the breakeven rule only runs when this is set.
    pub breakeven_spread: Option<f64>,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            stop_loss_percent: 1.0,
            take_profit_percent: 2.0,
            trailing_stop: false,
            trailing_stop_percent: 0.5,
            trailing_activation_percent: 0.0,
            max_hold_bars: 100,
            time_exit_close_percent: 50.0,
            equity_target_percent: 5.0,
            atr_stop: true,
            atr_period: 14,
            atr_multiplier: 2.0,
            breakeven_spread: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `tracing` filter when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl ExitConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: ExitConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.risk_management.validate()?;
        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "logging.level",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Content hash of the canonical JSON encoding.
    pub fn fingerprint(&self) -> Result<ConfigHash, ConfigError> {
        let json = serde_json::to_string(self)?;
        Ok(ConfigHash::from_bytes(json.as_bytes()))
    }
}

impl RiskConfig {
    /// Parse a flat JSON mapping (the shape the trade loop passes around).
    pub fn from_json(s: &str) -> Result<Self, ConfigError> {
        let config: RiskConfig = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("stop_loss_percent", self.stop_loss_percent)?;
        positive("take_profit_percent", self.take_profit_percent)?;
        positive("trailing_stop_percent", self.trailing_stop_percent)?;
        if self.trailing_stop_percent >= 100.0 {
            return Err(invalid("trailing_stop_percent", "must be below 100"));
        }
        if !self.trailing_activation_percent.is_finite() || self.trailing_activation_percent < 0.0 {
            return Err(invalid("trailing_activation_percent", "must be >= 0"));
        }
        if self.max_hold_bars == 0 {
            return Err(invalid("max_hold_bars", "must be >= 1"));
        }
        close_percent("time_exit_close_percent", self.time_exit_close_percent)?;
        positive("equity_target_percent", self.equity_target_percent)?;
        if self.atr_period == 0 {
            return Err(invalid("atr_period", "must be >= 1"));
        }
        positive("atr_multiplier", self.atr_multiplier)?;
        if let Some(spread) = self.breakeven_spread {
            positive("breakeven_spread", spread)?;
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: format!("must be a positive number, got {value}"),
        })
    }
}

fn close_percent(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 && value <= 100.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: format!("must be in (0, 100], got {value}"),
        })
    }
}
