use std::time::Duration;

use serde::Deserialize;

use super::limits::{ResourceLimits, opt_secs};
use crate::error::ConfigError;

/// Default minimum growth step between attempts (+50%).
pub const DEFAULT_MIN_GROWTH: f64 = 1.5;

/// Configuration for the resource governor.
///
/// Parsed from the QoS description, e.g.:
/// ```json
/// {
///   "qos": { "cpu_time": 900, "wall_time": 1800, "memory_bytes": 8589934592 },
///   "wall_time_allowance": 86400,
///   "min_growth": 1.5
/// }
/// ```
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct GovernorConfig {
    /// Default limits issued to every identity on its first attempt.
    pub qos: ResourceLimits,

    /// Global wall-clock allowance; without it budget exhaustion is always final.
    #[serde(with = "opt_secs")]
    pub wall_time_allowance: Option<Duration>,

    /// Minimum CPU-time growth factor between attempts.
    pub min_growth: f64,

    /// Offer retries before the whole workload was seen once.
    pub force_rescheduling: bool,
}

impl GovernorConfig {
    /// Parses a configuration from JSON; missing fields take defaults.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let conf: Self = serde_json::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        conf.validate()?;
        Ok(conf)
    }

    /// Rejects growth factors that could never enlarge a budget.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.min_growth.is_finite() || self.min_growth <= 1.0 {
            return Err(ConfigError::Parse(format!(
                "min_growth must be a finite number above 1.0, got {}",
                self.min_growth
            )));
        }
        Ok(())
    }
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            qos: ResourceLimits::default(),
            wall_time_allowance: None,
            min_growth: DEFAULT_MIN_GROWTH,
            force_rescheduling: false,
        }
    }
}
