//! # Global runtime configuration.
//!
//! [`Config`] is the immutable snapshot every task inherits from its parent at
//! creation time. It is usually parsed once from JSON ([`Config::from_json`])
//! and shared behind an `Arc`.
//!
//! ## Sentinel values
//! - `weight = "0"` → full weight: task logs are attached to outcome records
//! - `parallelism` as an integer → absolute worker count
//! - `parallelism` as a float → fraction of available CPU cores

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default ceiling for task identifiers; ids double as external report keys.
pub const DEFAULT_MAX_ID_LEN: usize = 200;

/// Global configuration snapshot.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Keep task working directories after a clean exit.
    pub keep_intermediate_files: bool,

    /// Report weight; see [`Weight`].
    pub weight: Weight,

    /// Add finished children's resource usage to the parent's record.
    pub include_child_resources: bool,

    /// Worker count for pools.
    pub parallelism: Parallelism,

    /// Pool polling cycle length in milliseconds.
    pub poll_interval_ms: u64,

    /// Directory under which root task work directories are created.
    pub work_root: PathBuf,

    /// Hard ceiling for task identifier length.
    pub max_id_len: usize,
}

impl Config {
    /// Parses a configuration from JSON; missing fields take defaults.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Pool polling interval.
    #[inline]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Resolves [`Config::parallelism`] against the cores of this machine.
    pub fn workers(&self) -> Result<usize, ConfigError> {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        self.parallelism.resolve(cores)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `keep_intermediate_files = false`
    /// - `weight = Weight::Full`
    /// - `include_child_resources = false`
    /// - `parallelism = 1.0` (one worker per core)
    /// - `poll_interval_ms = 100`
    /// - `work_root = "."`
    /// - `max_id_len = 200`
    fn default() -> Self {
        Self {
            keep_intermediate_files: false,
            weight: Weight::Full,
            include_child_resources: false,
            parallelism: Parallelism::Fraction(1.0),
            poll_interval_ms: 100,
            work_root: PathBuf::from("."),
            max_id_len: DEFAULT_MAX_ID_LEN,
        }
    }
}

/// Report weight.
///
/// Serialized as a string: `"0"` is [`Weight::Full`], anything else is [`Weight::Light`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Weight {
    /// Outcome records carry the task log.
    Full,
    /// Outcome records carry measurements only.
    Light(String),
}

impl Weight {
    #[inline]
    pub fn attaches_logs(&self) -> bool {
        matches!(self, Weight::Full)
    }
}

impl FromStr for Weight {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" => Err(ConfigError::Parse("empty weight".into())),
            "0" => Ok(Weight::Full),
            other => Ok(Weight::Light(other.to_string())),
        }
    }
}

impl TryFrom<String> for Weight {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Weight> for String {
    fn from(w: Weight) -> Self {
        match w {
            Weight::Full => "0".to_string(),
            Weight::Light(s) => s,
        }
    }
}

/// Worker count, either absolute or relative to CPU cores.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Parallelism {
    /// Exact number of workers.
    Absolute(u64),
    /// Fraction of available cores, floored.
    Fraction(f64),
}

impl Parallelism {
    /// Resolves to a worker count for a machine with `cores` cores.
    ///
    /// The result must lie in `[1, 2 × cores]`. The bound applies to both
    /// forms: an absolute count above twice the core count is rejected just
    /// like a fraction that resolves there.
    ///
    /// # Example
    /// ```
    /// use verivisor::Parallelism;
    ///
    /// assert_eq!(Parallelism::Fraction(0.5).resolve(8).unwrap(), 4);
    /// assert_eq!(Parallelism::Absolute(3).resolve(8).unwrap(), 3);
    /// assert!(Parallelism::Fraction(0.1).resolve(4).is_err());
    /// assert!(Parallelism::Absolute(9).resolve(4).is_err());
    /// ```
    pub fn resolve(&self, cores: usize) -> Result<usize, ConfigError> {
        let cores = cores.max(1);
        let max = 2 * cores;
        let resolved = match *self {
            Parallelism::Absolute(n) => i64::try_from(n).unwrap_or(i64::MAX),
            Parallelism::Fraction(f) if f.is_finite() => (f * cores as f64).floor() as i64,
            Parallelism::Fraction(_) => -1,
        };
        if resolved < 1 || resolved > max as i64 {
            return Err(ConfigError::InvalidParallelism {
                value: self.to_string(),
                resolved,
                max,
            });
        }
        Ok(resolved as usize)
    }
}

impl fmt::Display for Parallelism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Parallelism::Absolute(n) => write!(f, "{n}"),
            Parallelism::Fraction(x) => write!(f, "{x}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_json_with_defaults() {
        let cfg = Config::from_json(r#"{"keep_intermediate_files": true, "weight": "2"}"#).unwrap();
        assert!(cfg.keep_intermediate_files);
        assert_eq!(cfg.weight, Weight::Light("2".into()));
        assert!(!cfg.weight.attaches_logs());
        assert_eq!(cfg.max_id_len, DEFAULT_MAX_ID_LEN);
        assert_eq!(cfg.poll_interval(), Duration::from_millis(100));
    }

    #[test]
    fn parallelism_integer_and_fraction() {
        let cfg = Config::from_json(r#"{"parallelism": 4}"#).unwrap();
        assert_eq!(cfg.parallelism, Parallelism::Absolute(4));

        let cfg = Config::from_json(r#"{"parallelism": 0.5}"#).unwrap();
        assert_eq!(cfg.parallelism, Parallelism::Fraction(0.5));
    }

    #[test]
    fn parallelism_bounds() {
        assert_eq!(Parallelism::Fraction(2.0).resolve(4).unwrap(), 8);
        assert!(Parallelism::Fraction(2.5).resolve(4).is_err());
        assert!(Parallelism::Absolute(0).resolve(4).is_err());
        assert!(Parallelism::Absolute(9).resolve(4).is_err());
        assert!(Parallelism::Fraction(f64::NAN).resolve(4).is_err());
    }

    #[test]
    fn weight_round_trips_as_string() {
        let json = serde_json::to_string(&Weight::Full).unwrap();
        assert_eq!(json, "\"0\"");
        assert!(Config::from_json(r#"{"weight": ""}"#).is_err());
    }
}
