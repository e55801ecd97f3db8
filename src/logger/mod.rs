//! # Process-wide `tracing` setup.
//!
//! The library itself only emits through `tracing` macros; binaries embedding
//! it call [`init`] once at start-up.
//!
//! ```rust,no_run
//! use verivisor::logger::{self, LoggerConfig, LoggerFormat};
//!
//! logger::init(&LoggerConfig {
//!     format: LoggerFormat::Json,
//!     level: "info,verivisor=debug".into(),
//!     ..LoggerConfig::default()
//! })
//! .expect("logger");
//! ```

mod config;
mod error;

use tracing::Subscriber;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub use config::{LoggerConfig, LoggerFormat};
pub use error::LoggerError;

/// Installs the global subscriber described by `cfg`.
pub fn init(cfg: &LoggerConfig) -> Result<(), LoggerError> {
    let filter = mk_filter(&cfg.level)?;
    match cfg.format {
        LoggerFormat::Text => {
            let layer = fmt::layer()
                .with_ansi(cfg.use_color)
                .with_target(cfg.with_targets);
            init_with(tracing_subscriber::registry().with(filter).with(layer))
        }
        LoggerFormat::Json => {
            let layer = fmt::layer()
                .json()
                .with_ansi(false)
                .with_target(cfg.with_targets);
            init_with(tracing_subscriber::registry().with(filter).with(layer))
        }
    }
}

fn mk_filter(level: &str) -> Result<EnvFilter, LoggerError> {
    EnvFilter::try_new(level).map_err(|_| LoggerError::InvalidLogLevel(level.to_string()))
}

fn init_with<S>(subscriber: S) -> Result<(), LoggerError>
where
    S: Subscriber + Send + Sync + 'static,
{
    subscriber.try_init().map_err(|e| {
        let s = e.to_string();
        if s.contains("SetGlobalDefaultError") || s.contains("global default") {
            LoggerError::AlreadyInitialized
        } else {
            LoggerError::InitializationFailed(s)
        }
    })
}
