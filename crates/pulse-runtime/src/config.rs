#![forbid(unsafe_code)]

//! Runtime configuration.
//!
//! | Field                 | Default        | Env var                     |
//! |-----------------------|----------------|-----------------------------|
//! | `tick_period`         | 1000 ms        | `PULSE_TICK_MS`             |
//! | `idle_fallback_ticks` | 3              | `PULSE_IDLE_FALLBACK_TICKS` |
//! | `loop_name`           | `"pulse-loop"` | -                           |
//!
//! `idle_fallback_ticks = 0` disables the forced idle pass.

use std::env;
use std::time::Duration;

use crate::error::ConfigError;

/// Environment variable overriding the tick period, in milliseconds.
pub const ENV_TICK_MS: &str = "PULSE_TICK_MS";
/// Environment variable overriding the idle fallback interval, in ticks.
pub const ENV_IDLE_FALLBACK_TICKS: &str = "PULSE_IDLE_FALLBACK_TICKS";

/// Configuration for a [`Pulse`](crate::Pulse) instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PulseConfig {
    /// Wall-clock period of the tick source. Clamped to at least 1 ms.
    pub tick_period: Duration,
    /// Force an idle pass every N ticks if none happened naturally.
    pub idle_fallback_ticks: u32,
    /// Thread name used by [`EventLoop::spawn`](crate::EventLoop::spawn).
    pub loop_name: String,
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            tick_period: Duration::from_millis(1000),
            idle_fallback_ticks: 3,
            loop_name: "pulse-loop".to_string(),
        }
    }
}

impl PulseConfig {
    /// Set the tick period.
    pub fn with_tick_period(mut self, period: Duration) -> Self {
        self.tick_period = period;
        self
    }

    /// Set the idle fallback interval (`0` disables it).
    pub fn with_idle_fallback_ticks(mut self, ticks: u32) -> Self {
        self.idle_fallback_ticks = ticks;
        self
    }

    /// Set the event loop thread name.
    pub fn with_loop_name(mut self, name: impl Into<String>) -> Self {
        self.loop_name = name.into();
        self
    }

    /// Tick period, never zero.
    #[inline]
    pub fn effective_tick_period(&self) -> Duration {
        self.tick_period.max(Duration::from_millis(1))
    }

    /// Read overrides from the environment, ignoring malformed values.
    pub fn from_env() -> Self {
        match Self::try_from_env() {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(error = %err, "ignoring malformed pulse configuration");
                Self::default()
            }
        }
    }

    /// Read overrides from the environment.
    pub fn try_from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Read overrides through `lookup`, so callers can supply their own source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(raw) = lookup(ENV_TICK_MS) {
            let ms = parse_u64(ENV_TICK_MS, &raw, "expected milliseconds")?;
            if ms == 0 {
                return Err(ConfigError::InvalidValue {
                    var: ENV_TICK_MS,
                    value: raw,
                    reason: "tick period must be positive",
                });
            }
            config.tick_period = Duration::from_millis(ms);
        }
        if let Some(raw) = lookup(ENV_IDLE_FALLBACK_TICKS) {
            let ticks = parse_u64(ENV_IDLE_FALLBACK_TICKS, &raw, "expected a tick count")?;
            config.idle_fallback_ticks =
                u32::try_from(ticks).map_err(|_| ConfigError::InvalidValue {
                    var: ENV_IDLE_FALLBACK_TICKS,
                    value: raw.clone(),
                    reason: "tick count too large",
                })?;
        }
        Ok(config)
    }
}

fn parse_u64(var: &'static str, raw: &str, reason: &'static str) -> Result<u64, ConfigError> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| ConfigError::InvalidValue {
            var,
            value: raw.to_string(),
            reason,
        })
}
