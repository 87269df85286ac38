use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::history::DEFAULT_HISTORY_CAPACITY;
use crate::{CalibrationTable, ConfigError};

pub const ENV_URL: &str = "EXFOLIATOR_URL";
pub const ENV_RECONNECT_MS: &str = "EXFOLIATOR_RECONNECT_MS";
pub const ENV_CONFIRM_MS: &str = "EXFOLIATOR_CONFIRM_MS";
pub const ENV_SETTLE_MS: &str = "EXFOLIATOR_SETTLE_MS";

/// Client configuration.
///
/// Built from defaults, then an optional TOML file, then `EXFOLIATOR_*`
/// environment variables, in increasing precedence:
///
/// ```toml
/// url = "ws://10.0.0.5:8765"
/// confirm_timeout_ms = 1500
///
/// [calibration]
/// origin = { x = 105.5, y = 4.5 }
/// stage_x = 8.0
///
/// [calibration.rows]
/// A = { dx = 0.0 }
/// B = { dx = 12.5 }
///
/// [calibration.columns]
/// 1 = { dy = 0.0 }
/// 2 = { dy = 12.5 }
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Relay WebSocket address.
    pub url: String,
    pub reconnect_delay_ms: u64,
    /// How long a toggle waits for the device to agree before rolling back.
    pub confirm_timeout_ms: u64,
    /// Gap between two queue dispatches.
    pub settle_delay_ms: u64,
    pub history_capacity: usize,
    /// Buffer of the event broadcast; slow subscribers lag past this.
    pub event_capacity: usize,
    pub calibration: CalibrationTable,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8765".to_string(),
            reconnect_delay_ms: 3000,
            confirm_timeout_ms: 1000,
            settle_delay_ms: 500,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            event_capacity: 256,
            calibration: CalibrationTable::default(),
        }
    }
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Loads the full layered configuration and validates it.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Applies `EXFOLIATOR_*` overrides read through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_URL) {
            self.url = url;
        }
        for (var, field) in [
            (ENV_RECONNECT_MS, &mut self.reconnect_delay_ms),
            (ENV_CONFIRM_MS, &mut self.confirm_timeout_ms),
            (ENV_SETTLE_MS, &mut self.settle_delay_ms),
        ] {
            if let Some(value) = lookup(var) {
                *field = value
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| ConfigError::Env { var, value })?;
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::Invalid("url cannot be empty".into()));
        }
        if !(self.url.starts_with("ws://") || self.url.starts_with("wss://")) {
            return Err(ConfigError::Invalid(format!(
                "url must start with ws:// or wss://, got '{}'",
                self.url
            )));
        }
        for (name, value) in [
            ("reconnect_delay_ms", self.reconnect_delay_ms),
            ("confirm_timeout_ms", self.confirm_timeout_ms),
            ("settle_delay_ms", self.settle_delay_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be greater than 0", name)));
            }
        }
        if self.history_capacity == 0 {
            return Err(ConfigError::Invalid("history_capacity must be greater than 0".into()));
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::Invalid("event_capacity must be greater than 0".into()));
        }
        self.calibration
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_millis(self.confirm_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}
