use crate::error::{MissionError, MissionResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Heartbeat periods below this floor would flood the status channel.
const MIN_HEARTBEAT_MS: u64 = 200;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Capacity of the bounded telemetry-event lane. Commands are not
    /// subject to this limit.
    pub event_capacity: usize,
    /// Time limit for a handler's `initialize`; overruns abort the
    /// transition.
    pub init_timeout_ms: u64,
    /// Time limit for a handler's `teardown`; overruns are logged and the
    /// transition is forced through.
    pub teardown_timeout_ms: u64,
    /// Status republish cadence while a mission is running.
    pub heartbeat_ms: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig {
            event_capacity: 128,
            init_timeout_ms: 2000,
            teardown_timeout_ms: 2000,
            heartbeat_ms: 1000,
        }
    }
}

impl ControllerConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> MissionResult<Self> {
        let config_str = fs::read_to_string(path)
            .map_err(|e| MissionError::Config(format!("Failed to read config file: {}", e)))?;

        let config: ControllerConfig = serde_json::from_str(&config_str)
            .map_err(|e| MissionError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> MissionResult<()> {
        if self.event_capacity == 0 {
            return Err(MissionError::Config(
                "event_capacity must be at least 1".to_string(),
            ));
        }
        if self.init_timeout_ms == 0 || self.teardown_timeout_ms == 0 {
            return Err(MissionError::Config(
                "handler timeouts must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.init_timeout_ms)
    }

    pub fn teardown_timeout(&self) -> Duration {
        Duration::from_millis(self.teardown_timeout_ms)
    }

    pub fn heartbeat_period(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms.max(MIN_HEARTBEAT_MS))
    }
}
