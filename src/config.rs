use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Tunables for a debug session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DebuggerConfig {
    /// Instructions Pause may single-step looking for a source line.
    pub pause_step_limit: usize,
    pub reset_power_delay_ms: u64,
    pub reset_key_hold_ms: u64,
    /// How long a front end waits for a stop after resuming.
    pub event_wait_ms: u64,
    pub breakpoints_file: Option<PathBuf>,
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self {
            pause_step_limit: 500,
            reset_power_delay_ms: 1000,
            reset_key_hold_ms: 200,
            event_wait_ms: 500,
            breakpoints_file: None,
        }
    }
}

impl DebuggerConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn reset_power_delay(&self) -> Duration {
        Duration::from_millis(self.reset_power_delay_ms)
    }

    pub fn reset_key_hold(&self) -> Duration {
        Duration::from_millis(self.reset_key_hold_ms)
    }

    pub fn event_wait(&self) -> Duration {
        Duration::from_millis(self.event_wait_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let config: DebuggerConfig = serde_json::from_str(r#"{ "pauseStepLimit": 20 }"#).unwrap();
        assert_eq!(config.pause_step_limit, 20);
        assert_eq!(config.reset_power_delay_ms, 1000);
        assert_eq!(config.reset_key_hold(), Duration::from_millis(200));
        assert!(config.breakpoints_file.is_none());
    }
}
