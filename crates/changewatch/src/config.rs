//! Configuration for change assertions
//!
//! Loaded from YAML, e.g.
//!
//! ```yaml
//! retry:
//!   interval_ms: 100
//!   times: 15
//! tracking: on_entry
//! ```

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::interception::TrackingMode;

/// Environment variable naming a YAML config file for `ChangewatchConfig::from_env`.
pub const CONFIG_ENV_VAR: &str = "CHANGEWATCH_CONFIG";

/// How often the after-snapshot and evaluation are attempted, and how long to
/// wait between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(rename = "interval_ms", with = "duration_ms")]
    pub interval: Duration,
    pub times: u32,
}

impl RetryPolicy {
    pub fn new(interval: Duration, times: u32) -> Self {
        Self { interval, times }
    }

    pub fn from_millis(interval_ms: u64, times: u32) -> Self {
        Self::new(Duration::from_millis(interval_ms), times)
    }

    /// Number of evaluation attempts; zero is treated as a single attempt.
    pub fn attempts(&self) -> u32 {
        self.times.max(1)
    }
}

impl Default for RetryPolicy {
    /// One attempt, no real delay.
    fn default() -> Self {
        Self::from_millis(1, 1)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangewatchConfig {
    /// Used by requests that do not carry their own retry policy
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub tracking: TrackingMode,
}

impl ChangewatchConfig {
    /// Load configuration from a YAML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("Failed to read changewatch config {}: {}", path.display(), e)
        })?;

        let config: ChangewatchConfig = serde_yaml::from_str(&content).map_err(|e| {
            anyhow::anyhow!("Failed to parse changewatch config {}: {}", path.display(), e)
        })?;

        Ok(config)
    }

    /// Load the file named by `CHANGEWATCH_CONFIG`, or defaults when unset.
    pub fn from_env() -> Result<Self> {
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) if !path.is_empty() => Self::load_from_file(Path::new(&path)),
            _ => Ok(Self::default()),
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
