//! Uploader settings file.
use std::{path::Path, time::Duration};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::{
    constants::{DEFAULT_PAGE_SIZE, SCAN_SETTLE_MS},
    transport::BusPins,
};

/// Settings read from a YAML file. Missing keys take their defaults.
///
/// ```yaml
/// bus: /dev/i2c-1
/// page_size: 64
/// scan_settle_ms: 5
/// init_settle_ms: 100
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// I2C character device of the host adapter.
    pub bus: String,
    /// Bring the bus up on these lines instead of reusing it.
    pub pins: Option<BusPins>,
    pub page_size: usize,
    pub scan_settle_ms: u64,
    /// Enables the two-step init with this pause between the steps.
    pub init_settle_ms: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bus: "/dev/i2c-1".to_string(),
            pins: None,
            page_size: DEFAULT_PAGE_SIZE,
            scan_settle_ms: SCAN_SETTLE_MS,
            init_settle_ms: None,
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = Self::from_yaml(&raw)
            .with_context(|| format!("parsing config {}", path.display()))?;
        log::debug!("Loaded config from {}: {:?}", path.display(), config);
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Config::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn scan_settle(&self) -> Duration {
        Duration::from_millis(self.scan_settle_ms)
    }

    pub fn init_settle(&self) -> Option<Duration> {
        self.init_settle_ms.map(Duration::from_millis)
    }
}
