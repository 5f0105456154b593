use crate::constants::{PID, VID};
use crate::error::StsError;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Connection and timing settings for one spectrometer.
///
/// Every field has a default, so a JSON file only needs the keys it overrides:
///
/// ```json
/// { "device_index": 1, "block_delay_ms": 20 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub vendor_id: u16,
    pub product_id: u16,
    /// Which matching device to open when several are attached.
    pub device_index: usize,
    /// Bulk IN timeout. Long by default: reads block until data or a stall.
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
    /// Pause after every written 64-byte block.
    pub block_delay_ms: u64,
    /// Pause after the integration time is acknowledged.
    pub integration_settle_ms: u64,
    /// Pause after the reset command.
    pub reset_settle_ms: u64,
    /// Extra reads allowed while the device answers "deferred" (code 255).
    pub max_deferred_reads: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            vendor_id: VID,
            product_id: PID,
            device_index: 0,
            read_timeout_ms: 1_000_000,
            write_timeout_ms: 1_000,
            block_delay_ms: 100,
            integration_settle_ms: 500,
            reset_settle_ms: 1_500,
            max_deferred_reads: 16,
        }
    }
}

impl DeviceConfig {
    /// Defaults, selecting the `index`-th attached spectrometer.
    pub fn with_index(index: usize) -> Self {
        Self {
            device_index: index,
            ..Self::default()
        }
    }

    /// Settings with every settling pause removed, for simulated devices.
    pub fn without_delays() -> Self {
        Self {
            read_timeout_ms: 1_000,
            block_delay_ms: 0,
            integration_settle_ms: 0,
            reset_settle_ms: 0,
            ..Self::default()
        }
    }

    pub fn from_json(text: &str) -> Result<Self, StsError> {
        serde_json::from_str(text).map_err(|e| StsError::Config(e.to_string()))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, StsError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| StsError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn block_delay(&self) -> Duration {
        Duration::from_millis(self.block_delay_ms)
    }

    pub fn integration_settle(&self) -> Duration {
        Duration::from_millis(self.integration_settle_ms)
    }

    pub fn reset_settle(&self) -> Duration {
        Duration::from_millis(self.reset_settle_ms)
    }
}
