//! Compute device and weight settings for the model backend

use anyhow::Result;
use candle_core::Device;
use serde::{Deserialize, Serialize};

/// Where resident models live: `"cpu"`, `"cuda"` / `"cuda:N"`, or the
/// long form `{ device_type, device_id }`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DeviceConfig {
    Simple(String),
    Detailed {
        device_type: String,
        #[serde(default)]
        device_id: usize,
    },
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig::Simple("cpu".to_string())
    }
}

impl DeviceConfig {
    /// Get device type ("cuda" or "cpu")
    pub fn device_type(&self) -> &str {
        match self {
            DeviceConfig::Simple(s) if s.starts_with("cuda") => "cuda",
            DeviceConfig::Simple(_) => "cpu",
            DeviceConfig::Detailed { device_type, .. } => device_type,
        }
    }

    /// GPU ordinal, zero when unspecified
    pub fn device_id(&self) -> usize {
        match self {
            DeviceConfig::Simple(s) => s
                .strip_prefix("cuda:")
                .and_then(|id| id.parse().ok())
                .unwrap_or(0),
            DeviceConfig::Detailed { device_id, .. } => *device_id,
        }
    }

    pub fn is_cuda(&self) -> bool {
        self.device_type() == "cuda"
    }

    /// Open the configured device.
    ///
    /// CUDA requests fail at runtime unless the `cuda` feature is built in.
    pub fn open(&self) -> Result<Device> {
        if self.is_cuda() {
            Ok(Device::new_cuda(self.device_id())?)
        } else {
            Ok(Device::Cpu)
        }
    }
}

/// Model backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    #[serde(default)]
    pub device: DeviceConfig,

    /// Weight dtype (f32, f16, bf16)
    #[serde(default = "default_dtype")]
    pub dtype: String,

    /// Overrides the measured device size, in bytes; the cache's eviction
    /// threshold is a fraction of whichever applies
    #[serde(default)]
    pub device_memory_bytes: Option<u64>,
}

fn default_dtype() -> String {
    "f32".to_string()
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            device: DeviceConfig::default(),
            dtype: default_dtype(),
            device_memory_bytes: None,
        }
    }
}
