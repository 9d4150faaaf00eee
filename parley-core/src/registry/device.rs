//! Process-wide compute device selection.
//!
//! The probe runs once at startup and its answer is injected into every
//! [`ModelRegistry`](super::ModelRegistry); it is never renegotiated per
//! request or per model.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Where a model runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Device {
    #[serde(rename = "cpu")]
    Cpu,
    /// Hardware accelerator. Reported as `"cuda"` on the wire.
    #[serde(rename = "cuda")]
    Accelerator,
}

impl Device {
    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Cpu => "cpu",
            Device::Accelerator => "cuda",
        }
    }

    pub fn is_accelerator(&self) -> bool {
        matches!(self, Device::Accelerator)
    }

    /// Resolve `preference` against what this machine offers.
    pub fn probe(preference: DevicePreference) -> Self {
        let available = accelerator_available();
        let device = match preference {
            DevicePreference::Cpu => Device::Cpu,
            DevicePreference::Accelerator => {
                if !available {
                    warn!("accelerator requested but none detected; models may fail to load");
                }
                Device::Accelerator
            }
            DevicePreference::Auto if available => Device::Accelerator,
            DevicePreference::Auto => Device::Cpu,
        };
        info!(
            ?preference,
            accelerator_available = available,
            device = device.as_str(),
            "compute device selected"
        );
        device
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configured device preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DevicePreference {
    #[default]
    Auto,
    Cpu,
    Accelerator,
}

impl DevicePreference {
    /// Lenient parse; unknown values mean `Auto`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "cpu" => DevicePreference::Cpu,
            "cuda" | "gpu" | "accelerator" => DevicePreference::Accelerator,
            _ => DevicePreference::Auto,
        }
    }
}

/// NVIDIA driver presence, honouring `CUDA_VISIBLE_DEVICES` masking.
fn accelerator_available() -> bool {
    if let Ok(visible) = std::env::var("CUDA_VISIBLE_DEVICES") {
        let visible = visible.trim();
        if visible.is_empty() || visible == "-1" {
            return false;
        }
    }
    ["/dev/nvidia0", "/proc/driver/nvidia/version"]
        .iter()
        .any(|p| Path::new(p).exists())
}
