//! # Compute Device
//!
//! Resolves `model.device` to the Candle device the Whisper weights live on.
//! An accelerator that cannot be opened falls back to the CPU with a
//! warning; a server configured for CUDA still starts on a CPU-only host.

use crate::error::AppError;
use candle_core::Device;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Result of probing for `auto`, computed once per process.
static AUTO_DEVICE: OnceLock<Device> = OnceLock::new();

/// Accelerators in the order `auto` tries them.
const PROBE_ORDER: [Accelerator; 2] = [Accelerator::Cuda, Accelerator::Metal];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Accelerator {
    Cuda,
    Metal,
}

impl Accelerator {
    fn name(self) -> &'static str {
        match self {
            Accelerator::Cuda => "CUDA",
            Accelerator::Metal => "Metal",
        }
    }

    /// Open ordinal 0, or `None` when the build or host lacks support.
    fn open(self) -> Option<Device> {
        let opened = match self {
            Accelerator::Cuda => Device::new_cuda(0),
            Accelerator::Metal => Device::new_metal(0),
        };
        opened
            .map_err(|e| debug!("{} unavailable: {}", self.name(), e))
            .ok()
    }
}

/// Device choice from `model.device` / `--device`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DevicePreference {
    /// First accelerator that opens, else CPU
    #[default]
    Auto,
    Cpu,
    Cuda,
    Metal,
}

impl std::str::FromStr for DevicePreference {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(DevicePreference::Auto),
            "cpu" => Ok(DevicePreference::Cpu),
            "cuda" | "gpu" => Ok(DevicePreference::Cuda),
            "metal" => Ok(DevicePreference::Metal),
            _ => Err(AppError::Config(format!(
                "unknown device '{}' (expected auto, cpu, cuda or metal)",
                s
            ))),
        }
    }
}

impl DevicePreference {
    /// The device to load the model on. Never fails.
    pub fn resolve(self) -> Device {
        match self {
            DevicePreference::Cpu => Device::Cpu,
            DevicePreference::Auto => AUTO_DEVICE.get_or_init(probe).clone(),
            DevicePreference::Cuda => explicit(Accelerator::Cuda),
            DevicePreference::Metal => explicit(Accelerator::Metal),
        }
    }
}

fn explicit(accelerator: Accelerator) -> Device {
    accelerator.open().unwrap_or_else(|| {
        warn!("{} requested but not available, using CPU", accelerator.name());
        Device::Cpu
    })
}

fn probe() -> Device {
    for accelerator in PROBE_ORDER {
        if let Some(device) = accelerator.open() {
            info!("Auto-selected {} device", accelerator.name());
            return device;
        }
    }
    info!("No accelerator found, running on CPU");
    Device::Cpu
}

/// Short device name for logs.
pub fn device_label(device: &Device) -> &'static str {
    match device {
        Device::Cpu => "cpu",
        Device::Cuda(_) => "cuda",
        Device::Metal(_) => "metal",
    }
}
