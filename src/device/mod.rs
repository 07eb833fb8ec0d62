//! Compute device discovery and selection
//!
//! Platforms and their devices are enumerated once, flattened in stable
//! platform-then-device order, and addressed by a zero-based ordinal. The
//! selected device becomes an [`ActiveDevice`] value that is handed to the
//! backend constructor instead of living in process-wide state.

pub mod simulated;

pub use simulated::SimulatedPlatforms;

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Device identity
// ---------------------------------------------------------------------------

/// Hardware vendor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Apple,
    Unknown(String),
}

impl fmt::Display for GpuVendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuVendor::Nvidia => write!(f, "NVIDIA"),
            GpuVendor::Amd => write!(f, "AMD"),
            GpuVendor::Intel => write!(f, "Intel"),
            GpuVendor::Apple => write!(f, "Apple"),
            GpuVendor::Unknown(s) => write!(f, "{}", s),
        }
    }
}

/// Device type classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GpuDeviceType {
    DiscreteGpu,
    IntegratedGpu,
    Cpu,
    Accelerator,
}

impl fmt::Display for GpuDeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuDeviceType::DiscreteGpu => write!(f, "discrete GPU"),
            GpuDeviceType::IntegratedGpu => write!(f, "integrated GPU"),
            GpuDeviceType::Cpu => write!(f, "CPU"),
            GpuDeviceType::Accelerator => write!(f, "accelerator"),
        }
    }
}

/// Hardware limits reported by a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpuLimits {
    pub max_buffer_size: u64,
    pub max_compute_units: u32,
    pub max_work_group_size: u32,
    pub global_memory: u64,
}

impl Default for GpuLimits {
    fn default() -> Self {
        Self {
            max_buffer_size: 256 * 1024 * 1024, // 256 MiB
            max_compute_units: 16,
            max_work_group_size: 256,
            global_memory: 1024 * 1024 * 1024, // 1 GiB
        }
    }
}

/// Self-description of one compute device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub name: String,
    pub vendor: GpuVendor,
    pub device_type: GpuDeviceType,
    #[serde(default)]
    pub driver_version: String,
    #[serde(default = "default_true")]
    pub supports_fp64: bool,
    #[serde(default)]
    pub limits: GpuLimits,
}

fn default_true() -> bool {
    true
}

impl DeviceInfo {
    pub fn new(name: impl Into<String>, vendor: GpuVendor, device_type: GpuDeviceType) -> Self {
        Self {
            name: name.into(),
            vendor,
            device_type,
            driver_version: String::new(),
            supports_fp64: true,
            limits: GpuLimits::default(),
        }
    }

    /// Multi-line human-readable identity, built only from what the device
    /// reports about itself.
    pub fn info(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Name:                 {}\n", self.name));
        out.push_str(&format!("Vendor:               {}\n", self.vendor));
        out.push_str(&format!("Type:                 {}\n", self.device_type));
        if !self.driver_version.is_empty() {
            out.push_str(&format!("Driver Version:       {}\n", self.driver_version));
        }
        out.push_str(&format!(
            "Double Precision:     {}\n",
            if self.supports_fp64 { "yes" } else { "no" }
        ));
        out.push_str(&format!("Compute Units:        {}\n", self.limits.max_compute_units));
        out.push_str(&format!("Max Work Group Size:  {}\n", self.limits.max_work_group_size));
        out.push_str(&format!(
            "Max Buffer Size:      {} MiB\n",
            self.limits.max_buffer_size / (1024 * 1024)
        ));
        out.push_str(&format!(
            "Global Memory:        {} MiB",
            self.limits.global_memory / (1024 * 1024)
        ));
        out
    }
}

/// A compute platform and the devices it exposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformInfo {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub devices: Vec<DeviceInfo>,
}

/// Source of platform/device identities.
pub trait DeviceEnumerator {
    /// Platforms in a stable order, each with its devices in a stable order.
    fn platforms(&self) -> Result<Vec<PlatformInfo>>;
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// Position of a device in the flattened catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub platform_index: usize,
    pub device_index: usize,
    pub ordinal: usize,
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} (platform {}, device {})",
            self.ordinal, self.platform_index, self.device_index
        )
    }
}

/// The device chosen for a run. Immutable once created.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveDevice {
    pub descriptor: DeviceDescriptor,
    pub platform: String,
    pub info: DeviceInfo,
}

impl ActiveDevice {
    pub fn name(&self) -> &str {
        &self.info.name
    }
}

#[derive(Debug, Clone)]
struct CatalogEntry {
    descriptor: DeviceDescriptor,
    platform: String,
    info: DeviceInfo,
}

/// Flat, ordinal-addressed view over every device of every platform.
#[derive(Debug, Clone)]
pub struct DeviceSelector {
    entries: Vec<CatalogEntry>,
}

impl DeviceSelector {
    /// Enumerate all platforms and devices once.
    pub fn new(enumerator: &dyn DeviceEnumerator) -> Result<Self> {
        let mut entries = Vec::new();
        for (platform_index, platform) in enumerator.platforms()?.into_iter().enumerate() {
            debug!(
                platform = %platform.name,
                devices = platform.devices.len(),
                "enumerated platform"
            );
            for (device_index, info) in platform.devices.into_iter().enumerate() {
                let ordinal = entries.len();
                entries.push(CatalogEntry {
                    descriptor: DeviceDescriptor {
                        platform_index,
                        device_index,
                        ordinal,
                    },
                    platform: platform.name.clone(),
                    info,
                });
            }
        }
        info!(devices = entries.len(), "device enumeration complete");
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Map an ordinal to its platform/device position.
    pub fn resolve(&self, ordinal: usize) -> Result<DeviceDescriptor> {
        self.entry(ordinal).map(|e| e.descriptor)
    }

    /// Diagnostic identity string of the device at `ordinal`.
    pub fn describe(&self, ordinal: usize) -> Result<String> {
        self.entry(ordinal).map(|e| e.info.info())
    }

    /// Select the device at `ordinal` for the rest of the run.
    pub fn activate(&self, ordinal: usize) -> Result<ActiveDevice> {
        let entry = self.entry(ordinal)?;
        info!(
            ordinal,
            platform = %entry.platform,
            device = %entry.info.name,
            "activated device"
        );
        Ok(ActiveDevice {
            descriptor: entry.descriptor,
            platform: entry.platform.clone(),
            info: entry.info.clone(),
        })
    }

    /// `(descriptor, platform name, device info)` in ordinal order.
    pub fn iter(&self) -> impl Iterator<Item = (DeviceDescriptor, &str, &DeviceInfo)> {
        self.entries
            .iter()
            .map(|e| (e.descriptor, e.platform.as_str(), &e.info))
    }

    fn entry(&self, ordinal: usize) -> Result<&CatalogEntry> {
        self.entries.get(ordinal).ok_or(Error::DeviceNotFound {
            ordinal,
            available: self.entries.len(),
        })
    }
}
