//! Configured platform catalog backed by host simulation.

use super::{DeviceEnumerator, DeviceInfo, GpuDeviceType, GpuLimits, GpuVendor, PlatformInfo};
use crate::error::Result;

/// Platform catalog served from configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedPlatforms {
    platforms: Vec<PlatformInfo>,
}

impl SimulatedPlatforms {
    pub fn new(platforms: Vec<PlatformInfo>) -> Self {
        Self { platforms }
    }

    /// One platform with a discrete GPU and a CPU device.
    pub fn default_catalog() -> Vec<PlatformInfo> {
        let gpu = DeviceInfo {
            name: "Simulated Fused-Kernel GPU".into(),
            vendor: GpuVendor::Unknown("Simulated".into()),
            device_type: GpuDeviceType::DiscreteGpu,
            driver_version: env!("CARGO_PKG_VERSION").into(),
            supports_fp64: true,
            limits: GpuLimits::default(),
        };
        let cpu = DeviceInfo {
            name: "Simulated Host CPU".into(),
            vendor: GpuVendor::Unknown("Simulated".into()),
            device_type: GpuDeviceType::Cpu,
            driver_version: env!("CARGO_PKG_VERSION").into(),
            supports_fp64: true,
            limits: GpuLimits {
                max_compute_units: 4,
                max_work_group_size: 64,
                ..GpuLimits::default()
            },
        };
        vec![PlatformInfo {
            name: "Host Simulation".into(),
            version: "1.0".into(),
            devices: vec![gpu, cpu],
        }]
    }
}

impl Default for SimulatedPlatforms {
    fn default() -> Self {
        Self::new(Self::default_catalog())
    }
}

impl DeviceEnumerator for SimulatedPlatforms {
    fn platforms(&self) -> Result<Vec<PlatformInfo>> {
        Ok(self.platforms.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceSelector;

    #[test]
    fn test_default_catalog_has_two_devices() {
        let sel = DeviceSelector::new(&SimulatedPlatforms::default()).unwrap();
        assert_eq!(sel.len(), 2);
        assert!(sel.describe(0).unwrap().contains("Simulated Fused-Kernel GPU"));
    }

    #[test]
    fn test_empty_catalog() {
        let sel = DeviceSelector::new(&SimulatedPlatforms::new(vec![])).unwrap();
        assert!(sel.is_empty());
        assert!(sel.resolve(0).is_err());
    }
}
