//! Shared test helpers for integration tests

use fusion_oracle::backend::{Bindings, BufferUsage, DeviceBuffer, KernelBackend, SimulatedDevice};
use fusion_oracle::buffer::HostBuffer;
use fusion_oracle::config::{Dims, OracleConfig};
use fusion_oracle::device::{
    ActiveDevice, DeviceInfo, DeviceSelector, GpuDeviceType, GpuVendor, PlatformInfo,
    SimulatedPlatforms,
};
use fusion_oracle::expr::{CustomOperation, Expr, Statement};
use fusion_oracle::numeric::NumericProfile;
use fusion_oracle::suite::{Suite, TestCase};

/// Open device `ordinal` of the default catalog.
pub fn simulated_device(ordinal: usize, profile: NumericProfile) -> SimulatedDevice {
    let selector = DeviceSelector::new(&SimulatedPlatforms::default()).unwrap();
    SimulatedDevice::new(selector.activate(ordinal).unwrap(), profile).unwrap()
}

/// Three devices spread over three platforms, one of them empty.
#[allow(dead_code)]
pub fn three_device_catalog() -> SimulatedPlatforms {
    let device = |name: &str| DeviceInfo::new(name, GpuVendor::Nvidia, GpuDeviceType::DiscreteGpu);
    SimulatedPlatforms::new(vec![
        PlatformInfo {
            name: "First".into(),
            version: "3.0".into(),
            devices: vec![device("gpu-0"), device("gpu-1")],
        },
        PlatformInfo {
            name: "Empty".into(),
            version: "1.2".into(),
            devices: vec![],
        },
        PlatformInfo {
            name: "Second".into(),
            version: "2.1".into(),
            devices: vec![device("gpu-2")],
        },
    ])
}

/// Default configuration shrunk so the whole catalog runs quickly.
#[allow(dead_code)]
pub fn small_config() -> OracleConfig {
    OracleConfig {
        vector_size: 64,
        matrix: Dims::new(32, 48),
        pattern: Dims::new(8, 12),
        ..OracleConfig::default()
    }
}

/// Look a case up by name across suites.
#[allow(dead_code)]
pub fn find_case<'a>(suites: &'a [Suite], name: &str) -> &'a TestCase {
    suites
        .iter()
        .flat_map(|s| &s.cases)
        .find(|c| c.name == name)
        .unwrap_or_else(|| panic!("no case named {}", name))
}

/// Backend whose kernel generator reads one element too far in every shift.
#[allow(dead_code)]
pub struct OffByOneShift(pub SimulatedDevice);

fn bump_shifts(expr: &Expr) -> Expr {
    match expr {
        Expr::Shift { arg, offset } => Expr::Shift {
            arg: Box::new(bump_shifts(arg)),
            offset: offset + 1,
        },
        Expr::Unary { op, arg } => Expr::Unary {
            op: *op,
            arg: Box::new(bump_shifts(arg)),
        },
        Expr::Binary { op, lhs, rhs } => Expr::Binary {
            op: *op,
            lhs: Box::new(bump_shifts(lhs)),
            rhs: Box::new(bump_shifts(rhs)),
        },
        other => other.clone(),
    }
}

impl KernelBackend for OffByOneShift {
    fn device(&self) -> &ActiveDevice {
        self.0.device()
    }

    fn upload(&mut self, host: &HostBuffer, usage: BufferUsage) -> fusion_oracle::Result<DeviceBuffer> {
        self.0.upload(host, usage)
    }

    fn execute(&mut self, op: &CustomOperation, bindings: &Bindings) -> fusion_oracle::Result<()> {
        let mut broken = CustomOperation::new();
        for s in op.statements() {
            broken.add(Statement {
                dest: s.dest.clone(),
                op: s.op,
                value: bump_shifts(&s.value),
            });
        }
        self.0.execute(&broken, bindings)
    }

    fn finish(&mut self) -> fusion_oracle::Result<()> {
        self.0.finish()
    }

    fn read_back(&mut self, buffer: &DeviceBuffer) -> fusion_oracle::Result<HostBuffer> {
        self.0.read_back(buffer)
    }

    fn release(&mut self, buffer: DeviceBuffer) -> fusion_oracle::Result<()> {
        self.0.release(buffer)
    }
}
