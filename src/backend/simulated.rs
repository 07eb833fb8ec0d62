//! Host-simulated fused-kernel device
//!
//! Buffers live as little-endian byte arrays in the device's element type.
//! [`execute`](KernelBackend::execute) only records work on an in-order
//! queue; nothing runs until [`finish`](KernelBackend::finish).

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use tracing::{debug, trace};

use super::kernel::KernelGenerator;
use super::{Bindings, BufferId, BufferUsage, DeviceBuffer, KernelBackend};
use crate::buffer::workspace::check_kind;
use crate::buffer::{HostBuffer, Shape};
use crate::device::ActiveDevice;
use crate::error::{Error, Result};
use crate::expr::{CustomOperation, Operand};
use crate::numeric::NumericProfile;

/// Cumulative statistics for device operations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStats {
    pub buffers_created: u64,
    pub buffers_destroyed: u64,
    pub dispatches: u64,
    pub barriers: u64,
    pub bytes_written: u64,
    pub bytes_read: u64,
}

// ---------------------------------------------------------------------------
// Buffer storage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct GpuBuffer {
    shape: Shape,
    usage: BufferUsage,
    /// Backing storage in the device's element type.
    data: Vec<u8>,
    /// Queued work will write this buffer.
    pending: bool,
}

fn encode(values: &[f64], profile: NumericProfile) -> Vec<u8> {
    match profile {
        NumericProfile::Single => values
            .iter()
            .flat_map(|&v| (v as f32).to_le_bytes())
            .collect(),
        NumericProfile::Double => values.iter().flat_map(|v| v.to_le_bytes()).collect(),
    }
}

fn decode(bytes: &[u8], profile: NumericProfile) -> Vec<f64> {
    match profile {
        NumericProfile::Single => bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f64)
            .collect(),
        NumericProfile::Double => bytes
            .chunks_exact(8)
            .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
            .collect(),
    }
}

#[derive(Debug, Clone)]
struct Command {
    op: CustomOperation,
    bindings: Bindings,
}

// ---------------------------------------------------------------------------
// SimulatedDevice
// ---------------------------------------------------------------------------

/// Reference [`KernelBackend`] that runs fused kernels on the host.
pub struct SimulatedDevice {
    device: ActiveDevice,
    profile: NumericProfile,
    kernels: KernelGenerator,
    buffers: FxHashMap<BufferId, GpuBuffer>,
    queue: VecDeque<Command>,
    stats: DeviceStats,
    next_buffer_id: u64,
}

impl fmt::Debug for SimulatedDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulatedDevice")
            .field("device", &self.device.name())
            .field("profile", &self.profile)
            .field("buffers", &self.buffers.len())
            .field("queued", &self.queue.len())
            .finish()
    }
}

impl SimulatedDevice {
    /// Open `device` for `profile`. Fails when the device cannot hold the
    /// profile's element type.
    pub fn new(device: ActiveDevice, profile: NumericProfile) -> Result<Self> {
        if profile.requires_fp64() && !device.info.supports_fp64 {
            return Err(Error::device(format!(
                "{} does not support double precision",
                device.name()
            )));
        }
        let kernels =
            KernelGenerator::new(profile, device.info.limits.max_work_group_size as usize);
        Ok(Self {
            device,
            profile,
            kernels,
            buffers: FxHashMap::default(),
            queue: VecDeque::new(),
            stats: DeviceStats::default(),
            next_buffer_id: 1,
        })
    }

    pub fn profile(&self) -> NumericProfile {
        self.profile
    }

    pub fn stats(&self) -> &DeviceStats {
        &self.stats
    }

    /// Buffers currently allocated.
    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    /// Operations submitted but not yet run.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    fn buffer(&self, id: BufferId) -> Result<&GpuBuffer> {
        self.buffers
            .get(&id)
            .ok_or_else(|| Error::device(format!("buffer {:?} not found", id)))
    }

    fn load(&self, bindings: &Bindings, operand: &Operand) -> Result<HostBuffer> {
        let handle = bindings.get(&operand.name)?;
        let buf = self.buffer(handle.id())?;
        HostBuffer::from_vec(buf.shape, decode(&buf.data, self.profile))
    }

    fn run(&mut self, cmd: Command) -> Result<()> {
        debug!(op = %cmd.op, "dispatching fused kernel");
        for statement in cmd.op.statements() {
            let out = self
                .kernels
                .run_statement(statement, &|o: &Operand| self.load(&cmd.bindings, o))?;
            let id = cmd.bindings.get(&statement.dest.name)?.id();
            let bytes = encode(out.as_slice(), self.profile);
            let buf = self
                .buffers
                .get_mut(&id)
                .ok_or_else(|| Error::device(format!("buffer {:?} not found", id)))?;
            buf.data = bytes;
            trace!(statement = %statement, "statement complete");
        }
        for (_, handle) in cmd.bindings.iter() {
            if let Some(buf) = self.buffers.get_mut(&handle.id()) {
                buf.pending = false;
            }
        }
        self.stats.dispatches += 1;
        Ok(())
    }
}

impl KernelBackend for SimulatedDevice {
    fn device(&self) -> &ActiveDevice {
        &self.device
    }

    fn upload(&mut self, host: &HostBuffer, usage: BufferUsage) -> Result<DeviceBuffer> {
        if !usage.contains(BufferUsage::COPY_DST) {
            return Err(Error::device(format!(
                "cannot upload into a buffer without COPY_DST ({:?})",
                usage
            )));
        }
        let size = (host.len() * self.profile.element_size()) as u64;
        let limit = self.device.info.limits.max_buffer_size;
        if size > limit {
            return Err(Error::device(format!(
                "buffer size {} exceeds limit {}",
                size, limit
            )));
        }
        let id = BufferId(self.next_buffer_id);
        self.next_buffer_id += 1;
        let data = encode(host.as_slice(), self.profile);
        self.stats.bytes_written += data.len() as u64;
        self.buffers.insert(
            id,
            GpuBuffer {
                shape: host.shape(),
                usage,
                data,
                pending: false,
            },
        );
        self.stats.buffers_created += 1;
        Ok(DeviceBuffer::new(id, host.shape()))
    }

    fn execute(&mut self, op: &CustomOperation, bindings: &Bindings) -> Result<()> {
        if op.is_empty() {
            return Err(Error::invalid_expression("operation has no statements"));
        }
        for statement in op.statements() {
            for operand in std::iter::once(&statement.dest).chain(statement.value.operand_refs()) {
                let handle = bindings.get(&operand.name)?;
                let buf = self.buffer(handle.id())?;
                if buf.shape != handle.shape() {
                    return Err(Error::device(format!(
                        "binding '{}' is {} but buffer holds {}",
                        operand.name,
                        handle.shape(),
                        buf.shape
                    )));
                }
                check_kind(operand, buf.shape)?;
            }
        }
        let destinations = op.destinations();
        for dest in &destinations {
            let buf = self.buffer(bindings.get(&dest.name)?.id())?;
            if !buf.usage.contains(BufferUsage::STORAGE) {
                return Err(Error::device(format!(
                    "'{}' is bound to a read-only buffer",
                    dest.name
                )));
            }
        }
        for dest in destinations {
            let id = bindings.get(&dest.name)?.id();
            if let Some(buf) = self.buffers.get_mut(&id) {
                buf.pending = true;
            }
        }
        self.queue.push_back(Command {
            op: op.clone(),
            bindings: bindings.clone(),
        });
        debug!(queued = self.queue.len(), "enqueued operation");
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        while let Some(cmd) = self.queue.pop_front() {
            if let Err(e) = self.run(cmd) {
                self.queue.clear();
                for buf in self.buffers.values_mut() {
                    buf.pending = false;
                }
                return Err(e);
            }
        }
        self.stats.barriers += 1;
        Ok(())
    }

    fn read_back(&mut self, buffer: &DeviceBuffer) -> Result<HostBuffer> {
        let buf = self.buffer(buffer.id())?;
        if !buf.usage.contains(BufferUsage::COPY_SRC) {
            return Err(Error::device(format!(
                "buffer {:?} cannot be read back ({:?})",
                buffer.id(),
                buf.usage
            )));
        }
        if buf.pending {
            return Err(Error::device(format!(
                "buffer {:?} read before finish()",
                buffer.id()
            )));
        }
        let host = HostBuffer::from_vec(buf.shape, decode(&buf.data, self.profile))?;
        self.stats.bytes_read += buf.data.len() as u64;
        Ok(host)
    }

    fn release(&mut self, buffer: DeviceBuffer) -> Result<()> {
        self.buffers
            .remove(&buffer.id())
            .ok_or_else(|| Error::device(format!("buffer {:?} not found", buffer.id())))?;
        self.stats.buffers_destroyed += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Layout;
    use crate::device::{DeviceSelector, SimulatedPlatforms};
    use crate::expr::{reduce_max, repmat};

    fn device(profile: NumericProfile) -> SimulatedDevice {
        let active = DeviceSelector::new(&SimulatedPlatforms::default())
            .unwrap()
            .activate(0)
            .unwrap();
        SimulatedDevice::new(active, profile).unwrap()
    }

    fn bind(dev: &mut SimulatedDevice, pairs: &[(&str, HostBuffer)]) -> Bindings {
        let mut b = Bindings::new();
        for (name, host) in pairs {
            b.insert(*name, dev.upload(host, BufferUsage::OUTPUT).unwrap());
        }
        b
    }

    #[test]
    fn test_execute_is_deferred_until_finish() {
        let mut dev = device(NumericProfile::Double);
        let b = bind(
            &mut dev,
            &[
                ("w", HostBuffer::vector(vec![0.0; 4])),
                ("x", HostBuffer::vector(vec![1.0, 2.0, 3.0, 4.0])),
                ("y", HostBuffer::vector(vec![10.0; 4])),
            ],
        );
        let (w, x, y) = (Operand::vector("w"), Operand::vector("x"), Operand::vector("y"));
        let op = CustomOperation::new().with(w.assign(&x + &y));
        dev.execute(&op, &b).unwrap();
        assert_eq!(dev.queued(), 1);

        let err = dev.read_back(b.get("w").unwrap()).unwrap_err();
        assert!(matches!(err, Error::DeviceExecution(_)));
        // inputs are not written by the queued work
        assert!(dev.read_back(b.get("x").unwrap()).is_ok());

        dev.finish().unwrap();
        let out = dev.read_back(b.get("w").unwrap()).unwrap();
        assert_eq!(out.as_slice(), &[11.0, 12.0, 13.0, 14.0]);
        assert_eq!(dev.stats().dispatches, 1);
        assert_eq!(dev.stats().barriers, 1);
    }

    #[test]
    fn test_multi_statement_runs_in_order() {
        let mut dev = device(NumericProfile::Double);
        let b = bind(
            &mut dev,
            &[
                ("w", HostBuffer::vector(vec![0.0; 3])),
                ("x", HostBuffer::vector(vec![1.0, 2.0, 3.0])),
                ("s", HostBuffer::scalar(0.0)),
            ],
        );
        let (w, x, s) = (Operand::vector("w"), Operand::vector("x"), Operand::scalar("s"));
        let op = CustomOperation::new()
            .with(w.assign(&x * 2.0))
            .with(s.assign(reduce_max(&w)));
        dev.execute(&op, &b).unwrap();
        dev.finish().unwrap();
        let s = dev.read_back(b.get("s").unwrap()).unwrap();
        assert_eq!(s.scalar_value().unwrap(), 6.0);
    }

    #[test]
    fn test_single_profile_stores_f32() {
        let mut dev = device(NumericProfile::Single);
        let h = HostBuffer::vector(vec![0.1]);
        let buf = dev.upload(&h, BufferUsage::OUTPUT).unwrap();
        assert_eq!(dev.stats().bytes_written, 4);
        let back = dev.read_back(&buf).unwrap();
        assert_eq!(back.as_slice()[0], 0.1f32 as f64);
    }

    #[test]
    fn test_buffer_limit_enforced() {
        let mut dev = device(NumericProfile::Double);
        dev.device.info.limits.max_buffer_size = 16;
        assert!(dev.upload(&HostBuffer::vector(vec![0.0; 2]), BufferUsage::INPUT).is_ok());
        assert!(dev.upload(&HostBuffer::vector(vec![0.0; 3]), BufferUsage::INPUT).is_err());
    }

    #[test]
    fn test_fp64_required_for_double() {
        let mut active = DeviceSelector::new(&SimulatedPlatforms::default())
            .unwrap()
            .activate(1)
            .unwrap();
        active.info.supports_fp64 = false;
        assert!(SimulatedDevice::new(active.clone(), NumericProfile::Double).is_err());
        assert!(SimulatedDevice::new(active, NumericProfile::Single).is_ok());
    }

    #[test]
    fn test_layout_preserved_through_device() {
        let mut dev = device(NumericProfile::Double);
        let p = HostBuffer::matrix_from_fn(2, 3, Layout::RowMajor, |i, j| (i * 3 + j) as f64);
        let b = bind(
            &mut dev,
            &[
                ("P", p.clone()),
                ("C", HostBuffer::zeros(Shape::matrix(4, 6, Layout::ColumnMajor))),
            ],
        );
        let (c, pm) = (Operand::matrix("C"), Operand::matrix("P"));
        dev.execute(&CustomOperation::new().with(c.assign(repmat(&pm, 2, 2))), &b)
            .unwrap();
        dev.finish().unwrap();
        let out = dev.read_back(b.get("C").unwrap()).unwrap();
        assert_eq!(out.shape(), Shape::matrix(4, 6, Layout::ColumnMajor));
        assert_eq!(out.at(3, 4), p.at(1, 1));
    }

    #[test]
    fn test_kind_mismatch_rejected_at_submit() {
        let mut dev = device(NumericProfile::Double);
        let b = bind(&mut dev, &[("x", HostBuffer::vector(vec![1.0]))]);
        let op = CustomOperation::new().with(Operand::matrix("x").assign(1.0));
        assert!(dev.execute(&op, &b).is_err());
        assert_eq!(dev.queued(), 0);
    }

    #[test]
    fn test_usage_flags_enforced() {
        let mut dev = device(NumericProfile::Double);
        let (w, x) = (Operand::vector("w"), Operand::vector("x"));
        let mut b = Bindings::new();
        b.insert("w", dev.upload(&HostBuffer::vector(vec![0.0; 2]), BufferUsage::INPUT).unwrap());
        b.insert("x", dev.upload(&HostBuffer::vector(vec![1.0; 2]), BufferUsage::INPUT).unwrap());

        let err = dev.execute(&CustomOperation::new().with(w.assign(-&x)), &b).unwrap_err();
        assert!(err.to_string().contains("read-only"));
        assert_eq!(dev.queued(), 0);
        assert!(dev.read_back(b.get("x").unwrap()).is_err());
        assert!(dev
            .upload(&HostBuffer::scalar(0.0), BufferUsage::STORAGE)
            .is_err());
    }

    #[test]
    fn test_release() {
        let mut dev = device(NumericProfile::Double);
        let buf = dev.upload(&HostBuffer::scalar(1.0), BufferUsage::INPUT).unwrap();
        dev.release(buf.clone()).unwrap();
        assert_eq!(dev.live_buffers(), 0);
        assert!(dev.release(buf).is_err());
        assert_eq!(dev.stats().buffers_destroyed, 1);
    }
}
