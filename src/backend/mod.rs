//! Subject-under-test boundary
//!
//! A [`KernelBackend`] is anything that can take a [`CustomOperation`], run it
//! on device-resident buffers, and hand results back after a synchronization
//! barrier. Work submitted through [`KernelBackend::execute`] may still be in
//! flight when the call returns; nothing is read back until
//! [`KernelBackend::finish`] has drained the queue.

pub mod kernel;
pub mod simulated;

pub use simulated::SimulatedDevice;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::buffer::{HostBuffer, Shape};
use crate::device::ActiveDevice;
use crate::error::{Error, Result};
use crate::expr::CustomOperation;

// ---------------------------------------------------------------------------
// Device buffers
// ---------------------------------------------------------------------------

/// Unique identifier for a device buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BufferId(pub u64);

bitflags! {
    /// How a device buffer may be used.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// Kernels may write it
        const STORAGE = 1;
        /// Kernels may only read it
        const UNIFORM = 1 << 1;
        /// The host may read it back
        const COPY_SRC = 1 << 2;
        /// The host may fill it
        const COPY_DST = 1 << 3;
    }
}

impl BufferUsage {
    /// Operand an operation only reads.
    pub const INPUT: Self = Self::UNIFORM.union(Self::COPY_DST);
    /// Operand an operation writes and the host reads back.
    pub const OUTPUT: Self = Self::STORAGE.union(Self::COPY_DST).union(Self::COPY_SRC);
}

/// Handle to a device-resident buffer. The backend owns the storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceBuffer {
    id: BufferId,
    shape: Shape,
}

impl DeviceBuffer {
    pub fn new(id: BufferId, shape: Shape) -> Self {
        Self { id, shape }
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }
}

/// Operand name to device buffer map for one operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings {
    buffers: BTreeMap<String, DeviceBuffer>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, buffer: DeviceBuffer) {
        self.buffers.insert(name.into(), buffer);
    }

    pub fn get(&self, name: &str) -> Result<&DeviceBuffer> {
        self.buffers
            .get(name)
            .ok_or_else(|| Error::UnknownOperand(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DeviceBuffer)> {
        self.buffers.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Drain every binding, for releasing the underlying buffers.
    pub fn into_buffers(self) -> impl Iterator<Item = DeviceBuffer> {
        self.buffers.into_values()
    }
}

// ---------------------------------------------------------------------------
// Backend contract
// ---------------------------------------------------------------------------

/// Kernel-generation and execution backend under test.
pub trait KernelBackend {
    /// The device this backend was constructed for.
    fn device(&self) -> &ActiveDevice;

    /// Copy a host buffer to a new device buffer of the same shape.
    fn upload(&mut self, host: &HostBuffer, usage: BufferUsage) -> Result<DeviceBuffer>;

    /// Submit `op` for execution against `bindings`. May return before the
    /// work has completed.
    fn execute(&mut self, op: &CustomOperation, bindings: &Bindings) -> Result<()>;

    /// Blocking barrier: returns once every submitted operation has finished.
    fn finish(&mut self) -> Result<()>;

    /// Copy a device buffer back to the host. Shape is preserved exactly.
    fn read_back(&mut self, buffer: &DeviceBuffer) -> Result<HostBuffer>;

    /// Free a device buffer.
    fn release(&mut self, buffer: DeviceBuffer) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_usage_presets() {
        assert!(BufferUsage::OUTPUT.contains(BufferUsage::STORAGE | BufferUsage::COPY_SRC));
        assert!(BufferUsage::INPUT.contains(BufferUsage::COPY_DST));
        assert!(!BufferUsage::INPUT.intersects(BufferUsage::STORAGE | BufferUsage::COPY_SRC));
    }

    #[test]
    fn test_bindings_lookup() {
        let mut b = Bindings::new();
        b.insert("x", DeviceBuffer::new(BufferId(1), Shape::Vector(4)));
        assert_eq!(b.get("x").unwrap().id(), BufferId(1));
        assert!(matches!(b.get("y"), Err(Error::UnknownOperand(_))));
        assert_eq!(b.into_buffers().count(), 1);
    }
}
