//! Device memory handles
//!
//! [`DeviceMemory`] is a non-owning description of a device region: an opaque
//! address and a size. Callers own the memory behind it; the engine only
//! passes handles around for the duration of a call. [`ScopedBuffer`] is the
//! owning counterpart used for results allocated by an executable.

use std::fmt;
use std::sync::Arc;

use log::warn;

use super::traits::DeviceAllocator;

/// Non-owning handle to a region of device memory.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceMemory {
    opaque: u64,
    size: usize,
}

impl DeviceMemory {
    /// Wrap a device address and size.
    pub fn new(opaque: u64, size: usize) -> Self {
        Self { opaque, size }
    }

    /// A zero-sized handle that refers to nothing.
    pub fn null() -> Self {
        Self { opaque: 0, size: 0 }
    }

    /// Device address (backend defined)
    pub fn opaque(&self) -> u64 {
        self.opaque
    }

    /// Size in bytes
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_null(&self) -> bool {
        self.opaque == 0
    }
}

impl fmt::Debug for DeviceMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceMemory({:#x}, {} bytes)", self.opaque, self.size)
    }
}

/// Device memory owned by this value and released to its allocator on drop.
pub struct ScopedBuffer {
    memory: DeviceMemory,
    device_ordinal: usize,
    allocator: Arc<dyn DeviceAllocator>,
}

impl ScopedBuffer {
    pub fn new(
        memory: DeviceMemory,
        device_ordinal: usize,
        allocator: Arc<dyn DeviceAllocator>,
    ) -> Self {
        Self {
            memory,
            device_ordinal,
            allocator,
        }
    }

    /// Allocate `size` bytes on `device_ordinal` and take ownership of them.
    pub fn allocate(
        allocator: &Arc<dyn DeviceAllocator>,
        device_ordinal: usize,
        size: usize,
    ) -> Result<Self, crate::error::DeviceError> {
        let memory = allocator.allocate(device_ordinal, size)?;
        Ok(Self::new(memory, device_ordinal, Arc::clone(allocator)))
    }

    /// The root buffer of the result
    pub fn root_buffer(&self) -> &DeviceMemory {
        &self.memory
    }

    pub fn device_ordinal(&self) -> usize {
        self.device_ordinal
    }
}

impl fmt::Debug for ScopedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedBuffer")
            .field("memory", &self.memory)
            .field("device_ordinal", &self.device_ordinal)
            .finish()
    }
}

impl Drop for ScopedBuffer {
    fn drop(&mut self) {
        if self.memory.is_null() {
            return;
        }
        if let Err(e) = self.allocator.deallocate(self.device_ordinal, self.memory) {
            warn!("Failed to release {:?}: {}", self.memory, e);
        }
    }
}
