//! Advisory device leases
//!
//! Timing a kernel is only meaningful if nothing else runs on the device at
//! the same time. [`DeviceLocks`] keeps one slot per device ordinal: an
//! [`ExclusiveLease`] is granted when no other lease is held, a
//! [`SharedLease`] when no exclusive lease is held or waiting.
//!
//! The leases are a convention, not a driver-level lock. Work submitted
//! without asking for a lease is not held back; only executions that take a
//! shared lease when run without the exclusive one cooperate.
//!
//! A thread must not request an exclusive lease while it holds a shared one
//! on the same device: it would wait for itself.

use std::fmt;
use std::sync::{Arc, Condvar, LazyLock, Mutex, MutexGuard, PoisonError};

use log::trace;
use rustc_hash::FxHashMap;

static GLOBAL_LOCKS: LazyLock<DeviceLocks> = LazyLock::new(DeviceLocks::new);

#[derive(Debug, Default)]
struct SlotState {
    exclusive: bool,
    exclusive_waiting: usize,
    shared: usize,
}

#[derive(Debug, Default)]
struct DeviceSlot {
    state: Mutex<SlotState>,
    released: Condvar,
}

impl DeviceSlot {
    fn state(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, SlotState>) -> MutexGuard<'a, SlotState> {
        self.released
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Registry of per-device lease slots
#[derive(Debug, Default)]
pub struct DeviceLocks {
    slots: Mutex<FxHashMap<usize, Arc<DeviceSlot>>>,
}

impl DeviceLocks {
    /// Create an empty registry (useful for isolated tests)
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry
    pub fn global() -> &'static DeviceLocks {
        &GLOBAL_LOCKS
    }

    fn slot(&self, device_ordinal: usize) -> Arc<DeviceSlot> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(device_ordinal).or_default())
    }

    /// Block until the device is free, then hold it exclusively.
    pub fn acquire_exclusive(&self, device_ordinal: usize) -> ExclusiveLease {
        let slot = self.slot(device_ordinal);
        {
            let mut state = slot.state();
            state.exclusive_waiting += 1;
            while state.exclusive || state.shared > 0 {
                state = slot.wait(state);
            }
            state.exclusive_waiting -= 1;
            state.exclusive = true;
        }
        trace!("Exclusive lease acquired on device {device_ordinal}");
        ExclusiveLease {
            device_ordinal,
            slot,
        }
    }

    /// Take the exclusive lease only if the device is free right now.
    pub fn try_acquire_exclusive(&self, device_ordinal: usize) -> Option<ExclusiveLease> {
        let slot = self.slot(device_ordinal);
        {
            let mut state = slot.state();
            if state.exclusive || state.shared > 0 {
                return None;
            }
            state.exclusive = true;
        }
        Some(ExclusiveLease {
            device_ordinal,
            slot,
        })
    }

    /// Block while an exclusive lease is held or requested, then register
    /// as a shared user of the device.
    pub fn acquire_shared(&self, device_ordinal: usize) -> SharedLease {
        let slot = self.slot(device_ordinal);
        {
            let mut state = slot.state();
            while state.exclusive || state.exclusive_waiting > 0 {
                state = slot.wait(state);
            }
            state.shared += 1;
        }
        SharedLease {
            device_ordinal,
            slot,
        }
    }

    /// Whether an exclusive lease is currently held on the device
    pub fn is_exclusively_held(&self, device_ordinal: usize) -> bool {
        self.slot(device_ordinal).state().exclusive
    }
}

/// Exclusive execution window on one device; released on drop.
pub struct ExclusiveLease {
    device_ordinal: usize,
    slot: Arc<DeviceSlot>,
}

impl ExclusiveLease {
    pub fn device_ordinal(&self) -> usize {
        self.device_ordinal
    }
}

impl fmt::Debug for ExclusiveLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExclusiveLease(device={})", self.device_ordinal)
    }
}

impl Drop for ExclusiveLease {
    fn drop(&mut self) {
        self.slot.state().exclusive = false;
        self.slot.released.notify_all();
        trace!("Exclusive lease released on device {}", self.device_ordinal);
    }
}

/// Cooperative, non-exclusive use of one device; released on drop.
pub struct SharedLease {
    device_ordinal: usize,
    slot: Arc<DeviceSlot>,
}

impl SharedLease {
    pub fn device_ordinal(&self) -> usize {
        self.device_ordinal
    }
}

impl fmt::Debug for SharedLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedLease(device={})", self.device_ordinal)
    }
}

impl Drop for SharedLease {
    fn drop(&mut self) {
        self.slot.state().shared -= 1;
        self.slot.released.notify_all();
    }
}
