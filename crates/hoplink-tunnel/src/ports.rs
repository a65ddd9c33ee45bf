//! Ephemeral local-port allocation.

use std::collections::HashSet;

use parking_lot::Mutex;

use hoplink_core::defaults::{EPHEMERAL_PORT_CEIL, EPHEMERAL_PORT_FLOOR};
use hoplink_core::HopError;

/// Hands out local ports for tunnels whose `local_port` is zero.
///
/// Allocation can fail; exhaustion surfaces as
/// [`HopError::ResourceExhausted`] and is not retried.
pub trait PortAllocator: Send + Sync {
    fn allocate(&self) -> Result<u16, HopError>;
    fn release(&self, port: u16);
}

struct AllocatorState {
    next: u16,
    in_use: HashSet<u16>,
}

/// In-process allocator cycling through a fixed port range.
pub struct EphemeralPortAllocator {
    floor: u16,
    ceil: u16,
    state: Mutex<AllocatorState>,
}

impl EphemeralPortAllocator {
    pub fn new() -> Self {
        Self::with_range(EPHEMERAL_PORT_FLOOR, EPHEMERAL_PORT_CEIL)
    }

    /// Allocator over `floor..=ceil`. Panics if the range is empty.
    pub fn with_range(floor: u16, ceil: u16) -> Self {
        assert!(floor <= ceil, "empty port range");
        Self {
            floor,
            ceil,
            state: Mutex::new(AllocatorState {
                next: floor,
                in_use: HashSet::new(),
            }),
        }
    }
}

impl Default for EphemeralPortAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl PortAllocator for EphemeralPortAllocator {
    fn allocate(&self) -> Result<u16, HopError> {
        let mut state = self.state.lock();
        let span = u32::from(self.ceil) - u32::from(self.floor) + 1;
        let start = u32::from(state.next) - u32::from(self.floor);
        for i in 0..span {
            let offset = (start + i) % span;
            let candidate = self.floor + offset as u16;
            if state.in_use.insert(candidate) {
                state.next = if candidate == self.ceil {
                    self.floor
                } else {
                    candidate + 1
                };
                return Ok(candidate);
            }
        }
        Err(HopError::ResourceExhausted(
            "no ephemeral ports available".into(),
        ))
    }

    fn release(&self, port: u16) {
        self.state.lock().in_use.remove(&port);
    }
}
