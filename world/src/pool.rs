//! Circular store for short-lived integers attached to messages.
//!
//! A value handed out by the pool survives only until the write cursor wraps
//! around and reissues its slot, `capacity` allocations later. Raw [`get`]
//! references carry no protection against that reuse; values allocated
//! through [`alloc`] are addressed by generation-checked handles so a stale
//! read is reported instead of silently observing a newer value.
//!
//! [`get`]: EphemeralPool::get
//! [`alloc`]: EphemeralPool::alloc

use fsm_relay_core::{ConfigurationError, EphemeralHandle, PoolError, DEFAULT_POOL_CAPACITY};

/// Fixed-capacity circular pool of reusable `i32` slots.
#[derive(Clone, Debug)]
pub struct EphemeralPool {
    values: Vec<i32>,
    generations: Vec<u32>,
    cursor: usize,
}

impl EphemeralPool {
    /// Creates a pool with `capacity` zeroed slots.
    pub fn with_capacity(capacity: usize) -> Result<Self, ConfigurationError> {
        if capacity == 0 {
            return Err(ConfigurationError::ZeroPoolCapacity);
        }

        Ok(Self::filled(capacity))
    }

    /// Number of slots in the pool.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.values.len()
    }

    /// Slot that the next allocation will reuse.
    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Claims the slot under the cursor and returns a reference to it.
    ///
    /// The slot still holds whatever its previous user left behind.
    pub fn get(&mut self) -> &mut i32 {
        let slot = self.claim();
        &mut self.values[slot]
    }

    /// Stores `value` in the next slot and returns a handle to it.
    pub fn alloc(&mut self, value: i32) -> EphemeralHandle {
        let slot = self.claim();
        self.values[slot] = value;
        EphemeralHandle::new(slot as u32, self.generations[slot])
    }

    /// Reads the value behind a handle.
    pub fn read(&self, handle: EphemeralHandle) -> Result<i32, PoolError> {
        let slot = self.resolve(handle)?;
        Ok(self.values[slot])
    }

    /// Overwrites the value behind a handle without reissuing its slot.
    pub fn write(&mut self, handle: EphemeralHandle, value: i32) -> Result<(), PoolError> {
        let slot = self.resolve(handle)?;
        self.values[slot] = value;
        Ok(())
    }

    /// Rewinds the cursor and invalidates every outstanding handle.
    pub fn reset(&mut self) {
        self.cursor = 0;
        for generation in &mut self.generations {
            *generation = generation.wrapping_add(1);
        }
    }

    fn filled(capacity: usize) -> Self {
        Self {
            values: vec![0; capacity],
            generations: vec![0; capacity],
            cursor: 0,
        }
    }

    fn claim(&mut self) -> usize {
        let slot = self.cursor;
        self.cursor = (self.cursor + 1) % self.values.len();
        self.generations[slot] = self.generations[slot].wrapping_add(1);
        slot
    }

    fn resolve(&self, handle: EphemeralHandle) -> Result<usize, PoolError> {
        let slot = handle.slot() as usize;
        let current = *self
            .generations
            .get(slot)
            .ok_or(PoolError::UnknownSlot {
                slot: handle.slot(),
                capacity: self.capacity(),
            })?;
        if current != handle.generation() {
            return Err(PoolError::Stale {
                slot: handle.slot(),
                generation: handle.generation(),
                current,
            });
        }
        Ok(slot)
    }
}

impl Default for EphemeralPool {
    fn default() -> Self {
        Self::filled(DEFAULT_POOL_CAPACITY)
    }
}
