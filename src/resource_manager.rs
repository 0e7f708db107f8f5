//! Resource management

use crate::error::Lev2Error;

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// [crate::resource_manager::ResourceManager] bounds the number of reduction jobs running at
/// once. Each job holds a worker slot, a permit of a Tokio Semaphore, for as long as its
/// reduction process runs. Permits are owned so they can move into spawned tasks.
#[derive(Debug)]
pub struct ResourceManager {
    /// Semaphore with one permit per worker slot.
    slots: Arc<Semaphore>,

    /// Total number of worker slots.
    total_slots: usize,
}

impl ResourceManager {
    /// Returns a new ResourceManager object with `slot_limit` worker slots (at least one).
    pub fn new(slot_limit: usize) -> Self {
        let total_slots = slot_limit.max(1);
        Self {
            slots: Arc::new(Semaphore::new(total_slots)),
            total_slots,
        }
    }

    /// Acquire a worker slot, waiting until one is free.
    pub async fn worker_slot(&self) -> Result<OwnedSemaphorePermit, Lev2Error> {
        self.slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|err| err.into())
    }

    /// Number of worker slots currently free.
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    /// Total number of worker slots.
    pub fn total_slots(&self) -> usize {
        self.total_slots
    }
}

/// Default number of worker slots: one less than the number of CPUs, but at least one.
pub fn default_slot_limit() -> usize {
    num_cpus::get().saturating_sub(1).max(1)
}
