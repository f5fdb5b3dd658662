//! Service slots for concurrently running contexts.
//!
//! Slot [`BLOCK_FACTORY`] belongs to block production and [`CHAIN_SERVICE`]
//! to chain validation; queries take the remaining slots round-robin.

use crate::error::VmError;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::thread;
use std::time::Duration;
use tracing::debug;

pub const BLOCK_FACTORY: usize = 0;
pub const CHAIN_SERVICE: usize = 1;
pub const DEFAULT_MAX_CONTEXT: usize = 24;

const RETRY_DELAY: Duration = Duration::from_millis(100);

struct SlotTable {
    used: Vec<bool>,
    last: usize,
}

static SLOTS: Lazy<Mutex<SlotTable>> = Lazy::new(|| {
    Mutex::new(SlotTable {
        used: vec![false; DEFAULT_MAX_CONTEXT],
        last: CHAIN_SERVICE,
    })
});

/// Resizes the slot table. Call before any query runs.
pub fn init_context(max_context: usize) {
    let mut slots = SLOTS.lock();
    slots.used = vec![false; max_context];
    slots.last = CHAIN_SERVICE;
}

pub fn max_context() -> usize {
    SLOTS.lock().used.len()
}

/// A query slot, freed on drop.
#[derive(Debug)]
pub struct SlotGuard {
    service: usize,
}

impl SlotGuard {
    pub fn service(&self) -> usize {
        self.service
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        let mut slots = SLOTS.lock();
        if let Some(used) = slots.used.get_mut(self.service) {
            *used = false;
        }
    }
}

/// Takes the next free query slot, waiting while all are busy.
pub fn alloc_query_slot() -> Result<SlotGuard, VmError> {
    loop {
        {
            let mut slots = SLOTS.lock();
            let max = slots.used.len();
            if max <= CHAIN_SERVICE + 1 {
                return Err(VmError::system("no context slot is available for queries"));
            }
            let query_slots = max - CHAIN_SERVICE - 1;
            for step in 1..=query_slots {
                let service = CHAIN_SERVICE + 1 + (slots.last + step - CHAIN_SERVICE - 1) % query_slots;
                if !slots.used[service] {
                    slots.used[service] = true;
                    slots.last = service;
                    return Ok(SlotGuard { service });
                }
            }
        }
        debug!("all query slots are busy");
        thread::sleep(RETRY_DELAY);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_slots_skip_reserved() {
        let a = alloc_query_slot().unwrap();
        let b = alloc_query_slot().unwrap();
        assert!(a.service() > CHAIN_SERVICE);
        assert!(b.service() > CHAIN_SERVICE);
        assert_ne!(a.service(), b.service());
        drop(a);
        drop(b);
        assert!(alloc_query_slot().is_ok());
    }
}
