//! The operation session table.
//!
//! A fixed-capacity array of slots mapping opaque 64-bit handles to live
//! operations. Handles are drawn from the system RNG, never zero, and a slot
//! is zeroed on release so a finished handle cannot be used again. Capacity
//! never grows; when the table is full the caller must finish or abort
//! something first.

use rand::rngs::OsRng;
use rand::RngCore;
use tracing::warn;

use crate::error::ErrorCode;
use crate::ops::Operation;

struct TableEntry {
    handle: u64,
    operation: Box<dyn Operation>,
}

pub(crate) struct OperationTable {
    slots: Vec<Option<TableEntry>>,
}

impl OperationTable {
    pub(crate) fn new(size: usize) -> Self {
        let mut slots = Vec::with_capacity(size);
        slots.resize_with(size, || None);
        OperationTable { slots }
    }

    /// Insert an operation, returning its fresh handle
    pub(crate) fn add(&mut self, operation: Box<dyn Operation>) -> Result<u64, ErrorCode> {
        let mut handle = OsRng.next_u64();
        if handle == 0 {
            // Vanishingly unlikely from a healthy RNG; one retry, then treat
            // the RNG as broken and fail closed.
            handle = OsRng.next_u64();
            if handle == 0 {
                warn!("operation handle RNG returned zero twice");
                return Err(ErrorCode::UnknownError);
            }
        }

        match self.slots.iter_mut().find(|slot| slot.is_none()) {
            Some(slot) => {
                *slot = Some(TableEntry { handle, operation });
                Ok(handle)
            }
            None => Err(ErrorCode::TooManyOperations),
        }
    }

    /// Borrow the operation registered under `handle`
    pub(crate) fn find(&mut self, handle: u64) -> Option<&mut (dyn Operation + 'static)> {
        if handle == 0 {
            return None;
        }
        self.slots
            .iter_mut()
            .flatten()
            .find(|entry| entry.handle == handle)
            .map(|entry| &mut *entry.operation)
    }

    /// Destroy the operation registered under `handle` and zero its slot
    pub(crate) fn release(&mut self, handle: u64) -> bool {
        if handle == 0 {
            return false;
        }
        for slot in &mut self.slots {
            if slot.as_ref().is_some_and(|entry| entry.handle == handle) {
                *slot = None;
                return true;
            }
        }
        false
    }

    #[cfg(test)]
    pub(crate) fn live_handles(&self) -> Vec<u64> {
        self.slots
            .iter()
            .flatten()
            .map(|entry| entry.handle)
            .collect()
    }
}
