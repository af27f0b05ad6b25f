use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::MinterError;

/// Local view of the next nonce of the signer.
///
/// Seeded from the node on initialization and advanced by the submission
/// stage after every batch. Never read back from the node afterwards, so
/// transactions of consecutive batches get consecutive nonces even before
/// the node has seen them.
#[derive(Clone, Debug)]
pub(crate) struct NonceAllocator {
    next: Arc<Mutex<u64>>,
}

impl NonceAllocator {
    pub fn new(next: u64) -> Self {
        Self {
            next: Arc::new(Mutex::new(next)),
        }
    }

    pub fn current(&self) -> u64 {
        *self.next.lock()
    }

    pub fn reset(&self, next: u64) {
        let mut guard = self.next.lock();
        info!(old = *guard, new = next, "Resetting next nonce");
        *guard = next;
    }

    /// Nonce of the item at `index` in a batch starting at `base`
    pub fn nonce_at(base: u64, index: usize) -> Result<u64, MinterError> {
        let index = u64::try_from(index).map_err(|_| MinterError::NonceOverflow)?;
        base.checked_add(index).ok_or(MinterError::NonceOverflow)
    }

    /// Move past a batch of `count` transactions, returning the new next nonce
    pub fn advance(&self, count: usize) -> Result<u64, MinterError> {
        let mut guard = self.next.lock();
        let advanced = Self::nonce_at(*guard, count)?;
        debug!(from = *guard, to = advanced, "Advancing next nonce");
        *guard = advanced;
        Ok(advanced)
    }
}
