use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::Error;

/// Shared stop flag polled between units of work (elements, rows, sheets,
/// pages). Clones share the same flag; each conversion should own a fresh one.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Error::Cancelled)` once the flag has been set.
    pub fn check(&self) -> Result<(), Error> {
        if self.is_cancelled() {
            log::debug!("cancellation observed");
            return Err(Error::Cancelled);
        }
        Ok(())
    }
}
