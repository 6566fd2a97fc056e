//! Single-flight inference guard
//!
//! Admits at most one live inference at a time. Contenders are rejected
//! rather than queued, so a slow engine never builds up a backlog of frames.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Atomic busy flag shared by the live pipeline
#[derive(Debug, Default)]
pub struct SingleFlight {
    busy: AtomicBool,
}

impl SingleFlight {
    /// Create an idle guard
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to become the single in-flight caller
    pub fn try_acquire(&self) -> bool {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Release the flag. Only the current holder may call this.
    pub fn release(&self) {
        self.busy.store(false, Ordering::Release);
    }

    /// Whether an inference is currently in flight
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Acquire a permit that releases the flag when dropped
    pub fn try_permit(self: &Arc<Self>) -> Option<FlightPermit> {
        self.try_acquire().then(|| FlightPermit {
            flight: Arc::clone(self),
        })
    }
}

/// Ownership of the in-flight slot; released on drop, including on panic
#[derive(Debug)]
pub struct FlightPermit {
    flight: Arc<SingleFlight>,
}

impl Drop for FlightPermit {
    fn drop(&mut self) {
        self.flight.release();
    }
}
