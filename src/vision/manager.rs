//! Engine lifecycle management
//!
//! Owns the single live OCR engine handle and serializes inference, creation,
//! swapping and teardown. Every handle is tagged with an epoch; callers pass the
//! epoch they observed so results computed against a replaced engine can be
//! recognized and dropped.

use parking_lot::{Condvar, Mutex, RwLock};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tracing::{debug, error, info, warn};

use super::engine::{Accelerator, Benchmark, EngineFactory, OcrEngine};
use super::ocr::OcrResult;
use crate::capture::frame::Frame;
use crate::error::EngineError;

/// Version tag of an engine handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Epoch(pub u64);

impl std::fmt::Display for Epoch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Observable lifecycle state of the engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineState {
    Uninitialized,
    Loading,
    Ready { accelerator: Accelerator, epoch: Epoch },
    /// Initialization failed; stays here until the user retries
    Failed(String),
    Closed,
}

impl EngineState {
    #[cfg(test)]
    pub fn is_ready(&self) -> bool {
        matches!(self, EngineState::Ready { .. })
    }
}

/// Results of one inference together with the engine's timing for it
#[derive(Debug, Clone)]
pub struct TimedInference {
    pub results: Vec<OcrResult>,
    pub benchmark: Benchmark,
}

struct EngineSlot {
    engine: Option<Box<dyn OcrEngine>>,
    epoch: u64,
    closed: bool,
}

/// Exclusive owner of the OCR engine handle
pub struct EngineManager {
    factory: Box<dyn EngineFactory>,
    slot: Mutex<EngineSlot>,
    /// Signalled whenever a swap finishes
    swapped: Condvar,
    pending_swaps: AtomicUsize,
    epoch: AtomicU64,
    state: RwLock<EngineState>,
}

impl EngineManager {
    /// Create a manager with no engine loaded yet
    pub fn new(factory: Box<dyn EngineFactory>) -> Self {
        Self {
            factory,
            slot: Mutex::new(EngineSlot {
                engine: None,
                epoch: 0,
                closed: false,
            }),
            swapped: Condvar::new(),
            pending_swaps: AtomicUsize::new(0),
            epoch: AtomicU64::new(0),
            state: RwLock::new(EngineState::Uninitialized),
        }
    }

    /// Get a snapshot of the lifecycle state
    pub fn state(&self) -> EngineState {
        self.state.read().clone()
    }

    /// Accelerator of the current engine, if one is loaded
    pub fn active_accelerator(&self) -> Option<Accelerator> {
        match *self.state.read() {
            EngineState::Ready { accelerator, .. } => Some(accelerator),
            _ => None,
        }
    }

    /// Epoch of the current handle, to be passed back into [`infer`](Self::infer)
    pub fn current_epoch(&self) -> Epoch {
        Epoch(self.epoch.load(Ordering::Acquire))
    }

    /// Whether a handle observed at `epoch` is still the live one
    pub fn is_current(&self, epoch: Epoch) -> bool {
        self.current_epoch() == epoch
    }

    /// Whether a reconfiguration is waiting for or holding the engine
    pub fn swap_pending(&self) -> bool {
        self.pending_swaps.load(Ordering::SeqCst) > 0
    }

    /// Load the engine with the given accelerator preference.
    ///
    /// Returns the accelerator the engine actually activated.
    pub fn initialize(&self, preference: Accelerator) -> Result<Accelerator, EngineError> {
        info!("Initializing OCR engine (requested {})", preference);
        self.swap(preference)
    }

    /// Initialize only if no engine has been loaded yet
    pub fn ensure_initialized(&self, preference: Accelerator) -> Result<Accelerator, EngineError> {
        match self.state() {
            EngineState::Ready { accelerator, .. } => Ok(accelerator),
            EngineState::Uninitialized => self.initialize(preference),
            EngineState::Loading => {
                // Someone else is swapping; wait for the slot and look again.
                drop(self.slot.lock());
                self.active_accelerator().ok_or(EngineError::NotReady)
            }
            EngineState::Failed(msg) => Err(EngineError::Initialization(msg)),
            EngineState::Closed => Err(EngineError::Closed),
        }
    }

    /// Replace the engine with one built for a new accelerator.
    ///
    /// New inference requests wait while the swap is pending, in-flight work
    /// finishes first, and the old handle is destroyed before the new one is created.
    pub fn reconfigure(&self, preference: Accelerator) -> Result<Accelerator, EngineError> {
        info!("Reconfiguring OCR engine (requested {})", preference);
        self.swap(preference)
    }

    fn swap(&self, preference: Accelerator) -> Result<Accelerator, EngineError> {
        self.pending_swaps.fetch_add(1, Ordering::SeqCst);
        let _pending = PendingSwap { manager: self };
        let mut slot = self.slot.lock();
        self.swap_locked(&mut slot, preference)
    }

    fn swap_locked(
        &self,
        slot: &mut EngineSlot,
        preference: Accelerator,
    ) -> Result<Accelerator, EngineError> {
        if slot.closed {
            return Err(EngineError::Closed);
        }

        *self.state.write() = EngineState::Loading;

        if let Some(old) = slot.engine.take() {
            drop(old);
            debug!("Destroyed OCR engine epoch {}", slot.epoch);
        }
        slot.epoch += 1;
        self.epoch.store(slot.epoch, Ordering::Release);

        match self.factory.create(preference) {
            Ok(engine) => {
                let accelerator = engine.active_accelerator();
                if accelerator != preference {
                    warn!(
                        "OCR engine fell back to {} (requested {})",
                        accelerator, preference
                    );
                }
                slot.engine = Some(engine);
                *self.state.write() = EngineState::Ready {
                    accelerator,
                    epoch: Epoch(slot.epoch),
                };
                info!(
                    "OCR engine ready on {} (epoch {})",
                    accelerator, slot.epoch
                );
                Ok(accelerator)
            }
            Err(e) => {
                let message = match e {
                    EngineError::Initialization(msg) => msg,
                    other => other.to_string(),
                };
                error!("OCR engine initialization failed: {}", message);
                *self.state.write() = EngineState::Failed(message.clone());
                Err(EngineError::Initialization(message))
            }
        }
    }

    /// Run inference against the handle observed at `epoch`.
    ///
    /// Fails with [`EngineError::Stale`] if the engine was replaced since.
    pub fn infer(&self, epoch: Epoch, frame: &Frame) -> Result<Vec<OcrResult>, EngineError> {
        self.run(epoch, frame, |engine, frame| engine.recognize(frame))
    }

    /// Like [`infer`](Self::infer), also returning the engine benchmark for this call
    pub fn infer_timed(&self, epoch: Epoch, frame: &Frame) -> Result<TimedInference, EngineError> {
        self.run(epoch, frame, |engine, frame| {
            let results = engine.recognize(frame)?;
            Ok(TimedInference {
                results,
                benchmark: engine.benchmark(),
            })
        })
    }

    fn run<T>(
        &self,
        epoch: Epoch,
        frame: &Frame,
        f: impl FnOnce(&mut dyn OcrEngine, &Frame) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let mut slot = self.slot.lock();
        while self.pending_swaps.load(Ordering::SeqCst) > 0 {
            self.swapped.wait(&mut slot);
        }

        if slot.closed {
            return Err(EngineError::Closed);
        }
        if slot.epoch != epoch.0 {
            return Err(EngineError::Stale(epoch.0));
        }

        let engine = slot.engine.as_deref_mut().ok_or(EngineError::NotReady)?;
        let output = f(engine, frame)?;

        // A swap requested mid-inference supersedes this result
        if self.pending_swaps.load(Ordering::SeqCst) > 0 {
            return Err(EngineError::Stale(epoch.0));
        }
        Ok(output)
    }

    /// Release the engine. Safe to call more than once.
    pub fn close(&self) {
        let mut slot = self.slot.lock();
        if slot.closed {
            return;
        }

        slot.closed = true;
        if slot.engine.take().is_some() {
            debug!("Destroyed OCR engine epoch {}", slot.epoch);
        }
        slot.epoch += 1;
        self.epoch.store(slot.epoch, Ordering::Release);
        *self.state.write() = EngineState::Closed;
        self.swapped.notify_all();
        info!("OCR engine closed");
    }
}

/// Marks a swap as pending until dropped, including when engine creation panics
struct PendingSwap<'a> {
    manager: &'a EngineManager,
}

impl Drop for PendingSwap<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            error!("OCR engine creation panicked");
            *self.manager.state.write() =
                EngineState::Failed("engine creation panicked".to_string());
        }
        self.manager.pending_swaps.fetch_sub(1, Ordering::SeqCst);
        self.manager.swapped.notify_all();
    }
}
