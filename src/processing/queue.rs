//! FIFO work queue feeding gallery images to the shared engine
//!
//! A single logical worker drains the queue. Whoever enqueues into an idle
//! processor starts it; the worker keeps claiming ids until the queue is empty
//! and then exits, so no scheduler tick is needed to resume it.

use anyhow::{Context, Result};
use crossbeam_channel::Receiver;
use parking_lot::{Condvar, Mutex};
use std::collections::{HashSet, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::capture::frame::Frame;
use crate::shared::{Broadcast, ProcessingState};
use crate::storage::{GalleryImage, GalleryStore};
use crate::vision::{Accelerator, EngineManager};

struct WorkQueue {
    pending: VecDeque<String>,
    state: ProcessingState,
    /// Ids already requeued once after a stale result
    requeued: HashSet<String>,
}

impl WorkQueue {
    fn contains(&self, id: &str) -> bool {
        matches!(&self.state, ProcessingState::Processing(current) if current == id)
            || self.pending.iter().any(|queued| queued == id)
    }
}

/// Result of one unit of work
#[derive(Debug, PartialEq, Eq)]
enum Unit {
    /// Image is gone or already has a result
    Skipped,
    Recognized(usize),
    /// Engine was swapped under the inference; try again on the new one
    Stale,
}

/// Background OCR processor for gallery images
pub struct QueueProcessor {
    store: Arc<GalleryStore>,
    engine: Arc<EngineManager>,
    /// Used when the engine has to be brought up lazily
    default_accelerator: Accelerator,
    queue: Mutex<WorkQueue>,
    /// Signalled when the worker runs out of work
    idle: Condvar,
    state_events: Broadcast<ProcessingState>,
}

impl QueueProcessor {
    pub fn new(
        store: Arc<GalleryStore>,
        engine: Arc<EngineManager>,
        default_accelerator: Accelerator,
    ) -> Self {
        Self {
            store,
            engine,
            default_accelerator,
            queue: Mutex::new(WorkQueue {
                pending: VecDeque::new(),
                state: ProcessingState::Idle,
                requeued: HashSet::new(),
            }),
            idle: Condvar::new(),
            state_events: Broadcast::new(),
        }
    }

    /// Queue an image for OCR and start draining if idle.
    ///
    /// Returns false if the id was already queued or is being processed.
    pub fn enqueue(self: &Arc<Self>, id: impl Into<String>) -> bool {
        let id = id.into();
        let claimed = {
            let mut queue = self.queue.lock();
            if queue.contains(&id) {
                debug!("Image {} already queued", id);
                return false;
            }
            queue.pending.push_back(id);
            self.claim_next(&mut queue)
        };

        if let Some(first) = claimed {
            self.spawn_worker(first);
        }
        true
    }

    /// Queue every image in the store that has no OCR result yet
    pub fn enqueue_all_unprocessed(self: &Arc<Self>) -> usize {
        let queued = self
            .store
            .unprocessed_ids()
            .into_iter()
            .filter(|id| self.enqueue(id.clone()))
            .count();
        if queued > 0 {
            info!("Queued {} unprocessed images", queued);
        }
        queued
    }

    /// Snapshot of ids waiting to be processed, in order
    pub fn pending(&self) -> Vec<String> {
        self.queue.lock().pending.iter().cloned().collect()
    }

    pub fn state(&self) -> ProcessingState {
        self.queue.lock().state.clone()
    }

    /// Subscribe to processing state transitions
    pub fn subscribe_state(&self) -> Receiver<ProcessingState> {
        self.state_events.subscribe()
    }

    /// Block until the queue is empty and nothing is processing.
    ///
    /// Returns false if `timeout` elapsed first.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut queue = self.queue.lock();
        while !(queue.state.is_idle() && queue.pending.is_empty()) {
            if self.idle.wait_until(&mut queue, deadline).timed_out() {
                return queue.state.is_idle() && queue.pending.is_empty();
            }
        }
        true
    }

    /// Enqueue every image announced on `added` until the channel disconnects
    pub fn follow(self: &Arc<Self>, added: Receiver<GalleryImage>) -> std::io::Result<JoinHandle<()>> {
        let processor = Arc::clone(self);
        thread::Builder::new()
            .name("ocr-queue-listener".to_string())
            .spawn(move || {
                for image in added.iter() {
                    if !image.ocr_processed {
                        processor.enqueue(image.id);
                    }
                }
                debug!("Gallery event stream closed, listener exiting");
            })
    }

    /// Take the head of the queue if the worker is idle. Caller holds the lock.
    fn claim_next(&self, queue: &mut WorkQueue) -> Option<String> {
        if !queue.state.is_idle() {
            return None;
        }
        let id = queue.pending.pop_front()?;
        queue.state = ProcessingState::Processing(id.clone());
        self.state_events.publish(queue.state.clone());
        Some(id)
    }

    fn spawn_worker(self: &Arc<Self>, first: String) {
        let processor = Arc::clone(self);
        let id = first.clone();
        let spawned = thread::Builder::new()
            .name("ocr-queue".to_string())
            .spawn(move || processor.drain(first));

        if let Err(e) = spawned {
            warn!("Failed to spawn queue worker: {}", e);
            let mut queue = self.queue.lock();
            queue.pending.push_front(id);
            queue.state = ProcessingState::Idle;
            self.state_events.publish(ProcessingState::Idle);
        }
    }

    fn drain(&self, first: String) {
        let mut id = first;
        loop {
            let retry = match panic::catch_unwind(AssertUnwindSafe(|| self.process(&id))) {
                Ok(retry) => retry,
                Err(_) => {
                    warn!("Processing image {} panicked", id);
                    false
                }
            };

            let mut queue = self.queue.lock();
            if !retry {
                queue.requeued.remove(&id);
            } else if !queue.requeued.insert(id.clone()) {
                warn!("Image {} went stale twice, leaving it for the next scan", id);
                queue.requeued.remove(&id);
            } else if !queue.pending.contains(&id) {
                queue.pending.push_back(id.clone());
            }
            queue.state = ProcessingState::Idle;
            self.state_events.publish(ProcessingState::Idle);

            match self.claim_next(&mut queue) {
                Some(next) => id = next,
                None => {
                    self.idle.notify_all();
                    return;
                }
            }
        }
    }

    /// Run one unit of work. Returns true if the id should be retried.
    fn process(&self, id: &str) -> bool {
        match self.process_image(id) {
            Ok(Unit::Recognized(count)) => {
                info!("Image {} processed: {} text regions", id, count);
                false
            }
            Ok(Unit::Skipped) => {
                debug!("Image {} skipped", id);
                false
            }
            Ok(Unit::Stale) => {
                debug!("Image {} hit a swapped engine, requeueing", id);
                true
            }
            Err(e) => {
                warn!("Failed to process image {}: {:#}", id, e);
                false
            }
        }
    }

    fn process_image(&self, id: &str) -> Result<Unit> {
        let Some(image) = self.store.get(id) else {
            return Ok(Unit::Skipped);
        };
        if image.ocr_processed {
            return Ok(Unit::Skipped);
        }

        self.engine
            .ensure_initialized(self.default_accelerator)
            .context("OCR engine unavailable")?;

        let frame = Frame::open(&image.path())
            .with_context(|| format!("Failed to load {:?}", image.path()))?;

        let epoch = self.engine.current_epoch();
        let results = match self.engine.infer(epoch, &frame) {
            Ok(results) => results,
            Err(e) if e.is_stale() => return Ok(Unit::Stale),
            Err(e) => return Err(e.into()),
        };
        if !self.engine.is_current(epoch) {
            return Ok(Unit::Stale);
        }

        let count = results.len();
        self.store.attach_ocr_result(id, results)?;
        Ok(Unit::Recognized(count))
    }
}
