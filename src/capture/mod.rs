//! Live Frame Pipeline
//!
//! Camera frames flow through the stability gate and the single-flight guard
//! before reaching the shared OCR engine. Frames arriving while an inference
//! is in flight are dropped, never queued.

pub mod frame;
pub mod single_flight;
pub mod stability;

pub use frame::Frame;
pub use single_flight::SingleFlight;
pub use stability::{StabilityConfig, StabilityGate};

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::shared::{Broadcast, LiveUpdate};
use crate::storage::{GalleryImage, GalleryStore};
use crate::vision::{Benchmark, EngineManager, EngineState, Epoch};

/// What happened to a frame handed to the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Engine is not loaded or is being swapped
    NotReady,
    /// Pipeline is frozen; the frame was ignored
    Frozen,
    /// Frame differs too much from its predecessor
    Unstable,
    /// An inference is already running; the frame was dropped
    Busy,
    /// Frame was sent to the engine
    Dispatched,
}

/// Camera-driven OCR pipeline
pub struct LivePipeline {
    engine: Arc<EngineManager>,
    store: Arc<GalleryStore>,
    gate: Mutex<StabilityGate>,
    flight: Arc<SingleFlight>,
    frozen: AtomicBool,
    last_frame: Mutex<Option<Frame>>,
    last_update_at: Mutex<Option<Instant>>,
    latest: Mutex<Option<LiveUpdate>>,
    updates: Broadcast<LiveUpdate>,
}

impl LivePipeline {
    /// Create a pipeline sharing the given engine and gallery
    pub fn new(
        engine: Arc<EngineManager>,
        store: Arc<GalleryStore>,
        stability: StabilityConfig,
    ) -> Self {
        Self {
            engine,
            store,
            gate: Mutex::new(StabilityGate::new(stability)),
            flight: Arc::new(SingleFlight::new()),
            frozen: AtomicBool::new(false),
            last_frame: Mutex::new(None),
            last_update_at: Mutex::new(None),
            latest: Mutex::new(None),
            updates: Broadcast::new(),
        }
    }

    /// Subscribe to live inference results
    pub fn subscribe(&self) -> Receiver<LiveUpdate> {
        self.updates.subscribe()
    }

    /// Most recent live result, if any
    pub fn latest(&self) -> Option<LiveUpdate> {
        self.latest.lock().clone()
    }

    /// Whether an inference is currently running
    pub fn is_busy(&self) -> bool {
        self.flight.is_busy()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    /// Freeze or unfreeze the pipeline. Unfreezing restarts stability tracking.
    pub fn set_frozen(&self, frozen: bool) {
        let was = self.frozen.swap(frozen, Ordering::AcqRel);
        if was && !frozen {
            self.gate.lock().reset();
        }
        debug!("Live pipeline frozen: {}", frozen);
    }

    /// Hand a camera frame to the pipeline
    pub fn on_frame(self: &Arc<Self>, frame: Frame) -> FrameOutcome {
        let EngineState::Ready { epoch, .. } = self.engine.state() else {
            return FrameOutcome::NotReady;
        };
        // Frames arriving during a reconfiguration would only be discarded
        if self.engine.swap_pending() {
            return FrameOutcome::NotReady;
        }
        if self.is_frozen() {
            return FrameOutcome::Frozen;
        }

        *self.last_frame.lock() = Some(frame.clone());

        if !self.gate.lock().evaluate(&frame) {
            return FrameOutcome::Unstable;
        }

        let Some(permit) = self.flight.try_permit() else {
            debug!("Inference busy, dropping frame");
            return FrameOutcome::Busy;
        };

        let pipeline = Arc::clone(self);
        let spawned = std::thread::Builder::new()
            .name("ocr-live".to_string())
            .spawn(move || {
                let _permit = permit;
                pipeline.run_inference(epoch, &frame);
            });

        match spawned {
            Ok(_) => FrameOutcome::Dispatched,
            Err(e) => {
                // The permit moved into the closure and was dropped with it
                warn!("Failed to spawn live inference thread: {}", e);
                FrameOutcome::Busy
            }
        }
    }

    fn run_inference(&self, epoch: Epoch, frame: &Frame) {
        let (results, mut benchmark) = match self.engine.infer_timed(epoch, frame) {
            Ok(timed) => (timed.results, timed.benchmark),
            Err(e) if e.is_stale() => {
                debug!("Discarding live result: {}", e);
                return;
            }
            Err(e) => {
                warn!("Live inference failed: {}", e);
                (Vec::new(), Benchmark::default())
            }
        };

        if !self.engine.is_current(epoch) {
            debug!("Discarding live result computed against epoch {}", epoch);
            return;
        }

        let now = Instant::now();
        benchmark.fps = match self.last_update_at.lock().replace(now) {
            Some(previous) => {
                let delta = now.duration_since(previous).as_secs_f32();
                if delta > 0.0 {
                    1.0 / delta
                } else {
                    0.0
                }
            }
            None => 0.0,
        };

        debug!(
            "OCR results: {} items, det={}ms, rec={}ms, fps={:.1}",
            results.len(),
            benchmark.detection_ms,
            benchmark.recognition_ms,
            benchmark.fps
        );

        let update = LiveUpdate {
            results,
            benchmark,
            epoch,
        };
        *self.latest.lock() = Some(update.clone());
        self.updates.publish(update);
    }

    /// Save the most recent frame into the gallery
    pub fn capture(&self) -> Result<Option<GalleryImage>, StoreError> {
        let Some(frame) = self.last_frame.lock().clone() else {
            return Ok(None);
        };
        self.store.save_capture(&frame).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::testing::ScriptedFactory;
    use crate::vision::Accelerator;
    use std::time::Duration;
    use tempfile::TempDir;

    const WAIT: Duration = Duration::from_secs(5);

    fn pipeline(factory: ScriptedFactory, init: bool) -> (TempDir, Arc<LivePipeline>) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(GalleryStore::open(dir.path().join("gallery"), 90).unwrap());
        let engine = Arc::new(EngineManager::new(Box::new(factory)));
        if init {
            engine.initialize(Accelerator::Gpu).unwrap();
        }
        let live = Arc::new(LivePipeline::new(engine, store, StabilityConfig::default()));
        (dir, live)
    }

    fn dark() -> Frame {
        Frame::solid(16, 16, [10, 10, 10, 255]).unwrap()
    }

    fn bright() -> Frame {
        Frame::solid(16, 16, [250, 250, 250, 255]).unwrap()
    }

    #[test]
    fn test_not_ready_without_engine() {
        let (_dir, live) = pipeline(ScriptedFactory::new(), false);
        assert_eq!(live.on_frame(dark()), FrameOutcome::NotReady);
    }

    #[test]
    fn test_stable_frame_is_recognized() {
        let (_dir, live) = pipeline(ScriptedFactory::new(), true);
        let rx = live.subscribe();

        assert_eq!(live.on_frame(dark()), FrameOutcome::Dispatched);
        let update = rx.recv_timeout(WAIT).unwrap();
        assert_eq!(update.results.len(), 1);
        assert_eq!(update.benchmark.total_ms, 3.0);
        assert_eq!(update.benchmark.fps, 0.0);
        assert!(live.latest().is_some());
    }

    #[test]
    fn test_scene_change_is_unstable() {
        let (_dir, live) = pipeline(ScriptedFactory::new(), true);
        assert_eq!(live.on_frame(bright()), FrameOutcome::Unstable);
    }

    #[test]
    fn test_busy_frames_are_dropped() {
        let (factory, release, entered) = ScriptedFactory::new().holding();
        let probe = Arc::clone(&factory.probe);
        let (_dir, live) = pipeline(factory, true);
        let rx = live.subscribe();

        assert_eq!(live.on_frame(dark()), FrameOutcome::Dispatched);
        entered.recv_timeout(WAIT).unwrap();
        assert!(live.is_busy());

        assert_eq!(live.on_frame(dark()), FrameOutcome::Busy);
        assert_eq!(live.on_frame(dark()), FrameOutcome::Busy);

        release.send(()).unwrap();
        rx.recv_timeout(WAIT).unwrap();

        // Dropped frames were never handed to the engine
        assert_eq!(probe.calls().len(), 1);
    }

    #[test]
    fn test_inference_failure_yields_empty_result() {
        let mut factory = ScriptedFactory::new();
        factory.fail_width = Some(16);
        let (_dir, live) = pipeline(factory, true);
        let rx = live.subscribe();

        assert_eq!(live.on_frame(dark()), FrameOutcome::Dispatched);
        let update = rx.recv_timeout(WAIT).unwrap();
        assert!(update.results.is_empty());

        // The guard was released despite the failure
        let deadline = Instant::now() + WAIT;
        while live.is_busy() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(live.on_frame(dark()), FrameOutcome::Dispatched);
    }

    #[test]
    fn test_stale_result_is_discarded() {
        let (factory, release, entered) = ScriptedFactory::new().holding();
        let (_dir, live) = pipeline(factory, true);
        let rx = live.subscribe();

        assert_eq!(live.on_frame(dark()), FrameOutcome::Dispatched);
        entered.recv_timeout(WAIT).unwrap();

        let engine = Arc::clone(&live.engine);
        let swapper = {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || engine.reconfigure(Accelerator::Cpu))
        };
        while !engine.swap_pending() {
            std::thread::yield_now();
        }
        // Frames during the swap are not dispatched
        assert_eq!(live.on_frame(dark()), FrameOutcome::NotReady);

        release.send(()).unwrap();
        swapper.join().unwrap().unwrap();

        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
        assert!(live.latest().is_none());
    }

    #[test]
    fn test_frozen_pipeline_ignores_frames() {
        let (_dir, live) = pipeline(ScriptedFactory::new(), true);
        live.set_frozen(true);
        assert_eq!(live.on_frame(dark()), FrameOutcome::Frozen);
        assert!(live.capture().unwrap().is_none());

        live.set_frozen(false);
        assert!(!live.is_frozen());
    }

    #[test]
    fn test_capture_saves_last_frame() {
        let (_dir, live) = pipeline(ScriptedFactory::new(), true);
        assert!(live.capture().unwrap().is_none());

        let added = live.store.subscribe();
        live.on_frame(bright());
        let image = live.capture().unwrap().unwrap();

        assert!(image.path().exists());
        assert_eq!(added.recv_timeout(WAIT).unwrap().id, image.id);
    }
}
