//! Scripted engine for tests

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use super::engine::{Accelerator, Benchmark, EngineFactory, OcrEngine};
use super::ocr::OcrResult;
use crate::capture::frame::Frame;
use crate::error::EngineError;

/// Counters shared between a factory and every engine it created
#[derive(Debug, Default)]
pub struct Probe {
    pub created: AtomicUsize,
    pub destroyed: AtomicUsize,
    pub live: AtomicUsize,
    pub max_live: AtomicUsize,
    /// Frame sizes seen by `recognize`, in call order
    pub calls: Mutex<Vec<(u32, u32)>>,
}

impl Probe {
    pub fn calls(&self) -> Vec<(u32, u32)> {
        self.calls.lock().clone()
    }
}

/// Factory producing [`ScriptedEngine`]s
pub struct ScriptedFactory {
    pub probe: Arc<Probe>,
    /// Accelerator every engine reports, regardless of preference
    pub forced_accelerator: Option<Accelerator>,
    pub fail_create: AtomicBool,
    /// Panic inside the next `create`, once
    pub panic_create: AtomicBool,
    /// Frames of this width fail inference
    pub fail_width: Option<u32>,
    /// Frames of this width panic inside inference
    pub panic_width: Option<u32>,
    /// When set, `recognize` signals `entered` then waits for a message on `hold`
    pub hold: Option<Receiver<()>>,
    pub entered: Option<Sender<(u32, u32)>>,
    pub results: Vec<OcrResult>,
}

impl ScriptedFactory {
    pub fn new() -> Self {
        Self {
            probe: Arc::new(Probe::default()),
            forced_accelerator: None,
            fail_create: AtomicBool::new(false),
            panic_create: AtomicBool::new(false),
            fail_width: None,
            panic_width: None,
            hold: None,
            entered: None,
            results: vec![sample_result("scripted")],
        }
    }

    /// Block every inference until the returned sender releases it
    pub fn holding(mut self) -> (Self, Sender<()>, Receiver<(u32, u32)>) {
        let (release_tx, release_rx) = crossbeam_channel::unbounded();
        let (entered_tx, entered_rx) = crossbeam_channel::unbounded();
        self.hold = Some(release_rx);
        self.entered = Some(entered_tx);
        (self, release_tx, entered_rx)
    }
}

impl EngineFactory for ScriptedFactory {
    fn create(&self, preference: Accelerator) -> Result<Box<dyn OcrEngine>, EngineError> {
        if self.panic_create.swap(false, Ordering::SeqCst) {
            panic!("scripted engine creation panic");
        }
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(EngineError::Initialization("scripted failure".to_string()));
        }

        self.probe.created.fetch_add(1, Ordering::SeqCst);
        let live = self.probe.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.probe.max_live.fetch_max(live, Ordering::SeqCst);

        Ok(Box::new(ScriptedEngine {
            probe: Arc::clone(&self.probe),
            accelerator: self.forced_accelerator.unwrap_or(preference),
            fail_width: self.fail_width,
            panic_width: self.panic_width,
            hold: self.hold.clone(),
            entered: self.entered.clone(),
            results: self.results.clone(),
        }))
    }
}

pub struct ScriptedEngine {
    probe: Arc<Probe>,
    accelerator: Accelerator,
    fail_width: Option<u32>,
    panic_width: Option<u32>,
    hold: Option<Receiver<()>>,
    entered: Option<Sender<(u32, u32)>>,
    results: Vec<OcrResult>,
}

impl OcrEngine for ScriptedEngine {
    fn recognize(&mut self, frame: &Frame) -> Result<Vec<OcrResult>, EngineError> {
        self.probe.calls.lock().push(frame.dimensions());
        if let Some(entered) = &self.entered {
            let _ = entered.send(frame.dimensions());
        }
        if let Some(hold) = &self.hold {
            let _ = hold.recv();
        }
        if self.panic_width == Some(frame.width) {
            panic!("scripted inference panic");
        }
        if self.fail_width == Some(frame.width) {
            return Err(EngineError::Inference("scripted failure".to_string()));
        }
        Ok(self.results.clone())
    }

    fn benchmark(&self) -> Benchmark {
        Benchmark {
            detection_ms: 1.0,
            recognition_ms: 2.0,
            total_ms: 3.0,
            fps: 0.0,
        }
    }

    fn active_accelerator(&self) -> Accelerator {
        self.accelerator
    }
}

impl Drop for ScriptedEngine {
    fn drop(&mut self) {
        self.probe.live.fetch_sub(1, Ordering::SeqCst);
        self.probe.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn sample_result(text: &str) -> OcrResult {
    OcrResult {
        text: text.to_string(),
        confidence: 0.75,
        center_x: 10.0,
        center_y: 5.0,
        width: 8.0,
        height: 4.0,
        angle_degrees: 0.0,
    }
}
