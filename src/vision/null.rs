//! Placeholder engine used while no recognition backend is wired in

use std::time::Instant;
use tracing::{debug, info};

use super::engine::{Accelerator, Benchmark, EngineFactory, OcrEngine};
use super::ocr::OcrResult;
use crate::capture::frame::Frame;
use crate::error::EngineError;

/// Engine that recognizes nothing. It only runs on the CPU.
#[derive(Debug, Default)]
pub struct NullEngine {
    benchmark: Benchmark,
}

impl OcrEngine for NullEngine {
    fn recognize(&mut self, frame: &Frame) -> Result<Vec<OcrResult>, EngineError> {
        let start = Instant::now();
        let (width, height) = frame.dimensions();
        debug!("Null engine received {}x{} frame", width, height);

        let total_ms = start.elapsed().as_secs_f32() * 1000.0;
        self.benchmark = Benchmark {
            detection_ms: 0.0,
            recognition_ms: 0.0,
            total_ms,
            fps: 0.0,
        };
        Ok(vec![])
    }

    fn benchmark(&self) -> Benchmark {
        self.benchmark
    }

    fn active_accelerator(&self) -> Accelerator {
        Accelerator::Cpu
    }
}

/// Factory for [`NullEngine`]
#[derive(Debug, Default)]
pub struct NullEngineFactory;

impl EngineFactory for NullEngineFactory {
    fn create(&self, preference: Accelerator) -> Result<Box<dyn OcrEngine>, EngineError> {
        if preference != Accelerator::Cpu {
            info!("Null engine has no {} support, using CPU", preference);
        }
        Ok(Box::new(NullEngine::default()))
    }
}
