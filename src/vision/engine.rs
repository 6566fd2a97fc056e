//! OCR engine capability
//!
//! The recognition engine itself (model loading, tensor inference, accelerator
//! selection) lives outside this crate. These traits are the seam it plugs into.

use serde::{Deserialize, Serialize};

use super::ocr::OcrResult;
use crate::capture::frame::Frame;
use crate::error::EngineError;

/// Hardware accelerator used for inference
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum Accelerator {
    /// GPU (recommended for FP16 models)
    #[default]
    Gpu,
    /// CPU fallback, always available
    Cpu,
}

impl Accelerator {
    /// Display name for logs and the CLI
    pub fn display_name(&self) -> &'static str {
        match self {
            Accelerator::Gpu => "GPU",
            Accelerator::Cpu => "CPU",
        }
    }
}

impl std::fmt::Display for Accelerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Timing of the most recent inference
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Benchmark {
    pub detection_ms: f32,
    pub recognition_ms: f32,
    pub total_ms: f32,
    pub fps: f32,
}

/// A live engine handle. Dropping it destroys the native state.
pub trait OcrEngine: Send {
    /// Run detection and recognition on a frame
    fn recognize(&mut self, frame: &Frame) -> Result<Vec<OcrResult>, EngineError>;

    /// Timing of the last `recognize` call
    fn benchmark(&self) -> Benchmark;

    /// Accelerator the engine actually activated
    fn active_accelerator(&self) -> Accelerator;
}

/// Creates engine handles. May fall back to a different accelerator than requested.
pub trait EngineFactory: Send + Sync {
    fn create(&self, preference: Accelerator) -> Result<Box<dyn OcrEngine>, EngineError>;
}
