//! Events published to the UI and other collaborators

use crate::vision::{Benchmark, Epoch, OcrResult};

/// What the background queue is doing right now
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ProcessingState {
    #[default]
    Idle,
    /// OCR is running for the given image id
    Processing(String),
}

impl ProcessingState {
    pub fn is_idle(&self) -> bool {
        matches!(self, ProcessingState::Idle)
    }
}

/// Result of one live-frame inference
#[derive(Debug, Clone)]
pub struct LiveUpdate {
    /// Recognized regions; empty when inference failed
    pub results: Vec<OcrResult>,
    /// Engine timing, with `fps` measured between consecutive updates
    pub benchmark: Benchmark,
    /// Engine epoch the results were computed against
    pub epoch: Epoch,
}
