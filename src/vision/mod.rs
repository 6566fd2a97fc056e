//! Vision/OCR Layer
//!
//! Wraps the external OCR engine behind a lifecycle manager that guarantees a
//! single live handle and at most one inference at a time, shared by the live
//! camera pipeline and the background gallery queue.

pub mod engine;
pub mod manager;
pub mod null;
pub mod ocr;

#[cfg(test)]
pub mod testing;

pub use engine::{Accelerator, Benchmark, EngineFactory};
pub use manager::{EngineManager, EngineState, Epoch};
pub use null::NullEngineFactory;
pub use ocr::OcrResult;
