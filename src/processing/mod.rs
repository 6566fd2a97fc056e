//! Background Processing
//!
//! One-shot OCR over gallery images, drained off the caller's thread.

pub mod queue;

pub use queue::QueueProcessor;
