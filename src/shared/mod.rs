//! Shared messaging between the pipelines and their observers
//!
//! Publish/subscribe fan-out plus the event types that flow through it.

pub mod broadcast;
pub mod messages;

pub use broadcast::Broadcast;
pub use messages::{LiveUpdate, ProcessingState};
