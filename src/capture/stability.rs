//! Frame stability gate
//!
//! Decides whether a camera frame differs enough from the one before it to be
//! worth sending to the OCR engine. Frames are reduced to a single integer
//! fingerprint and compared against the immediately preceding frame.

use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgba};

use super::frame::Frame;

/// Stability gate configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StabilityConfig {
    /// Maximum fingerprint difference still considered "the same scene"
    pub threshold: u64,
    /// Consecutive in-threshold frames required before reporting stable
    pub min_stable_frames: u32,
    /// Side length of the downsampled grid
    pub grid_size: u32,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            threshold: 3000,
            min_stable_frames: 1,
            grid_size: 8,
        }
    }
}

/// Rolling frame-to-frame stability detector
#[derive(Debug, Clone)]
pub struct StabilityGate {
    config: StabilityConfig,
    previous: u64,
    stable_count: u32,
}

impl StabilityGate {
    /// Create a new gate
    pub fn new(config: StabilityConfig) -> Self {
        Self {
            config,
            previous: 0,
            stable_count: 0,
        }
    }

    /// Get the gate configuration
    #[cfg(test)]
    pub fn config(&self) -> &StabilityConfig {
        &self.config
    }

    /// Evaluate a frame, returning whether it is a stable inference candidate
    pub fn evaluate(&mut self, frame: &Frame) -> bool {
        let fp = fingerprint(frame, self.config.grid_size);
        self.observe(fp)
    }

    /// Feed a precomputed fingerprint through the gate
    pub fn observe(&mut self, fingerprint: u64) -> bool {
        let diff = fingerprint.abs_diff(self.previous);
        self.previous = fingerprint;

        if diff > self.config.threshold {
            self.stable_count = 0;
            return false;
        }

        self.stable_count = self.stable_count.saturating_add(1);
        self.stable_count >= self.config.min_stable_frames
    }

    /// Number of consecutive in-threshold frames seen so far
    #[cfg(test)]
    pub fn stable_count(&self) -> u32 {
        self.stable_count
    }

    /// Forget the previous frame and restart counting
    pub fn reset(&mut self) {
        self.previous = 0;
        self.stable_count = 0;
    }
}

/// Compute the luma fingerprint of a frame on a `grid x grid` sample grid
pub fn fingerprint(frame: &Frame, grid: u32) -> u64 {
    let grid = grid.max(1);
    let Some(view) =
        ImageBuffer::<Rgba<u8>, &[u8]>::from_raw(frame.width, frame.height, frame.data.as_slice())
    else {
        return 0;
    };

    let scaled = imageops::resize(&view, grid, grid, FilterType::Triangle);
    scaled
        .pixels()
        .map(|p| (p[0] as u64 + p[1] as u64 + p[2] as u64) / 3)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate(threshold: u64, min_stable_frames: u32) -> StabilityGate {
        StabilityGate::new(StabilityConfig {
            threshold,
            min_stable_frames,
            grid_size: 8,
        })
    }

    #[test]
    fn test_fingerprint_sequence_scenario() {
        let mut gate = gate(3000, 1);
        assert!(gate.observe(100));
        assert!(gate.observe(150));
        assert!(!gate.observe(5200));
        assert_eq!(gate.stable_count(), 0);
    }

    #[test]
    fn test_min_run_length() {
        let mut gate = gate(10, 3);
        // First frame is compared against the zero baseline
        assert!(!gate.observe(5));
        assert!(!gate.observe(6));
        assert!(gate.observe(7));
        assert!(gate.observe(8));
    }

    #[test]
    fn test_large_change_resets_counter() {
        let mut gate = gate(10, 2);
        assert!(!gate.observe(0));
        assert!(gate.observe(0));
        assert_eq!(gate.stable_count(), 2);

        assert!(!gate.observe(500));
        assert_eq!(gate.stable_count(), 0);

        // Comparison is against the previous frame, not a baseline
        assert!(!gate.observe(505));
        assert!(gate.observe(503));
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let mut gate = gate(100, 1);
        assert!(gate.observe(100));
        assert!(gate.observe(0));
        assert!(!gate.observe(101));
    }

    #[test]
    fn test_reset() {
        let mut gate = gate(10, 1);
        assert!(!gate.observe(1000));
        gate.reset();
        assert_eq!(gate.stable_count(), 0);
        assert!(gate.observe(5));
    }

    #[test]
    fn test_fingerprint_of_black_frame() {
        let frame = Frame::solid(32, 24, [0, 0, 0, 255]).unwrap();
        assert_eq!(fingerprint(&frame, 8), 0);
    }

    #[test]
    fn test_fingerprint_of_uniform_frame() {
        let frame = Frame::solid(40, 40, [90, 100, 110, 255]).unwrap();
        let fp = fingerprint(&frame, 8);
        // 64 samples of luma ~100
        assert!(fp.abs_diff(6400) <= 64, "unexpected fingerprint {}", fp);
    }

    #[test]
    fn test_evaluate_detects_scene_change() {
        let mut gate = gate(3000, 1);
        let dark = Frame::solid(16, 16, [10, 10, 10, 255]).unwrap();
        let bright = Frame::solid(16, 16, [250, 250, 250, 255]).unwrap();

        assert!(gate.evaluate(&dark));
        assert!(gate.evaluate(&dark));
        assert!(!gate.evaluate(&bright));
        assert!(gate.evaluate(&bright));
    }
}
