//! Frame timing

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Number of frame times kept for the rolling average
const HISTORY_LEN: usize = 120;

/// Rolling frame statistics
#[derive(Debug, Clone, Copy, Default, serde::Serialize, serde::Deserialize)]
pub struct FpsStats {
    pub avg: f32,
    pub min: f32,
    pub max: f32,
    pub frame_count: u64,
}

/// Tracks the frame delta and a short history of frame times
pub struct FrameTimer {
    last_frame: Instant,
    delta: Duration,
    frame_count: u64,
    history: VecDeque<f32>,
}

impl FrameTimer {
    pub fn new() -> Self {
        Self {
            last_frame: Instant::now(),
            delta: Duration::ZERO,
            frame_count: 0,
            history: VecDeque::with_capacity(HISTORY_LEN),
        }
    }

    /// Call once per frame before reading the delta
    pub fn tick(&mut self) {
        let now = Instant::now();
        self.record(now - self.last_frame);
        self.last_frame = now;
    }

    fn record(&mut self, delta: Duration) {
        self.delta = delta;
        self.frame_count += 1;
        if self.history.len() == HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back(delta.as_secs_f32());
    }

    /// Delta time in seconds, clamped so a stalled frame cannot teleport the camera
    pub fn delta_secs(&self) -> f32 {
        self.delta.as_secs_f32().min(0.25)
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Average FPS over the history window
    pub fn fps(&self) -> f32 {
        self.stats().avg
    }

    pub fn stats(&self) -> FpsStats {
        let total: f32 = self.history.iter().sum();
        let to_fps = |t: f32| if t > 0.0 { 1.0 / t } else { 0.0 };
        let (min, max) = self.history.iter().fold((f32::INFINITY, 0.0f32), |(lo, hi), &t| {
            let fps = to_fps(t);
            (lo.min(fps), hi.max(fps))
        });

        FpsStats {
            avg: if total > 0.0 { self.history.len() as f32 / total } else { 0.0 },
            min: if self.history.is_empty() { 0.0 } else { min },
            max,
            frame_count: self.frame_count,
        }
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new()
    }
}
