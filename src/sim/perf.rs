//! Injected boundary signals: frame-rate throttling and visible bounds

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::consts::{PERF_HISTORY, THROTTLE_FPS};

/// Tells the wave director whether spawning should back off
pub trait PerformanceSignal {
    /// Record one frame time
    fn sample(&mut self, frame_ms: f64);
    fn is_under_performance_target(&self) -> bool;
}

/// Rolling average over the last `capacity` frame times
#[derive(Debug, Clone)]
pub struct FrameRateMonitor {
    history: VecDeque<f64>,
    capacity: usize,
    threshold_fps: f64,
}

impl Default for FrameRateMonitor {
    fn default() -> Self {
        Self::new(PERF_HISTORY, f64::from(THROTTLE_FPS))
    }
}

impl FrameRateMonitor {
    pub fn new(capacity: usize, threshold_fps: f64) -> Self {
        let capacity = capacity.max(1);
        Self {
            history: VecDeque::with_capacity(capacity),
            capacity,
            threshold_fps,
        }
    }

    /// `None` until a positive frame time has been sampled
    pub fn average_fps(&self) -> Option<f64> {
        if self.history.is_empty() {
            return None;
        }
        let average = self.history.iter().sum::<f64>() / self.history.len() as f64;
        (average > 0.0).then(|| 1000.0 / average)
    }
}

impl PerformanceSignal for FrameRateMonitor {
    fn sample(&mut self, frame_ms: f64) {
        if !frame_ms.is_finite() || frame_ms < 0.0 {
            return;
        }
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(frame_ms);
    }

    fn is_under_performance_target(&self) -> bool {
        self.average_fps()
            .is_some_and(|fps| fps < self.threshold_fps)
    }
}

/// Visible play area in world units (y grows downward)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Default for Bounds {
    fn default() -> Self {
        Self {
            left: 0.0,
            top: 0.0,
            right: 800.0,
            bottom: 600.0,
        }
    }
}

impl Bounds {
    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }
}

pub trait BoundsProvider {
    fn bounds(&self) -> Bounds;
}

/// Bounds that never change (headless runs, tests)
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedBounds(pub Bounds);

impl BoundsProvider for FixedBounds {
    fn bounds(&self) -> Bounds {
        self.0
    }
}
