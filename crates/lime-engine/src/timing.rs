//! Frame timing.
//!
//! Provides clamped delta time for script updates, frame-rate limiting and
//! an averaged FPS readout.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Largest delta handed to `lime.update`, so a stall does not teleport the game.
const MAX_DT: f64 = 0.25;

/// Number of frames kept for averaging.
const MAX_SAMPLES: usize = 120;

/// Frame timing manager.
#[derive(Debug)]
pub struct FrameTiming {
    /// Target frames per second (0 = unthrottled)
    target_fps: u32,
    /// Time budget per frame (`None` when unthrottled)
    frame_budget: Option<Duration>,
    /// Start of the current frame
    last_frame: Instant,
    /// Recent frame times for averaging
    frame_times: VecDeque<f64>,
    /// Frames measured since creation or reset
    frames: u64,
}

impl Default for FrameTiming {
    fn default() -> Self {
        Self::new(60)
    }
}

impl FrameTiming {
    /// Create a frame timer. A `target_fps` of 0 disables frame limiting.
    #[must_use]
    pub fn new(target_fps: u32) -> Self {
        Self {
            target_fps,
            frame_budget: budget_for(target_fps),
            last_frame: Instant::now(),
            frame_times: VecDeque::with_capacity(MAX_SAMPLES),
            frames: 0,
        }
    }

    /// Seconds since the previous call, clamped to [`MAX_DT`].
    pub fn delta_time(&mut self) -> f64 {
        let now = Instant::now();
        let dt = (now - self.last_frame).as_secs_f64().min(MAX_DT);
        self.last_frame = now;
        self.frames += 1;

        self.frame_times.push_back(dt);
        if self.frame_times.len() > MAX_SAMPLES {
            self.frame_times.pop_front();
        }

        dt
    }

    /// Sleep for whatever is left of this frame's budget.
    pub fn sleep_remainder(&self) {
        let Some(budget) = self.frame_budget else {
            return;
        };

        let elapsed = self.last_frame.elapsed();
        if elapsed < budget {
            let sleep_time = budget - elapsed;
            if sleep_time > Duration::from_millis(1) {
                std::thread::sleep(sleep_time - Duration::from_millis(1));
            }
            while self.last_frame.elapsed() < budget {
                std::hint::spin_loop();
            }
        }
    }

    /// Average FPS over recent frames.
    #[must_use]
    pub fn current_fps(&self) -> f64 {
        let avg = self.average_frame_time();
        if avg > 0.0 {
            1.0 / avg
        } else {
            0.0
        }
    }

    /// Average frame time in milliseconds.
    #[must_use]
    pub fn average_frame_time_ms(&self) -> f64 {
        self.average_frame_time() * 1000.0
    }

    fn average_frame_time(&self) -> f64 {
        if self.frame_times.is_empty() {
            return 0.0;
        }
        self.frame_times.iter().sum::<f64>() / self.frame_times.len() as f64
    }

    /// Frames measured since creation or the last reset.
    #[must_use]
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Target FPS (0 = unthrottled).
    #[must_use]
    pub fn target_fps(&self) -> u32 {
        self.target_fps
    }

    /// Change the target FPS.
    pub fn set_target_fps(&mut self, fps: u32) {
        self.target_fps = fps;
        self.frame_budget = budget_for(fps);
    }

    /// Reset timing (call after loading so the first delta is not huge).
    pub fn reset(&mut self) {
        self.last_frame = Instant::now();
        self.frame_times.clear();
        self.frames = 0;
    }
}

fn budget_for(fps: u32) -> Option<Duration> {
    (fps > 0).then(|| Duration::from_secs_f64(1.0 / f64::from(fps)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_timing_creation() {
        let timing = FrameTiming::new(60);
        assert_eq!(timing.target_fps(), 60);
        assert_eq!(timing.frames(), 0);
        assert_eq!(timing.current_fps(), 0.0);
    }

    #[test]
    fn test_frame_timing_delta() {
        let mut timing = FrameTiming::new(60);

        std::thread::sleep(Duration::from_millis(16));
        let dt = timing.delta_time();
        assert!(dt >= 0.015);
        assert!(dt <= MAX_DT);
        assert_eq!(timing.frames(), 1);
    }

    #[test]
    fn test_frame_timing_max_dt() {
        let mut timing = FrameTiming::new(60);

        std::thread::sleep(Duration::from_millis(300));
        let dt = timing.delta_time();
        assert!(dt <= MAX_DT);
    }

    #[test]
    fn test_unthrottled_does_not_sleep() {
        let mut timing = FrameTiming::new(0);
        timing.reset();
        let start = Instant::now();
        timing.sleep_remainder();
        assert!(start.elapsed() < Duration::from_millis(5));
    }

    #[test]
    fn test_throttled_waits_for_budget() {
        let mut timing = FrameTiming::new(100);
        timing.reset();
        timing.sleep_remainder();
        assert!(timing.last_frame.elapsed() >= Duration::from_millis(10));
    }

    #[test]
    fn test_set_target_fps() {
        let mut timing = FrameTiming::new(60);
        timing.set_target_fps(0);
        assert!(timing.frame_budget.is_none());
        timing.set_target_fps(30);
        assert!(timing.frame_budget.is_some());
    }

    #[test]
    fn test_average_frame_time() {
        let mut timing = FrameTiming::new(60);
        timing.frame_times.extend([0.010, 0.020]);
        assert!((timing.average_frame_time_ms() - 15.0).abs() < 1e-9);
        assert!((timing.current_fps() - 1.0 / 0.015).abs() < 1e-6);
    }

    #[test]
    fn test_reset_timing() {
        let mut timing = FrameTiming::new(60);
        timing.frame_times.push_back(0.016);
        timing.frames = 5;

        timing.reset();

        assert!(timing.frame_times.is_empty());
        assert_eq!(timing.frames(), 0);
    }
}
