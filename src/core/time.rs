//! Frame timing utilities

use std::time::{Duration, Instant};

/// Counts frames and keeps a once-per-second FPS estimate
pub struct FrameTimer {
    frame_count: u64,
    fps_timer: Instant,
    fps: f32,
    fps_frame_count: u32,
}

impl FrameTimer {
    /// Create a new frame timer
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            frame_count: 0,
            fps_timer: now,
            fps: 0.0,
            fps_frame_count: 0,
        }
    }

    /// Call once per frame to update timing
    pub fn tick(&mut self) {
        self.tick_at(Instant::now());
    }

    fn tick_at(&mut self, now: Instant) {
        self.frame_count += 1;
        self.fps_frame_count += 1;

        let fps_elapsed = now.saturating_duration_since(self.fps_timer);
        if fps_elapsed >= Duration::from_secs(1) {
            self.fps = self.fps_frame_count as f32 / fps_elapsed.as_secs_f32();
            self.fps_frame_count = 0;
            self.fps_timer = now;
        }
    }

    /// Get current FPS (updated every second)
    pub fn fps(&self) -> f32 {
        self.fps
    }

    /// Get total frame count
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fps_updates_after_one_second() {
        let mut timer = FrameTimer::new();
        let start = timer.fps_timer;
        for i in 1..=30 {
            timer.tick_at(start + Duration::from_millis(i * 40));
        }
        // 30 frames over 1.2s
        assert_eq!(timer.frame_count(), 30);
        assert!((timer.fps() - 25.0).abs() < 0.5);
    }
}
