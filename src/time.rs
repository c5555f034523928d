//! Frame clock for the simulation tick.
//!
//! One source of truth for elapsed time, delta time, frame count, and a
//! periodically refreshed FPS estimate. All timed behavior effects
//! (conversation expiry, cooldowns) compare against `elapsed_ms()` rather
//! than scheduling callbacks, so dropping the scene can never leave a
//! dangling timer behind.

use std::time::{Duration, Instant};

/// How often the FPS estimate is refreshed.
const FPS_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug)]
pub struct FrameClock {
    start: Instant,
    last_frame: Instant,
    elapsed_secs: f32,
    delta_secs: f32,
    frame_count: u64,
    fps: f32,
    fps_frame_count: u64,
    fps_update_time: Instant,
    /// Fixed delta override for deterministic stepping.
    fixed_delta: Option<f32>,
}

impl FrameClock {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_frame: now,
            elapsed_secs: 0.0,
            delta_secs: 0.0,
            frame_count: 0,
            fps: 0.0,
            fps_frame_count: 0,
            fps_update_time: now,
            fixed_delta: None,
        }
    }

    /// Advance the clock one frame. Returns `(elapsed, delta)` in seconds.
    pub fn update(&mut self) -> (f32, f32) {
        let now = Instant::now();

        let raw_delta = now.duration_since(self.last_frame).as_secs_f32();
        self.delta_secs = self.fixed_delta.unwrap_or(raw_delta);
        self.last_frame = now;
        self.elapsed_secs = now.duration_since(self.start).as_secs_f32();
        self.frame_count += 1;

        let fps_elapsed = now.duration_since(self.fps_update_time);
        if fps_elapsed >= FPS_INTERVAL {
            let frames_since = self.frame_count - self.fps_frame_count;
            self.fps = frames_since as f32 / fps_elapsed.as_secs_f32();
            self.fps_frame_count = self.frame_count;
            self.fps_update_time = now;
        }

        (self.elapsed_secs, self.delta_secs)
    }

    #[inline]
    pub fn elapsed(&self) -> f32 {
        self.elapsed_secs
    }

    /// Elapsed wall-clock time in whole milliseconds. This is the value
    /// the behavior manager compares conversation expiries against.
    #[inline]
    pub fn elapsed_ms(&self) -> u64 {
        (self.elapsed_secs * 1000.0) as u64
    }

    #[inline]
    pub fn delta(&self) -> f32 {
        self.delta_secs
    }

    #[inline]
    pub fn frame(&self) -> u64 {
        self.frame_count
    }

    #[inline]
    pub fn fps(&self) -> f32 {
        self.fps
    }

    /// Force a fixed delta time (deterministic stepping). Pass `None`
    /// to return to real frame timing.
    pub fn set_fixed_delta(&mut self, delta: Option<f32>) {
        self.fixed_delta = delta;
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_clock_advances() {
        let mut clock = FrameClock::new();
        thread::sleep(Duration::from_millis(10));
        let (elapsed, delta) = clock.update();

        assert!(elapsed > 0.0);
        assert!(delta > 0.0);
        assert_eq!(clock.frame(), 1);
    }

    #[test]
    fn test_fixed_delta() {
        let mut clock = FrameClock::new();
        clock.set_fixed_delta(Some(1.0 / 60.0));

        thread::sleep(Duration::from_millis(30));
        clock.update();

        assert!((clock.delta() - 1.0 / 60.0).abs() < 1e-4);
    }

    #[test]
    fn test_elapsed_ms_tracks_elapsed() {
        let mut clock = FrameClock::new();
        thread::sleep(Duration::from_millis(12));
        clock.update();
        assert!(clock.elapsed_ms() >= 10);
    }
}
