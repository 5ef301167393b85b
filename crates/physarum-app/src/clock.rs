//! Frame timing and statistics.

use std::collections::VecDeque;
use std::fmt;
use std::time::Instant;

/// Frames averaged by [`FrameClock::average_frame_time`].
pub const AVERAGE_WINDOW: usize = 60;

/// Longest step handed to the simulation. Stalls (window drags, debugger
/// breaks) would otherwise teleport every agent.
pub const MAX_DELTA: f32 = 0.1;

/// Measures frame deltas and keeps running statistics.
#[derive(Debug, Clone)]
pub struct FrameClock {
    last: Option<Instant>,
    fixed_step: Option<f32>,
    elapsed: f64,
    frames: u64,
    recent: VecDeque<f32>,
    min: f32,
    max: f32,
    total: f64,
}

impl FrameClock {
    /// Wall-clock timing, or a constant step when `fixed_step` is set.
    pub fn new(fixed_step: Option<f32>) -> Self {
        Self {
            last: None,
            fixed_step,
            elapsed: 0.0,
            frames: 0,
            recent: VecDeque::with_capacity(AVERAGE_WINDOW),
            min: f32::MAX,
            max: 0.0,
            total: 0.0,
        }
    }

    /// Start a frame and return its delta in seconds.
    ///
    /// The first wall-clock frame has a delta of zero.
    pub fn tick(&mut self) -> f32 {
        let now = Instant::now();
        let measured = self
            .last
            .map_or(0.0, |last| now.duration_since(last).as_secs_f32());
        self.last = Some(now);
        self.advance(self.fixed_step.unwrap_or(measured))
    }

    /// Record a frame of `dt` seconds, clamped to [`MAX_DELTA`].
    pub fn advance(&mut self, dt: f32) -> f32 {
        let dt = dt.clamp(0.0, MAX_DELTA);
        self.frames += 1;
        self.elapsed += f64::from(dt);
        self.total += f64::from(dt);

        if self.recent.len() == AVERAGE_WINDOW {
            self.recent.pop_front();
        }
        self.recent.push_back(dt);

        if dt > 0.0 {
            self.min = self.min.min(dt);
            self.max = self.max.max(dt);
        }
        dt
    }

    /// Simulated seconds since the first frame.
    #[allow(clippy::cast_possible_truncation)]
    pub fn elapsed(&self) -> f32 {
        self.elapsed as f32
    }

    pub const fn frame_count(&self) -> u64 {
        self.frames
    }

    /// Mean delta over the last [`AVERAGE_WINDOW`] frames.
    #[allow(clippy::cast_precision_loss)]
    pub fn average_frame_time(&self) -> f32 {
        if self.recent.is_empty() {
            return 0.0;
        }
        self.recent.iter().sum::<f32>() / self.recent.len() as f32
    }

    /// Statistics over the whole run.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    pub fn summary(&self) -> FrameSummary {
        let average = if self.frames == 0 {
            0.0
        } else {
            (self.total / self.frames as f64) as f32
        };
        FrameSummary {
            frames: self.frames,
            average,
            min: if self.min == f32::MAX { 0.0 } else { self.min },
            max: self.max,
        }
    }
}

/// Frame count and frame-time statistics, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSummary {
    pub frames: u64,
    pub average: f32,
    pub min: f32,
    pub max: f32,
}

impl FrameSummary {
    /// Frames per second implied by the average frame time.
    pub fn fps(&self) -> f32 {
        if self.average > 0.0 {
            1.0 / self.average
        } else {
            0.0
        }
    }
}

impl fmt::Display for FrameSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} frames, avg {:.2} ms ({:.1} FPS), min {:.2} ms, max {:.2} ms",
            self.frames,
            self.average * 1000.0,
            self.fps(),
            self.min * 1000.0,
            self.max * 1000.0
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn fixed_step_ignores_wall_clock() {
        let mut clock = FrameClock::new(Some(1.0 / 60.0));
        for _ in 0..3 {
            assert_relative_eq!(clock.tick(), 1.0 / 60.0);
        }
        assert_eq!(clock.frame_count(), 3);
        assert_relative_eq!(clock.elapsed(), 0.05, epsilon = 1e-6);
    }

    #[test]
    fn first_wall_clock_frame_is_zero() {
        let mut clock = FrameClock::new(None);
        assert_eq!(clock.tick(), 0.0);
    }

    #[test]
    fn large_steps_are_clamped() {
        let mut clock = FrameClock::new(None);
        assert_relative_eq!(clock.advance(2.0), MAX_DELTA);
        assert_eq!(clock.advance(-1.0), 0.0);
    }

    #[test]
    fn average_uses_recent_window() {
        let mut clock = FrameClock::new(None);
        for _ in 0..AVERAGE_WINDOW {
            clock.advance(0.01);
        }
        for _ in 0..AVERAGE_WINDOW {
            clock.advance(0.02);
        }
        assert_relative_eq!(clock.average_frame_time(), 0.02, epsilon = 1e-6);
    }

    #[test]
    fn summary_tracks_extremes() {
        let mut clock = FrameClock::new(None);
        clock.advance(0.01);
        clock.advance(0.03);
        let summary = clock.summary();
        assert_eq!(summary.frames, 2);
        assert_relative_eq!(summary.average, 0.02, epsilon = 1e-6);
        assert_relative_eq!(summary.min, 0.01);
        assert_relative_eq!(summary.max, 0.03);
        assert_relative_eq!(summary.fps(), 50.0, epsilon = 1e-3);
    }

    #[test]
    fn empty_summary_is_zero() {
        let summary = FrameClock::new(None).summary();
        assert_eq!(summary.frames, 0);
        assert_eq!(summary.min, 0.0);
        assert_eq!(summary.fps(), 0.0);
    }
}
