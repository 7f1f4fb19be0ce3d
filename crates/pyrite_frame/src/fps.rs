//! **[ADDED]** Rolling-window FPS counter (§2's "FPS display", undetailed
//! in `spec.md` §4.9). Purely observational: the host application reads
//! it, it never feeds back into scheduling decisions.

const WINDOW: usize = 32;

/// Tracks the last ~32 frame times and reports their average as frames
/// per second.
pub struct FpsCounter {
    samples: [f32; WINDOW],
    next: usize,
    filled: usize,
}

impl FpsCounter {
    #[must_use]
    pub fn new() -> Self {
        FpsCounter {
            samples: [0.0; WINDOW],
            next: 0,
            filled: 0,
        }
    }

    pub fn record_frame(&mut self, frame_time_secs: f32) {
        self.samples[self.next] = frame_time_secs;
        self.next = (self.next + 1) % WINDOW;
        self.filled = (self.filled + 1).min(WINDOW);
    }

    /// Average FPS over the current window, or `0.0` before any samples.
    #[must_use]
    pub fn fps(&self) -> f32 {
        if self.filled == 0 {
            return 0.0;
        }
        let sum: f32 = self.samples[..self.filled].iter().sum();
        if sum <= 0.0 {
            0.0
        } else {
            self.filled as f32 / sum
        }
    }
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fps_reflects_a_steady_frame_rate() {
        let mut counter = FpsCounter::new();
        for _ in 0..WINDOW {
            counter.record_frame(1.0 / 60.0);
        }
        assert!((counter.fps() - 60.0).abs() < 0.5);
    }

    #[test]
    fn older_samples_are_evicted_past_the_window() {
        let mut counter = FpsCounter::new();
        for _ in 0..WINDOW {
            counter.record_frame(1.0);
        }
        assert!((counter.fps() - 1.0).abs() < 1e-3);
        for _ in 0..WINDOW {
            counter.record_frame(1.0 / 120.0);
        }
        assert!((counter.fps() - 120.0).abs() < 0.5);
    }
}
