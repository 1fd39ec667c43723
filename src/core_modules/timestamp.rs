use std::time::{Duration, Instant};

/// A point on the pipeline's own clock: time since the pipeline was created and
/// the number of frames it had accepted at that moment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp {
    pub elapsed: Duration,
    pub frame_count: u64,
}

impl Timestamp {
    pub fn new(elapsed: Duration, frame_count: u64) -> Self {
        Self { elapsed, frame_count }
    }

    pub fn millis(&self) -> u128 {
        self.elapsed.as_millis()
    }
}

/// Monotonic clock plus frame counter owned by a single pipeline.
#[derive(Debug, Clone)]
pub struct FrameClock {
    started: Instant,
    frame_count: u64,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameClock {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            frame_count: 0,
        }
    }

    /// Advances the frame counter and returns the stamp for the new frame.
    pub fn tick(&mut self) -> Timestamp {
        self.frame_count += 1;
        self.now()
    }

    pub fn now(&self) -> Timestamp {
        Timestamp::new(self.started.elapsed(), self.frame_count)
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_advances_frame_count_and_time_is_monotonic() {
        let mut clock = FrameClock::new();
        let first = clock.tick();
        let second = clock.tick();
        assert_eq!(first.frame_count, 1);
        assert_eq!(second.frame_count, 2);
        assert!(second.elapsed >= first.elapsed);
        assert_eq!(clock.frame_count(), 2);
    }

    #[test]
    fn millis_truncates_elapsed_time() {
        let stamp = Timestamp::new(Duration::from_micros(2_750), 3);
        assert_eq!(stamp.millis(), 2);
    }
}
