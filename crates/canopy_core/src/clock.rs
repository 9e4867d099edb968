//! Shared frame clock.
//!
//! The update thread is the only writer. Draw and audio threads read the
//! current time without locking.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic time source shared across threads.
#[derive(Debug, Default)]
pub struct FrameClock {
    /// Milliseconds since start, stored as `f64` bits.
    current_ms: AtomicU64,
    /// Ticks elapsed.
    frames: AtomicU64,
}

impl FrameClock {
    /// A clock at time zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current time in milliseconds.
    #[inline]
    #[must_use]
    pub fn now_ms(&self) -> f64 {
        f64::from_bits(self.current_ms.load(Ordering::Acquire))
    }

    /// Number of completed ticks.
    #[inline]
    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    /// Moves the clock to `now_ms` and counts a tick. Returns the elapsed delta.
    ///
    /// Time never runs backwards; an earlier `now_ms` yields a zero delta.
    pub fn advance_to(&self, now_ms: f64) -> f64 {
        let previous = self.now_ms();
        let next = now_ms.max(previous);
        self.current_ms.store(next.to_bits(), Ordering::Release);
        self.frames.fetch_add(1, Ordering::AcqRel);
        next - previous
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_reports_delta() {
        let clock = FrameClock::new();
        assert!((clock.advance_to(16.0) - 16.0).abs() < f64::EPSILON);
        assert!((clock.advance_to(20.5) - 4.5).abs() < f64::EPSILON);
        assert_eq!(clock.frame_count(), 2);
    }

    #[test]
    fn test_clock_is_monotonic() {
        let clock = FrameClock::new();
        clock.advance_to(10.0);
        let delta = clock.advance_to(5.0);
        assert!(delta.abs() < f64::EPSILON);
        assert!((clock.now_ms() - 10.0).abs() < f64::EPSILON);
    }
}
