//! Rate-limited rotating plot colour.

use std::time::{Duration, Instant};

use crate::types::Colour;

/// Colour wheel the plotting colour steps through.
pub const PALETTE: [Colour; 8] = [
    Colour::rgb(0xff, 0x00, 0x00),
    Colour::rgb(0xff, 0x7f, 0x00),
    Colour::rgb(0xff, 0xff, 0x00),
    Colour::rgb(0x00, 0xff, 0x00),
    Colour::rgb(0x00, 0xff, 0xff),
    Colour::rgb(0x00, 0x00, 0xff),
    Colour::rgb(0x8b, 0x00, 0xff),
    Colour::rgb(0xff, 0x00, 0xff),
];

/// Steps through [`PALETTE`], at most once per `min_interval`.
///
/// The limit is measured on the monotonic clock, so it is independent of how
/// often the owning cache recomputes.
#[derive(Debug, Clone)]
pub struct ColourCycle {
    index: usize,
    last_advance: Instant,
    min_interval: Duration,
}

impl ColourCycle {
    pub fn new(min_interval: Duration, now: Instant) -> Self {
        Self {
            index: 0,
            last_advance: now,
            min_interval,
        }
    }

    pub fn current(&self) -> Colour {
        PALETTE[self.index]
    }

    /// Move to the next colour if the interval has elapsed. Returns true on advance.
    pub fn advance(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.last_advance) < self.min_interval {
            return false;
        }
        self.index = (self.index + 1) % PALETTE.len();
        self.last_advance = now;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_red() {
        let cycle = ColourCycle::new(Duration::from_millis(200), Instant::now());
        assert_eq!(cycle.current().to_string(), "#ff0000");
    }

    #[test]
    fn advances_at_most_once_per_interval() {
        let t0 = Instant::now();
        let mut cycle = ColourCycle::new(Duration::from_millis(200), t0);

        assert!(!cycle.advance(t0 + Duration::from_millis(50)));
        assert!(!cycle.advance(t0 + Duration::from_millis(199)));
        assert!(cycle.advance(t0 + Duration::from_millis(200)));
        assert_eq!(cycle.current(), PALETTE[1]);

        // interval restarts from the last advance
        assert!(!cycle.advance(t0 + Duration::from_millis(300)));
        assert!(cycle.advance(t0 + Duration::from_millis(400)));
        assert_eq!(cycle.current(), PALETTE[2]);
    }

    #[test]
    fn wraps_around_the_palette() {
        let t0 = Instant::now();
        let mut cycle = ColourCycle::new(Duration::ZERO, t0);
        for _ in 0..PALETTE.len() {
            assert!(cycle.advance(t0));
        }
        assert_eq!(cycle.current(), PALETTE[0]);
    }
}
