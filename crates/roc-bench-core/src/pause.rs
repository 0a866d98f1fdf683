//! Randomized pause injection.
//!
//! Used to provoke back-pressure: once a random deadline passes, the task
//! sleeps for a random length, then both are re-rolled.

use crate::error::{Error, Result};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::time::{Duration, Instant};

/// Bounds for the pause schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PauseRange {
    /// Shortest time until the next pause.
    pub next_min: Duration,
    /// Longest time until the next pause.
    pub next_max: Duration,
    /// Shortest pause.
    pub length_min: Duration,
    /// Longest pause.
    pub length_max: Duration,
}

impl Default for PauseRange {
    fn default() -> Self {
        Self {
            next_min: Duration::from_millis(10),
            next_max: Duration::from_millis(2000),
            length_min: Duration::from_millis(1),
            length_max: Duration::from_millis(500),
        }
    }
}

impl PauseRange {
    /// Both ranges must be non-empty.
    pub fn validate(&self) -> Result<()> {
        if self.next_min > self.next_max {
            return Err(Error::Config(format!(
                "pause interval range {:?}..{:?} is empty",
                self.next_min, self.next_max
            )));
        }
        if self.length_min > self.length_max {
            return Err(Error::Config(format!(
                "pause length range {:?}..{:?} is empty",
                self.length_min, self.length_max
            )));
        }
        Ok(())
    }
}

/// Per-task pause schedule.
#[derive(Debug)]
pub struct RandomPauses {
    range: PauseRange,
    next: Instant,
    length: Duration,
    rng: SmallRng,
}

impl RandomPauses {
    /// New schedule starting now.
    pub fn new(range: PauseRange) -> Self {
        Self::with_rng(range, SmallRng::from_rng(&mut rand::rng()))
    }

    /// Deterministic schedule for tests.
    pub fn seeded(range: PauseRange, seed: u64) -> Self {
        Self::with_rng(range, SmallRng::seed_from_u64(seed))
    }

    fn with_rng(range: PauseRange, rng: SmallRng) -> Self {
        let mut pauses = Self {
            range,
            next: Instant::now(),
            length: Duration::ZERO,
            rng,
        };
        pauses.roll(Instant::now());
        pauses
    }

    fn roll(&mut self, now: Instant) {
        let until_next = self.pick(self.range.next_min, self.range.next_max);
        self.length = self.pick(self.range.length_min, self.range.length_max);
        self.next = now + until_next;
    }

    fn pick(&mut self, min: Duration, max: Duration) -> Duration {
        if min >= max {
            return min;
        }
        Duration::from_micros(self.rng.random_range(min.as_micros() as u64..=max.as_micros() as u64))
    }

    /// Pause length that should be applied now, if the deadline has passed.
    /// Re-rolls the schedule when it fires.
    pub fn due(&mut self, now: Instant) -> Option<Duration> {
        if now < self.next {
            return None;
        }
        let length = self.length;
        self.roll(now + length);
        Some(length)
    }

    /// Sleep if a pause is due. Returns whether the task slept.
    pub fn maybe_pause(&mut self, task: &str) -> bool {
        match self.due(Instant::now()) {
            Some(length) => {
                tracing::debug!(task, pause_ms = length.as_millis() as u64, "random pause");
                std::thread::sleep(length);
                true
            }
            None => false,
        }
    }
}
