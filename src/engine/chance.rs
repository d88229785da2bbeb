//! Injectable randomness and delays
//!
//! Everything the pipeline decides by chance, and every deliberate pause,
//! goes through these traits so tests can force a branch and skip the wait.

use std::ops::Range;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Random decisions made by the pipeline
pub trait Chance: Send {
    /// Whether to request two candidates instead of one
    fn two_candidates(&mut self) -> bool;

    /// Pick an index in `0..len`; `len` is never zero
    fn pick(&mut self, len: usize) -> usize;

    /// Draw a delay uniformly from `window`
    fn delay_in(&mut self, window: Range<Duration>) -> Duration;
}

/// [`Chance`] backed by a seedable RNG
pub struct RngChance<R = StdRng> {
    rng: R,
}

impl RngChance<StdRng> {
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl<R: Rng + Send> Chance for RngChance<R> {
    fn two_candidates(&mut self) -> bool {
        self.rng.gen_bool(0.5)
    }

    fn pick(&mut self, len: usize) -> usize {
        self.rng.gen_range(0..len)
    }

    fn delay_in(&mut self, window: Range<Duration>) -> Duration {
        if window.start >= window.end {
            return window.start;
        }
        self.rng.gen_range(window)
    }
}

/// Blocking pause used between attempts and on the greeting path
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Sleeps the current thread
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_stays_in_window() {
        let mut chance = RngChance::seeded(7);
        let window = Duration::from_secs(3)..Duration::from_secs(7);
        for _ in 0..100 {
            let delay = chance.delay_in(window.clone());
            assert!(delay >= window.start && delay < window.end);
        }
    }

    #[test]
    fn test_pick_in_bounds() {
        let mut chance = RngChance::seeded(1);
        for _ in 0..100 {
            assert!(chance.pick(3) < 3);
        }
        assert_eq!(chance.pick(1), 0);
    }

    #[test]
    fn test_seeded_is_reproducible() {
        let mut a = RngChance::seeded(42);
        let mut b = RngChance::seeded(42);
        let flips_a: Vec<bool> = (0..16).map(|_| a.two_candidates()).collect();
        let flips_b: Vec<bool> = (0..16).map(|_| b.two_candidates()).collect();
        assert_eq!(flips_a, flips_b);
    }
}
