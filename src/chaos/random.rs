use std::collections::VecDeque;
use std::fmt;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Source of the dice rolls behind every probabilistic chaos decision.
///
/// Production uses [`ThreadRandom`]; a fixed seed gives a reproducible run
/// and tests script exact rolls with [`ScriptedRandom`].
pub trait RandomSource: Send + Sync + fmt::Debug {
    /// Uniform integer in `[0, upper)`. Returns 0 when `upper` is 0.
    fn below(&self, upper: u64) -> u64;

    /// `true` with probability `percent`/100
    fn chance(&self, percent: u64) -> bool {
        percent > 0 && self.below(100) < percent
    }
}

/// Thread-local entropy
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn below(&self, upper: u64) -> u64 {
        if upper == 0 {
            return 0;
        }
        rand::thread_rng().gen_range(0..upper)
    }
}

/// Deterministic generator for reproducible chaos runs
#[derive(Debug)]
pub struct SeededRandom {
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl RandomSource for SeededRandom {
    fn below(&self, upper: u64) -> u64 {
        if upper == 0 {
            return 0;
        }
        self.rng.lock().gen_range(0..upper)
    }
}

/// Replays a fixed sequence of rolls, then a fallback value forever.
///
/// Each roll is reduced modulo `upper` so a script stays valid whatever
/// bound the caller asks for.
#[derive(Debug)]
pub struct ScriptedRandom {
    rolls: Mutex<VecDeque<u64>>,
    fallback: u64,
}

impl ScriptedRandom {
    pub fn new<I: IntoIterator<Item = u64>>(rolls: I, fallback: u64) -> Self {
        Self {
            rolls: Mutex::new(rolls.into_iter().collect()),
            fallback,
        }
    }

    /// Always returns `value`
    pub fn constant(value: u64) -> Self {
        Self::new(Vec::new(), value)
    }
}

impl RandomSource for ScriptedRandom {
    fn below(&self, upper: u64) -> u64 {
        if upper == 0 {
            return 0;
        }
        let roll = self.rolls.lock().pop_front().unwrap_or(self.fallback);
        roll % upper
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_random_in_range() {
        let random = ThreadRandom;
        for _ in 0..1000 {
            assert!(random.below(7) < 7);
        }
        assert_eq!(random.below(0), 0);
    }

    #[test]
    fn test_seeded_random_is_reproducible() {
        let a = SeededRandom::new(42);
        let b = SeededRandom::new(42);
        let rolls_a: Vec<u64> = (0..32).map(|_| a.below(100)).collect();
        let rolls_b: Vec<u64> = (0..32).map(|_| b.below(100)).collect();
        assert_eq!(rolls_a, rolls_b);
    }

    #[test]
    fn test_scripted_random_replays_then_falls_back() {
        let random = ScriptedRandom::new(vec![3, 150, 0], 99);
        assert_eq!(random.below(100), 3);
        assert_eq!(random.below(100), 50);
        assert_eq!(random.below(100), 0);
        assert_eq!(random.below(100), 99);
        assert_eq!(random.below(100), 99);
    }

    #[test]
    fn test_chance_bounds() {
        assert!(!ScriptedRandom::constant(0).chance(0));
        assert!(ScriptedRandom::constant(99).chance(100));
        assert!(ScriptedRandom::constant(0).chance(1));
        assert!(!ScriptedRandom::constant(1).chance(1));
    }
}
