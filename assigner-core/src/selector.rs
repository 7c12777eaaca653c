use std::sync::Mutex;

use rand::rngs::{OsRng, StdRng};
use rand::{Rng, SeedableRng};

/// Source of randomness used to break ties between equally loaded groups.
///
/// Participants must not be able to predict where they will land, so production code uses
/// `OsTieBreaker`. Tests can inject a seeded or fixed implementation.
pub trait TieBreaker: Send + Sync {
    /// Return an index in `0..candidates`. `candidates` is never zero.
    fn pick(&self, candidates: usize) -> usize;
}

/// Draws from the operating system CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsTieBreaker;

impl TieBreaker for OsTieBreaker {
    fn pick(&self, candidates: usize) -> usize {
        OsRng.gen_range(0..candidates)
    }
}

/// Reproducible tie breaker, for tests and simulations only.
#[derive(Debug)]
pub struct SeededTieBreaker {
    rng: Mutex<StdRng>,
}

impl SeededTieBreaker {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl TieBreaker for SeededTieBreaker {
    fn pick(&self, candidates: usize) -> usize {
        // A poisoned lock only means another picker panicked, the rng state is still usable.
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        rng.gen_range(0..candidates)
    }
}

/// Always picks the candidate at the given position (clamped to the last candidate).
#[derive(Debug, Default, Clone, Copy)]
pub struct FixedTieBreaker(pub usize);

impl TieBreaker for FixedTieBreaker {
    fn pick(&self, candidates: usize) -> usize {
        self.0.min(candidates - 1)
    }
}

/// Pick the group with the most remaining seats.
///
/// `remaining = capacity - count` can be negative once every group is overbooked; the least
/// overbooked group still wins, so balance holds past capacity. Ties are broken by
/// `tie_breaker`. Returns a 0-based index, or `None` when there are no groups.
pub fn choose_group(
    counts: &[i64],
    capacities: &[i64],
    tie_breaker: &dyn TieBreaker,
) -> Option<usize> {
    debug_assert_eq!(counts.len(), capacities.len());

    let remaining: Vec<i64> = capacities
        .iter()
        .zip(counts)
        .map(|(capacity, count)| capacity - count)
        .collect();

    let best = *remaining.iter().max()?;
    let candidates: Vec<usize> = remaining
        .iter()
        .enumerate()
        .filter(|(_, r)| **r == best)
        .map(|(index, _)| index)
        .collect();

    Some(candidates[tie_breaker.pick(candidates.len())])
}
