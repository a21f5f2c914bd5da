//! Weighted random candidate selection
//!
//! Whenever several structurally valid candidates exist, each gets an
//! independent zero-mean noise score and the maximum wins: a uniform
//! random pick among valid candidates, tie-broken by continuous noise.
//! Callers may add a deterministic bias (e.g. a meme-affinity score) on
//! top of the noise. The random source is an explicit strategy so tests
//! can seed it.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Explicit random source, constructible from entropy or a fixed seed.
#[derive(Debug)]
pub struct RandomSource {
    rng: StdRng,
}

impl RandomSource {
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

    /// Zero-mean continuous noise in (-0.5, 0.5).
    pub fn noise(&mut self) -> f64 {
        self.rng.gen::<f64>() - 0.5
    }
}

/// Keeps the maximum-scoring candidate seen so far.
#[derive(Debug)]
pub struct Chooser<T> {
    best: Option<(f64, T)>,
    count: usize,
}

impl<T> Chooser<T> {
    pub fn new() -> Self {
        Self {
            best: None,
            count: 0,
        }
    }

    /// Offer a candidate with an explicit score.
    pub fn add(&mut self, candidate: T, score: f64) {
        self.count += 1;
        match &self.best {
            Some((best_score, _)) if *best_score >= score => {}
            _ => self.best = Some((score, candidate)),
        }
    }

    /// Offer a candidate scored by noise alone.
    pub fn add_noise(&mut self, candidate: T, random: &mut RandomSource) {
        self.add(candidate, random.noise());
    }

    /// Number of candidates offered.
    pub fn count(&self) -> usize {
        self.count
    }

    /// The winning candidate, if any were offered.
    pub fn take(self) -> Option<T> {
        self.best.map(|(_, candidate)| candidate)
    }
}

impl<T> Default for Chooser<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_source_is_reproducible() {
        let mut a = RandomSource::seeded(42);
        let mut b = RandomSource::seeded(42);
        for _ in 0..16 {
            assert_eq!(a.noise(), b.noise());
        }
    }

    #[test]
    fn noise_is_bounded_and_varied() {
        let mut random = RandomSource::seeded(7);
        let samples: Vec<f64> = (0..64).map(|_| random.noise()).collect();
        assert!(samples.iter().all(|n| n.abs() <= 0.5));
        assert!(samples.windows(2).any(|w| w[0] != w[1]));
    }

    #[test]
    fn chooser_keeps_max_score() {
        let mut chooser = Chooser::new();
        chooser.add("low", -0.4);
        chooser.add("high", 0.3);
        chooser.add("mid", 0.0);
        assert_eq!(chooser.count(), 3);
        assert_eq!(chooser.take(), Some("high"));
    }

    #[test]
    fn empty_chooser_yields_none() {
        let chooser: Chooser<&str> = Chooser::new();
        assert_eq!(chooser.take(), None);
    }

    #[test]
    fn result_is_among_candidates() {
        let candidates = ["a", "b", "c", "d"];
        let mut random = RandomSource::seeded(99);
        let mut chooser = Chooser::new();
        for candidate in candidates {
            chooser.add_noise(candidate, &mut random);
        }
        let winner = chooser.take().unwrap();
        assert!(candidates.contains(&winner));
    }

    #[test]
    fn bias_dominates_when_large() {
        let mut random = RandomSource::seeded(1);
        let mut chooser = Chooser::new();
        chooser.add("biased", 10.0 + random.noise());
        chooser.add_noise("plain", &mut random);
        assert_eq!(chooser.take(), Some("biased"));
    }
}
