// src/rng.rs
//! Random Number Generation for Monte Carlo Simulations
//!
//! # Design Philosophy
//!
//! Monte Carlo pricing needs random numbers that are:
//! 1. **Reproducible**: same seed → same price (critical for debugging/validation)
//! 2. **Topology independent**: a path sees the same draws whether it runs
//!    sequentially, on a thread pool, or in a remote partition
//! 3. **Injectable**: tests and bump-and-reprice sweeps supply their own draws
//!
//! # Path-keyed streams
//!
//! Every path owns a stream derived from `(base_seed, path_index)`. No stream
//! is shared between paths, so partitions never draw correlated numbers and
//! any split of the path range reproduces the same draws.

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, StandardNormal};

/// Supplier of per-step standard normal draws for one path
pub trait NormalSource: Sync {
    /// Fill `draws` with the normals of path `path_index`, one per time step.
    fn fill_path(&self, path_index: u64, draws: &mut [f64]);

    /// Largest path count and step count this source can serve, if bounded.
    fn capacity(&self) -> Option<(usize, usize)> {
        None
    }
}

/// RNG factory for reproducible parallel simulations
#[derive(Debug, Clone, Copy)]
pub struct RngFactory {
    base_seed: u64,
}

impl RngFactory {
    pub fn new(base_seed: u64) -> Self {
        Self { base_seed }
    }

    pub fn base_seed(&self) -> u64 {
        self.base_seed
    }

    /// Create a standard RNG for a specific path
    pub fn create_std_rng(&self, path_id: u64) -> StdRng {
        StdRng::seed_from_u64(self.base_seed.wrapping_add(path_id))
    }
}

pub fn get_normal_draw<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    StandardNormal.sample(rng)
}

/// Pseudo-random normals, one `StdRng` per path
///
/// With `antithetic` set, odd paths replay the previous even path's draws
/// negated, so paths come in (Z, -Z) pairs.
#[derive(Debug, Clone, Copy)]
pub struct SeededNormals {
    factory: RngFactory,
    antithetic: bool,
}

impl SeededNormals {
    pub fn new(seed: u64) -> Self {
        Self {
            factory: RngFactory::new(seed),
            antithetic: false,
        }
    }

    pub fn with_antithetic(mut self, antithetic: bool) -> Self {
        self.antithetic = antithetic;
        self
    }

    pub fn is_antithetic(&self) -> bool {
        self.antithetic
    }
}

impl NormalSource for SeededNormals {
    fn fill_path(&self, path_index: u64, draws: &mut [f64]) {
        let mirrored = self.antithetic && path_index % 2 == 1;
        let stream = if mirrored { path_index - 1 } else { path_index };
        let mut rng = self.factory.create_std_rng(stream);
        for z in draws.iter_mut() {
            let draw = get_normal_draw(&mut rng);
            *z = if mirrored { -draw } else { draw };
        }
    }
}

/// Pre-generated draws, one row per path and one column per step
#[derive(Debug, Clone)]
pub struct FixedDraws {
    draws: Array2<f64>,
}

impl FixedDraws {
    pub fn new(draws: Array2<f64>) -> Self {
        Self { draws }
    }

    /// The same draw at every step of every path
    pub fn constant(paths: usize, steps: usize, z: f64) -> Self {
        Self::new(Array2::from_elem((paths, steps), z))
    }

    /// Materialise `paths` rows from another source
    pub fn sample<S: NormalSource + ?Sized>(source: &S, paths: usize, steps: usize) -> Self {
        let mut draws = Array2::<f64>::zeros((paths, steps));
        for (i, mut row) in draws.rows_mut().into_iter().enumerate() {
            let mut buffer = vec![0.0; steps];
            source.fill_path(i as u64, &mut buffer);
            for (dst, src) in row.iter_mut().zip(buffer) {
                *dst = src;
            }
        }
        Self::new(draws)
    }

    pub fn dim(&self) -> (usize, usize) {
        self.draws.dim()
    }
}

impl NormalSource for FixedDraws {
    fn fill_path(&self, path_index: u64, draws: &mut [f64]) {
        let row = self.draws.row(path_index as usize);
        for (dst, src) in draws.iter_mut().zip(row.iter()) {
            *dst = *src;
        }
    }

    fn capacity(&self) -> Option<(usize, usize)> {
        Some(self.draws.dim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_normals_reproducibility() {
        let source = SeededNormals::new(42);
        let mut a = vec![0.0; 5];
        let mut b = vec![0.0; 5];
        source.fill_path(7, &mut a);
        source.fill_path(7, &mut b);
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_paths_differ() {
        let source = SeededNormals::new(42);
        let mut a = vec![0.0; 10];
        let mut b = vec![0.0; 10];
        source.fill_path(0, &mut a);
        source.fill_path(1, &mut b);
        assert_ne!(a, b);
    }

    #[test]
    fn test_antithetic_pairs_are_negated() {
        let source = SeededNormals::new(7).with_antithetic(true);
        assert!(source.is_antithetic());
        let mut even = vec![0.0; 4];
        let mut odd = vec![0.0; 4];
        source.fill_path(10, &mut even);
        source.fill_path(11, &mut odd);
        for (z, minus_z) in even.iter().zip(&odd) {
            assert_eq!(*z, -*minus_z);
        }
    }

    #[test]
    fn test_fixed_draws_replay_rows() {
        let seeded = SeededNormals::new(3);
        let fixed = FixedDraws::sample(&seeded, 4, 3);
        assert_eq!(fixed.capacity(), Some((4, 3)));

        let mut expected = vec![0.0; 3];
        let mut replayed = vec![0.0; 3];
        seeded.fill_path(2, &mut expected);
        fixed.fill_path(2, &mut replayed);
        assert_eq!(expected, replayed);
    }

    #[test]
    fn test_normal_distribution() {
        let factory = RngFactory::new(42);
        let mut rng = factory.create_std_rng(0);

        let samples: Vec<f64> = (0..10000).map(|_| get_normal_draw(&mut rng)).collect();

        let mean = samples.iter().sum::<f64>() / samples.len() as f64;
        let variance =
            samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / samples.len() as f64;

        assert!(mean.abs() < 0.05, "Mean should be close to 0, got {}", mean);
        assert!((variance - 1.0).abs() < 0.05, "Variance should be close to 1, got {}", variance);
    }
}
