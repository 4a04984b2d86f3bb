//! Random operators on two-gene timing plans.

use rand::prelude::*;
use rand::seq::index;
use rand_distr::StandardNormal;

use crate::schema::{Candidate, GENE_COUNT, GreenBounds};

/// Random number generator wrapper for genome operations.
pub struct GenomeRng {
    rng: StdRng,
}

impl GenomeRng {
    /// Create from seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Uniform integer gene in bounds, inclusive.
    pub fn uniform_gene(&mut self, bounds: &GreenBounds) -> i32 {
        self.rng.gen_range(bounds.min..=bounds.max)
    }

    /// Candidate with both greens drawn uniformly in bounds.
    pub fn random_candidate(&mut self, bounds: &GreenBounds) -> Candidate {
        Candidate::new(self.uniform_gene(bounds), self.uniform_gene(bounds))
    }

    /// Two distinct parents drawn uniformly from `pool`.
    ///
    /// Returns `None` when the pool holds fewer than two candidates.
    pub fn pick_parents(&mut self, pool: &[Candidate]) -> Option<(Candidate, Candidate)> {
        if pool.len() < 2 {
            return None;
        }
        let picked = index::sample(&mut self.rng, pool.len(), 2);
        Some((pool[picked.index(0)], pool[picked.index(1)]))
    }

    /// Gene-swap crossover: `[a0, b1]` or `[b0, a1]` with equal probability.
    pub fn swap_crossover(&mut self, a: Candidate, b: Candidate) -> Candidate {
        if self.rng.gen_bool(0.5) {
            Candidate::new(a.green_a, b.green_b)
        } else {
            Candidate::new(b.green_a, a.green_b)
        }
    }

    /// Single-point crossover: genes before the cut from `a`, the rest from `b`.
    pub fn single_point_crossover(&mut self, a: Candidate, b: Candidate) -> Candidate {
        let cut = self.rng.gen_range(0..GENE_COUNT);
        let (a, b) = (a.genes(), b.genes());
        let mut genes = b;
        genes[..cut].copy_from_slice(&a[..cut]);
        Candidate::from_genes(genes)
    }

    /// Gaussian mutation: add N(0, std) noise, then clamp.
    pub fn gaussian_mutate(&mut self, value: i32, std: f64, bounds: &GreenBounds) -> i32 {
        let noise: f64 = self.rng.sample(StandardNormal);
        bounds.clamp(value as f64 + noise * std)
    }

    /// True with probability `p`.
    pub fn chance(&mut self, p: f64) -> bool {
        self.rng.r#gen::<f64>() < p
    }

    /// `amount` distinct gene indices, in random order.
    pub fn gene_indices(&mut self, amount: usize) -> Vec<usize> {
        index::sample(&mut self.rng, GENE_COUNT, amount.min(GENE_COUNT)).into_vec()
    }
}
