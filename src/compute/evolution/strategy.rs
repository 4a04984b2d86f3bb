//! Reproduction strategies.
//!
//! Selection and elitism are shared by the engine. A [`Variation`] only decides
//! how a child is produced from two chosen elites.

use crate::schema::{Candidate, GENE_COUNT, GreenBounds, SearchStrategy};

use super::genome::GenomeRng;

/// Produces one child from two parents.
pub trait Variation {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Child of `a` and `b`, always inside `bounds`.
    fn breed(
        &self,
        rng: &mut GenomeRng,
        a: Candidate,
        b: Candidate,
        bounds: &GreenBounds,
    ) -> Candidate;
}

/// Gene-swap crossover followed by per-gene Gaussian perturbation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianVariation {
    /// Probability that each gene is perturbed.
    pub mutation_rate: f64,
    /// Standard deviation of the perturbation, in seconds.
    pub mutation_std: f64,
}

impl Variation for GaussianVariation {
    fn name(&self) -> &'static str {
        "gaussian"
    }

    fn breed(
        &self,
        rng: &mut GenomeRng,
        a: Candidate,
        b: Candidate,
        bounds: &GreenBounds,
    ) -> Candidate {
        let mut genes = rng.swap_crossover(a, b).genes();
        for gene in &mut genes {
            if rng.chance(self.mutation_rate) {
                *gene = rng.gaussian_mutate(*gene, self.mutation_std, bounds);
            }
        }
        Candidate::from_genes(genes).clamped(bounds)
    }
}

/// Single-point crossover followed by uniform reset of a share of the genes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RandomResetVariation {
    /// Percentage of genes reset per child.
    pub mutation_percent_genes: f64,
}

impl RandomResetVariation {
    /// Genes reset per child; never fewer than one.
    pub fn genes_to_reset(&self) -> usize {
        let share = GENE_COUNT as f64 * self.mutation_percent_genes / 100.0;
        (share.round() as usize).clamp(1, GENE_COUNT)
    }
}

impl Variation for RandomResetVariation {
    fn name(&self) -> &'static str {
        "random-reset"
    }

    fn breed(
        &self,
        rng: &mut GenomeRng,
        a: Candidate,
        b: Candidate,
        bounds: &GreenBounds,
    ) -> Candidate {
        let mut genes = rng.single_point_crossover(a, b).genes();
        for index in rng.gene_indices(self.genes_to_reset()) {
            genes[index] = rng.uniform_gene(bounds);
        }
        Candidate::from_genes(genes).clamped(bounds)
    }
}

/// Variation operator for a configured strategy.
pub fn variation_for(strategy: &SearchStrategy, mutation_std: f64) -> Box<dyn Variation> {
    match *strategy {
        SearchStrategy::Gaussian { mutation_rate } => Box::new(GaussianVariation {
            mutation_rate,
            mutation_std,
        }),
        SearchStrategy::RandomReset {
            mutation_percent_genes,
        } => Box::new(RandomResetVariation {
            mutation_percent_genes,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const BOUNDS: GreenBounds = GreenBounds::new(10, 80);

    #[test]
    fn test_genes_to_reset() {
        let pct = |p| RandomResetVariation {
            mutation_percent_genes: p,
        };
        assert_eq!(pct(50.0).genes_to_reset(), 1);
        assert_eq!(pct(0.0).genes_to_reset(), 1);
        assert_eq!(pct(100.0).genes_to_reset(), 2);
    }

    #[test]
    fn test_gaussian_without_mutation_swaps_genes() {
        let variation = GaussianVariation {
            mutation_rate: 0.0,
            mutation_std: 6.0,
        };
        let mut rng = GenomeRng::new(11);
        let a = Candidate::new(20, 30);
        let b = Candidate::new(60, 70);
        for _ in 0..50 {
            let child = variation.breed(&mut rng, a, b, &BOUNDS);
            assert!(child == Candidate::new(20, 70) || child == Candidate::new(60, 30));
        }
    }

    #[test]
    fn test_variation_for_strategy() {
        assert_eq!(
            variation_for(&SearchStrategy::default(), 6.0).name(),
            "gaussian"
        );
        let reset = SearchStrategy::RandomReset {
            mutation_percent_genes: 50.0,
        };
        assert_eq!(variation_for(&reset, 6.0).name(), "random-reset");
    }

    proptest! {
        #[test]
        fn prop_children_in_bounds(
            seed in any::<u64>(),
            a in (10i32..=80, 10i32..=80),
            b in (10i32..=80, 10i32..=80),
            reset in any::<bool>(),
        ) {
            let strategy = if reset {
                SearchStrategy::RandomReset { mutation_percent_genes: 50.0 }
            } else {
                SearchStrategy::default()
            };
            let variation = variation_for(&strategy, 40.0);
            let mut rng = GenomeRng::new(seed);
            let child = variation.breed(
                &mut rng,
                Candidate::new(a.0, a.1),
                Candidate::new(b.0, b.1),
                &BOUNDS,
            );
            prop_assert!(BOUNDS.contains(child.green_a));
            prop_assert!(BOUNDS.contains(child.green_b));
        }
    }
}
