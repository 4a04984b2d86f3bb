//! Persisted per-generation history rows.

use serde::{Deserialize, Serialize};

use super::{Candidate, Metrics};

/// One row of the generation history log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRecord {
    /// Generations completed so far (1-based).
    pub generation: usize,
    /// Fitness of the generation's best candidate.
    pub fitness: f64,
    /// `total_wait / throughput`, 0 when throughput is 0.
    pub avg_waiting_time: f64,
    /// Arrived vehicles for the generation's best candidate.
    pub throughput: u64,
    pub green_a: i32,
    pub green_b: i32,
}

impl GenerationRecord {
    /// Build a record from the winning evaluation of a generation.
    pub fn from_metrics(generation: usize, fitness: f64, metrics: &Metrics) -> Self {
        Self {
            generation,
            fitness,
            avg_waiting_time: metrics.avg_waiting_time(),
            throughput: metrics.arrived_total,
            green_a: metrics.green_a,
            green_b: metrics.green_b,
        }
    }

    pub fn candidate(&self) -> Candidate {
        Candidate::new(self.green_a, self.green_b)
    }
}
