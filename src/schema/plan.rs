//! Timing-plan candidates and the per-run measurements taken from them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Number of evolved genes per candidate.
pub const GENE_COUNT: usize = 2;

/// Inclusive bounds on a green duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GreenBounds {
    pub min: i32,
    pub max: i32,
}

impl GreenBounds {
    pub const fn new(min: i32, max: i32) -> Self {
        Self { min, max }
    }

    /// Truncate toward zero, then clamp into `[min, max]`.
    ///
    /// Defined for every input: NaN maps to `min`, infinities to the
    /// nearest bound.
    pub fn clamp(&self, value: f64) -> i32 {
        if value.is_nan() {
            return self.min;
        }
        let truncated = value.trunc();
        if truncated <= self.min as f64 {
            self.min
        } else if truncated >= self.max as f64 {
            self.max
        } else {
            truncated as i32
        }
    }

    /// Whether a duration lies inside the bounds.
    #[inline]
    pub fn contains(&self, value: i32) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

/// A candidate timing plan: the two green durations in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Candidate {
    pub green_a: i32,
    pub green_b: i32,
}

impl Candidate {
    pub const fn new(green_a: i32, green_b: i32) -> Self {
        Self { green_a, green_b }
    }

    pub fn from_genes(genes: [i32; GENE_COUNT]) -> Self {
        Self::new(genes[0], genes[1])
    }

    pub fn genes(&self) -> [i32; GENE_COUNT] {
        [self.green_a, self.green_b]
    }

    /// Copy with both greens clamped into `bounds`.
    pub fn clamped(&self, bounds: &GreenBounds) -> Self {
        Self::new(
            bounds.clamp(self.green_a as f64),
            bounds.clamp(self.green_b as f64),
        )
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.green_a, self.green_b)
    }
}

/// Aggregate traffic statistics from one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub green_a: i32,
    pub green_b: i32,
    /// Simulation steps actually executed.
    pub steps_used: u64,
    /// Vehicles that completed their route.
    pub arrived_total: u64,
    /// Vehicle-seconds spent below the stop speed.
    pub total_wait: f64,
    /// Mean speed over all vehicle-step samples.
    pub avg_speed: f64,
}

impl Metrics {
    pub fn candidate(&self) -> Candidate {
        Candidate::new(self.green_a, self.green_b)
    }

    /// Waiting time per arrived vehicle, 0 when nothing arrived.
    pub fn avg_waiting_time(&self) -> f64 {
        if self.arrived_total == 0 {
            0.0
        } else {
            self.total_wait / self.arrived_total as f64
        }
    }
}
