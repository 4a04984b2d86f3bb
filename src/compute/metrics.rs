//! Online accumulation of traffic statistics and the scalar fitness.

use crate::schema::{Candidate, Metrics};
use crate::sim::StepSnapshot;

/// Running totals over one simulation run.
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    step_length: f64,
    stop_speed: f64,
    total_wait: f64,
    speed_sum: f64,
    speed_samples: u64,
    arrived_total: u64,
}

impl MetricsCollector {
    pub fn new(step_length: f64, stop_speed: f64) -> Self {
        Self {
            step_length,
            stop_speed,
            total_wait: 0.0,
            speed_sum: 0.0,
            speed_samples: 0,
            arrived_total: 0,
        }
    }

    /// Fold in one step. Never fails; an empty network only adds arrivals.
    pub fn observe(&mut self, snapshot: &StepSnapshot) {
        for &(_, speed) in &snapshot.vehicles {
            if speed < self.stop_speed {
                self.total_wait += self.step_length;
            }
            self.speed_sum += speed;
            self.speed_samples += 1;
        }
        self.arrived_total += snapshot.arrived as u64;
    }

    pub fn arrived_total(&self) -> u64 {
        self.arrived_total
    }

    /// Freeze the totals into a [`Metrics`] record.
    pub fn finish(&self, candidate: Candidate, steps_used: u64) -> Metrics {
        let avg_speed = if self.speed_samples > 0 {
            self.speed_sum / self.speed_samples as f64
        } else {
            0.0
        };
        Metrics {
            green_a: candidate.green_a,
            green_b: candidate.green_b,
            steps_used,
            arrived_total: self.arrived_total,
            total_wait: self.total_wait,
            avg_speed,
        }
    }
}

/// Throughput minus a weighted waiting-time penalty. Higher is better.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fitness {
    pub alpha: f64,
}

impl Fitness {
    pub fn new(alpha: f64) -> Self {
        Self { alpha }
    }

    pub fn score(&self, metrics: &Metrics) -> f64 {
        metrics.arrived_total as f64 - self.alpha * metrics.total_wait
    }
}

impl Default for Fitness {
    fn default() -> Self {
        Self::new(0.01)
    }
}
