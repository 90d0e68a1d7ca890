//! Synthetic traces for demos and tests.
//!
//! The walker moves a fixed distance per fix along a slowly wandering
//! bearing. Each reported fix is the true position plus uniform jitter, and
//! with some probability a drift spike instead.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::geo::Position;
use crate::source::PedometerReading;

#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub fixes: usize,
    /// True distance covered between fixes, meters.
    pub step_m: f64,
    pub interval: Duration,
    /// Maximum jitter radius added to every fix, meters.
    pub jitter_m: f64,
    /// Chance of a fix being replaced by a drift spike.
    pub drift_probability: f64,
    pub drift_m: f64,
    /// Average stride used to derive step counts for pedometer traces.
    pub stride_m: f64,
    pub origin: (f64, f64),
    pub start: DateTime<Utc>,
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            fixes: 120,
            step_m: 3.0,
            interval: Duration::from_secs(1),
            jitter_m: 0.5,
            drift_probability: 0.05,
            drift_m: 120.0,
            stride_m: 0.8,
            origin: (59.3293, 18.0686),
            start: Utc::now(),
            seed: 7,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulatedTrack {
    pub fixes: Vec<Position>,
    /// Distance the walker actually covered.
    pub true_distance_m: f64,
}

pub fn simulate_track(config: &SimulationConfig) -> SimulatedTrack {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut truth = Position::new(config.origin.0, config.origin.1, config.start);
    let mut bearing: f64 = rng.gen_range(0.0..360.0);
    let mut fixes = Vec::with_capacity(config.fixes);
    let mut true_distance_m = 0.0;

    for i in 0..config.fixes {
        if i > 0 {
            bearing = (bearing + rng.gen_range(-15.0..15.0)).rem_euclid(360.0);
            truth = truth.offset(config.step_m, bearing);
            true_distance_m += config.step_m;
        }
        let timestamp = config.start
            + chrono::Duration::from_std(config.interval * i as u32)
                .unwrap_or(chrono::Duration::zero());

        let reported = if i > 0 && rng.gen_bool(config.drift_probability.clamp(0.0, 1.0)) {
            truth.offset(config.drift_m, rng.gen_range(0.0..360.0))
        } else if config.jitter_m > 0.0 {
            truth.offset(rng.gen_range(0.0..config.jitter_m), rng.gen_range(0.0..360.0))
        } else {
            truth
        };

        fixes.push(Position {
            timestamp,
            ..reported
        });
    }

    SimulatedTrack {
        fixes,
        true_distance_m,
    }
}

/// Pedometer trace for the same walk: absolute distance and steps.
pub fn simulate_readings(config: &SimulationConfig) -> Vec<PedometerReading> {
    (0..config.fixes)
        .map(|i| {
            let distance_m = config.step_m * i as f64;
            let steps = if config.stride_m > 0.0 {
                (distance_m / config.stride_m).round() as u64
            } else {
                0
            };
            let timestamp = config.start
                + chrono::Duration::from_std(config.interval * i as u32)
                    .unwrap_or(chrono::Duration::zero());
            PedometerReading::new(timestamp, distance_m, steps)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{FilterConfig, NoiseFilter};
    use itertools::Itertools;

    fn config() -> SimulationConfig {
        SimulationConfig {
            fixes: 50,
            start: DateTime::parse_from_rfc3339("2026-10-18T09:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            ..SimulationConfig::default()
        }
    }

    #[test]
    fn test_same_seed_same_track() {
        let a = simulate_track(&config());
        let b = simulate_track(&config());
        assert_eq!(a.fixes, b.fixes);

        let c = simulate_track(&SimulationConfig {
            seed: 99,
            ..config()
        });
        assert_ne!(a.fixes, c.fixes);
    }

    #[test]
    fn test_timestamps_follow_interval() {
        let track = simulate_track(&config());
        assert_eq!(track.fixes.len(), 50);
        for (a, b) in track.fixes.iter().tuple_windows() {
            assert_eq!((b.timestamp - a.timestamp).num_seconds(), 1);
        }
    }

    #[test]
    fn test_clean_track_is_measured_exactly() {
        let cfg = SimulationConfig {
            jitter_m: 0.0,
            drift_probability: 0.0,
            ..config()
        };
        let track = simulate_track(&cfg);
        let mut filter = NoiseFilter::new(FilterConfig::default());
        let total: f64 = track
            .fixes
            .iter()
            .map(|p| filter.apply(*p).contribution())
            .sum();

        assert!((total - track.true_distance_m).abs() < 1e-6);
        assert!((track.true_distance_m - 147.0).abs() < 1e-9);
    }

    #[test]
    fn test_drift_spikes_are_filtered() {
        let cfg = SimulationConfig {
            jitter_m: 0.0,
            drift_probability: 0.2,
            ..config()
        };
        let track = simulate_track(&cfg);
        let mut filter = NoiseFilter::new(FilterConfig::default());
        let total: f64 = track
            .fixes
            .iter()
            .map(|p| filter.apply(*p).contribution())
            .sum();

        assert!(filter.stats().drift > 0);
        assert!(total <= track.true_distance_m + 1e-6);
    }

    #[test]
    fn test_readings_are_monotonic() {
        let readings = simulate_readings(&config());
        assert_eq!(readings[0].distance_m, 0.0);
        assert!(readings
            .iter()
            .tuple_windows()
            .all(|(a, b)| b.distance_m >= a.distance_m && b.steps >= a.steps));
    }
}
