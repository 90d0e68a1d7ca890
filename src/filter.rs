//! Noise filtering for positional samples.
//!
//! Raw fixes carry sub-meter jitter and occasional large jumps from multipath
//! or a cold fix. The filter keeps a single baseline (the last accepted fix)
//! and measures each new fix against it:
//!
//! - no baseline yet: accept with contribution 0
//! - closer than `min_distance_m`: jitter, rejected
//! - further than `max_drift_m`: drift, rejected, baseline kept
//! - otherwise: accepted, contribution is the distance, baseline moves
//!
//! Rejections are ordinary outcomes, returned as values and logged at debug.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::geo::Position;

/// Thresholds for the noise filter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Movements shorter than this (meters) are treated as stationary jitter.
    pub min_distance_m: f64,
    /// Movements longer than this (meters) are treated as a spurious jump.
    pub max_drift_m: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_distance_m: 2.0,
            max_drift_m: 50.0,
        }
    }
}

/// Why a fix was not applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rejection {
    Jitter { distance_m: f64 },
    Drift { distance_m: f64 },
    /// Non-finite or out-of-range coordinates.
    Malformed,
}

/// Outcome of running one fix through the filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterDecision {
    /// First valid fix of the session; becomes the baseline, no distance.
    Baseline,
    Accepted { contribution_m: f64 },
    Rejected(Rejection),
}

impl FilterDecision {
    /// Distance this decision adds to the session total.
    pub fn contribution(&self) -> f64 {
        match self {
            FilterDecision::Accepted { contribution_m } => *contribution_m,
            FilterDecision::Baseline | FilterDecision::Rejected(_) => 0.0,
        }
    }

    pub fn is_accepted(&self) -> bool {
        !matches!(self, FilterDecision::Rejected(_))
    }
}

/// Running counts of filter outcomes, for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterStats {
    pub accepted: u64,
    pub jitter: u64,
    pub drift: u64,
    pub malformed: u64,
}

impl FilterStats {
    fn record(&mut self, decision: &FilterDecision) {
        match decision {
            FilterDecision::Baseline | FilterDecision::Accepted { .. } => self.accepted += 1,
            FilterDecision::Rejected(Rejection::Jitter { .. }) => self.jitter += 1,
            FilterDecision::Rejected(Rejection::Drift { .. }) => self.drift += 1,
            FilterDecision::Rejected(Rejection::Malformed) => self.malformed += 1,
        }
    }

    pub fn rejected(&self) -> u64 {
        self.jitter + self.drift + self.malformed
    }
}

/// Stateful filter holding the last accepted fix.
#[derive(Debug, Clone)]
pub struct NoiseFilter {
    config: FilterConfig,
    last_accepted: Option<Position>,
    stats: FilterStats,
}

impl NoiseFilter {
    pub fn new(config: FilterConfig) -> Self {
        Self {
            config,
            last_accepted: None,
            stats: FilterStats::default(),
        }
    }

    /// Classify `position` against the baseline, moving the baseline only
    /// when the fix is accepted.
    pub fn apply(&mut self, position: Position) -> FilterDecision {
        let decision = self.decide(&position);
        self.stats.record(&decision);

        match decision {
            FilterDecision::Baseline => {
                debug!(
                    lat = position.latitude,
                    lon = position.longitude,
                    "baseline fix established"
                );
                self.last_accepted = Some(position);
            }
            FilterDecision::Accepted { contribution_m } => {
                debug!(contribution_m, "accepted fix");
                self.last_accepted = Some(position);
            }
            FilterDecision::Rejected(Rejection::Jitter { distance_m }) => {
                debug!(distance_m, "ignoring small movement");
            }
            FilterDecision::Rejected(Rejection::Drift { distance_m }) => {
                debug!(distance_m, "ignoring position drift");
            }
            FilterDecision::Rejected(Rejection::Malformed) => {
                debug!(
                    lat = position.latitude,
                    lon = position.longitude,
                    "ignoring malformed fix"
                );
            }
        }

        decision
    }

    fn decide(&self, position: &Position) -> FilterDecision {
        if !position.is_valid() {
            return FilterDecision::Rejected(Rejection::Malformed);
        }

        let Some(last) = self.last_accepted else {
            return FilterDecision::Baseline;
        };

        let distance_m = position.distance_to(&last);
        if !distance_m.is_finite() {
            FilterDecision::Rejected(Rejection::Malformed)
        } else if distance_m < self.config.min_distance_m {
            FilterDecision::Rejected(Rejection::Jitter { distance_m })
        } else if distance_m > self.config.max_drift_m {
            FilterDecision::Rejected(Rejection::Drift { distance_m })
        } else {
            FilterDecision::Accepted {
                contribution_m: distance_m,
            }
        }
    }

    pub fn last_accepted(&self) -> Option<&Position> {
        self.last_accepted.as_ref()
    }

    pub fn stats(&self) -> FilterStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::{TimeZone, Utc};

    fn origin() -> Position {
        Position::new(37.7749, -122.4194, Utc.timestamp_opt(1_700_000_000, 0).unwrap())
    }

    fn filter_with_baseline() -> NoiseFilter {
        let mut filter = NoiseFilter::new(FilterConfig::default());
        assert_eq!(filter.apply(origin()), FilterDecision::Baseline);
        filter
    }

    #[test]
    fn test_default_thresholds() {
        let config = FilterConfig::default();
        assert_eq!(config.min_distance_m, 2.0);
        assert_eq!(config.max_drift_m, 50.0);
    }

    #[test]
    fn test_first_fix_is_baseline_with_no_distance() {
        let mut filter = NoiseFilter::new(FilterConfig::default());
        let decision = filter.apply(origin());

        assert_eq!(decision, FilterDecision::Baseline);
        assert_eq!(decision.contribution(), 0.0);
        assert_eq!(filter.last_accepted(), Some(&origin()));
    }

    #[test]
    fn test_jitter_is_rejected_and_baseline_kept() {
        let mut filter = filter_with_baseline();
        let decision = filter.apply(origin().offset(1.0, 90.0));

        assert_matches!(
            decision,
            FilterDecision::Rejected(Rejection::Jitter { distance_m }) if (distance_m - 1.0).abs() < 1e-6
        );
        assert_eq!(filter.last_accepted(), Some(&origin()));
    }

    #[test]
    fn test_drift_is_rejected_and_baseline_kept() {
        let mut filter = filter_with_baseline();
        let decision = filter.apply(origin().offset(80.0, 0.0));

        assert_matches!(decision, FilterDecision::Rejected(Rejection::Drift { .. }));
        assert_eq!(decision.contribution(), 0.0);
        assert_eq!(filter.last_accepted(), Some(&origin()));
    }

    #[test]
    fn test_movement_in_range_is_accepted() {
        let mut filter = filter_with_baseline();
        let next = origin().offset(10.0, 45.0);
        let decision = filter.apply(next);

        assert_matches!(decision, FilterDecision::Accepted { contribution_m } if (contribution_m - 10.0).abs() < 1e-6);
        assert_eq!(filter.last_accepted(), Some(&next));
    }

    #[test]
    fn test_thresholds_are_inclusive() {
        let mut filter = filter_with_baseline();
        // Slightly inside each bound to stay clear of rounding in the haversine.
        assert!(filter.apply(origin().offset(2.000_001, 0.0)).is_accepted());

        let mut filter = filter_with_baseline();
        assert!(filter.apply(origin().offset(49.999_99, 0.0)).is_accepted());
    }

    #[test]
    fn test_outlier_does_not_corrupt_baseline() {
        let mut filter = filter_with_baseline();
        filter.apply(origin().offset(500.0, 0.0));
        let decision = filter.apply(origin().offset(5.0, 0.0));

        assert_matches!(decision, FilterDecision::Accepted { contribution_m } if (contribution_m - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_malformed_fix_never_becomes_baseline() {
        let mut filter = NoiseFilter::new(FilterConfig::default());
        let bad = Position::new(f64::NAN, 0.0, Utc::now());

        assert_eq!(
            filter.apply(bad),
            FilterDecision::Rejected(Rejection::Malformed)
        );
        assert!(filter.last_accepted().is_none());
        assert_eq!(filter.apply(origin()), FilterDecision::Baseline);
    }

    #[test]
    fn test_custom_thresholds() {
        let mut filter = NoiseFilter::new(FilterConfig {
            min_distance_m: 0.5,
            max_drift_m: 5.0,
        });
        filter.apply(origin());

        assert!(filter.apply(origin().offset(1.0, 0.0)).is_accepted());
        assert_matches!(
            filter.apply(origin().offset(20.0, 0.0)),
            FilterDecision::Rejected(Rejection::Drift { .. })
        );
    }

    #[test]
    fn test_stats_count_each_outcome() {
        let mut filter = filter_with_baseline();
        filter.apply(origin().offset(1.0, 0.0));
        filter.apply(origin().offset(100.0, 0.0));
        filter.apply(Position::new(0.0, f64::INFINITY, Utc::now()));
        filter.apply(origin().offset(3.0, 0.0));

        let stats = filter.stats();
        assert_eq!(stats.accepted, 2);
        assert_eq!(stats.jitter, 1);
        assert_eq!(stats.drift, 1);
        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.rejected(), 3);
    }
}
