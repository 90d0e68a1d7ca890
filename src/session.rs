use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::elapsed_secs;
use crate::filter::{FilterConfig, FilterDecision, FilterStats, NoiseFilter};
use crate::geo::Position;
use crate::source::{PedometerReading, Sample, SourceKind};
use crate::summary::RunSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum SessionState {
    Idle,
    Active,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionConfig {
    pub filter: FilterConfig,
    pub tick_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            filter: FilterConfig::default(),
            tick_interval: Duration::from_secs(1),
        }
    }
}

/// Point-in-time view of a session, published to observers.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub source_kind: Option<SourceKind>,
    pub distance_m: f64,
    pub duration_s: f64,
    pub step_count: Option<u64>,
    pub filter: FilterStats,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// Mutable accumulators of one run.
///
/// While `Active`, distance and duration never decrease. Positional fixes go
/// through the noise filter, which owns the last accepted position; pedometer
/// readings replace the distance outright.
#[derive(Debug, Clone)]
pub struct RunSession {
    state: SessionState,
    source_kind: Option<SourceKind>,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    accumulated_distance: f64,
    elapsed_duration: f64,
    step_count: Option<u64>,
    filter: NoiseFilter,
}

impl Default for RunSession {
    fn default() -> Self {
        Self {
            state: SessionState::Idle,
            source_kind: None,
            start_time: None,
            end_time: None,
            accumulated_distance: 0.0,
            elapsed_duration: 0.0,
            step_count: None,
            filter: NoiseFilter::new(FilterConfig::default()),
        }
    }
}

impl RunSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset every accumulator and enter `Active`.
    pub fn begin(&mut self, kind: SourceKind, config: &SessionConfig, now: DateTime<Utc>) {
        *self = Self {
            state: SessionState::Active,
            source_kind: Some(kind),
            start_time: Some(now),
            filter: NoiseFilter::new(config.filter),
            ..Self::default()
        };
    }

    /// Apply one sample. Returns whether published state may have changed.
    pub fn apply(&mut self, sample: Sample) -> bool {
        if self.state != SessionState::Active {
            return false;
        }
        match (self.source_kind, sample) {
            (Some(SourceKind::Positional), Sample::Position(p)) => {
                self.apply_position(p).is_accepted()
            }
            (Some(SourceKind::Pedometric), Sample::Reading(r)) => self.apply_reading(r),
            (kind, sample) => {
                debug!(?kind, ?sample, "ignoring sample from inactive source kind");
                false
            }
        }
    }

    fn apply_position(&mut self, position: Position) -> FilterDecision {
        let decision = self.filter.apply(position);
        self.accumulated_distance += decision.contribution();
        decision
    }

    fn apply_reading(&mut self, reading: PedometerReading) -> bool {
        if !reading.distance_m.is_finite() || reading.distance_m < 0.0 {
            debug!(distance_m = reading.distance_m, "ignoring malformed pedometer reading");
            return false;
        }
        if reading.distance_m < self.accumulated_distance {
            debug!(
                distance_m = reading.distance_m,
                current_m = self.accumulated_distance,
                "ignoring out-of-order pedometer reading"
            );
            return false;
        }
        self.accumulated_distance = reading.distance_m;
        self.step_count = Some(self.step_count.map_or(reading.steps, |s| s.max(reading.steps)));
        debug!(
            distance_m = reading.distance_m,
            steps = reading.steps,
            "pedometer reading applied"
        );
        true
    }

    /// Recompute elapsed time from the wall clock.
    pub fn tick(&mut self, now: DateTime<Utc>) -> bool {
        if self.state != SessionState::Active {
            return false;
        }
        let Some(start) = self.start_time else {
            return false;
        };
        self.elapsed_duration = self.elapsed_duration.max(elapsed_secs(start, now));
        true
    }

    /// Enter `Stopped`, recording the end time once. Returns false if the
    /// session was not active.
    pub fn finish(&mut self, now: DateTime<Utc>) -> bool {
        if self.state != SessionState::Active {
            return false;
        }
        self.tick(now);
        self.end_time = Some(now);
        self.state = SessionState::Stopped;
        true
    }

    /// Summary of the current accumulators, or `None` if never started.
    pub fn summary(&self) -> Option<RunSummary> {
        let start = self.start_time?;
        Some(RunSummary::new(
            self.accumulated_distance,
            self.elapsed_duration,
            start,
        ))
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            source_kind: self.source_kind,
            distance_m: self.accumulated_distance,
            duration_s: self.elapsed_duration,
            step_count: self.step_count,
            filter: self.filter.stats(),
            started_at: self.start_time,
            ended_at: self.end_time,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn source_kind(&self) -> Option<SourceKind> {
        self.source_kind
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    pub fn accumulated_distance(&self) -> f64 {
        self.accumulated_distance
    }

    pub fn elapsed_duration(&self) -> f64 {
        self.elapsed_duration
    }

    pub fn step_count(&self) -> Option<u64> {
        self.step_count
    }

    pub fn last_accepted_position(&self) -> Option<&Position> {
        self.filter.last_accepted()
    }
}
