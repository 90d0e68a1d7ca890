use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Immutable record of a run.
///
/// Fields are only readable; a summary is built once from a session's
/// accumulators and handed over by value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    id: Uuid,
    /// Meters.
    distance: f64,
    /// Seconds.
    duration: f64,
    /// When the run started.
    timestamp: DateTime<Utc>,
}

impl RunSummary {
    pub fn new(distance: f64, duration: f64, timestamp: DateTime<Utc>) -> Self {
        Self::from_parts(Uuid::new_v4(), distance, duration, timestamp)
    }

    /// Rebuild a summary with a known id, e.g. when loading from a store.
    pub fn from_parts(id: Uuid, distance: f64, duration: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            id,
            distance: distance.max(0.0),
            duration: duration.max(0.0),
            timestamp,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn distance(&self) -> f64 {
        self.distance
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Run: {:.2} m, {:.2} s ({})",
            self.distance,
            self.duration,
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_ids_are_unique() {
        let now = Utc::now();
        let a = RunSummary::new(1.0, 2.0, now);
        let b = RunSummary::new(1.0, 2.0, now);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_display() {
        let ts = Utc.with_ymd_and_hms(2026, 10, 18, 9, 30, 0).unwrap();
        let summary = RunSummary::new(7.0, 12.0, ts);
        assert_eq!(summary.to_string(), "Run: 7.00 m, 12.00 s (2026-10-18 09:30:00 UTC)");
    }

    #[test]
    fn test_negative_values_are_clamped() {
        let summary = RunSummary::new(-3.0, -1.0, Utc::now());
        assert_eq!(summary.distance(), 0.0);
        assert_eq!(summary.duration(), 0.0);
    }

    #[test]
    fn test_json_shape() {
        let ts = Utc.with_ymd_and_hms(2026, 1, 27, 0, 0, 0).unwrap();
        let summary = RunSummary::new(2500.0, 1200.0, ts);
        let value = serde_json::to_value(&summary).unwrap();

        assert_eq!(value["distance"], 2500.0);
        assert_eq!(value["duration"], 1200.0);
        assert_eq!(value["timestamp"], "2026-01-27T00:00:00Z");
        assert_eq!(value["id"], summary.id().to_string());
    }
}
