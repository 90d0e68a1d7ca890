//! Recorded traces and their playback.
//!
//! A trace is a CSV file with a header row. Positional traces carry
//! `latitude,longitude,timestamp`; pedometric traces carry
//! `timestamp,distance_m,steps`. Timestamps are RFC 3339.

use std::io::{Read, Write};
use std::path::Path;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use itertools::Itertools;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::Result;
use crate::geo::Position;
use crate::source::{
    Authorization, LocationProvider, MotionProvider, PedometerReading, Sample, Sink, SourceError,
};

pub trait Timestamped {
    fn timestamp(&self) -> DateTime<Utc>;
}

impl Timestamped for Position {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl Timestamped for PedometerReading {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

pub fn read_trace<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<Vec<T>> {
    let reader = csv::Reader::from_path(path)?;
    collect_records(reader)
}

pub fn read_trace_from<T: DeserializeOwned, R: Read>(reader: R) -> Result<Vec<T>> {
    collect_records(csv::Reader::from_reader(reader))
}

fn collect_records<T: DeserializeOwned, R: Read>(mut reader: csv::Reader<R>) -> Result<Vec<T>> {
    let mut items = Vec::new();
    for record in reader.deserialize() {
        items.push(record?);
    }
    Ok(items)
}

pub fn write_trace<T: Serialize, P: AsRef<Path>>(path: P, items: &[T]) -> Result<()> {
    let writer = csv::Writer::from_path(path)?;
    write_records(writer, items)
}

pub fn write_trace_to<T: Serialize, W: Write>(writer: W, items: &[T]) -> Result<()> {
    write_records(csv::Writer::from_writer(writer), items)
}

fn write_records<T: Serialize, W: Write>(mut writer: csv::Writer<W>, items: &[T]) -> Result<()> {
    for item in items {
        writer.serialize(item)?;
    }
    writer.flush()?;
    Ok(())
}

/// Delays between consecutive items, scaled by `speed` (2.0 plays twice as
/// fast). A speed of zero, or timestamps going backwards, give no delay.
pub fn replay_delays<T: Timestamped>(items: &[T], speed: f64) -> Vec<Duration> {
    items
        .iter()
        .tuple_windows()
        .map(|(a, b)| {
            let gap = (b.timestamp() - a.timestamp()).to_std().unwrap_or(Duration::ZERO);
            scale_delay(gap, speed)
        })
        .collect()
}

/// Recorded gap played back at `speed`. Saturates at `Duration::MAX` when
/// a very slow speed stretches the gap past what a `Duration` holds.
pub fn scale_delay(gap: Duration, speed: f64) -> Duration {
    if speed <= 0.0 || gap.is_zero() {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(gap.as_secs_f64() / speed).unwrap_or(Duration::MAX)
}

/// Provider that plays back a recorded trace on a background thread.
pub struct ReplayProvider<T> {
    items: Vec<T>,
    speed: f64,
    authorization: Authorization,
    cancel: Option<Sender<()>>,
    done_tx: Sender<()>,
    done_rx: Receiver<()>,
}

impl<T> ReplayProvider<T>
where
    T: Timestamped + Into<Sample> + Clone + Send + 'static,
{
    pub fn new(items: Vec<T>, speed: f64) -> Self {
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        Self {
            items,
            speed,
            authorization: Authorization::Authorized,
            cancel: None,
            done_tx,
            done_rx,
        }
    }

    pub fn with_authorization(mut self, authorization: Authorization) -> Self {
        self.authorization = authorization;
        self
    }

    /// Signalled once playback has emitted every item or was cut short.
    pub fn done(&self) -> Receiver<()> {
        self.done_rx.clone()
    }

    fn play(&mut self, sink: Sink<T>) -> std::result::Result<(), SourceError> {
        let (cancel_tx, cancel_rx) = crossbeam_channel::bounded::<()>(0);
        let items = self.items.clone();
        let delays = replay_delays(&items, self.speed);
        let done_tx = self.done_tx.clone();

        thread::Builder::new()
            .name("trace-replay".into())
            .spawn(move || {
                let mut emitted = 0usize;
                for (i, item) in items.into_iter().enumerate() {
                    if i > 0 {
                        let delay = delays[i - 1];
                        if !delay.is_zero() {
                            match cancel_rx.recv_timeout(delay) {
                                Err(RecvTimeoutError::Timeout) => {}
                                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                            }
                        } else if !matches!(cancel_rx.try_recv(), Err(TryRecvError::Empty)) {
                            break;
                        }
                    }
                    if !sink.send(item) {
                        break;
                    }
                    emitted += 1;
                }
                debug!(emitted, "trace replay finished");
                let _ = done_tx.try_send(());
            })
            .map_err(|e| SourceError::Provider(e.to_string()))?;

        self.cancel = Some(cancel_tx);
        Ok(())
    }

    fn halt(&mut self) {
        if self.cancel.take().is_some() {
            debug!("trace replay cancelled");
        }
    }
}

impl LocationProvider for ReplayProvider<Position> {
    fn authorization(&self) -> Authorization {
        self.authorization
    }

    fn start_updates(&mut self, sink: Sink<Position>) -> std::result::Result<(), SourceError> {
        if self.items.is_empty() {
            warn!("positional trace is empty");
        }
        self.play(sink)
    }

    fn stop_updates(&mut self) {
        self.halt();
    }
}

impl MotionProvider for ReplayProvider<PedometerReading> {
    fn authorization(&self) -> Authorization {
        self.authorization
    }

    fn start_updates(
        &mut self,
        sink: Sink<PedometerReading>,
    ) -> std::result::Result<(), SourceError> {
        if self.items.is_empty() {
            warn!("pedometer trace is empty");
        }
        self.play(sink)
    }

    fn stop_updates(&mut self) {
        self.halt();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SampleSink;
    use chrono::TimeZone;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn t(millis: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000 + millis).unwrap()
    }

    #[test]
    fn test_positions_roundtrip_through_csv() {
        let fixes = vec![
            Position::new(52.52, 13.405, t(0)),
            Position::new(52.5201, 13.4051, t(1000)),
        ];
        let mut buf = Vec::new();
        write_trace_to(&mut buf, &fixes).unwrap();

        let text = String::from_utf8(buf.clone()).unwrap();
        assert!(text.starts_with("latitude,longitude,timestamp\n"));

        let loaded: Vec<Position> = read_trace_from(buf.as_slice()).unwrap();
        assert_eq!(loaded, fixes);
    }

    #[test]
    fn test_reads_hand_written_pedometer_trace() {
        let csv = "timestamp,distance_m,steps\n\
                   2026-10-18T09:00:00Z,0.0,0\n\
                   2026-10-18T09:00:05Z,5.2,7\n";
        let readings: Vec<PedometerReading> = read_trace_from(csv.as_bytes()).unwrap();
        assert_eq!(readings.len(), 2);
        assert_eq!(readings[1].distance_m, 5.2);
        assert_eq!(readings[1].steps, 7);
    }

    #[test]
    fn test_bad_trace_is_an_error() {
        let csv = "latitude,longitude,timestamp\nnorth,east,yesterday\n";
        assert!(read_trace_from::<Position, _>(csv.as_bytes()).is_err());
    }

    #[test]
    fn test_replay_delays_scale_with_speed() {
        let fixes = vec![
            Position::new(0.0, 0.0, t(0)),
            Position::new(0.0, 0.0, t(1000)),
            Position::new(0.0, 0.0, t(500)),
        ];
        assert_eq!(
            replay_delays(&fixes, 2.0),
            vec![Duration::from_millis(500), Duration::ZERO]
        );
        assert_eq!(replay_delays(&fixes, 0.0), vec![Duration::ZERO, Duration::ZERO]);
    }

    #[test]
    fn test_tiny_speed_saturates_instead_of_overflowing() {
        let fixes = vec![
            Position::new(0.0, 0.0, t(0)),
            Position::new(0.0, 0.0, t(1000)),
        ];
        assert_eq!(replay_delays(&fixes, 1e-30), vec![Duration::MAX]);
        assert_eq!(scale_delay(Duration::from_secs(1), f64::MIN_POSITIVE), Duration::MAX);
        assert_eq!(scale_delay(Duration::ZERO, 1e-30), Duration::ZERO);
        assert_eq!(scale_delay(Duration::from_secs(3), 0.5), Duration::from_secs(6));
    }

    #[test]
    fn test_replay_emits_every_item_then_signals_done() {
        let readings: Vec<PedometerReading> = (0..5)
            .map(|i| PedometerReading::new(t(i * 10), i as f64, i as u64))
            .collect();
        let mut provider = ReplayProvider::new(readings, 0.0);
        let done = provider.done();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let store = seen.clone();
        let sink = SampleSink::new(move |s| {
            store.lock().push(s);
            true
        });
        provider.start_updates(sink.typed()).unwrap();

        done.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(seen.lock().len(), 5);
    }

    #[test]
    fn test_replay_stops_when_cancelled() {
        let fixes: Vec<Position> = (0..3)
            .map(|i| Position::new(0.0, 0.0, t(i * 60_000)))
            .collect();
        let mut provider = ReplayProvider::new(fixes, 1.0);
        let done = provider.done();
        let count = Arc::new(Mutex::new(0usize));
        let counter = count.clone();

        provider
            .start_updates(
                SampleSink::new(move |_| {
                    *counter.lock() += 1;
                    true
                })
                .typed(),
            )
            .unwrap();
        provider.stop_updates();

        done.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(*count.lock(), 1);
    }
}
