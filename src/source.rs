//! Sample sources.
//!
//! A session draws movement from exactly one [`SampleSource`], chosen at
//! start. Both variants wrap a platform provider (location services or a
//! pedometer) and push samples into a [`SampleSink`] handed over by the
//! engine. A source that cannot start simply never emits.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::geo::Position;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    clap::ValueEnum,
    strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SourceKind {
    /// Continuous position fixes, filtered for noise.
    Positional,
    /// Absolute distance readings from a motion sensor.
    Pedometric,
}

/// Cumulative pedometer output since tracking began.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PedometerReading {
    pub timestamp: DateTime<Utc>,
    /// Absolute distance in meters, not a delta.
    pub distance_m: f64,
    pub steps: u64,
}

impl PedometerReading {
    pub fn new(timestamp: DateTime<Utc>, distance_m: f64, steps: u64) -> Self {
        Self {
            timestamp,
            distance_m,
            steps,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sample {
    Position(Position),
    Reading(PedometerReading),
}

impl From<Position> for Sample {
    fn from(p: Position) -> Self {
        Sample::Position(p)
    }
}

impl From<PedometerReading> for Sample {
    fn from(r: PedometerReading) -> Self {
        Sample::Reading(r)
    }
}

/// Permission state reported by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Authorization {
    NotDetermined,
    Denied,
    Restricted,
    Authorized,
}

impl Authorization {
    pub fn is_granted(&self) -> bool {
        matches!(self, Authorization::Authorized)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("permission not granted ({0})")]
    PermissionDenied(Authorization),
    #[error("sensor unavailable on this device")]
    Unavailable,
    #[error("source is already tracking")]
    AlreadyTracking,
    #[error("provider failure: {0}")]
    Provider(String),
}

/// Delivery handle from a source into the session that started it.
///
/// `emit` returns `false` once the receiving session no longer accepts
/// samples; producers should stop forwarding at that point.
#[derive(Clone)]
pub struct SampleSink {
    deliver: Arc<dyn Fn(Sample) -> bool + Send + Sync>,
}

impl SampleSink {
    pub fn new<F>(deliver: F) -> Self
    where
        F: Fn(Sample) -> bool + Send + Sync + 'static,
    {
        Self {
            deliver: Arc::new(deliver),
        }
    }

    pub fn emit(&self, sample: Sample) -> bool {
        (self.deliver)(sample)
    }

    pub fn typed<T: Into<Sample>>(&self) -> Sink<T> {
        Sink {
            inner: self.clone(),
            _marker: PhantomData,
        }
    }
}

impl fmt::Debug for SampleSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleSink").finish_non_exhaustive()
    }
}

/// A [`SampleSink`] restricted to one sample type, handed to providers.
pub struct Sink<T> {
    inner: SampleSink,
    _marker: PhantomData<fn(T)>,
}

impl<T: Into<Sample>> Sink<T> {
    pub fn send(&self, item: T) -> bool {
        self.inner.emit(item.into())
    }
}

impl<T> Clone for Sink<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Sink<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sink").finish_non_exhaustive()
    }
}

/// Platform location services.
pub trait LocationProvider: Send + 'static {
    fn authorization(&self) -> Authorization;
    fn start_updates(&mut self, sink: Sink<Position>) -> Result<(), SourceError>;
    fn stop_updates(&mut self);
}

/// Platform pedometer.
pub trait MotionProvider: Send + 'static {
    fn authorization(&self) -> Authorization;
    fn is_available(&self) -> bool {
        true
    }
    fn start_updates(&mut self, sink: Sink<PedometerReading>) -> Result<(), SourceError>;
    fn stop_updates(&mut self);
}

/// The capability the engine drives: start emitting into a sink, stop.
pub trait SampleSource: Send + 'static {
    fn kind(&self) -> SourceKind;
    fn authorization(&self) -> Authorization;
    fn is_tracking(&self) -> bool;
    fn start(&mut self, sink: SampleSink) -> Result<(), SourceError>;
    /// Idempotent.
    fn stop(&mut self);
}

pub struct PositionalSource<P> {
    provider: P,
    tracking: bool,
}

impl<P: LocationProvider> PositionalSource<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            tracking: false,
        }
    }
}

impl<P: LocationProvider> SampleSource for PositionalSource<P> {
    fn kind(&self) -> SourceKind {
        SourceKind::Positional
    }

    fn authorization(&self) -> Authorization {
        self.provider.authorization()
    }

    fn is_tracking(&self) -> bool {
        self.tracking
    }

    fn start(&mut self, sink: SampleSink) -> Result<(), SourceError> {
        if self.tracking {
            return Err(SourceError::AlreadyTracking);
        }
        let status = self.provider.authorization();
        if !status.is_granted() {
            warn!(%status, "location permission not granted");
            return Err(SourceError::PermissionDenied(status));
        }
        self.provider.start_updates(sink.typed())?;
        self.tracking = true;
        info!("positional source started");
        Ok(())
    }

    fn stop(&mut self) {
        if !self.tracking {
            return;
        }
        self.provider.stop_updates();
        self.tracking = false;
        debug!("positional source stopped");
    }
}

pub struct PedometricSource<M> {
    provider: M,
    tracking: bool,
}

impl<M: MotionProvider> PedometricSource<M> {
    pub fn new(provider: M) -> Self {
        Self {
            provider,
            tracking: false,
        }
    }
}

impl<M: MotionProvider> SampleSource for PedometricSource<M> {
    fn kind(&self) -> SourceKind {
        SourceKind::Pedometric
    }

    fn authorization(&self) -> Authorization {
        self.provider.authorization()
    }

    fn is_tracking(&self) -> bool {
        self.tracking
    }

    fn start(&mut self, sink: SampleSink) -> Result<(), SourceError> {
        if self.tracking {
            return Err(SourceError::AlreadyTracking);
        }
        if !self.provider.is_available() {
            warn!("step counting not available");
            return Err(SourceError::Unavailable);
        }
        let status = self.provider.authorization();
        if !status.is_granted() {
            warn!(%status, "motion permission not granted");
            return Err(SourceError::PermissionDenied(status));
        }
        self.provider.start_updates(sink.typed())?;
        self.tracking = true;
        info!("pedometric source started");
        Ok(())
    }

    fn stop(&mut self) {
        if !self.tracking {
            return;
        }
        self.provider.stop_updates();
        self.tracking = false;
        debug!("pedometric source stopped");
    }
}

/// Provider fed by hand from the embedding application (or a test).
///
/// Items pushed through its [`Feed`] are delivered synchronously on the
/// pushing thread while updates are running, and dropped otherwise.
pub struct FeedProvider<T> {
    slot: Arc<Mutex<Option<Sink<T>>>>,
    authorization: Authorization,
    available: bool,
}

/// Push side of a [`FeedProvider`].
pub struct Feed<T> {
    slot: Arc<Mutex<Option<Sink<T>>>>,
}

impl<T> FeedProvider<T> {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
            authorization: Authorization::Authorized,
            available: true,
        }
    }

    pub fn with_authorization(mut self, authorization: Authorization) -> Self {
        self.authorization = authorization;
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    pub fn feed(&self) -> Feed<T> {
        Feed {
            slot: self.slot.clone(),
        }
    }

    fn connect(&mut self, sink: Sink<T>) {
        *self.slot.lock() = Some(sink);
    }

    fn disconnect(&mut self) {
        self.slot.lock().take();
    }
}

impl<T> Default for FeedProvider<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Into<Sample>> Feed<T> {
    /// Returns whether the item reached an active session.
    pub fn push(&self, item: T) -> bool {
        // Release the slot before delivering so a concurrent stop never
        // waits on session state.
        let sink = self.slot.lock().clone();
        match sink {
            Some(sink) => sink.send(item),
            None => false,
        }
    }
}

impl<T> Clone for Feed<T> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
        }
    }
}

impl LocationProvider for FeedProvider<Position> {
    fn authorization(&self) -> Authorization {
        self.authorization
    }

    fn start_updates(&mut self, sink: Sink<Position>) -> Result<(), SourceError> {
        self.connect(sink);
        Ok(())
    }

    fn stop_updates(&mut self) {
        self.disconnect();
    }
}

impl MotionProvider for FeedProvider<PedometerReading> {
    fn authorization(&self) -> Authorization {
        self.authorization
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn start_updates(&mut self, sink: Sink<PedometerReading>) -> Result<(), SourceError> {
        self.connect(sink);
        Ok(())
    }

    fn stop_updates(&mut self) {
        self.disconnect();
    }
}
