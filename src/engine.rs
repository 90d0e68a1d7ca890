//! Run session engine.
//!
//! All session mutations (samples, clock ticks, start, stop) go through one
//! mutex around [`EngineCore`]. Each `start` bumps a generation number; the
//! sinks and clock callbacks issued for a session carry that number, so
//! anything arriving after the session stopped or was re-armed is dropped.
//!
//! Sources and the clock live behind a second mutex and are only started or
//! stopped while the core lock is released, so a source may deliver samples
//! from inside its own `start`.

use std::sync::{Arc, Weak};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::clock::{FixedTicker, SessionClock, SystemWallClock, WallClock};
use crate::session::{RunSession, SessionConfig, SessionSnapshot, SessionState};
use crate::source::{Sample, SampleSink, SampleSource, SourceKind};
use crate::summary::RunSummary;

struct EngineCore {
    session: RunSession,
    generation: u64,
    /// Summary frozen at stop; cleared by the next start.
    frozen: Option<RunSummary>,
    observers: Vec<Sender<SessionSnapshot>>,
}

impl EngineCore {
    fn is_current(&self, generation: u64) -> bool {
        generation == self.generation && self.session.state() == SessionState::Active
    }

    fn deliver(&mut self, generation: u64, sample: Sample) -> bool {
        if !self.is_current(generation) {
            debug!(generation, current = self.generation, "dropping late sample");
            return false;
        }
        if self.session.apply(sample) {
            self.publish();
        }
        true
    }

    fn on_tick(&mut self, generation: u64, now: chrono::DateTime<chrono::Utc>) -> bool {
        if !self.is_current(generation) {
            return false;
        }
        if self.session.tick(now) {
            self.publish();
        }
        true
    }

    fn publish(&mut self) {
        if self.observers.is_empty() {
            return;
        }
        let snapshot = self.session.snapshot();
        self.observers.retain(|tx| tx.send(snapshot.clone()).is_ok());
    }
}

struct Collaborators {
    positional: Box<dyn SampleSource>,
    pedometric: Box<dyn SampleSource>,
    active: Option<SourceKind>,
    clock: Option<SessionClock>,
}

impl Collaborators {
    fn source_mut(&mut self, kind: SourceKind) -> &mut dyn SampleSource {
        match kind {
            SourceKind::Positional => self.positional.as_mut(),
            SourceKind::Pedometric => self.pedometric.as_mut(),
        }
    }

    fn halt(&mut self) {
        if let Some(mut clock) = self.clock.take() {
            clock.stop();
        }
        if let Some(kind) = self.active.take() {
            self.source_mut(kind).stop();
        }
    }
}

/// Owns one run session at a time and the collaborators feeding it.
///
/// Construct once at the application root and share by reference (or
/// `Arc`); every method takes `&self`.
pub struct RunEngine {
    core: Arc<Mutex<EngineCore>>,
    collaborators: Mutex<Collaborators>,
    wall_clock: Arc<dyn WallClock>,
}

impl RunEngine {
    pub fn new<P, M>(positional: P, pedometric: M) -> Self
    where
        P: SampleSource,
        M: SampleSource,
    {
        debug_assert_eq!(positional.kind(), SourceKind::Positional);
        debug_assert_eq!(pedometric.kind(), SourceKind::Pedometric);

        Self {
            core: Arc::new(Mutex::new(EngineCore {
                session: RunSession::new(),
                generation: 0,
                frozen: None,
                observers: Vec::new(),
            })),
            collaborators: Mutex::new(Collaborators {
                positional: Box::new(positional),
                pedometric: Box::new(pedometric),
                active: None,
                clock: None,
            }),
            wall_clock: Arc::new(SystemWallClock),
        }
    }

    pub fn with_wall_clock<C: WallClock>(mut self, wall_clock: C) -> Self {
        self.wall_clock = Arc::new(wall_clock);
        self
    }

    /// Begin a fresh session fed by `kind`.
    ///
    /// Calling this while a session is active re-arms from scratch: the
    /// running session is discarded, not stopped, and no summary is kept
    /// for it. After a stop it starts a new session on the same engine.
    pub fn start(&self, kind: SourceKind, config: SessionConfig) {
        let mut collaborators = self.collaborators.lock();
        collaborators.halt();

        let generation = {
            let mut core = self.core.lock();
            if core.session.state() == SessionState::Active {
                info!("start called on an active session; re-arming");
            }
            core.generation += 1;
            core.frozen = None;
            core.session.begin(kind, &config, self.wall_clock.now());
            core.publish();
            core.generation
        };
        info!(source = %kind, generation, "run started");

        let sink = sample_sink(Arc::downgrade(&self.core), generation);
        if let Err(e) = collaborators.source_mut(kind).start(sink) {
            warn!(source = %kind, error = %e, "sample source did not start; no samples will arrive");
        }
        collaborators.active = Some(kind);

        let core = Arc::downgrade(&self.core);
        let wall_clock = self.wall_clock.clone();
        collaborators.clock = Some(SessionClock::start(
            FixedTicker::new(config.tick_interval),
            move || {
                let Some(core) = core.upgrade() else {
                    return false;
                };
                let now = wall_clock.now();
                let mut core = core.lock();
                core.on_tick(generation, now)
            },
        ));
    }

    /// Stop the active session. A no-op when idle or already stopped.
    pub fn stop(&self) {
        let mut collaborators = self.collaborators.lock();

        let stopped = {
            let mut core = self.core.lock();
            let stopped = core.session.finish(self.wall_clock.now());
            if stopped {
                core.frozen = core.session.summary();
                core.publish();
            }
            stopped
        };

        if stopped {
            info!("run stopped");
        } else {
            debug!("stop ignored: no active session");
        }
        collaborators.halt();
    }

    /// Summary of the session.
    ///
    /// `None` if no session was ever started. Once stopped, every call
    /// returns the same frozen summary; while active, a provisional summary
    /// of the current accumulators (the session keeps running).
    pub fn summary(&self) -> Option<RunSummary> {
        let core = self.core.lock();
        match core.session.state() {
            SessionState::Stopped => core.frozen.clone(),
            SessionState::Active | SessionState::Idle => core.session.summary(),
        }
    }

    /// Recompute duration now, the same way a clock tick does.
    pub fn tick(&self) {
        let now = self.wall_clock.now();
        let mut core = self.core.lock();
        let generation = core.generation;
        core.on_tick(generation, now);
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.core.lock().session.snapshot()
    }

    pub fn state(&self) -> SessionState {
        self.core.lock().session.state()
    }

    /// Receive a snapshot now and after every state change.
    pub fn subscribe(&self) -> Receiver<SessionSnapshot> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut core = self.core.lock();
        if tx.send(core.session.snapshot()).is_ok() {
            core.observers.push(tx);
        }
        rx
    }
}

impl Drop for RunEngine {
    fn drop(&mut self) {
        self.collaborators.get_mut().halt();
    }
}

fn sample_sink(core: Weak<Mutex<EngineCore>>, generation: u64) -> SampleSink {
    SampleSink::new(move |sample| {
        let Some(core) = core.upgrade() else {
            return false;
        };
        let mut core = core.lock();
        core.deliver(generation, sample)
    })
}
