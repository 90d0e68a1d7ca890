use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{trace, warn};

/// Configurable ticker interface
pub trait Ticker: Send + Sync + 'static {
    fn interval(&self) -> Duration;
}

/// Shortest interval a [`SessionClock`] will tick at; shorter tickers are
/// clamped to it.
pub const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

/// Fixed interval ticker
#[derive(Clone, Copy, Debug)]
pub struct FixedTicker {
    interval: Duration,
}

impl FixedTicker {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Default for FixedTicker {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl Ticker for FixedTicker {
    fn interval(&self) -> Duration {
        self.interval
    }
}

/// Source of "now" for session timestamps and elapsed time.
pub trait WallClock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemWallClock;

impl WallClock for SystemWallClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Wall clock that only moves when told to. Clones share the same time.
#[derive(Clone, Debug)]
pub struct ManualWallClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualWallClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let by = chrono::Duration::from_std(by).unwrap_or(chrono::Duration::zero());
        let mut now = self.now.lock();
        *now += by;
    }
}

impl WallClock for ManualWallClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Seconds from `start` to `now`, clamped at zero when the wall clock
/// steps backwards.
pub fn elapsed_secs(start: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let millis = (now - start).num_milliseconds().max(0);
    millis as f64 / 1000.0
}

/// Background thread invoking a tick callback once per ticker interval.
///
/// The callback returns `false` to end the thread. Dropping or stopping the
/// clock disconnects its stop channel, which wakes the thread immediately.
#[derive(Debug)]
pub struct SessionClock {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl SessionClock {
    pub fn start<T, F>(ticker: T, mut on_tick: F) -> Self
    where
        T: Ticker,
        F: FnMut() -> bool + Send + 'static,
    {
        let (stop_tx, stop_rx): (Sender<()>, Receiver<()>) = crossbeam_channel::bounded(0);
        let interval = ticker.interval().max(MIN_TICK_INTERVAL);

        let spawned = thread::Builder::new()
            .name("session-clock".into())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        trace!("clock tick");
                        if !on_tick() {
                            break;
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            });

        let handle = match spawned {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(error = %e, "failed to spawn session clock thread");
                None
            }
        };

        Self {
            stop_tx: Some(stop_tx),
            handle,
        }
    }

    /// Stop ticking. Does not wait for the thread to exit.
    pub fn stop(&mut self) {
        self.stop_tx.take();
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Stop and wait for the tick thread to exit.
    pub fn join(mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SessionClock {
    fn drop(&mut self) {
        self.stop();
    }
}
