use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use serde::{Serialize, Deserialize};
use crate::Error;
use crate::capture::PacketRecord;
use crate::engine::Native;
use super::{Config, Counters, Managed, NativeCounters, Rates, Snapshot};

/// Which counters snapshots are computed from.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Source {
    Managed,
    Native,
}

pub struct Aggregator {
    cfg:     Arc<Config>,
    managed: Managed,
    native:  RwLock<Option<NativeCounters>>,
    engine:  AtomicBool,
    state:   Mutex<State>,
}

struct State {
    rates:   Rates,
    started: Option<Instant>,
    frozen:  Duration,
}

impl Aggregator {
    pub fn new(cfg: Arc<Config>) -> Self {
        let rates = Rates::new(cfg.history);
        Self {
            cfg:     cfg,
            managed: Managed::new(),
            native:  RwLock::new(None),
            engine:  AtomicBool::new(false),
            state:   Mutex::new(State {
                rates:   rates,
                started: None,
                frozen:  Duration::from_secs(0),
            }),
        }
    }

    pub fn record_packet(&self, rec: &PacketRecord) {
        if !self.engine.load(Ordering::Acquire) {
            self.managed.record(rec);
        }
    }

    pub fn record_batch(&self, batch: &[Arc<PacketRecord>]) {
        for rec in batch {
            self.record_packet(rec);
        }
    }

    /// Compute a snapshot from one consistent read of the counters and
    /// advance the rate history.
    pub fn tick(&self) -> Result<Snapshot, Error> {
        let mut state = self.state.lock();
        let tally     = self.with_counters(|c| c.tally(&self.cfg))?;
        let now       = Instant::now();

        let rate = match state.started.is_some() {
            true  => state.rates.sample(now, tally.packets),
            false => state.rates.rate(),
        };

        Ok(Snapshot::new(tally, rate, state.elapsed(now)))
    }

    /// Reset counters and rate history. Runs exclusively of `tick`.
    pub fn clear(&self) -> Result<(), Error> {
        let mut state = self.state.lock();
        self.with_counters(|c| c.clear())?;
        state.rates.clear();
        state.frozen = Duration::from_secs(0);
        if state.started.is_some() {
            state.started = Some(Instant::now());
        }
        debug!("statistics cleared");
        Ok(())
    }

    /// Start timing a capture session.
    pub fn begin(&self) {
        let mut state = self.state.lock();
        state.started = Some(Instant::now());
        state.frozen  = Duration::from_secs(0);
        state.rates.restart();
    }

    /// Freeze the elapsed time at the end of a capture session.
    pub fn finish(&self) {
        let mut state = self.state.lock();
        state.frozen  = state.elapsed(Instant::now());
        state.started = None;
    }

    pub fn source(&self) -> Source {
        match self.engine.load(Ordering::Acquire) {
            true  => Source::Native,
            false => Source::Managed,
        }
    }

    /// Switch the counter feed and clear statistics.
    pub fn switch(&self, source: Source, native: Option<Arc<dyn Native>>) -> Result<(), Error> {
        let native = match (source, native) {
            (Source::Native, Some(native)) => Some(NativeCounters::new(native)),
            (Source::Native, None)         => return Err(Error::engine("engine keeps no native statistics")),
            (Source::Managed, _)           => None,
        };

        let mut state = self.state.lock();
        let mut feed  = self.native.write();

        if let Some(old) = feed.take() {
            if let Err(e) = old.enable(false) {
                warn!("disabling native statistics failed: {}", e);
            }
        }

        self.engine.store(false, Ordering::Release);

        if let Some(counters) = native {
            counters.enable(true)?;
            counters.clear()?;
            *feed = Some(counters);
            self.engine.store(true, Ordering::Release);
        }

        self.managed.clear()?;
        state.rates.clear();

        info!("statistics source: {:?}", source);

        Ok(())
    }

    fn with_counters<T, F>(&self, f: F) -> Result<T, Error>
    where
        F: FnOnce(&dyn Counters) -> Result<T, Error>,
    {
        match &*self.native.read() {
            Some(native) => f(native),
            None         => f(&self.managed),
        }
    }
}

impl State {
    fn elapsed(&self, now: Instant) -> Duration {
        match self.started {
            Some(started) => now.saturating_duration_since(started),
            None          => self.frozen,
        }
    }
}
