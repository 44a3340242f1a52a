use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use futures::future;
use futures::stream::{Stream, StreamExt};
use log::{debug, info, trace, warn};
use parking_lot::Mutex;
use tokio::task::{self, JoinHandle};
use tokio::time::{self, MissedTickBehavior};
use crate::Error;
use crate::capture::{queue, Batches, Bridge, Filter, Packets, PacketRecord, Signal, Timestamp};
use crate::engine::{Device, Engine};
use crate::stats::{Aggregator, Publisher, Snapshot};
use super::{Config, Session, Setting, State};

/// Supervises capture sessions. Transitions run one at a time on their own
/// task and finish even when the caller stops waiting; packet data flows
/// around it through the packet channel.
pub struct Controller {
    inner: Arc<Inner>,
}

struct Inner {
    cfg:        Arc<Config>,
    engine:     Arc<dyn Engine>,
    bridge:     Arc<Mutex<Bridge>>,
    session:    Mutex<Session>,
    packets:    Mutex<Packets>,
    running:    tokio::sync::Mutex<Option<Running>>,
    sessions:   AtomicU64,
    aggregator: Arc<Aggregator>,
    publisher:  Arc<Publisher>,
}

struct Running {
    id:      u64,
    packets: Packets,
    feeder:  JoinHandle<()>,
    cadence: JoinHandle<()>,
}

impl Controller {
    pub fn new(cfg: Config, engine: Arc<dyn Engine>, signal: Arc<dyn Signal>) -> Self {
        let capture = Arc::new(cfg.capture.clone());
        let stats   = Arc::new(cfg.stats.clone());
        let bridge  = Bridge::new(capture, engine.clone(), signal);
        let packets = queue::channel(cfg.capture.capacity, cfg.capture.batch);

        let inner = Inner {
            cfg:        Arc::new(cfg),
            engine:     engine,
            bridge:     Arc::new(Mutex::new(bridge)),
            session:    Mutex::new(Session::default()),
            packets:    Mutex::new(packets),
            running:    tokio::sync::Mutex::new(None),
            sessions:   AtomicU64::new(0),
            aggregator: Arc::new(Aggregator::new(stats.clone())),
            publisher:  Arc::new(Publisher::new(stats.snapshots)),
        };

        Self { inner: Arc::new(inner) }
    }

    pub async fn devices(&self, timeout: Duration) -> Result<Vec<Device>, Error> {
        let engine  = self.inner.engine.clone();
        let listing = task::spawn_blocking(move || engine.devices());

        let names = match time::timeout(timeout, listing).await {
            Ok(names) => names??,
            Err(_)    => return Err(Error::DeviceEnumerationTimeout(timeout)),
        };

        Ok(names.iter().enumerate().map(|(n, name)| Device::parse(n, name)).collect())
    }

    pub fn enumeration_timeout(&self) -> Duration {
        self.inner.cfg.enumeration
    }

    pub async fn start(&self, device: usize) -> Result<State, Error> {
        let inner = self.inner.clone();
        tokio::spawn(async move { inner.start(device).await }).await?
    }

    pub async fn stop(&self) -> Result<State, Error> {
        let inner = self.inner.clone();
        tokio::spawn(async move { inner.stop(None).await }).await?
    }

    pub fn state(&self) -> State {
        self.inner.state()
    }

    pub fn session(&self) -> Session {
        self.inner.session.lock().clone()
    }

    /// Receiver on the packet channel of the running session, or of the
    /// next one when idle. It ends when that session stops.
    pub fn subscribe(&self) -> Batches {
        self.inner.packets.lock().subscribe()
    }

    pub fn packet_batches(&self) -> impl Stream<Item = Vec<Arc<PacketRecord>>> {
        self.subscribe().into_batches()
    }

    pub fn filtered_batches(&self, filter: Filter) -> impl Stream<Item = Vec<Arc<PacketRecord>>> {
        self.packet_batches().filter_map(move |batch| {
            let batch = batch.into_iter().filter(|rec| filter.matches(rec)).collect::<Vec<_>>();
            future::ready(match batch.is_empty() {
                true  => None,
                false => Some(batch),
            })
        })
    }

    pub fn statistics(&self) -> impl Stream<Item = Arc<Snapshot>> {
        self.inner.publisher.subscribe().into_stream()
    }

    pub fn latest(&self) -> Option<Arc<Snapshot>> {
        self.inner.publisher.latest()
    }

    pub fn clear_statistics(&self) -> Result<(), Error> {
        self.inner.aggregator.clear()?;
        self.inner.publish();
        Ok(())
    }

    pub fn configure(&self, setting: Setting) -> Result<(), Error> {
        match setting {
            Setting::Source(source) => {
                self.inner.aggregator.switch(source, self.inner.engine.native())?;
                self.inner.publish();
            }
        }
        Ok(())
    }

    /// Stop any session, release the engine and end every statistics stream.
    pub async fn close(&self) -> Result<(), Error> {
        self.stop().await?;

        let engine = self.inner.engine.clone();
        task::spawn_blocking(move || engine.close()).await??;

        self.inner.packets.lock().close();
        self.inner.publisher.close();

        Ok(())
    }
}

impl Inner {
    async fn start(self: &Arc<Self>, device: usize) -> Result<State, Error> {
        let mut running = self.running.lock().await;

        match self.state() {
            State::Idle => (),
            state       => return Ok(state),
        }

        self.transition(State::Starting, Some(device), None);

        let packets = self.packets.lock().clone();
        let feed    = packets.subscribe();
        let bridge  = self.bridge.clone();
        let tx      = packets.clone();

        let started = task::spawn_blocking(move || bridge.lock().start(device, tx)).await;

        if let Err(e) = started.map_err(Error::from).and_then(|r| r) {
            warn!("capture of device {} failed to start: {}", device, e);
            self.transition(State::Idle, None, None);
            return Err(e);
        }

        self.aggregator.begin();

        let id = self.sessions.fetch_add(1, Ordering::Relaxed);

        *running = Some(Running {
            id:      id,
            feeder:  self.feeder(feed, id),
            cadence: self.cadence(),
            packets: packets,
        });

        self.transition(State::Capturing, Some(device), Some(Timestamp::now()));

        info!("capturing on device {}", device);

        Ok(State::Capturing)
    }

    /// Stop the running session, or only session `id` when given.
    async fn stop(&self, id: Option<u64>) -> Result<State, Error> {
        let mut running = self.running.lock().await;

        let active = match running.take() {
            Some(active) if id.map_or(true, |id| id == active.id) => active,
            other => {
                *running = other;
                return Ok(self.state());
            }
        };

        let device = self.session.lock().device;
        self.transition(State::Stopping, device, None);

        active.packets.close();
        *self.packets.lock() = queue::channel(self.cfg.capture.capacity, self.cfg.capture.batch);

        let bridge = self.bridge.clone();
        match task::spawn_blocking(move || bridge.lock().stop()).await {
            Ok(Ok(())) => debug!("capture bridge stopped"),
            Ok(Err(e)) => warn!("capture bridge: {}", e),
            Err(e)     => warn!("capture bridge stop failed: {}", e),
        }

        if let Err(e) = active.feeder.await {
            warn!("statistics feeder failed: {}", e);
        }

        active.cadence.abort();
        let _ = active.cadence.await;

        self.aggregator.finish();
        self.publish();

        self.transition(State::Idle, None, None);

        info!("capture stopped");

        Ok(State::Idle)
    }

    fn state(&self) -> State {
        self.session.lock().state
    }

    /// Counts every batch of session `id`. The packet channel closes on stop
    /// or when the reader exits; in the second case the session is stopped.
    fn feeder(self: &Arc<Self>, feed: Batches, id: u64) -> JoinHandle<()> {
        let inner = self.clone();
        tokio::spawn(async move {
            while let Some(batch) = feed.recv_batch().await {
                inner.aggregator.record_batch(&batch);
            }
            debug!("statistics feeder finished, {} dropped", feed.dropped());

            tokio::spawn(async move {
                match inner.stop(Some(id)).await {
                    Ok(_)  => (),
                    Err(e) => warn!("capture session {} stop failed: {}", id, e),
                }
            });
        })
    }

    fn cadence(self: &Arc<Self>) -> JoinHandle<()> {
        let inner   = self.clone();
        let cadence = self.cfg.stats.cadence;

        tokio::spawn(async move {
            let mut interval = time::interval(cadence);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                inner.publish();
            }
        })
    }

    fn publish(&self) {
        match self.publisher.publish(|| self.aggregator.tick()) {
            Ok(snapshot)       => trace!("{}", snapshot),
            Err(Error::Closed) => debug!("snapshot not published: channel closed"),
            Err(e)             => warn!("statistics tick failed: {}", e),
        }
    }

    fn transition(&self, state: State, device: Option<usize>, started: Option<Timestamp>) {
        let mut session = self.session.lock();
        debug!("session {} -> {}", session.state, state);
        *session = Session {
            state:   state,
            device:  device,
            started: started.or(session.started.filter(|_| state != State::Idle)),
        };
    }
}
