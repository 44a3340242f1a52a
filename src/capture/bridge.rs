use std::io::Read;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, TryRecvError};
use log::{debug, info, warn};
use crate::Error;
use crate::engine::Engine;
use super::{decode, disconnected, Config, Frames, Packets, PacketRecord, Signal, Stream};

/// Owns the engine connection for one capture at a time.
pub struct Bridge {
    cfg:    Arc<Config>,
    engine: Arc<dyn Engine>,
    signal: Arc<dyn Signal>,
    active: Option<Active>,
}

struct Active {
    device: usize,
    stream: Stream,
    stop:   Arc<AtomicBool>,
    done:   Receiver<()>,
    thread: JoinHandle<()>,
}

impl Bridge {
    pub fn new(cfg: Arc<Config>, engine: Arc<dyn Engine>, signal: Arc<dyn Signal>) -> Self {
        Self {
            cfg:    cfg,
            engine: engine,
            signal: signal,
            active: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Whether the reader of the active capture is still consuming frames.
    pub fn is_running(&self) -> bool {
        match &self.active {
            Some(active) => !matches!(active.done.try_recv(), Err(TryRecvError::Disconnected)),
            None         => false,
        }
    }

    pub fn device(&self) -> Option<usize> {
        self.active.as_ref().map(|a| a.device)
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    /// Arm the engine, connect to its stream and start forwarding records to
    /// `packets`. Does nothing while a capture is already running; a capture
    /// whose reader has exited is torn down and started again.
    pub fn start(&mut self, device: usize, packets: Packets) -> Result<(), Error> {
        if self.is_running() {
            debug!("capture already active on device {:?}", self.device());
            return Ok(());
        }

        if self.is_active() {
            info!("capture reader exited, restarting");
            if let Err(e) = self.stop() {
                warn!("capture stop failed: {}", e);
            }
        }

        self.signal.set()?;

        match self.attach(device, packets) {
            Ok(active) => {
                self.active = Some(active);
                Ok(())
            }
            Err(e) => {
                if let Err(e) = self.signal.reset() {
                    warn!("signal reset failed: {}", e);
                }
                Err(e)
            }
        }
    }

    fn attach(&self, device: usize, packets: Packets) -> Result<Active, Error> {
        self.engine.start(device)?;

        let stream = match self.cfg.endpoint.connect(self.cfg.connect_timeout) {
            Ok(stream) => stream,
            Err(e)     => return Err(self.abort(None, e)),
        };

        info!("connected to {}", self.cfg.endpoint);

        if let Err(e) = self.engine.select(device) {
            return Err(self.abort(Some(&stream), e));
        }

        let reader = match stream.try_clone() {
            Ok(reader) => reader,
            Err(e)     => return Err(self.abort(Some(&stream), e.into())),
        };

        let stop = Arc::new(AtomicBool::new(false));
        let (tx, done) = bounded::<()>(0);
        let mut task = Task::new(reader, packets, stop.clone(), self.cfg.retry_pause);

        let thread = thread::Builder::new().name("capture".into()).spawn(move || {
            let _done = tx;
            info!("starting capture of device {}", device);
            match task.poll() {
                Ok(()) => debug!("capture of device {} finished", device),
                Err(e) => warn!("capture of device {} stopped: {:?}", device, e),
            }
        });

        let thread = match thread {
            Ok(thread) => thread,
            Err(e)     => return Err(self.abort(Some(&stream), e.into())),
        };

        Ok(Active {
            device: device,
            stream: stream,
            stop:   stop,
            done:   done,
            thread: thread,
        })
    }

    fn abort(&self, stream: Option<&Stream>, e: Error) -> Error {
        if let Some(stream) = stream {
            stream.shutdown().ok();
        }
        if let Err(e) = self.engine.stop() {
            warn!("engine stop failed: {}", e);
        }
        e
    }

    /// Best-effort teardown. Every step runs even when an earlier one fails;
    /// a reader that outlives the join timeout is reported as
    /// `ShutdownTimeout` after the capture has been released.
    pub fn stop(&mut self) -> Result<(), Error> {
        let active = match self.active.take() {
            Some(active) => active,
            None         => return Ok(()),
        };

        if let Err(e) = self.engine.stop() {
            warn!("engine stop failed: {}", e);
        }

        active.stop.store(true, Ordering::Release);

        if let Err(e) = active.stream.shutdown() {
            debug!("stream shutdown failed: {}", e);
        }

        if let Err(e) = self.signal.reset() {
            warn!("signal reset failed: {}", e);
        }

        match active.done.recv_timeout(self.cfg.join_timeout) {
            Err(RecvTimeoutError::Timeout) => {
                Err(Error::ShutdownTimeout(self.cfg.join_timeout))
            }
            _ => {
                if active.thread.join().is_err() {
                    warn!("capture reader panicked");
                }
                Ok(())
            }
        }
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("capture stop failed: {}", e);
        }
    }
}

/// Reader loop of one capture. Closes the packet channel when it exits.
pub(super) struct Task<R> {
    frames:     Frames<R>,
    packets:    Packets,
    stop:       Arc<AtomicBool>,
    pause:      Duration,
    forwarded:  u64,
    heartbeats: u64,
    rejected:   u64,
}

impl<R: Read> Task<R> {
    pub(super) fn new(stream: R, packets: Packets, stop: Arc<AtomicBool>, pause: Duration) -> Self {
        Self {
            frames:     Frames::new(stream),
            packets:    packets,
            stop:       stop,
            pause:      pause,
            forwarded:  0,
            heartbeats: 0,
            rejected:   0,
        }
    }

    pub(super) fn poll(&mut self) -> Result<(), Error> {
        while !self.stop.load(Ordering::Acquire) {
            let record = match self.frames.read_frame() {
                Ok(Some(frame))            => decode(frame),
                Ok(None)                   => break,
                Err(e) if disconnected(&e) => {
                    debug!("capture stream disconnected: {}", e);
                    break;
                }
                Err(e) => {
                    if self.stop.load(Ordering::Acquire) {
                        break;
                    }
                    warn!("capture read failed: {}", e);
                    thread::sleep(self.pause);
                    continue;
                }
            };

            match record {
                Ok(rec) if rec.is_heartbeat() => self.heartbeats += 1,
                Ok(rec)                       => if !self.forward(rec) { break },
                Err(e)                        => {
                    self.rejected += 1;
                    warn!("dropping frame: {}", e);
                }
            }
        }

        self.packets.close();

        info!("capture reader done: {} forwarded, {} heartbeats, {} rejected",
              self.forwarded, self.heartbeats, self.rejected);

        Ok(())
    }

    fn forward(&mut self, rec: PacketRecord) -> bool {
        self.forwarded += 1;

        if self.forwarded <= 5 || self.forwarded % 1000 == 0 {
            debug!("packet #{}: {}", self.forwarded, rec);
        }

        match self.packets.send(Arc::new(rec)) {
            Ok(()) => true,
            Err(e) => {
                debug!("packet channel: {}", e);
                false
            }
        }
    }
}
