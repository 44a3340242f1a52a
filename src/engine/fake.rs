use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;
use parking_lot::Mutex;
use crate::Error;
use crate::capture::{encode, Endpoint, Event, PacketRecord, HEARTBEAT};
use super::{Engine, Native, Totals};

/// Loopback engine: on `start` it accepts one connection, waits for the
/// arming signal and writes its prepared frames.
pub struct Fake {
    pub endpoint: Endpoint,
    pub signal:   Arc<Event>,
    listener:     Option<TcpListener>,
    frames:       Mutex<Vec<Vec<u8>>>,
    devices:      Vec<String>,
    delay:        Duration,
    hangup:       bool,
    native:       Option<Arc<FakeNative>>,
    pub starts:   AtomicUsize,
    pub accepts:  Arc<AtomicUsize>,
    pub stops:    AtomicUsize,
}

impl Fake {
    pub fn new(records: &[PacketRecord]) -> Result<Self, Error> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let addr     = listener.local_addr()?;
        Ok(Self::build(Endpoint::Tcp(addr), Some(listener), records))
    }

    /// An engine that never opens its stream.
    pub fn dead() -> Result<Self, Error> {
        let addr: SocketAddr = TcpListener::bind("127.0.0.1:0")?.local_addr()?;
        Ok(Self::build(Endpoint::Tcp(addr), None, &[]))
    }

    fn build(endpoint: Endpoint, listener: Option<TcpListener>, records: &[PacketRecord]) -> Self {
        Self {
            endpoint: endpoint,
            signal:   Arc::new(Event::new()),
            listener: listener,
            frames:   Mutex::new(records.iter().map(encode).collect()),
            devices:  vec!["0_Ethernet".to_owned(), "1_Loopback".to_owned()],
            delay:    Duration::from_secs(0),
            hangup:   false,
            native:   None,
            starts:   AtomicUsize::new(0),
            accepts:  Arc::new(AtomicUsize::new(0)),
            stops:    AtomicUsize::new(0),
        }
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queue a frame as raw bytes after the prepared records.
    pub fn frame(self, frame: Vec<u8>) -> Self {
        self.frames.lock().push(frame);
        self
    }

    /// Close the stream once every frame is written.
    pub fn hangup(mut self) -> Self {
        self.hangup = true;
        self
    }

    pub fn with_native(mut self, native: Arc<FakeNative>) -> Self {
        self.native = Some(native);
        self
    }
}

impl Engine for Fake {
    fn devices(&self) -> Result<Vec<String>, Error> {
        thread::sleep(self.delay);
        Ok(self.devices.clone())
    }

    fn start(&self, _device: usize) -> Result<(), Error> {
        self.starts.fetch_add(1, Ordering::SeqCst);

        let listener = match &self.listener {
            Some(listener) => listener.try_clone()?,
            None           => return Ok(()),
        };

        let signal  = self.signal.clone();
        let accepts = self.accepts.clone();
        let frames  = self.frames.lock().drain(..).collect::<Vec<_>>();
        let hangup  = self.hangup;

        thread::spawn(move || {
            let (mut stream, _) = match listener.accept() {
                Ok(accepted) => accepted,
                Err(_)       => return,
            };
            accepts.fetch_add(1, Ordering::SeqCst);

            if !signal.wait(Duration::from_secs(5)) {
                return;
            }

            for frame in frames {
                if stream.write_all(&frame).is_err() {
                    return;
                }
            }

            if !hangup {
                let _ = stream.read(&mut [0u8; 1]);
            }
        });

        Ok(())
    }

    fn select(&self, _device: usize) -> Result<(), Error> {
        Ok(())
    }

    fn stop(&self) -> Result<(), Error> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self) -> Result<(), Error> {
        Ok(())
    }

    fn native(&self) -> Option<Arc<dyn Native>> {
        self.native.clone().map(|n| n as Arc<dyn Native>)
    }
}

/// Engine-side counters with fixed contents.
#[derive(Default)]
pub struct FakeNative {
    pub enabled: Mutex<bool>,
    pub totals:  Mutex<Totals>,
    pub protos:  Mutex<Vec<(String, u64)>>,
    pub sources: Mutex<Vec<(String, u64)>>,
    pub ports:   Mutex<Vec<(u16, u64)>>,
}

impl Native for FakeNative {
    fn enable(&self, on: bool) -> Result<(), Error> {
        *self.enabled.lock() = on;
        Ok(())
    }

    fn totals(&self) -> Result<Totals, Error> {
        Ok(*self.totals.lock())
    }

    fn protocols(&self, max: usize) -> Result<Vec<(String, u64)>, Error> {
        Ok(self.protos.lock().iter().take(max).cloned().collect())
    }

    fn sources(&self, max: usize) -> Result<Vec<(String, u64)>, Error> {
        Ok(self.sources.lock().iter().take(max).cloned().collect())
    }

    fn destinations(&self, _max: usize) -> Result<Vec<(String, u64)>, Error> {
        Ok(Vec::new())
    }

    fn ports(&self, max: usize) -> Result<Vec<(u16, u64)>, Error> {
        Ok(self.ports.lock().iter().take(max).cloned().collect())
    }

    fn clear(&self) -> Result<(), Error> {
        *self.totals.lock() = Totals::default();
        self.protos.lock().clear();
        self.sources.lock().clear();
        self.ports.lock().clear();
        Ok(())
    }
}

pub fn record(id: i32, protocol: &str, src: &str, dst: &str, dport: u16) -> PacketRecord {
    PacketRecord {
        id:           id,
        src_port:     40000 + id as u16,
        dst_port:     dport,
        protocol:     protocol.to_owned(),
        src_ip:       src.to_owned(),
        dst_ip:       dst.to_owned(),
        src_mac:      "00:11:22:33:44:55".to_owned(),
        dst_mac:      "66:77:88:99:aa:bb".to_owned(),
        host:         "fake".to_owned(),
        capture_len:  4,
        original_len: 60,
        timestamp:    Default::default(),
        raw:          vec![0xde, 0xad, 0xbe, 0xef],
    }
}

pub fn heartbeat() -> PacketRecord {
    PacketRecord {
        id: HEARTBEAT,
        ..Default::default()
    }
}

/// A full-size frame whose capture length fails decoding.
pub fn corrupt(id: i32) -> Vec<u8> {
    let mut frame = encode(&record(id, "TCP", "10.0.0.1", "10.0.0.2", 80));
    frame[144..148].copy_from_slice(&70_000u32.to_le_bytes());
    frame
}
