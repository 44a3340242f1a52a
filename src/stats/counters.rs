use std::collections::HashSet;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering::Relaxed};
use dashmap::DashMap;
use parking_lot::RwLock;
use crate::Error;
use crate::capture::PacketRecord;
use crate::engine::Native;
use super::Config;

/// Source of the counts a snapshot is built from.
pub trait Counters: Send + Sync {
    fn record(&self, rec: &PacketRecord);
    fn tally(&self, cfg: &Config) -> Result<Tally, Error>;
    fn clear(&self) -> Result<(), Error>;
}

/// Ranked counts read at one instant.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Tally {
    pub packets:          u64,
    pub bytes:            u64,
    pub protocols:        Vec<(String, u64)>,
    pub sources:          Vec<(String, u64)>,
    pub destinations:     Vec<(String, u64)>,
    pub ports:            Vec<(u16, u64)>,
    pub unique_protocols: usize,
    pub unique_ips:       usize,
}

/// In-process counters. Increments share the gate and touch only their own
/// key, while `tally` and `clear` hold it exclusively so they never observe
/// or reset half of a packet.
#[derive(Default)]
pub struct Managed {
    gate:         RwLock<()>,
    packets:      AtomicU64,
    bytes:        AtomicU64,
    protocols:    DashMap<String, AtomicU64>,
    sources:      DashMap<String, AtomicU64>,
    destinations: DashMap<String, AtomicU64>,
    ports:        DashMap<u16, AtomicU64>,
}

impl Managed {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Counters for Managed {
    fn record(&self, rec: &PacketRecord) {
        let _gate = self.gate.read();

        self.packets.fetch_add(1, Relaxed);
        self.bytes.fetch_add(rec.bytes(), Relaxed);

        bump(&self.protocols,    &rec.protocol);
        bump(&self.sources,      &rec.src_ip);
        bump(&self.destinations, &rec.dst_ip);

        if rec.dst_port > 0 {
            self.ports.entry(rec.dst_port).or_default().fetch_add(1, Relaxed);
        }
    }

    fn tally(&self, cfg: &Config) -> Result<Tally, Error> {
        let _gate = self.gate.write();

        let mut ips = HashSet::new();
        ips.extend(self.sources.iter().map(|e| e.key().clone()));
        ips.extend(self.destinations.iter().map(|e| e.key().clone()));

        Ok(Tally {
            packets:          self.packets.load(Relaxed),
            bytes:            self.bytes.load(Relaxed),
            protocols:        rank(snapshot(&self.protocols),    cfg.protocols),
            sources:          rank(snapshot(&self.sources),      cfg.talkers),
            destinations:     rank(snapshot(&self.destinations), cfg.talkers),
            ports:            rank(snapshot(&self.ports),        cfg.ports),
            unique_protocols: self.protocols.len(),
            unique_ips:       ips.len(),
        })
    }

    fn clear(&self) -> Result<(), Error> {
        let _gate = self.gate.write();

        self.packets.store(0, Relaxed);
        self.bytes.store(0, Relaxed);
        self.protocols.clear();
        self.sources.clear();
        self.destinations.clear();
        self.ports.clear();

        Ok(())
    }
}

fn bump(map: &DashMap<String, AtomicU64>, key: &str) {
    if key.is_empty() {
        return;
    }

    if let Some(n) = map.get(key) {
        n.fetch_add(1, Relaxed);
        return;
    }

    map.entry(key.to_owned()).or_default().fetch_add(1, Relaxed);
}

fn snapshot<K: Clone + Eq + Hash>(map: &DashMap<K, AtomicU64>) -> Vec<(K, u64)> {
    map.iter().map(|e| (e.key().clone(), e.value().load(Relaxed))).collect()
}

/// Highest counts first, ties broken by key, keeping at most `max`.
pub fn rank<K: Ord>(mut counts: Vec<(K, u64)>, max: usize) -> Vec<(K, u64)> {
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    counts.truncate(max);
    counts
}

/// Counters kept by the capture engine.
pub struct NativeCounters {
    native: Arc<dyn Native>,
}

impl NativeCounters {
    pub fn new(native: Arc<dyn Native>) -> Self {
        Self { native }
    }

    pub fn enable(&self, on: bool) -> Result<(), Error> {
        self.native.enable(on)
    }
}

impl Counters for NativeCounters {
    fn record(&self, _rec: &PacketRecord) {}

    fn tally(&self, cfg: &Config) -> Result<Tally, Error> {
        let totals = self.native.totals()?;
        Ok(Tally {
            packets:          totals.packets,
            bytes:            totals.bytes,
            protocols:        rank(self.native.protocols(cfg.protocols)?,  cfg.protocols),
            sources:          rank(self.native.sources(cfg.talkers)?,      cfg.talkers),
            destinations:     rank(self.native.destinations(cfg.talkers)?, cfg.talkers),
            ports:            rank(self.native.ports(cfg.ports)?,          cfg.ports),
            unique_protocols: totals.protocols,
            unique_ips:       totals.sources + totals.destinations,
        })
    }

    fn clear(&self) -> Result<(), Error> {
        self.native.clear()
    }
}
