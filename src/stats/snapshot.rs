use std::fmt;
use std::time::Duration;
use serde::Serialize;
use crate::capture::Timestamp;
use super::{service, Rate, Tally};

/// Statistics published on one tick.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Snapshot {
    pub time:             Timestamp,
    pub packets:          u64,
    pub bytes:            u64,
    pub rate:             Rate,
    pub elapsed:          Duration,
    pub protocols:        Vec<Share>,
    pub talkers:          Vec<Share>,
    pub destinations:     Vec<Share>,
    pub ports:            Vec<PortShare>,
    pub unique_protocols: usize,
    pub unique_ips:       usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Share {
    pub key:     String,
    pub count:   u64,
    pub percent: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PortShare {
    pub port:    u16,
    pub service: Option<&'static str>,
    pub count:   u64,
    pub percent: f64,
}

impl Snapshot {
    pub fn new(tally: Tally, rate: Rate, elapsed: Duration) -> Self {
        let total  = tally.packets;
        let shares = |counts: Vec<(String, u64)>| {
            counts.into_iter().map(|(key, count)| Share {
                key:     key,
                count:   count,
                percent: percent(count, total),
            }).collect::<Vec<_>>()
        };

        let ports = tally.ports.into_iter().map(|(port, count)| PortShare {
            port:    port,
            service: service(port),
            count:   count,
            percent: percent(count, total),
        }).collect();

        Self {
            time:             Timestamp::now(),
            packets:          tally.packets,
            bytes:            tally.bytes,
            rate:             rate,
            elapsed:          elapsed,
            protocols:        shares(tally.protocols),
            talkers:          shares(tally.sources),
            destinations:     shares(tally.destinations),
            ports:            ports,
            unique_protocols: tally.unique_protocols,
            unique_ips:       tally.unique_ips,
        }
    }
}

fn percent(count: u64, total: u64) -> f64 {
    match total {
        0 => 0.0,
        n => count as f64 / n as f64 * 100.0,
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let secs = self.elapsed.as_secs();
        write!(f, "{:02}:{:02}:{:02} {} packets, {} bytes, {:.1} pps (avg {:.1}, max {:.1})",
               secs / 3600, secs / 60 % 60, secs % 60,
               self.packets, self.bytes,
               self.rate.current, self.rate.average, self.rate.max)?;

        for share in &self.protocols {
            write!(f, ", {}", share)?;
        }

        Ok(())
    }
}

impl fmt::Display for Share {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {} {:.1}%", self.key, self.count, self.percent)
    }
}

impl fmt::Display for PortShare {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.service {
            Some(name) => write!(f, "{} ({}) {} {:.1}%", self.port, name, self.count, self.percent),
            None       => write!(f, "{} {} {:.1}%", self.port, self.count, self.percent),
        }
    }
}
