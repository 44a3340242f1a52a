use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use serde::{Serialize, Deserialize};

/// Record id the engine uses for keep-alive frames.
pub const HEARTBEAT: i32 = 1000;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketRecord {
    pub id:           i32,
    pub src_port:     u16,
    pub dst_port:     u16,
    pub protocol:     String,
    pub src_ip:       String,
    pub dst_ip:       String,
    pub src_mac:      String,
    pub dst_mac:      String,
    pub host:         String,
    pub capture_len:  u32,
    pub original_len: u32,
    pub timestamp:    Timestamp,
    pub raw:          Vec<u8>,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    pub sec:  u64,
    pub usec: u32,
}

impl PacketRecord {
    pub fn is_heartbeat(&self) -> bool {
        self.id == HEARTBEAT
    }

    /// Bytes on the wire, falling back to the captured length when the
    /// engine did not report one.
    pub fn bytes(&self) -> u64 {
        match self.original_len {
            0 => self.capture_len as u64,
            n => n as u64,
        }
    }
}

impl Timestamp {
    pub fn now() -> Self {
        SystemTime::now().into()
    }
}

impl From<SystemTime> for Timestamp {
    fn from(time: SystemTime) -> Self {
        let since = time.duration_since(UNIX_EPOCH).unwrap_or_default();
        Self {
            sec:  since.as_secs(),
            usec: since.subsec_micros(),
        }
    }
}

impl From<Timestamp> for SystemTime {
    fn from(ts: Timestamp) -> Self {
        UNIX_EPOCH + Duration::from_secs(ts.sec) + Duration::from_micros(ts.usec as u64)
    }
}

impl fmt::Display for PacketRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{} {} {}:{} -> {}:{} ({} bytes)",
               self.id,     self.protocol,
               self.src_ip, self.src_port,
               self.dst_ip, self.dst_port,
               self.bytes(),
        )
    }
}
