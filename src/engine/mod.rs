use std::sync::Arc;
use crate::Error;

pub use command::Command;
pub use device::{Device, find};

mod command;
mod device;

#[cfg(test)]
pub(crate) mod fake;


/// Control surface of the external capture engine.
pub trait Engine: Send + Sync {
    fn devices(&self) -> Result<Vec<String>, Error>;

    /// Begin emitting frames for `device` on the capture stream.
    fn start(&self, device: usize) -> Result<(), Error>;

    fn select(&self, device: usize) -> Result<(), Error>;

    fn stop(&self) -> Result<(), Error>;

    fn close(&self) -> Result<(), Error>;

    /// Counters maintained by the engine itself, when it keeps any.
    fn native(&self) -> Option<Arc<dyn Native>> {
        None
    }
}

/// Statistics surface of an engine that counts packets on its own.
pub trait Native: Send + Sync {
    fn enable(&self, on: bool) -> Result<(), Error>;
    fn totals(&self) -> Result<Totals, Error>;
    fn protocols(&self, max: usize) -> Result<Vec<(String, u64)>, Error>;
    fn sources(&self, max: usize) -> Result<Vec<(String, u64)>, Error>;
    fn destinations(&self, max: usize) -> Result<Vec<(String, u64)>, Error>;
    fn ports(&self, max: usize) -> Result<Vec<(u16, u64)>, Error>;
    fn clear(&self) -> Result<(), Error>;
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Totals {
    pub packets:      u64,
    pub bytes:        u64,
    pub protocols:    usize,
    pub sources:      usize,
    pub destinations: usize,
}
