use std::sync::Arc;
use parking_lot::Mutex;
use crate::Error;
use crate::capture::queue::{self, Receiver, Sender};
use super::Snapshot;

/// Hands each snapshot to every display consumer, dropping the oldest
/// unread one when a consumer falls behind.
pub struct Publisher {
    tx:     Sender<Arc<Snapshot>>,
    latest: Mutex<Option<Arc<Snapshot>>>,
}

impl Publisher {
    pub fn new(capacity: usize) -> Self {
        Self {
            tx:     queue::channel(capacity, 1),
            latest: Mutex::new(None),
        }
    }

    /// Take a snapshot with `tick` and publish it. Snapshots are taken and
    /// sent one at a time, so consumers and `latest` see them in tick order.
    pub fn publish<F>(&self, tick: F) -> Result<Arc<Snapshot>, Error>
    where
        F: FnOnce() -> Result<Snapshot, Error>,
    {
        let mut latest = self.latest.lock();
        let snapshot   = Arc::new(tick()?);
        *latest = Some(snapshot.clone());
        self.tx.send(snapshot.clone())?;
        Ok(snapshot)
    }

    pub fn subscribe(&self) -> Receiver<Arc<Snapshot>> {
        self.tx.subscribe()
    }

    pub fn latest(&self) -> Option<Arc<Snapshot>> {
        self.latest.lock().clone()
    }

    pub fn close(&self) {
        self.tx.close();
    }
}
