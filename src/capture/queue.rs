//! Bounded drop-oldest fan-out channel.
//!
//! Each call to [`Sender::subscribe`] creates an independent queue, and every
//! sent item is delivered to every live queue. Clones of a [`Receiver`] share
//! their queue and compete for its items. When a queue is full the oldest item
//! is evicted, so [`Sender::send`] never blocks and never fails while open.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use futures::stream::{self, Stream};
use parking_lot::Mutex;
use tokio::sync::Notify;
use crate::Error;

pub struct Sender<T> {
    shared: Arc<Shared<T>>,
}

#[derive(Clone)]
pub struct Receiver<T> {
    slot:  Arc<Slot<T>>,
    batch: usize,
}

struct Shared<T> {
    capacity: usize,
    batch:    usize,
    inner:    Mutex<Inner<T>>,
}

struct Inner<T> {
    slots:  Vec<Weak<Slot<T>>>,
    closed: bool,
}

struct Slot<T> {
    queue:  Mutex<Queue<T>>,
    notify: Notify,
}

struct Queue<T> {
    items:   VecDeque<T>,
    closed:  bool,
    dropped: u64,
}

pub fn channel<T: Clone>(capacity: usize, batch: usize) -> Sender<T> {
    Sender {
        shared: Arc::new(Shared {
            capacity: capacity.max(1),
            batch:    batch.max(1),
            inner:    Mutex::new(Inner {
                slots:  Vec::new(),
                closed: false,
            }),
        }),
    }
}

impl<T: Clone> Sender<T> {
    /// Deliver `item` to every subscriber. Items sent while nobody is
    /// subscribed are discarded.
    pub fn send(&self, item: T) -> Result<(), Error> {
        let mut inner = self.shared.inner.lock();

        if inner.closed {
            return Err(Error::Closed);
        }

        inner.slots.retain(|slot| slot.strong_count() > 0);

        for slot in inner.slots.iter().filter_map(Weak::upgrade) {
            slot.push(item.clone(), self.shared.capacity);
        }

        Ok(())
    }

    pub fn subscribe(&self) -> Receiver<T> {
        let mut inner = self.shared.inner.lock();

        let slot = Arc::new(Slot {
            queue:  Mutex::new(Queue {
                items:   VecDeque::with_capacity(self.shared.capacity.min(1024)),
                closed:  inner.closed,
                dropped: 0,
            }),
            notify: Notify::new(),
        });

        if !inner.closed {
            inner.slots.push(Arc::downgrade(&slot));
        }

        Receiver {
            slot:  slot,
            batch: self.shared.batch,
        }
    }

    /// Refuse further sends and wake every waiting receiver. Receivers still
    /// drain what was queued before they observe the end of the stream.
    pub fn close(&self) {
        let mut inner = self.shared.inner.lock();
        inner.closed = true;
        for slot in inner.slots.drain(..).filter_map(|slot| slot.upgrade()) {
            slot.queue.lock().closed = true;
            slot.notify.notify_waiters();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.inner.lock().closed
    }
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        Self { shared: self.shared.clone() }
    }
}

impl<T> Slot<T> {
    fn push(&self, item: T, capacity: usize) {
        let mut queue = self.queue.lock();
        if queue.items.len() >= capacity {
            queue.items.pop_front();
            queue.dropped += 1;
        }
        queue.items.push_back(item);
        drop(queue);
        self.notify.notify_waiters();
    }
}

impl<T> Receiver<T> {
    /// Wait for at least one item, then take up to the batch size without
    /// waiting again. `None` once the channel is closed and drained.
    pub async fn recv_batch(&self) -> Option<Vec<T>> {
        let batch = self.batch;
        self.wait(|items| {
            let n = items.len().min(batch);
            items.drain(..n).collect()
        }).await
    }

    pub async fn recv(&self) -> Option<T> {
        self.wait(|items| items.pop_front()).await.flatten()
    }

    pub fn try_batch(&self) -> Vec<T> {
        let mut queue = self.slot.queue.lock();
        let n = queue.items.len().min(self.batch);
        queue.items.drain(..n).collect()
    }

    pub fn len(&self) -> usize {
        self.slot.queue.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Items evicted from this receiver's queue to make room for newer ones.
    pub fn dropped(&self) -> u64 {
        self.slot.queue.lock().dropped
    }

    pub fn is_closed(&self) -> bool {
        self.slot.queue.lock().closed
    }

    async fn wait<U, F>(&self, take: F) -> Option<U>
    where
        F: Fn(&mut VecDeque<T>) -> U,
    {
        loop {
            let notified = self.slot.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut queue = self.slot.queue.lock();
                if !queue.items.is_empty() {
                    return Some(take(&mut queue.items));
                }
                if queue.closed {
                    return None;
                }
            }

            notified.await;
        }
    }
}

impl<T: Send + 'static> Receiver<T> {
    pub fn into_batches(self) -> impl Stream<Item = Vec<T>> {
        stream::unfold(self, |rx| async move {
            rx.recv_batch().await.map(|batch| (batch, rx))
        })
    }

    pub fn into_stream(self) -> impl Stream<Item = T> {
        stream::unfold(self, |rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
    }
}
