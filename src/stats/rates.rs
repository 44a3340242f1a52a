use std::time::Instant;
use ringbuffer::{AllocRingBuffer, RingBuffer};
use serde::Serialize;

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
pub struct Rate {
    pub current: f64,
    pub average: f64,
    pub max:     f64,
}

/// Packets-per-second samples taken on each tick.
pub struct Rates {
    history: AllocRingBuffer<f64>,
    last:    Option<(Instant, u64)>,
    current: f64,
    max:     f64,
}

impl Rates {
    pub fn new(len: usize) -> Self {
        Self {
            history: AllocRingBuffer::new(len.max(1)),
            last:    None,
            current: 0.0,
            max:     0.0,
        }
    }

    /// Record the packet total seen at `now`. The first call after a restart
    /// only sets the baseline.
    pub fn sample(&mut self, now: Instant, total: u64) -> Rate {
        if let Some((then, count)) = self.last {
            let secs = now.saturating_duration_since(then).as_secs_f64();
            if secs > 0.0 {
                self.current = total.saturating_sub(count) as f64 / secs;
                self.max     = self.max.max(self.current);
                self.history.push(self.current);
            }
        }
        self.last = Some((now, total));
        self.rate()
    }

    pub fn rate(&self) -> Rate {
        let n   = self.history.len();
        let sum = self.history.iter().sum::<f64>();
        Rate {
            current: self.current,
            average: if n > 0 { sum / n as f64 } else { 0.0 },
            max:     self.max,
        }
    }

    /// Forget the baseline so the next sample starts a new interval.
    pub fn restart(&mut self) {
        self.last    = None;
        self.current = 0.0;
    }

    pub fn clear(&mut self) {
        self.history.clear();
        self.last    = None;
        self.current = 0.0;
        self.max     = 0.0;
    }
}
