use std::fmt;
use std::time::Duration;
use serde::Serialize;
use crate::capture::{self, Timestamp};
use crate::stats;

pub use controller::Controller;
pub use crate::stats::Source;

mod controller;


#[derive(Clone, Debug)]
pub struct Config {
    pub capture:     capture::Config,
    pub stats:       stats::Config,
    pub enumeration: Duration,
}

impl Config {
    pub fn new(capture: capture::Config, stats: stats::Config) -> Self {
        Self {
            capture:     capture,
            stats:       stats,
            enumeration: Duration::from_secs(30),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum State {
    Idle,
    Starting,
    Capturing,
    Stopping,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Session {
    pub state:   State,
    pub device:  Option<usize>,
    pub started: Option<Timestamp>,
}

/// Runtime configuration messages.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Setting {
    Source(Source),
}

impl Default for Config {
    fn default() -> Self {
        Self::new(Default::default(), Default::default())
    }
}

impl Default for Session {
    fn default() -> Self {
        Self {
            state:   State::Idle,
            device:  None,
            started: None,
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
