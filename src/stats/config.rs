use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Config {
    pub cadence:   Duration,
    pub history:   usize,
    pub snapshots: usize,
    pub protocols: usize,
    pub talkers:   usize,
    pub ports:     usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cadence:   Duration::from_millis(300),
            history:   60,
            snapshots: 10,
            protocols: 10,
            talkers:   5,
            ports:     5,
        }
    }
}
