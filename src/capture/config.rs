use std::env;
use std::path::PathBuf;
use std::time::Duration;
use super::stream::Endpoint;

#[derive(Clone, Debug)]
pub struct Config {
    pub endpoint:        Endpoint,
    pub signal:          String,
    pub connect_timeout: Duration,
    pub join_timeout:    Duration,
    pub retry_pause:     Duration,
    pub capacity:        usize,
    pub batch:           usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint:        Endpoint::Unix(runtime_dir().join("tapline.sock")),
            signal:          "tapline".to_owned(),
            connect_timeout: Duration::from_secs(5),
            join_timeout:    Duration::from_secs(2),
            retry_pause:     Duration::from_millis(10),
            capacity:        10_000,
            batch:           100,
        }
    }
}

pub fn runtime_dir() -> PathBuf {
    env::var_os("XDG_RUNTIME_DIR").map(PathBuf::from).unwrap_or_else(env::temp_dir)
}
