pub use aggregate::{Aggregator, Source};
pub use config::Config;
pub use counters::{rank, Counters, Managed, NativeCounters, Tally};
pub use publish::Publisher;
pub use rates::{Rate, Rates};
pub use services::service;
pub use snapshot::{PortShare, Share, Snapshot};

mod aggregate;
mod config;
mod counters;
mod publish;
mod rates;
mod services;
mod snapshot;
