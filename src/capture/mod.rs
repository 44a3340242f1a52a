use std::sync::Arc;

pub mod frame;
pub mod queue;
pub mod signal;
pub mod stream;

pub use bridge::Bridge;
pub use config::{runtime_dir, Config};
pub use filter::Filter;
pub use frame::{decode, encode, DecodeError, FRAME_LEN};
pub use frames::{load, save, Frames};
pub use record::{PacketRecord, Timestamp, HEARTBEAT};
pub use signal::{Event, Named, Signal};
pub use stream::{disconnected, Endpoint, Stream};

mod bridge;
mod config;
mod filter;
mod frames;
mod record;

/// Producer side of the packet channel.
pub type Packets = queue::Sender<Arc<PacketRecord>>;

/// Consumer side of the packet channel.
pub type Batches = queue::Receiver<Arc<PacketRecord>>;

#[cfg(test)]
mod test;
