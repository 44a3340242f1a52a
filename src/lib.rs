pub mod agent;
pub mod args;
pub mod capture;
pub mod engine;
pub mod error;
pub mod session;
pub mod stats;

pub use error::Error;
