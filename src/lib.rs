#![doc = include_str!("../README.md")]
#![warn(missing_debug_implementations)]

pub mod blocking;
pub mod config;
pub mod connection;
#[cfg(feature = "cooperative")]
pub mod cooperative;
pub mod error;
pub mod event;
mod lifecycle;
pub mod stats;

#[cfg(feature = "test-support")]
pub mod testing;

pub use config::{PoolConfig, PoolConfigBuilder};
pub use error::{BoxDynError, PoolError};
pub use event::PoolEvent;
pub use stats::PoolStats;
