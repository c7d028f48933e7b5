//! The cooperative-async pool engine (spec §5 "Cooperative pool").
//!
//! Uses a `tokio::sync::Mutex` guarding shared state and an
//! `event_listener::Event` for waiter signaling (no async condvar exists in
//! `std`); the maintenance and shrink loops run as Tokio tasks, stoppable via
//! a shared flag plus `tokio::sync::Notify`, joined on [`Pool::close`].
//!
//! Requires feature `cooperative` (on by default) and an active Tokio
//! runtime for the lifetime of the pool.

mod maintenance;
mod pool;
mod shrink;
mod validation;

pub use crate::connection::{Connection, ConnectionFactory};
pub use pool::{Pool, PooledConnection};
