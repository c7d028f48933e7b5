//! The preemptive, multi-threaded pool engine (spec §5 "Blocking pool").
//!
//! Uses a `std::sync::Mutex` guarding shared state and a `std::sync::Condvar`
//! for waiter signaling; the maintenance and shrink loops run on dedicated
//! daemon threads, stoppable via a shared flag plus a wake primitive, joined
//! (best-effort, bounded by the threads' own sleep granularity) on
//! [`Pool::close`].

mod connection;
mod maintenance;
mod pool;
mod shrink;
mod validation;

pub use connection::{Connection, ConnectionFactory};
pub use pool::{Pool, PooledConnection};
