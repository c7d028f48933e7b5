//! The blocking Connection capability consumed by [`crate::blocking::Pool`]
//! (spec §6).
//!
//! Same method set as [`crate::connection::Connection`], with synchronous
//! signatures — grounded on `sqlx-core`'s own `blocking` module
//! (`examples/launchbadge-sqlx/sqlx-core/src/blocking.rs`), which re-exports
//! a parallel `Connection`/`Connect`/`Close` trait trio under a separate
//! module rather than feature-flagging a single trait.

use std::any::Any;

use crate::error::BoxDynError;

/// One live, preemptively-scheduled database session.
pub trait Connection: Send + 'static {
    /// Commits the current transaction, if any.
    fn commit(&mut self) -> Result<(), BoxDynError>;

    /// Rolls back the current transaction, if any (spec §4.4 reset).
    fn rollback(&mut self) -> Result<(), BoxDynError>;

    /// Closes the connection.
    fn close(self: Box<Self>) -> Result<(), BoxDynError>;

    /// Non-blocking, non-I/O liveness hint (spec §4.2 check 1).
    fn is_open(&self) -> bool;

    /// Opaque passthrough for advanced callers (spec §6 `raw_handle`).
    fn raw_handle(&self) -> &dyn Any;
}

/// A capability producing a fresh [`Connection`] on demand (spec §6).
///
/// Must be callable repeatedly from multiple threads and must not re-enter
/// the pool it is registered with.
pub trait ConnectionFactory: Send + Sync + 'static {
    type Conn: Connection;

    fn connect(&self) -> Result<Self::Conn, BoxDynError>;
}
