//! The cooperative-async Connection capability consumed by
//! [`crate::cooperative::Pool`] (spec §6).
//!
//! Mirrors `sqlx-core::connection::Connection`'s choice to return
//! `BoxFuture` from trait methods rather than requiring the `async_trait`
//! macro, so the trait stays dyn-compatible behind an `Arc<dyn ...>` factory.
//! Cursor-level operations are explicitly out of scope (spec §1, §6): the
//! pool never calls them.

use std::any::Any;

use futures_core::future::BoxFuture;

use crate::error::BoxDynError;

/// One live, cooperative-async database session.
///
/// `Sync` in addition to `Send`: event handler dispatch holds `&Conn` across
/// an `.await` point (spec §4.5), which requires the reference itself be
/// `Send`.
pub trait Connection: Send + Sync + 'static {
    /// Commits the current transaction, if any.
    fn commit(&mut self) -> BoxFuture<'_, Result<(), BoxDynError>>;

    /// Rolls back the current transaction, if any. Called by the pool at
    /// release time to reset connection state (spec §4.4); drivers in
    /// auto-commit mode may treat this as a no-op.
    fn rollback(&mut self) -> BoxFuture<'_, Result<(), BoxDynError>>;

    /// Closes the connection. Called by the pool, never by application code
    /// holding a [`PooledConnection`][crate::cooperative::PooledConnection].
    fn close(self: Box<Self>) -> BoxFuture<'static, Result<(), BoxDynError>>;

    /// A non-blocking, non-I/O liveness hint (spec §4.2 check 1). `false`
    /// means the driver already knows the connection is dead; `true` is not
    /// a guarantee, only the absence of a known-bad signal.
    fn is_open(&self) -> bool;

    /// Opaque passthrough for advanced callers who need the concrete driver
    /// type (spec §6 `raw_handle`). The pool itself never downcasts this.
    fn raw_handle(&self) -> &dyn Any;
}

/// A capability producing a fresh [`Connection`] on demand (spec §6).
///
/// Must not re-enter the pool it is registered with (§5 deadlock avoidance)
/// and must be safely callable repeatedly and concurrently, since the pool
/// may call it from multiple acquiring tasks at once.
pub trait ConnectionFactory: Send + Sync + 'static {
    type Conn: Connection;

    fn connect(&self) -> BoxFuture<'_, Result<Self::Conn, BoxDynError>>;
}
