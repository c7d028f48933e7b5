//! Error and Result types for the pool.
//!
//! Modeled on the `thiserror`-derived error enums sqlx-core has moved to for
//! its newer subsystems (see `sqlx_core::migrate::MigrateError`) rather than
//! the hand-written `Display`/`source` impls in its original `error.rs`.

use std::fmt;

/// A type-erased error, used for factory and event-handler failures whose
/// concrete type the pool has no reason to know about.
pub type BoxDynError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A specialized `Result` for pool operations.
pub type Result<T, E = PoolError> = std::result::Result<T, E>;

/// Errors the pool can surface to a caller of [`Acquire`][crate::blocking::Pool::acquire]
/// or its cooperative equivalent.
///
/// Internal-only failure kinds from the design (validation failure, reset
/// failure, handler error) have no variant here by construction: they are
/// never surfaced, only logged and turned into a connection replacement.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum PoolError {
    /// `connection_timeout` elapsed with no connection becoming available.
    #[error("timed out waiting for a connection from the pool")]
    AcquireTimeout,

    /// The pool has been closed; this and all future operations will fail.
    #[error("attempted to acquire a connection from a closed pool")]
    PoolClosed,

    /// The connection factory returned an error while the pool was growing.
    #[error("failed to create a new connection: {0}")]
    ConnectionCreationFailed(#[source] BoxDynError),

    /// The supplied [`PoolConfig`][crate::config::PoolConfig] violated one of
    /// its invariants.
    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),
}

/// Internal validation outcome; never escapes the crate as a [`PoolError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Invalid {
    /// The driver reported the connection as no longer open.
    NotOpen,
    /// The connection has lived past `max_lifetime`.
    Expired,
}

impl fmt::Display for Invalid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Invalid::NotOpen => f.write_str("connection is no longer open"),
            Invalid::Expired => f.write_str("connection exceeded its maximum lifetime"),
        }
    }
}
