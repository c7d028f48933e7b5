//! Cheap, non-SQL validation and reset for the blocking engine (spec §4.2,
//! §4.4). Pulled out as free functions, grounded on the `_quick_validate`/
//! `_reset_connection` helpers in
//! `examples/original_source/nexios/orm/backends/pool/connection_pool.py`,
//! so both `pool.rs` and `maintenance.rs`/`shrink.rs` share one
//! implementation instead of re-deriving the same two checks.

use std::time::{Duration, Instant};

use super::connection::Connection;
use crate::error::Invalid;

/// Spec §4.2: liveness flag, then (only at "validation-with-age" points)
/// the max-lifetime check.
pub(super) fn validate<C: Connection>(
    conn: &C,
    created: Instant,
    max_lifetime: Duration,
) -> Result<(), Invalid> {
    if !conn.is_open() {
        return Err(Invalid::NotOpen);
    }
    if crate::lifecycle::is_past_lifetime(created, max_lifetime) {
        return Err(Invalid::Expired);
    }
    Ok(())
}

/// Spec §4.4 "Connection reset at Release": rollback, idempotent for
/// auto-commit drivers. `Err` means the connection is broken and must be
/// closed instead of returned to idle.
pub(super) fn reset<C: Connection>(conn: &mut C) -> Result<(), ()> {
    conn.rollback().map_err(|_| ())
}
