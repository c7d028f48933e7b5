//! Cheap, non-SQL validation and reset for the cooperative engine (spec
//! §4.2, §4.4). Mirrors [`crate::blocking::validation`]; `reset` is async
//! here since rollback is a driver round-trip that may itself need to yield.

use std::time::{Duration, Instant};

use crate::connection::Connection;
use crate::error::Invalid;

/// Spec §4.2: liveness flag, then the max-lifetime check.
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

/// Spec §4.4 "Connection reset at Release". `Err` means the connection is
/// broken and must be closed instead of returned to idle.
pub(super) async fn reset<C: Connection>(conn: &mut C) -> Result<(), ()> {
    conn.rollback().await.map_err(|_| ())
}
