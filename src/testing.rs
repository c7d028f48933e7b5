//! In-memory mock connections, exposed behind the `test-support` feature so
//! downstream crates can exercise [`crate::blocking::Pool`] and
//! [`crate::cooperative::Pool`] without a real driver.
//!
//! Grounded on `sqlx-core`'s own test doubles
//! (`examples/launchbadge-sqlx/sqlx-core/src/test_utils.rs` and
//! `examples/launchbadge-sqlx/tests/any/pool.rs`'s hand-rolled connections
//! that fail, hang, or flip dead on command).

use std::any::Any;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::BoxDynError;

/// Shared, externally-inspectable counters for a [`MockFactory`] /
/// [`AsyncMockFactory`] and the connections it has produced.
#[derive(Debug, Default, Clone)]
pub struct MockTelemetry {
    connects: Arc<AtomicU64>,
    rollbacks: Arc<AtomicU64>,
    closes: Arc<AtomicU64>,
}

impl MockTelemetry {
    pub fn connects(&self) -> u64 {
        self.connects.load(Ordering::Relaxed)
    }

    pub fn rollbacks(&self) -> u64 {
        self.rollbacks.load(Ordering::Relaxed)
    }

    pub fn closes(&self) -> u64 {
        self.closes.load(Ordering::Relaxed)
    }
}

/// A blocking mock connection. Reports `is_open() == true` until it has
/// been used (`rollback`, i.e. released back to the pool) `die_after_uses`
/// times, at which point it starts reporting dead — simulating a driver
/// discovering its socket has gone away.
#[derive(Debug)]
pub struct MockConnection {
    id: usize,
    uses: u64,
    die_after_uses: Option<u64>,
    telemetry: MockTelemetry,
}

impl MockConnection {
    pub fn id(&self) -> usize {
        self.id
    }
}

impl crate::blocking::Connection for MockConnection {
    fn commit(&mut self) -> Result<(), BoxDynError> {
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), BoxDynError> {
        self.uses += 1;
        self.telemetry.rollbacks.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<(), BoxDynError> {
        self.telemetry.closes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn is_open(&self) -> bool {
        match self.die_after_uses {
            Some(n) => self.uses < n,
            None => true,
        }
    }

    fn raw_handle(&self) -> &dyn Any {
        self
    }
}

/// A [`crate::blocking::ConnectionFactory`] that hands out [`MockConnection`]s,
/// optionally failing after a fixed number of successes (simulating a
/// database that has run out of capacity) and optionally marking every
/// connection it creates as dying after a fixed number of uses.
#[derive(Debug, Clone, Default)]
pub struct MockFactory {
    next_id: Arc<AtomicUsize>,
    fail_after: Option<u64>,
    die_after_uses: Option<u64>,
    telemetry: MockTelemetry,
}

impl MockFactory {
    pub fn new() -> Self {
        MockFactory::default()
    }

    /// `connect()` returns `Err` once it has already succeeded `n` times.
    pub fn fail_after(mut self, n: u64) -> Self {
        self.fail_after = Some(n);
        self
    }

    /// Every connection created reports itself dead after `n` uses.
    pub fn die_after_uses(mut self, n: u64) -> Self {
        self.die_after_uses = Some(n);
        self
    }

    pub fn telemetry(&self) -> MockTelemetry {
        self.telemetry.clone()
    }
}

impl crate::blocking::ConnectionFactory for MockFactory {
    type Conn = MockConnection;

    fn connect(&self) -> Result<Self::Conn, BoxDynError> {
        let already = self.telemetry.connects.load(Ordering::Relaxed);
        if let Some(limit) = self.fail_after {
            if already >= limit {
                return Err("mock factory exhausted".into());
            }
        }
        self.telemetry.connects.fetch_add(1, Ordering::Relaxed);
        Ok(MockConnection {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            uses: 0,
            die_after_uses: self.die_after_uses,
            telemetry: self.telemetry.clone(),
        })
    }
}

/// The cooperative-async counterpart of [`MockConnection`].
#[derive(Debug)]
pub struct AsyncMockConnection {
    id: usize,
    uses: u64,
    die_after_uses: Option<u64>,
    telemetry: MockTelemetry,
}

impl AsyncMockConnection {
    pub fn id(&self) -> usize {
        self.id
    }
}

impl crate::connection::Connection for AsyncMockConnection {
    fn commit(&mut self) -> futures_core::future::BoxFuture<'_, Result<(), BoxDynError>> {
        Box::pin(async { Ok(()) })
    }

    fn rollback(&mut self) -> futures_core::future::BoxFuture<'_, Result<(), BoxDynError>> {
        self.uses += 1;
        self.telemetry.rollbacks.fetch_add(1, Ordering::Relaxed);
        Box::pin(async { Ok(()) })
    }

    fn close(self: Box<Self>) -> futures_core::future::BoxFuture<'static, Result<(), BoxDynError>> {
        self.telemetry.closes.fetch_add(1, Ordering::Relaxed);
        Box::pin(async { Ok(()) })
    }

    fn is_open(&self) -> bool {
        match self.die_after_uses {
            Some(n) => self.uses < n,
            None => true,
        }
    }

    fn raw_handle(&self) -> &dyn Any {
        self
    }
}

/// The cooperative-async counterpart of [`MockFactory`].
#[derive(Debug, Clone, Default)]
pub struct AsyncMockFactory {
    next_id: Arc<AtomicUsize>,
    fail_after: Option<u64>,
    die_after_uses: Option<u64>,
    telemetry: MockTelemetry,
}

impl AsyncMockFactory {
    pub fn new() -> Self {
        AsyncMockFactory::default()
    }

    pub fn fail_after(mut self, n: u64) -> Self {
        self.fail_after = Some(n);
        self
    }

    pub fn die_after_uses(mut self, n: u64) -> Self {
        self.die_after_uses = Some(n);
        self
    }

    pub fn telemetry(&self) -> MockTelemetry {
        self.telemetry.clone()
    }
}

impl crate::connection::ConnectionFactory for AsyncMockFactory {
    type Conn = AsyncMockConnection;

    fn connect(&self) -> futures_core::future::BoxFuture<'_, Result<Self::Conn, BoxDynError>> {
        let already = self.telemetry.connects.load(Ordering::Relaxed);
        let fail_after = self.fail_after;
        if let Some(limit) = fail_after {
            if already >= limit {
                return Box::pin(async { Err("mock factory exhausted".into()) });
            }
        }
        self.telemetry.connects.fetch_add(1, Ordering::Relaxed);
        let conn = AsyncMockConnection {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            uses: 0,
            die_after_uses: self.die_after_uses,
            telemetry: self.telemetry.clone(),
        };
        Box::pin(async move { Ok(conn) })
    }
}
