//! The blocking pool core (spec §4.1, §4.6, §4.7, §5).
//!
//! Grounded on `sqlx-core`'s `pool::{mod,inner,connection}.rs` split
//! (`examples/launchbadge-sqlx/sqlx-core/src/pool/{mod,inner,connection}.rs`):
//! a thin `Arc`-wrapped handle (`Pool`) in front of a shared, mutex-guarded
//! inner state (`SharedPool` there, `Shared` here), with a `PoolConnection`
//! guard that releases on `Drop`. The waiter queue from spec §3 is realized
//! as a `std::sync::Condvar` rather than an explicit FIFO list: spec §4.1
//! explicitly allows fast-path hits to overtake waiters ("no fairness
//! guarantee beyond timeouts are honored"), so the OS-level wait queue a
//! `Condvar` rides on is sufficient and is the idiomatic choice for a
//! preemptive-threaded pool (see also spec §9's "condition-variable-under-
//! mutex: mandatory").

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Instant;

use super::connection::ConnectionFactory;
use super::{maintenance, shrink, validation};
use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::event::{EventDispatch, Handler, PoolEvent};
use crate::lifecycle::{ConnId, ConnIdGen, IdleSlot, Metadata};
use crate::stats::{Counters, PoolStats};

pub(super) struct Shared<F: ConnectionFactory> {
    pub(super) factory: F,
    pub(super) config: PoolConfig,
    pub(super) counters: Counters,
    pub(super) events: Mutex<EventDispatch<Box<dyn Handler<F::Conn>>>>,
    pub(super) id_gen: ConnIdGen,
    state: Mutex<State<F::Conn>>,
    condvar: Condvar,
    pub(super) stop: std::sync::atomic::AtomicBool,
    /// Dedicated wake primitive for the maintenance/shrink sleep phases, so
    /// `close()` can wake them early instead of waiting out a full period
    /// (spec §5: background loops run their sleep phases outside the
    /// critical section, so they can't share `condvar`/`state` for this).
    pub(super) wake_lock: Mutex<()>,
    pub(super) wake: Condvar,
}

struct State<C> {
    /// All connections not yet retired, keyed by id. Authoritative for
    /// capacity accounting and usage stats (spec §3 "All-connections set");
    /// a strong map rather than the source's weak set, since Rust ownership
    /// is explicit (spec §9 REDESIGN FLAGS).
    all: HashMap<ConnId, Metadata>,
    /// Idle connections. Pushed/popped from the back (LIFO, spec §3); the
    /// maintenance and shrink loops scan front-to-back (FIFO) when
    /// expiring entries.
    idle: VecDeque<IdleSlot<C>>,
    /// Proof of checkout: connection ids currently held by a caller, with
    /// their acquire timestamp.
    in_use: HashMap<ConnId, Instant>,
    closed: bool,
}

/// A pool of blocking database connections.
///
/// `Clone`-able; clones share the same underlying state and background
/// threads (spec §4.1 `Initialize` starts them once).
pub struct Pool<F: ConnectionFactory> {
    pub(super) shared: Arc<Shared<F>>,
    maintenance: Arc<Mutex<Option<JoinHandle<()>>>>,
    shrink: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl<F: ConnectionFactory> Clone for Pool<F> {
    fn clone(&self) -> Self {
        Pool {
            shared: Arc::clone(&self.shared),
            maintenance: Arc::clone(&self.maintenance),
            shrink: Arc::clone(&self.shrink),
        }
    }
}

impl<F: ConnectionFactory> std::fmt::Debug for Pool<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock().unwrap();
        f.debug_struct("Pool")
            .field("size", &state.all.len())
            .field("num_idle", &state.idle.len())
            .field("is_closed", &state.closed)
            .finish()
    }
}

impl<F: ConnectionFactory> Pool<F> {
    /// Spec §4.1 `Initialize`: pre-creates up to `min_size` connections
    /// (failures are logged, not fatal) and starts the maintenance and
    /// shrink loops.
    pub fn initialize(config: PoolConfig, factory: F) -> Result<Self, PoolError> {
        config.validate()?;

        let shared = Arc::new(Shared {
            factory,
            counters: Counters::default(),
            events: Mutex::new(EventDispatch::default()),
            id_gen: ConnIdGen::default(),
            state: Mutex::new(State {
                all: HashMap::new(),
                idle: VecDeque::new(),
                in_use: HashMap::new(),
                closed: false,
            }),
            condvar: Condvar::new(),
            stop: std::sync::atomic::AtomicBool::new(false),
            wake_lock: Mutex::new(()),
            wake: Condvar::new(),
            config,
        });

        for _ in 0..shared.config.min_size {
            let id = shared.id_gen.next();
            match shared.factory.connect() {
                Ok(conn) => {
                    shared
                        .counters
                        .connections_created
                        .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    shared
                        .events
                        .lock()
                        .unwrap()
                        .fire(PoolEvent::ConnectionCreated, &conn);
                    let mut state = shared.state.lock().unwrap();
                    state.all.insert(id, Metadata::new(id));
                    state.idle.push_back(IdleSlot::new(id, conn));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to pre-create connection during pool initialization");
                }
            }
        }

        let pool = Pool {
            shared,
            maintenance: Arc::new(Mutex::new(None)),
            shrink: Arc::new(Mutex::new(None)),
        };

        *pool.maintenance.lock().unwrap() = Some(maintenance::spawn(pool.shared.clone()));
        *pool.shrink.lock().unwrap() = Some(shrink::spawn(pool.shared.clone()));

        Ok(pool)
    }

    /// Spec §4.1 `Acquire`.
    pub fn acquire(&self) -> Result<PooledConnection<F>, PoolError> {
        self.shared
            .counters
            .acquire_requests
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);

        let deadline = Instant::now() + self.shared.config.connection_timeout;
        let mut state = self.shared.state.lock().unwrap();

        loop {
            if state.closed {
                return Err(PoolError::PoolClosed);
            }

            // Fast path: pop idle slots LIFO until one validates or the
            // idle set is empty.
            while let Some(slot) = state.idle.pop_back() {
                let id = slot.id();
                let created = state.all.get(&id).map(|m| m.created);
                let Some(created) = created else {
                    // Shouldn't happen: every idle slot has a metadata entry.
                    continue;
                };
                match validation::validate(slot.conn(), created, self.shared.config.max_lifetime) {
                    Ok(()) => {
                        state.in_use.insert(id, Instant::now());
                        if let Some(meta) = state.all.get_mut(&id) {
                            meta.usage += 1;
                        }
                        drop(state);
                        return Ok(PooledConnection::new(self.clone(), id, slot.into_conn()));
                    }
                    Err(invalid) => {
                        state.all.remove(&id);
                        drop(state);
                        retire(&self.shared, id, slot.into_conn(), invalid_event(invalid));
                        state = self.shared.state.lock().unwrap();
                    }
                }
            }

            if state.closed {
                return Err(PoolError::PoolClosed);
            }

            // Grow path: reserve a slot under the lock, then connect
            // without holding it (spec §5: I/O never happens under the
            // critical section).
            if state.all.len() < self.shared.config.max_size as usize {
                let id = self.shared.id_gen.next();
                state.all.insert(id, Metadata::new(id));
                drop(state);

                match self.shared.factory.connect() {
                    Ok(conn) => {
                        let mut state = self.shared.state.lock().unwrap();
                        if let Some(meta) = state.all.get_mut(&id) {
                            meta.usage = 1;
                        }
                        state.in_use.insert(id, Instant::now());
                        drop(state);
                        self.shared
                            .counters
                            .connections_created
                            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                        let events = self.shared.events.lock().unwrap();
                        events.fire(PoolEvent::ConnectionCreated, &conn);
                        events.fire(PoolEvent::PoolGrow, &conn);
                        drop(events);
                        return Ok(PooledConnection::new(self.clone(), id, conn));
                    }
                    Err(e) => {
                        let mut state = self.shared.state.lock().unwrap();
                        state.all.remove(&id);
                        drop(state);
                        self.shared.condvar.notify_one();
                        return Err(PoolError::ConnectionCreationFailed(e));
                    }
                }
            }

            // Wait path.
            let now = Instant::now();
            if now >= deadline {
                self.shared
                    .counters
                    .acquire_timeouts
                    .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                return Err(PoolError::AcquireTimeout);
            }

            let (guard, _timeout_result) = self
                .shared
                .condvar
                .wait_timeout(state, deadline - now)
                .unwrap();
            state = guard;
            // Loop back around: re-check the predicate under the lock,
            // regardless of whether we actually timed out or were
            // spuriously/legitimately woken (spec §9).
        }
    }

    /// Spec §4.1 `Release`, invoked by [`PooledConnection::drop`].
    pub(super) fn release(&self, id: ConnId, conn: F::Conn) {
        let mut state = self.shared.state.lock().unwrap();

        if state.closed {
            drop(state);
            retire(&self.shared, id, conn, None);
            return;
        }

        if state.in_use.remove(&id).is_none() {
            // Double-release safety net (spec §4.1): not a connection we
            // handed out (or already released once); close it and leave
            // pool state untouched.
            drop(state);
            let _ = Box::new(conn).close();
            return;
        }

        let created = state.all.get(&id).map(|m| m.created);
        drop(state);

        let Some(created) = created else {
            let _ = Box::new(conn).close();
            return;
        };

        match validation::validate(&conn, created, self.shared.config.max_lifetime) {
            Ok(()) => {
                let mut conn = conn;
                match validation::reset(&mut conn) {
                    Ok(()) => {
                        let mut state = self.shared.state.lock().unwrap();
                        state.idle.push_back(IdleSlot::new(id, conn));
                        drop(state);
                        self.shared.condvar.notify_one();
                    }
                    Err(()) => {
                        let mut state = self.shared.state.lock().unwrap();
                        state.all.remove(&id);
                        drop(state);
                        retire(&self.shared, id, conn, None);
                        self.shared.condvar.notify_one();
                    }
                }
            }
            Err(_invalid) => {
                // Spec §4.1 Release: any validation failure emits
                // ConnectionInvalid, unlike the acquire-path/maintenance
                // split that only fires it for a dead-probe result.
                let mut state = self.shared.state.lock().unwrap();
                state.all.remove(&id);
                drop(state);
                retire(&self.shared, id, conn, Some(PoolEvent::ConnectionInvalid));
                self.shared.condvar.notify_one();
            }
        }
    }

    /// Spec §4.1 `Close`.
    pub fn close(&self) {
        let mut state = self.shared.state.lock().unwrap();
        if state.closed {
            return;
        }
        state.closed = true;
        self.shared
            .stop
            .store(true, std::sync::atomic::Ordering::SeqCst);

        let idle: Vec<_> = state.idle.drain(..).collect();
        state.all.clear();
        // In-use connections are left to the caller's `PooledConnection`;
        // their `Drop` impl sees `closed == true` and closes them directly
        // (spec: "callers must not use a connection after pool shutdown").
        state.in_use.clear();
        drop(state);

        for slot in idle {
            let id = slot.id();
            retire(&self.shared, id, slot.into_conn(), None);
        }

        self.shared.condvar.notify_all();
        self.shared.wake.notify_all();

        if let Some(handle) = self.maintenance.lock().unwrap().take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.shrink.lock().unwrap().take() {
            let _ = handle.join();
        }
    }

    /// Spec §4.1 `GetStats`: atomic snapshot.
    pub fn stats(&self) -> PoolStats {
        let state = self.shared.state.lock().unwrap();
        let total = state.all.len() as u32;
        let idle = state.idle.len() as u32;
        let in_use = state.in_use.len() as u32;
        let (usage_sum, usage_count) = state
            .all
            .values()
            .fold((0u64, 0u64), |(sum, count), m| (sum + m.usage, count + 1));
        self.shared
            .counters
            .snapshot(total, idle, in_use, usage_sum, usage_count)
    }

    /// Spec §4.1 `HealthCheck`: runs the same scan as the maintenance loop
    /// once, synchronously.
    pub fn health_check(&self) {
        maintenance::run_once(&self.shared);
    }

    /// Spec §4.1 `AddEventHandler`. Callable on any live handle, including
    /// one already shared via `Clone` or with background loops running —
    /// the maintenance/shrink threads hold their own `Arc` clone of
    /// `Shared` from the moment `initialize` spawns them, so registration
    /// can never rely on exclusive access to it.
    pub fn add_event_handler<H>(&self, event: PoolEvent, handler: H)
    where
        H: Handler<F::Conn> + 'static,
    {
        self.shared
            .events
            .lock()
            .unwrap()
            .register(event, Box::new(handler));
    }

    /// Spec §4.1 `AcquireScope`: guaranteed release on every exit path.
    /// Since [`PooledConnection`] already releases on `Drop` (including
    /// stack unwinding from a panic), this is a thin convenience wrapper.
    pub fn scope<R>(&self, body: impl FnOnce(&mut F::Conn) -> R) -> Result<R, PoolError> {
        let mut conn = self.acquire()?;
        Ok(body(&mut conn))
    }
}

fn invalid_event(invalid: crate::error::Invalid) -> Option<PoolEvent> {
    match invalid {
        crate::error::Invalid::NotOpen => Some(PoolEvent::ConnectionInvalid),
        crate::error::Invalid::Expired => None,
    }
}

/// Closes `conn` (outside any lock) and accounts for it: increments
/// `connections_closed`, fires `extra` (if any) followed by
/// `ConnectionClosed` — every retirement fires exactly one `ConnectionClosed`
/// event regardless of how it was triggered, satisfying spec §8 invariant 6.
pub(super) fn retire<F: ConnectionFactory>(
    shared: &Shared<F>,
    _id: ConnId,
    conn: F::Conn,
    extra: Option<PoolEvent>,
) {
    let events = shared.events.lock().unwrap();
    if let Some(event) = extra {
        events.fire(event, &conn);
    }
    events.fire(PoolEvent::ConnectionClosed, &conn);
    drop(events);
    let _ = Box::new(conn).close();
    shared
        .counters
        .connections_closed
        .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
}

/// Internal view used by the maintenance and shrink loops to splice the
/// idle deque without duplicating `Shared`'s private fields across modules.
pub(super) struct IdleScan<'a, C> {
    pub(super) all: &'a mut HashMap<ConnId, Metadata>,
    pub(super) idle: &'a mut VecDeque<IdleSlot<C>>,
    pub(super) in_use_count: usize,
}

impl<F: ConnectionFactory> Shared<F> {
    pub(super) fn with_idle_scan<R>(
        &self,
        f: impl FnOnce(IdleScan<'_, F::Conn>) -> R,
    ) -> Option<R> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return None;
        }
        let in_use_count = state.in_use.len();
        let State { all, idle, .. } = &mut *state;
        Some(f(IdleScan {
            all,
            idle,
            in_use_count,
        }))
    }

    pub(super) fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }
}

/// A connection checked out from a [`Pool`]. Releases back to the pool on
/// `Drop`, on every exit path including panics (spec §3 "Acquire Scope").
pub struct PooledConnection<F: ConnectionFactory> {
    conn: Option<F::Conn>,
    id: ConnId,
    pool: Pool<F>,
}

impl<F: ConnectionFactory> std::fmt::Debug for PooledConnection<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection").field("id", &self.id).finish()
    }
}

impl<F: ConnectionFactory> PooledConnection<F> {
    fn new(pool: Pool<F>, id: ConnId, conn: F::Conn) -> Self {
        PooledConnection {
            conn: Some(conn),
            id,
            pool,
        }
    }
}

const DEREF_ERR: &str = "(bug) connection already released to pool";

impl<F: ConnectionFactory> std::ops::Deref for PooledConnection<F> {
    type Target = F::Conn;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().expect(DEREF_ERR)
    }
}

impl<F: ConnectionFactory> std::ops::DerefMut for PooledConnection<F> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect(DEREF_ERR)
    }
}

impl<F: ConnectionFactory> Drop for PooledConnection<F> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(self.id, conn);
        }
    }
}
