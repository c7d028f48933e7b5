//! The cooperative pool core (spec §4.1, §4.6, §4.7, §5).
//!
//! Same `Arc`-wrapped-shared-state shape as [`crate::blocking::pool`], but
//! the critical section is a `tokio::sync::Mutex` and waiter signaling is an
//! `event_listener::Event` rather than a `Condvar` — directly grounded on
//! `sqlx-core`'s own async idle queue
//! (`examples/launchbadge-sqlx/sqlx-core/src/pool/idle.rs`'s
//! `IdleQueue`/`release_event: Event` pair), since there is no async condvar
//! in `std`. The listen-before-check-then-drop-the-lock ordering in
//! [`Pool::acquire`]'s wait path is the same ordering that module uses to
//! avoid a missed wakeup between releasing the lock and starting to wait.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use event_listener::Event;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;

use super::{maintenance, shrink, validation};
use crate::config::PoolConfig;
use crate::connection::ConnectionFactory;
use crate::error::PoolError;
use crate::event::{AsyncHandler, EventDispatch, PoolEvent};
use crate::lifecycle::{ConnId, ConnIdGen, IdleSlot, Metadata};
use crate::stats::{Counters, PoolStats};

pub(super) struct Shared<F: ConnectionFactory> {
    pub(super) factory: F,
    pub(super) config: PoolConfig,
    pub(super) counters: Counters,
    pub(super) events: Mutex<EventDispatch<Box<dyn AsyncHandler<F::Conn>>>>,
    pub(super) id_gen: ConnIdGen,
    state: Mutex<State<F::Conn>>,
    release_event: Event,
    pub(super) stop: AtomicBool,
    /// Wakes the maintenance/shrink tasks early on [`Pool::close`] instead of
    /// waiting out a full sleep period. Separate from `release_event`: that
    /// one signals "a connection may be available", this one signals "stop
    /// looping", and conflating them would wake maintenance/shrink on every
    /// unrelated release.
    pub(super) shutdown: Notify,
}

struct State<C> {
    all: HashMap<ConnId, Metadata>,
    idle: VecDeque<IdleSlot<C>>,
    in_use: HashMap<ConnId, Instant>,
    closed: bool,
}

/// A pool of cooperative-async database connections.
///
/// `Clone`-able; clones share the same underlying state and background
/// tasks (spec §4.1 `Initialize` starts them once). Requires a Tokio runtime
/// to be active for the lifetime of the pool, since releasing a connection
/// ([`PooledConnection::drop`]) spawns a task to finish the async reset.
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
        let Ok(state) = self.shared.state.try_lock() else {
            return f.debug_struct("Pool").finish_non_exhaustive();
        };
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
    /// shrink tasks.
    pub async fn initialize(config: PoolConfig, factory: F) -> Result<Self, PoolError> {
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
            release_event: Event::new(),
            stop: AtomicBool::new(false),
            shutdown: Notify::new(),
            config,
        });

        for _ in 0..shared.config.min_size {
            let id = shared.id_gen.next();
            match shared.factory.connect().await {
                Ok(conn) => {
                    shared.counters.connections_created.fetch_add(1, Ordering::Relaxed);
                    shared
                        .events
                        .lock()
                        .await
                        .fire_async(PoolEvent::ConnectionCreated, &conn)
                        .await;
                    let mut state = shared.state.lock().await;
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

        *pool.maintenance.lock().await = Some(maintenance::spawn(pool.shared.clone()));
        *pool.shrink.lock().await = Some(shrink::spawn(pool.shared.clone()));

        Ok(pool)
    }

    /// Spec §4.1 `Acquire`.
    pub async fn acquire(&self) -> Result<PooledConnection<F>, PoolError> {
        self.shared.counters.acquire_requests.fetch_add(1, Ordering::Relaxed);

        let deadline = Instant::now() + self.shared.config.connection_timeout;

        loop {
            let mut state = self.shared.state.lock().await;

            if state.closed {
                return Err(PoolError::PoolClosed);
            }

            // Fast path: pop idle slots LIFO until one validates or the
            // idle set is empty.
            while let Some(slot) = state.idle.pop_back() {
                let id = slot.id();
                let created = match state.all.get(&id) {
                    Some(meta) => meta.created,
                    None => continue,
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
                        retire(&self.shared, id, slot.into_conn(), invalid_event(invalid)).await;
                        state = self.shared.state.lock().await;
                    }
                }
            }

            if state.closed {
                return Err(PoolError::PoolClosed);
            }

            // Grow path: reserve a slot under the lock, then connect without
            // holding it (spec §5: I/O never happens under the critical
            // section).
            if state.all.len() < self.shared.config.max_size as usize {
                let id = self.shared.id_gen.next();
                state.all.insert(id, Metadata::new(id));
                drop(state);

                match self.shared.factory.connect().await {
                    Ok(conn) => {
                        let mut state = self.shared.state.lock().await;
                        if let Some(meta) = state.all.get_mut(&id) {
                            meta.usage = 1;
                        }
                        state.in_use.insert(id, Instant::now());
                        drop(state);
                        self.shared.counters.connections_created.fetch_add(1, Ordering::Relaxed);
                        let events = self.shared.events.lock().await;
                        events.fire_async(PoolEvent::ConnectionCreated, &conn).await;
                        events.fire_async(PoolEvent::PoolGrow, &conn).await;
                        drop(events);
                        return Ok(PooledConnection::new(self.clone(), id, conn));
                    }
                    Err(e) => {
                        let mut state = self.shared.state.lock().await;
                        state.all.remove(&id);
                        drop(state);
                        self.shared.release_event.notify(1);
                        return Err(PoolError::ConnectionCreationFailed(e));
                    }
                }
            }

            // Wait path. Register the listener before dropping the lock, so
            // a release racing with this acquire can't fire between "we gave
            // up the lock" and "we started listening" and be missed.
            let listener = self.shared.release_event.listen();
            drop(state);

            let now = Instant::now();
            if now >= deadline {
                self.shared.counters.acquire_timeouts.fetch_add(1, Ordering::Relaxed);
                return Err(PoolError::AcquireTimeout);
            }

            if tokio::time::timeout(deadline - now, listener).await.is_err() {
                self.shared.counters.acquire_timeouts.fetch_add(1, Ordering::Relaxed);
                return Err(PoolError::AcquireTimeout);
            }
            // Loop back around: re-check everything under the lock,
            // regardless of why we woke (spec §9).
        }
    }

    /// Spec §4.1 `Release`, invoked (via a spawned task) from
    /// [`PooledConnection::drop`].
    pub(super) async fn release(&self, id: ConnId, conn: F::Conn) {
        let mut state = self.shared.state.lock().await;

        if state.closed {
            drop(state);
            retire(&self.shared, id, conn, None).await;
            return;
        }

        if state.in_use.remove(&id).is_none() {
            // Double-release safety net: not a connection we handed out (or
            // already released once); close it and leave pool state alone.
            drop(state);
            let _ = Box::new(conn).close().await;
            return;
        }

        let created = state.all.get(&id).map(|m| m.created);
        drop(state);

        let Some(created) = created else {
            let _ = Box::new(conn).close().await;
            return;
        };

        match validation::validate(&conn, created, self.shared.config.max_lifetime) {
            Ok(()) => {
                let mut conn = conn;
                match validation::reset(&mut conn).await {
                    Ok(()) => {
                        let mut state = self.shared.state.lock().await;
                        state.idle.push_back(IdleSlot::new(id, conn));
                        drop(state);
                        self.shared.release_event.notify(1);
                    }
                    Err(()) => {
                        let mut state = self.shared.state.lock().await;
                        state.all.remove(&id);
                        drop(state);
                        retire(&self.shared, id, conn, None).await;
                        self.shared.release_event.notify(1);
                    }
                }
            }
            Err(_invalid) => {
                // Spec §4.1 Release: any validation failure emits
                // ConnectionInvalid, unlike the acquire-path/maintenance
                // split that only fires it for a dead-probe result.
                let mut state = self.shared.state.lock().await;
                state.all.remove(&id);
                drop(state);
                retire(&self.shared, id, conn, Some(PoolEvent::ConnectionInvalid)).await;
                self.shared.release_event.notify(1);
            }
        }
    }

    /// Spec §4.1 `Close`.
    pub async fn close(&self) {
        let mut state = self.shared.state.lock().await;
        if state.closed {
            return;
        }
        state.closed = true;
        self.shared.stop.store(true, Ordering::SeqCst);

        let idle: Vec<_> = state.idle.drain(..).collect();
        state.all.clear();
        // In-use connections are left to the caller's `PooledConnection`;
        // its `Drop` sees `closed == true` in `release` and closes the
        // connection directly (callers must not use a connection after
        // pool shutdown).
        state.in_use.clear();
        drop(state);

        for slot in idle {
            let id = slot.id();
            retire(&self.shared, id, slot.into_conn(), None).await;
        }

        self.shared.release_event.notify(usize::MAX);
        self.shared.shutdown.notify_waiters();

        if let Some(handle) = self.maintenance.lock().await.take() {
            let _ = handle.await;
        }
        if let Some(handle) = self.shrink.lock().await.take() {
            let _ = handle.await;
        }
    }

    /// Spec §4.1 `GetStats`: atomic snapshot.
    pub async fn stats(&self) -> PoolStats {
        let state = self.shared.state.lock().await;
        let total = state.all.len() as u32;
        let idle = state.idle.len() as u32;
        let in_use = state.in_use.len() as u32;
        let (usage_sum, usage_count) = state
            .all
            .values()
            .fold((0u64, 0u64), |(sum, count), m| (sum + m.usage, count + 1));
        self.shared.counters.snapshot(total, idle, in_use, usage_sum, usage_count)
    }

    /// Spec §4.1 `HealthCheck`: runs the same scan as the maintenance loop
    /// once.
    pub async fn health_check(&self) {
        maintenance::run_once(&self.shared).await;
    }

    /// Spec §4.1 `AddEventHandler`. Callable on any live handle, including
    /// one already shared via `Clone` or with the maintenance/shrink tasks
    /// already running — those tasks hold their own `Arc` clone of `Shared`
    /// from the moment `initialize` spawns them, so registration can never
    /// rely on exclusive access to it.
    pub async fn add_event_handler<H>(&self, event: PoolEvent, handler: H)
    where
        H: AsyncHandler<F::Conn> + 'static,
    {
        self.shared
            .events
            .lock()
            .await
            .register(event, Box::new(handler));
    }

    /// Spec §4.1 `AcquireScope`: guaranteed release on every exit path,
    /// including the body future being dropped before completion (spec §5
    /// "cancellation during acquisition").
    pub async fn scope<R, Fut>(&self, body: impl FnOnce(&mut F::Conn) -> Fut) -> Result<R, PoolError>
    where
        Fut: std::future::Future<Output = R>,
    {
        let mut conn = self.acquire().await?;
        Ok(body(&mut conn).await)
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
pub(super) async fn retire<F: ConnectionFactory>(
    shared: &Shared<F>,
    _id: ConnId,
    conn: F::Conn,
    extra: Option<PoolEvent>,
) {
    let events = shared.events.lock().await;
    if let Some(event) = extra {
        events.fire_async(event, &conn).await;
    }
    events.fire_async(PoolEvent::ConnectionClosed, &conn).await;
    drop(events);
    let _ = Box::new(conn).close().await;
    shared.counters.connections_closed.fetch_add(1, Ordering::Relaxed);
}

/// Internal view used by the maintenance and shrink tasks to splice the idle
/// deque without duplicating `Shared`'s private fields across modules.
pub(super) struct IdleScan<'a, C> {
    pub(super) all: &'a mut HashMap<ConnId, Metadata>,
    pub(super) idle: &'a mut VecDeque<IdleSlot<C>>,
    pub(super) in_use_count: usize,
}

impl<F: ConnectionFactory> Shared<F> {
    pub(super) async fn with_idle_scan<R>(&self, f: impl FnOnce(IdleScan<'_, F::Conn>) -> R) -> Option<R> {
        let mut state = self.state.lock().await;
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
}

/// A connection checked out from a [`Pool`]. Releases back to the pool on
/// `Drop` by spawning a task to run the async release path, since `Drop`
/// itself cannot `.await` — the same constraint `sqlx-core`'s own
/// `PoolConnection::drop` works around by spawning rather than blocking.
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
        PooledConnection { conn: Some(conn), id, pool }
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
            let pool = self.pool.clone();
            let id = self.id;
            tokio::spawn(async move {
                pool.release(id, conn).await;
            });
        }
    }
}
