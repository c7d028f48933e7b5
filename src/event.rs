//! Lifecycle event dispatch (spec §4.5).
//!
//! Grounded on the `_event_handlers: Dict[PoolEvent, List[Callable]]` /
//! `_fire_event` pair in
//! `examples/original_source/nexios/orm/backends/pool/connection_pool.py`:
//! a closed tagged variant mapping to an ordered list of subscribers, fired
//! outside any lock, with handler errors caught and logged rather than
//! propagated.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use futures_core::future::BoxFuture;

/// A pool lifecycle notification (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolEvent {
    ConnectionCreated,
    ConnectionClosed,
    ConnectionInvalid,
    PoolGrow,
    PoolShrink,
}

/// A synchronous event handler, used by [`crate::blocking::Pool`].
///
/// Handlers run on whatever thread fired the event (caller thread for
/// acquire/release, the maintenance or shrink thread for background
/// expiry) and must not call back into the pool that owns them (§5 deadlock
/// avoidance).
pub trait Handler<Conn>: Send + Sync {
    fn handle(&self, event: PoolEvent, conn: &Conn);
}

impl<Conn, F> Handler<Conn> for F
where
    F: Fn(PoolEvent, &Conn) + Send + Sync,
{
    fn handle(&self, event: PoolEvent, conn: &Conn) {
        self(event, conn)
    }
}

impl<Conn> Handler<Conn> for Box<dyn Handler<Conn>> {
    fn handle(&self, event: PoolEvent, conn: &Conn) {
        (**self).handle(event, conn)
    }
}

impl<Conn> AsyncHandler<Conn> for Box<dyn AsyncHandler<Conn>> {
    fn handle<'a>(&'a self, event: PoolEvent, conn: &'a Conn) -> BoxFuture<'a, ()> {
        (**self).handle(event, conn)
    }
}

/// Ordered-per-event fan-out registry.
pub(crate) struct EventDispatch<H> {
    handlers: HashMap<PoolEvent, Vec<H>>,
}

impl<H> Default for EventDispatch<H> {
    fn default() -> Self {
        EventDispatch {
            handlers: HashMap::new(),
        }
    }
}

impl<H> EventDispatch<H> {
    pub(crate) fn register(&mut self, event: PoolEvent, handler: H) {
        self.handlers.entry(event).or_default().push(handler);
    }
}

impl<Conn, H: Handler<Conn>> EventDispatch<H> {
    /// Fires `event` to every handler registered for it, catching panics so
    /// a misbehaving handler can never take down an acquire/release call or
    /// a background loop (spec §4.5, §7 *HandlerError*).
    pub(crate) fn fire(&self, event: PoolEvent, conn: &Conn) {
        let Some(handlers) = self.handlers.get(&event) else {
            return;
        };
        for handler in handlers {
            let result = catch_unwind(AssertUnwindSafe(|| handler.handle(event, conn)));
            if let Err(panic) = result {
                let msg = panic
                    .downcast_ref::<&str>()
                    .copied()
                    .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
                    .unwrap_or("<non-string panic payload>");
                tracing::error!(?event, %msg, "pool event handler panicked");
            }
        }
    }
}

/// An asynchronous event handler, used by [`crate::cooperative::Pool`].
///
/// Unlike the blocking [`Handler`], the future is awaited in dispatch order
/// (spec §4.5) rather than run to completion synchronously. Modeled on
/// `sqlx-core`'s own preference for `BoxFuture`-returning trait methods
/// (`connection::Connection::ping`) over the `async_trait` macro.
pub trait AsyncHandler<Conn>: Send + Sync {
    fn handle<'a>(&'a self, event: PoolEvent, conn: &'a Conn) -> BoxFuture<'a, ()>;
}

impl<Conn, H> EventDispatch<H>
where
    H: AsyncHandler<Conn>,
    Conn: Sync,
{
    /// Awaits every handler registered for `event`, in registration order.
    /// A handler that panics inside its returned future is not caught here
    /// (a panic inside `.await` unwinds the task the same as any other Rust
    /// code); callers run this inside the cooperative pool's task, which is
    /// already wrapped by the runtime's own panic boundary per task.
    pub(crate) async fn fire_async(&self, event: PoolEvent, conn: &Conn) {
        let Some(handlers) = self.handlers.get(&event) else {
            return;
        };
        for handler in handlers {
            handler.handle(event, conn).await;
        }
    }
}
