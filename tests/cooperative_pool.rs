//! Integration tests for [`connpool::cooperative::Pool`], the async
//! counterpart of `tests/blocking_pool.rs`'s scenarios.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use connpool::cooperative::Pool;
use connpool::event::AsyncHandler;
use connpool::testing::{AsyncMockConnection, AsyncMockFactory};
use connpool::{PoolConfig, PoolError, PoolEvent};
use futures_core::future::BoxFuture;

/// Records every event it's fired with into a shared buffer.
struct RecordingHandler(Arc<Mutex<Vec<PoolEvent>>>);

impl AsyncHandler<AsyncMockConnection> for RecordingHandler {
    fn handle<'a>(&'a self, event: PoolEvent, _conn: &'a AsyncMockConnection) -> BoxFuture<'a, ()> {
        let seen = Arc::clone(&self.0);
        Box::pin(async move {
            seen.lock().unwrap().push(event);
        })
    }
}

#[tokio::test]
async fn steady_state_reuse_does_not_grow_past_min_size() {
    let factory = AsyncMockFactory::new();
    let telemetry = factory.telemetry();
    let pool = Pool::initialize(
        PoolConfig::builder()
            .min_size(2)
            .max_size(4)
            .build()
            .unwrap(),
        factory,
    )
    .await
    .unwrap();

    for _ in 0..100 {
        let conn = pool.acquire().await.unwrap();
        drop(conn);
        // Release runs in a spawned task (Drop can't `.await`); give it a
        // moment to land before the next acquire so this stays a
        // single-connection round trip instead of racing into a grow.
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    let stats = pool.stats().await;
    assert_eq!(telemetry.connects(), 2);
    assert_eq!(stats.connections_created, 2);
    assert_eq!(stats.connections_closed, 0);
    pool.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_acquire_grows_up_to_max_size() {
    let factory = AsyncMockFactory::new();
    let pool = Arc::new(
        Pool::initialize(
            PoolConfig::builder()
                .min_size(1)
                .max_size(4)
                .build()
                .unwrap(),
            factory,
        )
        .await
        .unwrap(),
    );

    let mut tasks = Vec::new();
    for _ in 0..4 {
        let pool = Arc::clone(&pool);
        tasks.push(tokio::spawn(async move {
            let conn = pool.acquire().await.unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            drop(conn);
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let stats = pool.stats().await;
    assert_eq!(stats.connections_created, 4);
    assert_eq!(stats.acquire_timeouts, 0);
    pool.close().await;
}

#[tokio::test]
async fn saturation_times_out_instead_of_blocking_forever() {
    let factory = AsyncMockFactory::new();
    let pool = Pool::initialize(
        PoolConfig::builder()
            .min_size(0)
            .max_size(2)
            .connection_timeout(Duration::from_millis(500))
            .build()
            .unwrap(),
        factory,
    )
    .await
    .unwrap();

    let _a = pool.acquire().await.unwrap();
    let _b = pool.acquire().await.unwrap();

    let started = std::time::Instant::now();
    let result = pool.acquire().await;
    assert!(matches!(result, Err(PoolError::AcquireTimeout)));
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(pool.stats().await.acquire_timeouts, 1);
    pool.close().await;
}

#[tokio::test]
async fn expired_lifetime_connections_are_retired_by_maintenance() {
    let factory = AsyncMockFactory::new();
    let pool = Pool::initialize(
        PoolConfig::builder()
            .min_size(2)
            .max_size(2)
            .max_lifetime(Duration::from_millis(200))
            .health_check_interval(Duration::from_millis(50))
            .build()
            .unwrap(),
        factory,
    )
    .await
    .unwrap();

    tokio::time::sleep(Duration::from_millis(600)).await;

    let stats = pool.stats().await;
    assert_eq!(stats.total_connections, 0);
    assert!(stats.connections_closed >= 2);
    pool.close().await;
}

#[tokio::test]
async fn dead_connection_is_replaced_on_next_acquire() {
    let factory = AsyncMockFactory::new().die_after_uses(1);
    let pool = Pool::initialize(
        PoolConfig::builder()
            .min_size(0)
            .max_size(2)
            .build()
            .unwrap(),
        factory,
    )
    .await
    .unwrap();

    let first = pool.acquire().await.unwrap();
    let first_id = first.id();
    drop(first);
    tokio::task::yield_now().await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    let second = pool.acquire().await.unwrap();
    assert_ne!(second.id(), first_id);
    drop(second);

    tokio::time::sleep(Duration::from_millis(20)).await;
    let stats = pool.stats().await;
    assert_eq!(stats.connections_created, 2);
    assert_eq!(stats.connections_closed, 1);
    pool.close().await;
}

#[tokio::test]
async fn close_wakes_waiters_with_pool_closed() {
    let factory = AsyncMockFactory::new();
    let pool = Arc::new(
        Pool::initialize(
            PoolConfig::builder()
                .min_size(0)
                .max_size(1)
                .connection_timeout(Duration::from_secs(5))
                .build()
                .unwrap(),
            factory,
        )
        .await
        .unwrap(),
    );

    let holder = pool.acquire().await.unwrap();

    let waiter_pool = Arc::clone(&pool);
    let waiter = tokio::spawn(async move { waiter_pool.acquire().await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    pool.close().await;

    let result = waiter.await.unwrap();
    assert!(matches!(result, Err(PoolError::PoolClosed)));

    drop(holder);
}

#[tokio::test]
async fn close_is_idempotent() {
    let factory = AsyncMockFactory::new();
    let pool = Pool::initialize(PoolConfig::default(), factory)
        .await
        .unwrap();
    pool.close().await;
    pool.close().await;
}

#[tokio::test]
async fn min_equals_max_never_grows_or_shrinks() {
    let factory = AsyncMockFactory::new();
    let telemetry = factory.telemetry();
    let pool = Pool::initialize(
        PoolConfig::builder()
            .min_size(3)
            .max_size(3)
            .build()
            .unwrap(),
        factory,
    )
    .await
    .unwrap();

    let mut conns = Vec::new();
    for _ in 0..3 {
        conns.push(pool.acquire().await.unwrap());
    }
    drop(conns);

    assert_eq!(telemetry.connects(), 3);
    assert_eq!(pool.stats().await.total_connections, 3);
    pool.close().await;
}

#[tokio::test]
async fn event_handlers_observe_creation_growth_and_close() {
    let factory = AsyncMockFactory::new();
    let pool = Pool::initialize(
        PoolConfig::builder()
            .min_size(0)
            .max_size(2)
            .build()
            .unwrap(),
        factory,
    )
    .await
    .unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    for event in [
        PoolEvent::ConnectionCreated,
        PoolEvent::PoolGrow,
        PoolEvent::ConnectionClosed,
    ] {
        pool.add_event_handler(event, RecordingHandler(Arc::clone(&seen)))
            .await;
    }

    let conn = pool.acquire().await.unwrap();
    drop(conn);
    tokio::time::sleep(Duration::from_millis(20)).await;
    pool.close().await;

    let seen = seen.lock().unwrap();
    assert_eq!(seen.iter().filter(|e| **e == PoolEvent::ConnectionCreated).count(), 1);
    assert_eq!(seen.iter().filter(|e| **e == PoolEvent::PoolGrow).count(), 1);
    assert_eq!(seen.iter().filter(|e| **e == PoolEvent::ConnectionClosed).count(), 1);
}

#[tokio::test]
async fn add_event_handler_works_on_an_already_shared_pool() {
    let factory = AsyncMockFactory::new();
    let pool = Pool::initialize(PoolConfig::default(), factory)
        .await
        .unwrap();
    let pool2 = pool.clone();

    let seen = Arc::new(Mutex::new(Vec::new()));
    pool2
        .add_event_handler(PoolEvent::ConnectionClosed, RecordingHandler(Arc::clone(&seen)))
        .await;

    pool.close().await;
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn zero_connection_timeout_succeeds_immediately_when_not_saturated() {
    let factory = AsyncMockFactory::new();
    let pool = Pool::initialize(
        PoolConfig::builder()
            .min_size(1)
            .max_size(1)
            .connection_timeout(Duration::ZERO)
            .build()
            .unwrap(),
        factory,
    )
    .await
    .unwrap();

    pool.acquire().await.unwrap();
    pool.close().await;
}

#[tokio::test]
async fn zero_connection_timeout_fails_fast_without_suspending() {
    let factory = AsyncMockFactory::new();
    let pool = Pool::initialize(
        PoolConfig::builder()
            .min_size(0)
            .max_size(1)
            .connection_timeout(Duration::ZERO)
            .build()
            .unwrap(),
        factory,
    )
    .await
    .unwrap();

    let _held = pool.acquire().await.unwrap();

    let started = std::time::Instant::now();
    let result = pool.acquire().await;
    assert!(matches!(result, Err(PoolError::AcquireTimeout)));
    assert!(started.elapsed() < Duration::from_millis(100));
    assert_eq!(pool.stats().await.acquire_timeouts, 1);
    pool.close().await;
}
