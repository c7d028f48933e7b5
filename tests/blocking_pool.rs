//! Integration tests for [`connpool::blocking::Pool`], covering the seed
//! scenarios and boundary cases the pool is designed against.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use connpool::blocking::Pool;
use connpool::testing::{MockConnection, MockFactory};
use connpool::{PoolConfig, PoolError, PoolEvent};

#[test]
fn steady_state_reuse_does_not_grow_past_min_size() {
    let factory = MockFactory::new();
    let telemetry = factory.telemetry();
    let pool = Pool::initialize(
        PoolConfig::builder()
            .min_size(2)
            .max_size(4)
            .build()
            .unwrap(),
        factory,
    )
    .unwrap();

    for _ in 0..100 {
        let conn = pool.acquire().unwrap();
        drop(conn);
    }

    let stats = pool.stats();
    assert_eq!(telemetry.connects(), 2);
    assert_eq!(stats.connections_created, 2);
    assert_eq!(stats.connections_closed, 0);
    assert_eq!(stats.total_connections, 2);
    pool.close();
}

#[test]
fn concurrent_acquire_grows_up_to_max_size() {
    let factory = MockFactory::new();
    let pool = Arc::new(
        Pool::initialize(
            PoolConfig::builder()
                .min_size(1)
                .max_size(4)
                .build()
                .unwrap(),
            factory,
        )
        .unwrap(),
    );

    thread::scope(|scope| {
        for _ in 0..4 {
            let pool = Arc::clone(&pool);
            scope.spawn(move || {
                let conn = pool.acquire().unwrap();
                thread::sleep(Duration::from_millis(50));
                drop(conn);
            });
        }
    });

    let stats = pool.stats();
    assert_eq!(stats.connections_created, 4);
    assert_eq!(stats.acquire_timeouts, 0);
    pool.close();
}

#[test]
fn saturation_times_out_instead_of_blocking_forever() {
    let factory = MockFactory::new();
    let pool = Arc::new(
        Pool::initialize(
            PoolConfig::builder()
                .min_size(0)
                .max_size(2)
                .connection_timeout(Duration::from_millis(500))
                .build()
                .unwrap(),
            factory,
        )
        .unwrap(),
    );

    let _a = pool.acquire().unwrap();
    let _b = pool.acquire().unwrap();

    let started = std::time::Instant::now();
    let result = pool.acquire();
    assert!(matches!(result, Err(PoolError::AcquireTimeout)));
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(pool.stats().acquire_timeouts, 1);
    pool.close();
}

#[test]
fn expired_lifetime_connections_are_retired_by_maintenance() {
    let factory = MockFactory::new();
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
    .unwrap();

    thread::sleep(Duration::from_millis(600));

    let stats = pool.stats();
    assert_eq!(stats.total_connections, 0);
    assert!(stats.connections_closed >= 2);
    pool.close();
}

#[test]
fn dead_connection_is_replaced_on_next_acquire() {
    let factory = MockFactory::new().die_after_uses(1);
    let pool = Pool::initialize(
        PoolConfig::builder()
            .min_size(0)
            .max_size(2)
            .build()
            .unwrap(),
        factory,
    )
    .unwrap();

    let first = pool.acquire().unwrap();
    let first_id = first.id();
    drop(first);

    let second = pool.acquire().unwrap();
    assert_ne!(second.id(), first_id);
    drop(second);

    let stats = pool.stats();
    assert_eq!(stats.connections_created, 2);
    assert_eq!(stats.connections_closed, 1);
    pool.close();
}

#[test]
fn close_wakes_waiters_with_pool_closed() {
    let factory = MockFactory::new();
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
        .unwrap(),
    );

    let holder = pool.acquire().unwrap();

    let waiter_pool = Arc::clone(&pool);
    let waiter = thread::spawn(move || waiter_pool.acquire());

    thread::sleep(Duration::from_millis(100));
    pool.close();

    let result = waiter.join().unwrap();
    assert!(matches!(result, Err(PoolError::PoolClosed)));

    drop(holder);
}

#[test]
fn close_is_idempotent() {
    let factory = MockFactory::new();
    let pool = Pool::initialize(PoolConfig::default(), factory).unwrap();
    pool.close();
    pool.close();
}

#[test]
fn min_equals_max_never_grows_or_shrinks() {
    let factory = MockFactory::new();
    let telemetry = factory.telemetry();
    let pool = Pool::initialize(
        PoolConfig::builder()
            .min_size(3)
            .max_size(3)
            .build()
            .unwrap(),
        factory,
    )
    .unwrap();

    let conns: Vec<_> = (0..3).map(|_| pool.acquire().unwrap()).collect();
    drop(conns);

    assert_eq!(telemetry.connects(), 3);
    assert_eq!(pool.stats().total_connections, 3);
    pool.close();
}

#[test]
fn event_handlers_observe_creation_growth_and_close() {
    let factory = MockFactory::new();
    let pool = Pool::initialize(
        PoolConfig::builder()
            .min_size(0)
            .max_size(2)
            .build()
            .unwrap(),
        factory,
    )
    .unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    for event in [
        PoolEvent::ConnectionCreated,
        PoolEvent::PoolGrow,
        PoolEvent::ConnectionClosed,
    ] {
        let seen = Arc::clone(&seen);
        pool.add_event_handler(event, move |e: PoolEvent, _conn: &MockConnection| {
            seen.lock().unwrap().push(e);
        });
    }

    let conn = pool.acquire().unwrap();
    drop(conn);
    pool.close();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.iter().filter(|e| **e == PoolEvent::ConnectionCreated).count(), 1);
    assert_eq!(seen.iter().filter(|e| **e == PoolEvent::PoolGrow).count(), 1);
    assert_eq!(seen.iter().filter(|e| **e == PoolEvent::ConnectionClosed).count(), 1);
}

#[test]
fn add_event_handler_works_on_an_already_shared_pool() {
    // `add_event_handler` must succeed even after `Clone` and after the
    // maintenance/shrink loops have their own `Arc` clone of the shared
    // state, not just on a freshly-initialized, not-yet-cloned handle.
    let factory = MockFactory::new();
    let pool = Pool::initialize(PoolConfig::default(), factory).unwrap();
    let pool2 = pool.clone();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = Arc::clone(&seen);
    pool2.add_event_handler(
        PoolEvent::ConnectionClosed,
        move |e: PoolEvent, _conn: &MockConnection| {
            seen_clone.lock().unwrap().push(e);
        },
    );

    pool.close();
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[test]
fn zero_connection_timeout_succeeds_immediately_when_not_saturated() {
    let factory = MockFactory::new();
    let pool = Pool::initialize(
        PoolConfig::builder()
            .min_size(1)
            .max_size(1)
            .connection_timeout(Duration::ZERO)
            .build()
            .unwrap(),
        factory,
    )
    .unwrap();

    pool.acquire().unwrap();
    pool.close();
}

#[test]
fn zero_connection_timeout_fails_fast_without_suspending() {
    let factory = MockFactory::new();
    let pool = Pool::initialize(
        PoolConfig::builder()
            .min_size(0)
            .max_size(1)
            .connection_timeout(Duration::ZERO)
            .build()
            .unwrap(),
        factory,
    )
    .unwrap();

    let _held = pool.acquire().unwrap();

    let started = std::time::Instant::now();
    let result = pool.acquire();
    assert!(matches!(result, Err(PoolError::AcquireTimeout)));
    assert!(started.elapsed() < Duration::from_millis(100));
    assert_eq!(pool.stats().acquire_timeouts, 1);
    pool.close();
}
