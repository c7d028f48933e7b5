//! The blocking engine's maintenance loop (spec §4.3): a daemon thread that
//! periodically expires stale-idle connections and those past `max_lifetime`.
//! Mutates the idle set only, never `in_use` (spec §4.3, §4.7).

use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::thread::{self, JoinHandle};

use super::connection::ConnectionFactory;
use super::pool::{retire, Shared};
use crate::event::PoolEvent;
use crate::lifecycle::{is_idle_expired, is_past_lifetime};

pub(super) fn spawn<F: ConnectionFactory>(shared: std::sync::Arc<Shared<F>>) -> JoinHandle<()> {
    thread::Builder::new()
        .name("pool-maintenance".into())
        .spawn(move || loop {
            {
                let guard = shared.wake_lock.lock().unwrap();
                let _ = shared
                    .wake
                    .wait_timeout(guard, shared.config.health_check_interval)
                    .unwrap();
            }
            if shared.stop.load(Ordering::SeqCst) {
                break;
            }
            run_once(&shared);
        })
        .expect("failed to spawn pool-maintenance thread")
}

/// Spec §4.1 `HealthCheck`: the same scan, callable synchronously and
/// repeatedly (from the loop above, or directly by a caller).
pub(super) fn run_once<F: ConnectionFactory>(shared: &Shared<F>) {
    let retiring = shared.with_idle_scan(|scan| {
        let mut retiring = Vec::new();
        let mut keep = VecDeque::new();

        while let Some(slot) = scan.idle.pop_front() {
            let Some(created) = scan.all.get(&slot.id()).map(|m| m.created) else {
                continue;
            };

            if is_past_lifetime(created, shared.config.max_lifetime) {
                scan.all.remove(&slot.id());
                retiring.push((slot, None));
                continue;
            }

            if is_idle_expired(slot.since(), shared.config.idle_timeout) && !slot.conn().is_open()
            {
                scan.all.remove(&slot.id());
                retiring.push((slot, Some(PoolEvent::ConnectionInvalid)));
                continue;
            }

            keep.push_back(slot);
        }

        *scan.idle = keep;
        retiring
    });

    let Some(retiring) = retiring else { return };
    for (slot, event) in retiring {
        let id = slot.id();
        retire(shared, id, slot.into_conn(), event);
    }
}
