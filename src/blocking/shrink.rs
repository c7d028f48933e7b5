//! The blocking engine's shrink loop (spec §4.4): reduces surplus idle
//! capacity back toward `max_idle`, without shrinking below
//! `min_size - |in-use|` (the conservative floor adopted per spec §9's
//! flagged open question).

use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::thread::{self, JoinHandle};

use super::connection::ConnectionFactory;
use super::pool::{retire, Shared};
use crate::event::PoolEvent;
use crate::lifecycle::is_idle_expired;

pub(super) fn spawn<F: ConnectionFactory>(shared: std::sync::Arc<Shared<F>>) -> JoinHandle<()> {
    thread::Builder::new()
        .name("pool-shrink".into())
        .spawn(move || loop {
            {
                let guard = shared.wake_lock.lock().unwrap();
                let _ = shared
                    .wake
                    .wait_timeout(guard, shared.config.shrink_interval)
                    .unwrap();
            }
            if shared.stop.load(Ordering::SeqCst) {
                break;
            }
            run_once(&shared);
        })
        .expect("failed to spawn pool-shrink thread")
}

fn run_once<F: ConnectionFactory>(shared: &Shared<F>) {
    let retiring = shared.with_idle_scan(|scan| {
        let floor = shared
            .config
            .min_size
            .saturating_sub(scan.in_use_count as u32);
        let target = floor.max(shared.config.max_idle) as usize;

        let mut retiring = Vec::new();

        // Surplus removal, coldest (front) first.
        while scan.idle.len() > target {
            let Some(slot) = scan.idle.pop_front() else {
                break;
            };
            scan.all.remove(&slot.id());
            retiring.push((slot, Some(PoolEvent::PoolShrink)));
        }

        // Belt-and-suspenders idle-timeout sweep over what remains.
        let mut keep = VecDeque::with_capacity(scan.idle.len());
        while let Some(slot) = scan.idle.pop_front() {
            if is_idle_expired(slot.since(), shared.config.idle_timeout) {
                scan.all.remove(&slot.id());
                retiring.push((slot, None));
            } else {
                keep.push_back(slot);
            }
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
