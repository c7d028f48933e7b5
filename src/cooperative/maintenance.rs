//! The cooperative engine's maintenance task (spec §4.3): periodically
//! expires stale-idle connections and those past `max_lifetime`. Mutates the
//! idle set only, never `in_use` (spec §4.3, §4.7).

use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::task::JoinHandle;

use super::pool::{retire, Shared};
use crate::connection::ConnectionFactory;
use crate::event::PoolEvent;
use crate::lifecycle::{is_idle_expired, is_past_lifetime};

pub(super) fn spawn<F: ConnectionFactory>(shared: Arc<Shared<F>>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(shared.config.health_check_interval) => {}
                _ = shared.shutdown.notified() => break,
            }
            if shared.stop.load(Ordering::SeqCst) {
                break;
            }
            run_once(&shared).await;
        }
    })
}

/// Spec §4.1 `HealthCheck`: the same scan, callable directly and repeatedly.
pub(super) async fn run_once<F: ConnectionFactory>(shared: &Shared<F>) {
    let retiring = shared
        .with_idle_scan(|scan| {
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
        })
        .await;

    let Some(retiring) = retiring else { return };
    for (slot, event) in retiring {
        let id = slot.id();
        retire(shared, id, slot.into_conn(), event).await;
    }
}
