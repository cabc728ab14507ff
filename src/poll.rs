//! Fixed-cadence refresh loops.
//!
//! Polling is the only mechanism propagating other terminals' writes, so
//! every view re-pulls its slice of the store every two seconds and
//! staleness up to one interval is expected. Each loop publishes snapshots
//! on a watch channel; a fetch failure keeps the previous snapshot and the
//! next tick is the retry. Dropping the handle aborts the task.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::warn;

use crate::error::Error;
use crate::models::{BlacklistEntry, PalletOrder, Reservation, TableHistoryRecord};
use crate::store::Store;
use crate::{blacklist, pallets, reservations};

/// Cadence shared by every view.
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(2);

/// Handle to a running refresh loop. The snapshot is replaced in place on
/// every successful fetch; dropping the handle stops the loop.
pub struct RefreshHandle<T> {
    rx: watch::Receiver<Vec<T>>,
    task: JoinHandle<()>,
}

impl<T: Clone> RefreshHandle<T> {
    /// Latest snapshot (empty until the first fetch lands).
    pub fn snapshot(&self) -> Vec<T> {
        self.rx.borrow().clone()
    }

    /// Subscribe to snapshot updates.
    pub fn subscribe(&self) -> watch::Receiver<Vec<T>> {
        self.rx.clone()
    }
}

impl<T> Drop for RefreshHandle<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn spawn_refresh<S, T, F, Fut>(
    store: Arc<S>,
    interval: Duration,
    view: &'static str,
    fetch: F,
) -> RefreshHandle<T>
where
    S: Store + ?Sized + 'static,
    T: Clone + Send + Sync + 'static,
    F: Fn(Arc<S>) -> Fut + Send + 'static,
    Fut: Future<Output = Result<Vec<T>, Error>> + Send,
{
    let (tx, rx) = watch::channel(Vec::new());
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match fetch(Arc::clone(&store)).await {
                Ok(rows) => {
                    if tx.send(rows).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(view, error = %e, "refresh failed; keeping the previous snapshot");
                }
            }
        }
    });
    RefreshHandle { rx, task }
}

/// Active reservations, ordered by table number.
pub fn watch_reservations<S: Store + ?Sized + 'static>(
    store: Arc<S>,
) -> RefreshHandle<Reservation> {
    spawn_refresh(store, REFRESH_INTERVAL, "reservations", |s| async move {
        reservations::active(&*s).await
    })
}

/// Pending pallet orders, oldest first.
pub fn watch_pending_orders<S: Store + ?Sized + 'static>(
    store: Arc<S>,
) -> RefreshHandle<PalletOrder> {
    spawn_refresh(store, REFRESH_INTERVAL, "pending_orders", |s| async move {
        pallets::pending_orders(&*s).await
    })
}

/// Blacklist entries, newest first.
pub fn watch_blacklist<S: Store + ?Sized + 'static>(
    store: Arc<S>,
) -> RefreshHandle<BlacklistEntry> {
    spawn_refresh(store, REFRESH_INTERVAL, "blacklist", |s| async move {
        blacklist::entries(&*s).await
    })
}

/// Table history, most recently completed first.
pub fn watch_history<S: Store + ?Sized + 'static>(
    store: Arc<S>,
) -> RefreshHandle<TableHistoryRecord> {
    spawn_refresh(store, REFRESH_INTERVAL, "history", |s| async move {
        reservations::history(&*s).await
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::mem::MemStore;

    #[tokio::test]
    async fn publishes_fresh_snapshots_every_tick() {
        let store = Arc::new(MemStore::new());
        reservations::reserve(&*store, 5, "A1").await.expect("reserve");

        let handle = spawn_refresh(
            Arc::clone(&store),
            Duration::from_millis(10),
            "test",
            |s| async move { reservations::active(&*s).await },
        );
        let mut rx = handle.subscribe();

        // First tick fires immediately.
        tokio::time::timeout(Duration::from_secs(1), rx.changed())
            .await
            .expect("first snapshot in time")
            .expect("sender alive");
        assert_eq!(rx.borrow().len(), 1);

        // A write from "another terminal" shows up within a tick or two.
        reservations::reserve(&*store, 6, "B2").await.expect("reserve");
        tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                rx.changed().await.expect("sender alive");
                if rx.borrow().len() == 2 {
                    break;
                }
            }
        })
        .await
        .expect("second snapshot in time");
    }

    #[tokio::test(start_paused = true)]
    async fn view_loops_track_the_pending_queue() {
        let store = Arc::new(MemStore::new());
        reservations::reserve(&*store, 5, "A1").await.expect("reserve");
        let order = pallets::create_order(&*store, 5, "A1")
            .await
            .expect("order");

        let handle = watch_pending_orders(Arc::clone(&store));
        let mut rx = handle.subscribe();
        rx.changed().await.expect("first snapshot");
        assert_eq!(handle.snapshot().len(), 1);

        pallets::complete_order(&*store, order.id)
            .await
            .expect("complete");
        loop {
            rx.changed().await.expect("sender alive");
            if rx.borrow().is_empty() {
                break;
            }
        }
    }

    #[tokio::test]
    async fn dropping_the_handle_stops_the_loop() {
        let store = Arc::new(MemStore::new());
        let handle = spawn_refresh(
            Arc::clone(&store),
            Duration::from_millis(10),
            "test",
            |s| async move { reservations::active(&*s).await },
        );
        let mut rx = handle.subscribe();
        drop(handle);

        // The sender goes away once the task is aborted.
        tokio::time::timeout(Duration::from_secs(1), async {
            while rx.changed().await.is_ok() {}
        })
        .await
        .expect("loop stopped");
    }
}
