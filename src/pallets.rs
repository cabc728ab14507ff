//! Pallet order lifecycle: creation, the pending queue, completion, and the
//! loader acknowledgment countdown.
//!
//! Each order moves `pending -> completed`, one-way, with no cancellation
//! state. Orders can only be created for a (table, badge) pair that holds a
//! live reservation. The duplicate-pending check is a query before the
//! insert and is inherently racy across terminals; where the store carries
//! its own constraint the conflict error is mapped to the same failure,
//! otherwise the benign duplicate risk is a known limitation.

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::Error;
use crate::models::{OrderStatus, PalletOrder};
use crate::reservations::{validate_badge, validate_table_number};
use crate::store::{self, Query, Resource, Store, StoreError};

/// Create a delivery order for an occupied table.
pub async fn create_order<S: Store + ?Sized>(
    store: &S,
    table_number: i64,
    badge_number: &str,
) -> Result<PalletOrder, Error> {
    validate_table_number(table_number)?;
    let badge = validate_badge(badge_number)?;

    // The pair must match a live reservation exactly.
    let reserved = store
        .select(
            Resource::Reservations,
            Query::new()
                .eq("table_number", table_number)
                .eq("badge_number", badge),
        )
        .await?;
    if reserved.is_empty() {
        return Err(Error::NotReserved);
    }

    let pending = store
        .select(
            Resource::PalletOrders,
            Query::new()
                .eq("table_number", table_number)
                .eq("status", "pending"),
        )
        .await?;
    if !pending.is_empty() {
        return Err(Error::DuplicateActiveOrder);
    }

    let row = json!({
        "table_number": table_number,
        "badge_number": badge,
        "status": OrderStatus::Pending,
    });
    let created = match store.insert(Resource::PalletOrders, row).await {
        Ok(created) => created,
        Err(StoreError::Conflict { .. }) => return Err(Error::DuplicateActiveOrder),
        Err(e) => return Err(e.into()),
    };

    let order: PalletOrder = store::decode_row(created)?;
    info!(table_number = order.table_number, order_id = %order.id, "pallet order created");
    Ok(order)
}

/// Mark an order completed, stamping `completed_at`.
///
/// One-way on `status`; calling this on an already-completed order keeps it
/// completed and re-stamps `completed_at` (at-least-once semantics kept
/// from the observed product behavior).
pub async fn complete_order<S: Store + ?Sized>(
    store: &S,
    order_id: Uuid,
) -> Result<PalletOrder, Error> {
    let patch = json!({
        "status": OrderStatus::Completed,
        "completed_at": Utc::now(),
    });
    let updated = match store
        .update_by_id(Resource::PalletOrders, order_id, patch)
        .await
    {
        Ok(updated) => updated,
        Err(StoreError::NotFound) => return Err(Error::NotFound),
        Err(e) => return Err(e.into()),
    };

    let order: PalletOrder = store::decode_row(updated)?;
    info!(table_number = order.table_number, order_id = %order.id, "pallet order completed");
    Ok(order)
}

/// Pending orders, oldest first. Loaders always act on the head of this
/// queue.
pub async fn pending_orders<S: Store + ?Sized>(store: &S) -> Result<Vec<PalletOrder>, Error> {
    let rows = store
        .select(
            Resource::PalletOrders,
            Query::new().eq("status", "pending").order_asc("created_at"),
        )
        .await?;
    Ok(store::decode_rows(rows)?)
}

/// Head of the pending queue.
pub fn next_pending(orders: &[PalletOrder]) -> Option<&PalletOrder> {
    orders.first()
}

/// Completed orders, most recently completed first, optionally limited
/// (the loader view shows the last 10).
pub async fn completed_orders<S: Store + ?Sized>(
    store: &S,
    limit: Option<usize>,
) -> Result<Vec<PalletOrder>, Error> {
    let mut query = Query::new()
        .eq("status", "completed")
        .order_desc("completed_at");
    if let Some(limit) = limit {
        query = query.limit(limit);
    }
    let rows = store.select(Resource::PalletOrders, query).await?;
    Ok(store::decode_rows(rows)?)
}

// ---------------------------------------------------------------------------
// Loader acknowledgment
// ---------------------------------------------------------------------------

/// Seconds between acknowledging an order and committing its completion.
/// The delay exists so the loader can visually confirm the table number;
/// it is not a lifecycle invariant.
pub const ACK_COUNTDOWN_SECS: u8 = 3;

/// Observable state of the acknowledgment countdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckState {
    Idle,
    Counting { order_id: Uuid, remaining: u8 },
    /// The countdown elapsed and completion was attempted. Not a completion
    /// confirmation: if the completion write failed, the failure is logged
    /// and the order stays pending until the next refresh shows it again.
    Fired { order_id: Uuid },
}

/// Acknowledgment countdown owned by the loader-facing component.
///
/// `begin_acknowledge` starts a fixed 3-second countdown, ticking once per
/// second on the watch channel, and calls [`complete_order`] on expiry.
/// There is no cancel path once counting — completion is inevitable after
/// the countdown (product behavior). Dropping the acknowledger aborts the
/// timer task, so view teardown never leaks it.
pub struct Acknowledger<S: Store + ?Sized> {
    store: Arc<S>,
    state: watch::Sender<AckState>,
    task: Option<JoinHandle<()>>,
}

impl<S: Store + ?Sized + 'static> Acknowledger<S> {
    pub fn new(store: Arc<S>) -> Self {
        let (state, _) = watch::channel(AckState::Idle);
        Self {
            store,
            state,
            task: None,
        }
    }

    /// Watch the countdown (remaining seconds, then `Fired`).
    pub fn state(&self) -> watch::Receiver<AckState> {
        self.state.subscribe()
    }

    /// Start the countdown for an order. Ignored while one is already
    /// running.
    pub fn begin_acknowledge(&mut self, order_id: Uuid) {
        if matches!(*self.state.borrow(), AckState::Counting { .. }) {
            debug!(%order_id, "acknowledge ignored while a countdown is running");
            return;
        }

        self.state.send_replace(AckState::Counting {
            order_id,
            remaining: ACK_COUNTDOWN_SECS,
        });

        let store = Arc::clone(&self.store);
        let state = self.state.clone();
        self.task = Some(tokio::spawn(async move {
            let mut remaining = ACK_COUNTDOWN_SECS;
            while remaining > 0 {
                tokio::time::sleep(Duration::from_secs(1)).await;
                remaining -= 1;
                if remaining > 0 {
                    state.send_replace(AckState::Counting {
                        order_id,
                        remaining,
                    });
                }
            }

            // Countdown elapsed; completion is committed from here.
            if let Err(e) = complete_order(&*store, order_id).await {
                warn!(%order_id, error = %e, "acknowledged order could not be completed");
            }
            state.send_replace(AckState::Fired { order_id });
        }));
    }
}

impl<S: Store + ?Sized> Drop for Acknowledger<S> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
