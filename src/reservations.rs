//! Reservation management: table <-> badge assignment and release.
//!
//! Validation happens client-side first (fast path for the operator), but
//! the store's unique constraint on `table_number` is the final arbiter —
//! two terminals racing for the same table will have exactly one insert
//! succeed and the other surface `TableTaken`.

use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use crate::blacklist;
use crate::error::Error;
use crate::models::{Reservation, TableHistoryRecord, TOTAL_TABLES};
use crate::store::{self, Query, Resource, Store, StoreError};

/// Reject table numbers outside `1..=208`.
pub(crate) fn validate_table_number(table_number: i64) -> Result<(), Error> {
    if (1..=TOTAL_TABLES).contains(&table_number) {
        Ok(())
    } else {
        Err(Error::OutOfRange(table_number))
    }
}

/// Trim the badge and reject blank input. The trimmed value is what gets
/// stored and compared everywhere.
pub(crate) fn validate_badge(badge_number: &str) -> Result<&str, Error> {
    let badge = badge_number.trim();
    if badge.is_empty() {
        Err(Error::EmptyBadge)
    } else {
        Ok(badge)
    }
}

/// Live reservation held by a badge, if any.
pub async fn find_by_badge<S: Store + ?Sized>(
    store: &S,
    badge_number: &str,
) -> Result<Option<Reservation>, Error> {
    let rows = store
        .select(
            Resource::Reservations,
            Query::new().eq("badge_number", badge_number),
        )
        .await?;
    let mut reservations: Vec<Reservation> = store::decode_rows(rows)?;
    Ok(if reservations.is_empty() {
        None
    } else {
        Some(reservations.remove(0))
    })
}

/// Register a badge at a table.
///
/// Order of checks: range, badge shape, blacklist, existing assignment for
/// the badge, then the insert itself. A uniqueness violation from the store
/// means another terminal won the table in the meantime.
pub async fn reserve<S: Store + ?Sized>(
    store: &S,
    table_number: i64,
    badge_number: &str,
) -> Result<Reservation, Error> {
    validate_table_number(table_number)?;
    let badge = validate_badge(badge_number)?;

    if let Some(comment) = blacklist::is_banned(store, badge).await? {
        return Err(Error::Blacklisted { comment });
    }

    if let Some(existing) = find_by_badge(store, badge).await? {
        return Err(Error::BadgeAlreadyAssigned(existing.table_number));
    }

    let row = json!({ "table_number": table_number, "badge_number": badge });
    let created = match store.insert(Resource::Reservations, row).await {
        Ok(created) => created,
        Err(StoreError::Conflict { column }) => {
            info!(table_number, column, "lost the race for the table");
            return Err(Error::TableTaken);
        }
        Err(e) => return Err(e.into()),
    };

    let reservation: Reservation = store::decode_row(created)?;
    info!(
        table_number = reservation.table_number,
        badge = %reservation.badge_number,
        "table reserved"
    );
    Ok(reservation)
}

/// Release a table: archive the reservation to history, then delete it.
///
/// Archive-then-delete ordering is mandatory. If the archive write fails the
/// reservation stays intact and the table stays occupied; if the delete
/// fails after a successful archive the error is surfaced distinctly, since
/// a blind retry would write a second history row.
pub async fn release<S: Store + ?Sized>(
    store: &S,
    reservation: &Reservation,
) -> Result<(), Error> {
    let archive = json!({
        "table_number": reservation.table_number,
        "badge_number": reservation.badge_number,
        "started_at": reservation.created_at,
        "completed_at": Utc::now(),
    });
    if let Err(e) = store.insert(Resource::TableHistory, archive).await {
        warn!(
            reservation_id = %reservation.id,
            error = %e,
            "history write failed; reservation left intact"
        );
        return Err(Error::ArchiveFailed(e));
    }

    if let Err(e) = store
        .delete_by_id(Resource::Reservations, reservation.id)
        .await
    {
        warn!(
            reservation_id = %reservation.id,
            error = %e,
            "reservation archived but delete failed; a retry would duplicate history"
        );
        return Err(Error::DeleteFailed(e));
    }

    info!(table_number = reservation.table_number, "table released");
    Ok(())
}

/// All active reservations, ordered by table number ascending.
pub async fn active<S: Store + ?Sized>(store: &S) -> Result<Vec<Reservation>, Error> {
    let rows = store
        .select(
            Resource::Reservations,
            Query::new().order_asc("table_number"),
        )
        .await?;
    Ok(store::decode_rows(rows)?)
}

/// Archived reservations, most recently completed first.
pub async fn history<S: Store + ?Sized>(store: &S) -> Result<Vec<TableHistoryRecord>, Error> {
    let rows = store
        .select(
            Resource::TableHistory,
            Query::new().order_desc("completed_at"),
        )
        .await?;
    Ok(store::decode_rows(rows)?)
}
