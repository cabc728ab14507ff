//! Blacklist guard: the deny-list of badge numbers.
//!
//! Consulted before every new reservation. Banning a badge cascades into
//! removing its live reservation; the cascade is best-effort because the
//! ban itself has already landed — an occupied table with a banned badge is
//! reconciled by staff.

use serde_json::json;
use tracing::{info, warn};

use crate::error::Error;
use crate::models::BlacklistEntry;
use crate::reservations::validate_badge;
use crate::store::{self, Filter, Query, Resource, Store, StoreError};

/// Add a badge to the blacklist and drop its live reservation, if any.
pub async fn ban<S: Store + ?Sized>(
    store: &S,
    badge_number: &str,
    comment: &str,
) -> Result<BlacklistEntry, Error> {
    let badge = validate_badge(badge_number)?;

    let row = json!({ "badge_number": badge, "comment": comment.trim() });
    let created = match store.insert(Resource::Blacklist, row).await {
        Ok(created) => created,
        Err(StoreError::Conflict { .. }) => return Err(Error::DuplicateBadge),
        Err(e) => return Err(e.into()),
    };
    let entry: BlacklistEntry = store::decode_row(created)?;
    info!(badge = %entry.badge_number, "badge blacklisted");

    // Cascade: the ban succeeded, so a failure here is logged, not fatal.
    if let Err(e) = store
        .delete_by_filter(Resource::Reservations, &[Filter::eq("badge_number", badge)])
        .await
    {
        warn!(badge, error = %e, "could not remove the banned badge's reservation");
    }

    Ok(entry)
}

/// Remove an entry by id, re-admitting the badge.
pub async fn unban<S: Store + ?Sized>(store: &S, id: uuid::Uuid) -> Result<(), Error> {
    store.delete_by_id(Resource::Blacklist, id).await?;
    info!(%id, "blacklist entry removed");
    Ok(())
}

/// Comment of the entry listing this badge, or `None` when the badge is
/// admitted.
pub async fn is_banned<S: Store + ?Sized>(
    store: &S,
    badge_number: &str,
) -> Result<Option<String>, Error> {
    let rows = store
        .select(
            Resource::Blacklist,
            Query::new().eq("badge_number", badge_number),
        )
        .await?;
    let mut entries: Vec<BlacklistEntry> = store::decode_rows(rows)?;
    Ok(if entries.is_empty() {
        None
    } else {
        Some(entries.remove(0).comment)
    })
}

/// All entries, most recently added first.
pub async fn entries<S: Store + ?Sized>(store: &S) -> Result<Vec<BlacklistEntry>, Error> {
    let rows = store
        .select(Resource::Blacklist, Query::new().order_desc("created_at"))
        .await?;
    Ok(store::decode_rows(rows)?)
}
