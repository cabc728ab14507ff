//! Pure snapshot helpers for UI layers.
//!
//! Everything here works on polled snapshots and performs no I/O: the table
//! grid, the search filters, and the duration labels shown on the
//! management and history views.

use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::models::{PalletOrder, Reservation, TableHistoryRecord, TOTAL_TABLES};

/// Table numbers currently occupied.
pub fn occupied_tables(reservations: &[Reservation]) -> HashSet<i64> {
    reservations.iter().map(|r| r.table_number).collect()
}

/// One slot in the table grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSlot {
    pub number: i64,
    pub reserved: bool,
}

/// All 208 tables in order, flagged by occupancy.
pub fn table_grid(reservations: &[Reservation]) -> Vec<TableSlot> {
    let occupied = occupied_tables(reservations);
    (1..=TOTAL_TABLES)
        .map(|number| TableSlot {
            number,
            reserved: occupied.contains(&number),
        })
        .collect()
}

/// Case-insensitive search over active reservations by table number or
/// badge substring. A blank query matches everything.
pub fn search_reservations<'a>(
    reservations: &'a [Reservation],
    query: &str,
) -> Vec<&'a Reservation> {
    let query = query.trim().to_lowercase();
    reservations
        .iter()
        .filter(|r| {
            query.is_empty()
                || r.table_number.to_string().contains(&query)
                || r.badge_number.to_lowercase().contains(&query)
        })
        .collect()
}

/// Search archived reservations with independent table and badge queries;
/// a record must match both (blank queries match everything).
pub fn search_history<'a>(
    records: &'a [TableHistoryRecord],
    table_query: &str,
    badge_query: &str,
) -> Vec<&'a TableHistoryRecord> {
    let table_query = table_query.trim();
    let badge_query = badge_query.trim().to_lowercase();
    records
        .iter()
        .filter(|r| {
            let table_match =
                table_query.is_empty() || r.table_number.to_string().contains(table_query);
            let badge_match =
                badge_query.is_empty() || r.badge_number.to_lowercase().contains(&badge_query);
            table_match && badge_match
        })
        .collect()
}

/// Minute-resolution label for how long a table has been (or was) occupied:
/// `"45m"`, `"2h 5m"`.
pub fn format_elapsed(from: DateTime<Utc>, to: DateTime<Utc>) -> String {
    let minutes = (to - from).num_minutes().max(0);
    let hours = minutes / 60;
    let minutes = minutes % 60;
    if hours == 0 {
        format!("{minutes}m")
    } else {
        format!("{hours}h {minutes}m")
    }
}

/// Second-resolution label for how long a pallet order took: `"34s"`,
/// `"2m 10s"`, or `"-"` while the order is still pending.
pub fn format_execution(order: &PalletOrder) -> String {
    let Some(completed_at) = order.completed_at else {
        return "-".to_string();
    };
    let seconds = (completed_at - order.created_at).num_seconds().max(0);
    let minutes = seconds / 60;
    let seconds = seconds % 60;
    if minutes == 0 {
        format!("{seconds}s")
    } else {
        format!("{minutes}m {seconds}s")
    }
}
