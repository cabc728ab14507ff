//! Record types for the four store collections.
//!
//! The store owns every entity; values of these types held by callers are
//! disposable snapshots refreshed by polling. Row identity and `created_at`
//! are assigned server-side.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Number of physical tables at the venue. Valid table numbers are
/// `1..=TOTAL_TABLES`.
pub const TOTAL_TABLES: i64 = 208;

/// An active table <-> badge assignment.
///
/// At most one active reservation per table (store unique constraint) and
/// at most one per badge (client-enforced).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Uuid,
    pub table_number: i64,
    pub badge_number: String,
    pub created_at: DateTime<Utc>,
}

/// A badge barred from new reservations. `badge_number` is unique across
/// entries (store constraint).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlacklistEntry {
    pub id: Uuid,
    pub badge_number: String,
    #[serde(default)]
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

/// Append-only archive row, written exactly once per released reservation.
/// Never mutated or deleted by this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableHistoryRecord {
    pub id: Uuid,
    pub table_number: i64,
    pub badge_number: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle state of a pallet order. `Pending -> Completed` is one-way;
/// no cancellation state exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Completed,
}

/// A pallet delivery request tied to an occupied table.
///
/// At most one pending order per table. `completed_at` stays `None` until
/// the order is completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PalletOrder {
    pub id: Uuid,
    pub table_number: i64,
    pub badge_number: String,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}
