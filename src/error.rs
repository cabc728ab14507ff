//! Crate error taxonomy.
//!
//! Validation errors are caught before any store call; conflict errors come
//! from the store's uniqueness constraints and are never retried
//! automatically — the right recovery is telling staff, since the condition
//! is usually a legitimate double-booking. Display strings are the messages
//! shown to staff verbatim.

use thiserror::Error;

use crate::models::TOTAL_TABLES;
use crate::store::StoreError;

/// Error returned by reservation, blacklist, and pallet order operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Table number outside `1..=208`.
    #[error("table number {0} must be between 1 and {max}", max = TOTAL_TABLES)]
    OutOfRange(i64),

    /// Badge number blank after trimming.
    #[error("badge number must not be empty")]
    EmptyBadge,

    /// The badge is on the blacklist; carries the entry's comment verbatim.
    #[error("badge is blacklisted: {comment}")]
    Blacklisted { comment: String },

    /// The badge already holds a live reservation. Release that table first;
    /// there is no implicit transfer.
    #[error("badge is already assigned to table {0}; release that table first")]
    BadgeAlreadyAssigned(i64),

    /// Another terminal reserved the table between our read and write.
    #[error("table is already taken")]
    TableTaken,

    /// The badge is already on the blacklist.
    #[error("badge is already blacklisted")]
    DuplicateBadge,

    /// No live reservation matches the (table, badge) pair.
    #[error("register at the table first")]
    NotReserved,

    /// The table already has a pending pallet order.
    #[error("table already has a pending pallet order")]
    DuplicateActiveOrder,

    /// The id no longer exists in the store.
    #[error("record not found")]
    NotFound,

    /// History write failed during release. The reservation is left intact
    /// and the table is still considered occupied.
    #[error("failed to archive reservation: {0}")]
    ArchiveFailed(#[source] StoreError),

    /// The reservation was archived but the delete failed. Surfaced
    /// distinctly because a blind retry would duplicate the history row.
    #[error("reservation archived but could not be removed: {0}")]
    DeleteFailed(#[source] StoreError),

    /// Transport, permission, or decode failure from the store.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Coarse classification used by callers to decide how to present a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input shape or a failed precondition; resolved at the call site.
    Validation,
    /// Store uniqueness violation; the store constraint is authoritative.
    Conflict,
    /// The target row vanished between read and write.
    NotFound,
    /// Transport or store-side failure; logged and surfaced generically.
    Store,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::OutOfRange(_)
            | Error::EmptyBadge
            | Error::Blacklisted { .. }
            | Error::BadgeAlreadyAssigned(_)
            | Error::NotReserved => ErrorKind::Validation,
            Error::TableTaken | Error::DuplicateBadge | Error::DuplicateActiveOrder => {
                ErrorKind::Conflict
            }
            Error::NotFound => ErrorKind::NotFound,
            Error::ArchiveFailed(_) | Error::DeleteFailed(_) | Error::Store(_) => ErrorKind::Store,
        }
    }
}
