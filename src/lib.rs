//! Palletboard — table reservation and pallet delivery coordination core.
//!
//! Staff terminals register badge numbers against numbered tables (1..208),
//! maintain a blacklist, and route pallet delivery requests to loaders. The
//! crate is a thin client over a hosted Postgres store reached through its
//! REST layer; terminals see each other's writes through fixed two-second
//! polling, and the store's uniqueness constraints are the only true
//! serialization points between them.
//!
//! - [`reservations`] — table <-> badge assignment, release with
//!   archive-then-delete ordering
//! - [`blacklist`] — deny-list consulted before every reservation
//! - [`pallets`] — order lifecycle (`pending -> completed`) and the loader
//!   acknowledgment countdown
//! - [`poll`] — per-view refresh loops
//! - [`store`] — the store contract and the PostgREST client
//! - [`views`] — pure snapshot helpers for UI layers

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod blacklist;
pub mod config;
pub mod error;
pub mod models;
pub mod pallets;
pub mod poll;
pub mod reservations;
pub mod store;
pub mod views;

pub use config::StoreConfig;
pub use error::{Error, ErrorKind};
pub use models::{
    BlacklistEntry, OrderStatus, PalletOrder, Reservation, TableHistoryRecord, TOTAL_TABLES,
};
pub use store::{ConnectivityResult, RestStore, Store, StoreError};

/// Initialize console logging for binaries and examples. Respects
/// `RUST_LOG`; defaults to info with debug for this crate. Safe to call
/// more than once.
pub fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,palletboard=debug"));
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::mem::MemStore;

    /// The end-to-end floor scenario: reserve, race, ban with cascade,
    /// re-reserve, order, duplicate order, complete.
    #[tokio::test]
    async fn full_floor_scenario() {
        let store = MemStore::new();

        reservations::reserve(&store, 5, "A1")
            .await
            .expect("table 5 for A1");
        let err = reservations::reserve(&store, 5, "B2")
            .await
            .expect_err("table 5 is taken");
        assert!(matches!(err, Error::TableTaken));
        assert_eq!(err.kind(), ErrorKind::Conflict);

        // Banning A1 frees table 5.
        blacklist::ban(&store, "A1", "unpaid").await.expect("ban A1");
        assert!(reservations::active(&store)
            .await
            .expect("active")
            .is_empty());

        // And A1 cannot rebook anywhere.
        let err = reservations::reserve(&store, 6, "A1")
            .await
            .expect_err("A1 is banned");
        assert!(matches!(err, Error::Blacklisted { comment } if comment == "unpaid"));

        reservations::reserve(&store, 5, "C3")
            .await
            .expect("table 5 is free again");

        let order = pallets::create_order(&store, 5, "C3")
            .await
            .expect("pallet order");
        assert_eq!(order.status, OrderStatus::Pending);

        let err = pallets::create_order(&store, 5, "C3")
            .await
            .expect_err("one pending order per table");
        assert!(matches!(err, Error::DuplicateActiveOrder));

        let done = pallets::complete_order(&store, order.id)
            .await
            .expect("complete");
        assert_eq!(done.status, OrderStatus::Completed);
        assert!(done.completed_at.is_some());
    }
}
