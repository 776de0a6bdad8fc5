//! `PostgreSQL` durable store for raffle ticket reservations.
//!
//! [`PostgresStore`] implements the three store traits from `raffle-core`:
//!
//! - [`OfferingCatalog`](raffle_core::OfferingCatalog): read access to offerings
//! - [`ReservationStore`](raffle_core::ReservationStore): reservations, guarded
//!   claims, and the confirmation transaction that issues tickets
//! - [`PromotionStore`](raffle_core::PromotionStore): promotion codes and their
//!   usage audit
//!
//! Every status transition is a conditional `UPDATE ... WHERE status =
//! 'pending'`, so of several concurrent claimers exactly one sees a row come
//! back. Confirmation, ticket numbering, and promotion resolution commit in
//! one transaction.
//!
//! # Example
//!
//! ```no_run
//! use raffle_postgres::PostgresStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = PostgresStore::connect("postgres://localhost/raffle", 10).await?;
//! store.migrate().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod catalog;
mod promotions;
mod reservations;
mod rows;

use raffle_core::{ReservationError, Result};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// `PostgreSQL`-backed durable store.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Clone, Debug)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Wrap an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool of at most `max_connections` to `database_url`.
    ///
    /// # Errors
    ///
    /// Returns `Store` if the database cannot be reached.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| ReservationError::Store(format!("Failed to connect to database: {e}")))?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    ///
    /// # Errors
    ///
    /// Returns `Store` if migrations fail.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| ReservationError::Store(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}
