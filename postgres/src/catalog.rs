//! Offerings and promotion codes.
//!
//! Both are owned by the catalog service. The upserts exist for catalog sync
//! jobs and test fixtures; the reservation core only reads.

use crate::PostgresStore;
use crate::rows::{self, store_error, to_cents, to_int};
use chrono::{DateTime, Utc};
use raffle_core::{Offering, OfferingCatalog, OfferingId, Promotion, Result};

impl PostgresStore {
    /// Insert or replace an offering.
    ///
    /// # Errors
    ///
    /// Returns `Store` if the write fails.
    pub async fn upsert_offering(&self, offering: &Offering) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO offerings (
                id, title, total_tickets, ticket_price_cents, max_tickets_per_user,
                max_participants, opens_at, closes_at, status
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO UPDATE SET
                title = EXCLUDED.title,
                total_tickets = EXCLUDED.total_tickets,
                ticket_price_cents = EXCLUDED.ticket_price_cents,
                max_tickets_per_user = EXCLUDED.max_tickets_per_user,
                max_participants = EXCLUDED.max_participants,
                opens_at = EXCLUDED.opens_at,
                closes_at = EXCLUDED.closes_at,
                status = EXCLUDED.status
            ",
        )
        .bind(offering.id.as_uuid())
        .bind(&offering.title)
        .bind(to_int(offering.total_tickets)?)
        .bind(to_cents(offering.ticket_price)?)
        .bind(offering.max_tickets_per_user.map(to_int).transpose()?)
        .bind(offering.max_participants.map(to_int).transpose()?)
        .bind(offering.opens_at)
        .bind(offering.closes_at)
        .bind(offering.status.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| store_error("Failed to upsert offering", &e))?;
        Ok(())
    }

    /// Insert or replace a promotion. The code is stored normalized.
    ///
    /// # Errors
    ///
    /// Returns `Store` if the write fails.
    pub async fn upsert_promotion(&self, promotion: &Promotion) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO promotions (
                code, active, starts_at, ends_at, per_user_limit, usage_limit,
                min_purchase_cents, applicable_offerings
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (code) DO UPDATE SET
                active = EXCLUDED.active,
                starts_at = EXCLUDED.starts_at,
                ends_at = EXCLUDED.ends_at,
                per_user_limit = EXCLUDED.per_user_limit,
                usage_limit = EXCLUDED.usage_limit,
                min_purchase_cents = EXCLUDED.min_purchase_cents,
                applicable_offerings = EXCLUDED.applicable_offerings
            ",
        )
        .bind(Promotion::normalize_code(&promotion.code))
        .bind(promotion.active)
        .bind(promotion.starts_at)
        .bind(promotion.ends_at)
        .bind(to_int(promotion.per_user_limit)?)
        .bind(promotion.usage_limit.map(to_int).transpose()?)
        .bind(promotion.min_purchase.map(to_cents).transpose()?)
        .bind(
            promotion
                .applicable_offerings
                .iter()
                .map(|id| *id.as_uuid())
                .collect::<Vec<_>>(),
        )
        .execute(&self.pool)
        .await
        .map_err(|e| store_error("Failed to upsert promotion", &e))?;
        Ok(())
    }
}

impl OfferingCatalog for PostgresStore {
    async fn get_offering(&self, offering_id: OfferingId) -> Result<Option<Offering>> {
        sqlx::query("SELECT * FROM offerings WHERE id = $1")
            .bind(offering_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| store_error("Failed to get offering", &e))?
            .as_ref()
            .map(rows::offering)
            .transpose()
    }

    async fn open_offerings(&self, now: DateTime<Utc>) -> Result<Vec<Offering>> {
        sqlx::query(
            r"
            SELECT * FROM offerings
            WHERE status = 'active'
              AND (opens_at IS NULL OR opens_at <= $1)
              AND closes_at > $1
            ORDER BY closes_at
            ",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| store_error("Failed to list open offerings", &e))?
        .iter()
        .map(rows::offering)
        .collect()
    }
}
