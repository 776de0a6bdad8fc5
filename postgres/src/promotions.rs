use crate::PostgresStore;
use crate::rows::{self, store_error, to_cents};
use chrono::{DateTime, Utc};
use raffle_core::store::{PromotionStore, UsageOutcome};
use raffle_core::{
    Promotion, PromotionUsage, PromotionUsageStatus, ReservationError, ReservationId, Result,
};
use sqlx::Row;

impl PromotionStore for PostgresStore {
    async fn get_promotion(&self, code: &str) -> Result<Option<Promotion>> {
        sqlx::query("SELECT * FROM promotions WHERE code = $1")
            .bind(code)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| store_error("Failed to get promotion", &e))?
            .as_ref()
            .map(rows::promotion)
            .transpose()
    }

    async fn record_usage(
        &self,
        promotion: &Promotion,
        usage: &PromotionUsage,
    ) -> Result<UsageOutcome> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| store_error("Failed to start transaction", &e))?;

        // Holding the reservation row makes claims and confirmation wait for
        // this usage, so they always settle it.
        let checkout = sqlx::query("SELECT * FROM reservations WHERE id = $1 FOR UPDATE")
            .bind(usage.transaction_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| store_error("Failed to lock reservation", &e))?
            .as_ref()
            .map(rows::reservation)
            .transpose()?
            .filter(|r| r.user_id == usage.user_id);
        if !checkout.as_ref().is_some_and(|r| r.is_live(usage.created_at)) {
            return Ok(UsageOutcome::CheckoutClosed(checkout));
        }

        // The promotion row lock serializes limit checks for one code.
        let locked = sqlx::query("SELECT code FROM promotions WHERE code = $1 FOR UPDATE")
            .bind(&usage.code)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| store_error("Failed to lock promotion", &e))?;
        if locked.is_none() {
            return Err(ReservationError::PromotionNotFound(usage.code.clone()));
        }

        let existing = sqlx::query(
            r"
            SELECT * FROM promotion_usages
            WHERE code = $1 AND transaction_id = $2 AND status <> 'reversed'
            ",
        )
        .bind(&usage.code)
        .bind(usage.transaction_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| store_error("Failed to look up promotion usage", &e))?;
        if let Some(row) = existing {
            return Ok(UsageOutcome::Existing(rows::promotion_usage(&row)?));
        }

        let counts = sqlx::query(
            r"
            SELECT COUNT(*) FILTER (WHERE user_id = $2) AS by_user, COUNT(*) AS overall
            FROM promotion_usages
            WHERE code = $1 AND status <> 'reversed'
            ",
        )
        .bind(&usage.code)
        .bind(usage.user_id.as_uuid())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| store_error("Failed to count promotion usages", &e))?;
        let by_user: i64 = counts
            .try_get("by_user")
            .map_err(|e| store_error("Failed to decode by_user", &e))?;
        let overall: i64 = counts
            .try_get("overall")
            .map_err(|e| store_error("Failed to decode overall", &e))?;

        if by_user >= i64::from(promotion.per_user_limit) {
            return Ok(UsageOutcome::UserLimitReached);
        }
        if promotion
            .usage_limit
            .is_some_and(|limit| overall >= i64::from(limit))
        {
            return Ok(UsageOutcome::UsageLimitReached);
        }

        sqlx::query(
            r"
            INSERT INTO promotion_usages (
                id, transaction_id, user_id, code, discount_cents, status, created_at, settled_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ",
        )
        .bind(usage.id.as_uuid())
        .bind(usage.transaction_id.as_uuid())
        .bind(usage.user_id.as_uuid())
        .bind(&usage.code)
        .bind(to_cents(usage.discount)?)
        .bind(usage.status.as_str())
        .bind(usage.created_at)
        .bind(usage.settled_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| store_error("Failed to record promotion usage", &e))?;

        tx.commit()
            .await
            .map_err(|e| store_error("Failed to commit promotion usage", &e))?;
        Ok(UsageOutcome::Recorded(usage.clone()))
    }

    async fn settle_usages(
        &self,
        transaction_id: ReservationId,
        to: PromotionUsageStatus,
        at: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query(
            r"
            UPDATE promotion_usages SET status = $2, settled_at = $3
            WHERE transaction_id = $1 AND status = 'pending'
            ",
        )
        .bind(transaction_id.as_uuid())
        .bind(to.as_str())
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(|e| store_error("Failed to settle promotion usages", &e))?;
        Ok(result.rows_affected())
    }

    async fn usages_for_transaction(
        &self,
        transaction_id: ReservationId,
    ) -> Result<Vec<PromotionUsage>> {
        sqlx::query(
            "SELECT * FROM promotion_usages WHERE transaction_id = $1 ORDER BY created_at, id",
        )
        .bind(transaction_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| store_error("Failed to load promotion usages", &e))?
        .iter()
        .map(rows::promotion_usage)
        .collect()
    }
}
