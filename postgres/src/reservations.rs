//! Reservations, guarded claims, and ticket issuance.

use crate::PostgresStore;
use crate::rows::{self, store_error, to_cents, to_int};
use chrono::{DateTime, Utc};
use raffle_core::store::{Claim, ClaimGuard, ClaimOutcome, ConfirmOutcome, ReservationStore};
use raffle_core::{
    HoldSeed, InventorySeed, Offering, Page, PaymentTransactionId, PromotionUsageStatus,
    Reservation, ReservationError, ReservationId, ReservationQuery, ReservationStatus,
    ReservationToken, Result, Ticket, TicketId, TicketNumber, TicketStatus, UserId,
};
use sqlx::{PgConnection, Row};
use uuid::Uuid;

async fn load(conn: &mut PgConnection, reservation_id: ReservationId) -> Result<Option<Reservation>> {
    sqlx::query("SELECT * FROM reservations WHERE id = $1")
        .bind(reservation_id.as_uuid())
        .fetch_optional(conn)
        .await
        .map_err(|e| store_error("Failed to load reservation", &e))?
        .as_ref()
        .map(rows::reservation)
        .transpose()
}

fn row_count(value: i64) -> Result<u32> {
    u32::try_from(value).map_err(|_| ReservationError::Store(format!("Invalid count: {value}")))
}

impl ReservationStore for PostgresStore {
    async fn insert_reservation(&self, reservation: &Reservation) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO reservations (
                id, offering_id, user_id, quantity, unit_price_cents, total_price_cents,
                token, status, expires_at, created_at, updated_at, processed_at,
                payment_transaction_id, error_message
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ",
        )
        .bind(reservation.id.as_uuid())
        .bind(reservation.offering_id.as_uuid())
        .bind(reservation.user_id.as_uuid())
        .bind(to_int(reservation.quantity)?)
        .bind(to_cents(reservation.unit_price)?)
        .bind(to_cents(reservation.total_price)?)
        .bind(reservation.token.as_str())
        .bind(reservation.status.as_str())
        .bind(reservation.expires_at)
        .bind(reservation.created_at)
        .bind(reservation.updated_at)
        .bind(reservation.processed_at)
        .bind(reservation.payment_transaction_id.map(|id| *id.as_uuid()))
        .bind(reservation.error_message.as_deref())
        .execute(&self.pool)
        .await
        .map_err(|e| store_error("Failed to insert reservation", &e))?;
        Ok(())
    }

    async fn get_reservation(&self, reservation_id: ReservationId) -> Result<Option<Reservation>> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| store_error("Failed to acquire connection", &e))?;
        load(&mut *conn, reservation_id).await
    }

    async fn reservation_by_token(&self, token: &ReservationToken) -> Result<Option<Reservation>> {
        sqlx::query("SELECT * FROM reservations WHERE token = $1")
            .bind(token.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| store_error("Failed to load reservation by token", &e))?
            .as_ref()
            .map(rows::reservation)
            .transpose()
    }

    async fn list_user_reservations(
        &self,
        user_id: UserId,
        query: &ReservationQuery,
    ) -> Result<Page<Reservation>> {
        let (page, limit) = query.page_and_limit();
        let offset = i64::try_from(query.offset()).unwrap_or(i64::MAX);
        let status = query.status.map(|s| s.as_str());

        let total: i64 = sqlx::query_scalar(
            r"
            SELECT COUNT(*) FROM reservations
            WHERE user_id = $1 AND ($2::text IS NULL OR status = $2)
            ",
        )
        .bind(user_id.as_uuid())
        .bind(status)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| store_error("Failed to count reservations", &e))?;

        let items = sqlx::query(
            r"
            SELECT * FROM reservations
            WHERE user_id = $1 AND ($2::text IS NULL OR status = $2)
            ORDER BY created_at DESC, id DESC
            LIMIT $3 OFFSET $4
            ",
        )
        .bind(user_id.as_uuid())
        .bind(status)
        .bind(i64::from(limit))
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| store_error("Failed to list reservations", &e))?
        .iter()
        .map(rows::reservation)
        .collect::<Result<Vec<_>>>()?;

        Ok(Page {
            items,
            page,
            limit,
            total: u64::try_from(total).unwrap_or_default(),
        })
    }

    async fn claim(&self, reservation_id: ReservationId, claim: &Claim) -> Result<ClaimOutcome> {
        let (owner, expired_by) = match claim.guard {
            ClaimGuard::Any => (None, None),
            ClaimGuard::Owner(user_id) => (Some(*user_id.as_uuid()), None),
            ClaimGuard::ExpiredBy(at) => (None, Some(at)),
        };

        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| store_error("Failed to acquire connection", &e))?;

        let claimed = sqlx::query(
            r"
            UPDATE reservations
            SET status = $2,
                updated_at = $3,
                processed_at = $3,
                error_message = COALESCE($4, error_message)
            WHERE id = $1
              AND status = 'pending'
              AND ($5::uuid IS NULL OR user_id = $5)
              AND ($6::timestamptz IS NULL OR expires_at <= $6)
            RETURNING *
            ",
        )
        .bind(reservation_id.as_uuid())
        .bind(claim.target.as_str())
        .bind(claim.at)
        .bind(claim.error_message.as_deref())
        .bind(owner)
        .bind(expired_by)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| store_error("Failed to claim reservation", &e))?;

        if let Some(row) = claimed {
            return Ok(ClaimOutcome::Claimed(rows::reservation(&row)?));
        }

        Ok(match load(&mut *conn, reservation_id).await? {
            None => ClaimOutcome::NotFound,
            Some(current) if owner.is_some_and(|o| o != *current.user_id.as_uuid()) => {
                ClaimOutcome::NotFound
            }
            Some(current) => ClaimOutcome::Lost(current),
        })
    }

    async fn confirm(
        &self,
        reservation_id: ReservationId,
        payment_transaction_id: PaymentTransactionId,
        at: DateTime<Utc>,
    ) -> Result<ConfirmOutcome> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| store_error("Failed to start transaction", &e))?;

        let claimed = sqlx::query(
            r"
            UPDATE reservations
            SET status = 'confirmed',
                payment_transaction_id = $2,
                updated_at = $3,
                processed_at = $3
            WHERE id = $1 AND status = 'pending' AND expires_at > $3
            RETURNING *
            ",
        )
        .bind(reservation_id.as_uuid())
        .bind(payment_transaction_id.as_uuid())
        .bind(at)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| store_error("Failed to confirm reservation", &e))?;

        let Some(row) = claimed else {
            let current = load(&mut *tx, reservation_id).await?;
            // Nothing was written; dropping the transaction rolls it back.
            return Ok(current.map_or(ConfirmOutcome::NotFound, ConfirmOutcome::Lost));
        };
        let reservation = rows::reservation(&row)?;
        let quantity = to_int(reservation.quantity)?;

        let last: i32 = sqlx::query_scalar(
            r"
            INSERT INTO ticket_counters (offering_id, last_number) VALUES ($1, $2)
            ON CONFLICT (offering_id)
            DO UPDATE SET last_number = ticket_counters.last_number + EXCLUDED.last_number
            RETURNING last_number
            ",
        )
        .bind(reservation.offering_id.as_uuid())
        .bind(quantity)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| store_error("Failed to allocate ticket numbers", &e))?;
        let first = u32::try_from(last - quantity + 1)
            .map_err(|_| ReservationError::Store(format!("Invalid ticket counter: {last}")))?;

        let mut tickets = Vec::with_capacity(reservation.quantity as usize);
        for number in first..first + reservation.quantity {
            let ticket = Ticket {
                id: TicketId::new(),
                offering_id: reservation.offering_id,
                user_id: reservation.user_id,
                reservation_id,
                number: TicketNumber::new(number),
                status: TicketStatus::Active,
                purchase_price: reservation.unit_price,
                payment_transaction_id,
                purchased_at: at,
            };
            sqlx::query(
                r"
                INSERT INTO tickets (
                    id, offering_id, user_id, reservation_id, ticket_number, status,
                    purchase_price_cents, payment_transaction_id, purchased_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ",
            )
            .bind(ticket.id.as_uuid())
            .bind(ticket.offering_id.as_uuid())
            .bind(ticket.user_id.as_uuid())
            .bind(ticket.reservation_id.as_uuid())
            .bind(to_int(number)?)
            .bind(ticket.status.as_str())
            .bind(to_cents(ticket.purchase_price)?)
            .bind(payment_transaction_id.as_uuid())
            .bind(at)
            .execute(&mut *tx)
            .await
            .map_err(|e| store_error("Failed to insert ticket", &e))?;
            tickets.push(ticket);
        }

        let resolved = sqlx::query(
            r"
            UPDATE promotion_usages SET status = $2, settled_at = $3
            WHERE transaction_id = $1 AND status = 'pending'
            ",
        )
        .bind(reservation_id.as_uuid())
        .bind(PromotionUsageStatus::Resolved.as_str())
        .bind(at)
        .execute(&mut *tx)
        .await
        .map_err(|e| store_error("Failed to resolve promotion usages", &e))?
        .rows_affected();

        tx.commit()
            .await
            .map_err(|e| store_error("Failed to commit confirmation", &e))?;

        tracing::debug!(
            reservation_id = %reservation_id,
            first_ticket = first,
            tickets = tickets.len(),
            promotions_resolved = resolved,
            "Confirmation committed"
        );

        Ok(ConfirmOutcome::Confirmed {
            reservation,
            tickets,
        })
    }

    async fn tickets_for_reservation(&self, reservation_id: ReservationId) -> Result<Vec<Ticket>> {
        sqlx::query("SELECT * FROM tickets WHERE reservation_id = $1 ORDER BY ticket_number")
            .bind(reservation_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| store_error("Failed to load tickets", &e))?
            .iter()
            .map(rows::ticket)
            .collect()
    }

    async fn expired_pending(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<Reservation>> {
        sqlx::query(
            r"
            SELECT * FROM reservations
            WHERE status = 'pending' AND expires_at <= $1
            ORDER BY expires_at
            LIMIT $2
            ",
        )
        .bind(now)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| store_error("Failed to scan expired reservations", &e))?
        .iter()
        .map(rows::reservation)
        .collect()
    }

    async fn inventory_seed(&self, offering: &Offering) -> Result<InventorySeed> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| store_error("Failed to start transaction", &e))?;
        // Both reads must see one snapshot, or a confirmation in between is
        // counted as a hold and as sold.
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(|e| store_error("Failed to set isolation level", &e))?;

        let holdings = sqlx::query(
            r"
            SELECT user_id, COUNT(*) AS owned FROM tickets
            WHERE offering_id = $1 AND status = 'active'
            GROUP BY user_id
            ORDER BY user_id
            ",
        )
        .bind(offering.id.as_uuid())
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| store_error("Failed to load ticket holdings", &e))?
        .iter()
        .map(|row| {
            let user_id: Uuid = row
                .try_get("user_id")
                .map_err(|e| store_error("Failed to decode user_id", &e))?;
            let owned: i64 = row
                .try_get("owned")
                .map_err(|e| store_error("Failed to decode owned", &e))?;
            Ok((UserId::from_uuid(user_id), row_count(owned)?))
        })
        .collect::<Result<Vec<_>>>()?;

        let holds = sqlx::query(
            "SELECT * FROM reservations WHERE offering_id = $1 AND status = $2",
        )
        .bind(offering.id.as_uuid())
        .bind(ReservationStatus::Pending.as_str())
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| store_error("Failed to load pending holds", &e))?
        .iter()
        .map(|row| {
            rows::reservation(row).map(|r| HoldSeed {
                token: r.token,
                user_id: r.user_id,
                quantity: r.quantity,
            })
        })
        .collect::<Result<Vec<_>>>()?;

        tx.commit()
            .await
            .map_err(|e| store_error("Failed to finish seed snapshot", &e))?;

        Ok(InventorySeed {
            total: offering.total_tickets,
            sold: holdings.iter().map(|(_, owned)| owned).sum(),
            holds,
            holdings,
        })
    }
}
