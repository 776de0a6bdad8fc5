//! Row decoding and column conversions.

use raffle_core::{
    Money, Offering, OfferingId, OfferingStatus, PaymentTransactionId, Promotion, PromotionUsage,
    PromotionUsageId, PromotionUsageStatus, Reservation, ReservationError, ReservationId,
    ReservationStatus, ReservationToken, Result, Ticket, TicketId, TicketNumber, TicketStatus,
    UserId,
};
use sqlx::postgres::PgRow;
use sqlx::{Postgres, Row};
use uuid::Uuid;

/// Map a sqlx error to `Store`, keeping the failed step in the message.
pub(crate) fn store_error(context: &str, e: &sqlx::Error) -> ReservationError {
    ReservationError::Store(format!("{context}: {e}"))
}

fn get<'r, T>(row: &'r PgRow, column: &str) -> Result<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(column)
        .map_err(|e| ReservationError::Store(format!("Failed to decode {column}: {e}")))
}

fn invalid(column: &str, value: impl std::fmt::Display) -> ReservationError {
    ReservationError::Store(format!("Invalid {column} value: {value}"))
}

pub(crate) fn to_int(value: u32) -> Result<i32> {
    i32::try_from(value).map_err(|_| invalid("integer", value))
}

pub(crate) fn to_cents(money: Money) -> Result<i64> {
    i64::try_from(money.cents()).map_err(|_| invalid("amount", money.cents()))
}

fn count(row: &PgRow, column: &str) -> Result<u32> {
    let value: i32 = get(row, column)?;
    u32::try_from(value).map_err(|_| invalid(column, value))
}

fn optional_count(row: &PgRow, column: &str) -> Result<Option<u32>> {
    let value: Option<i32> = get(row, column)?;
    value
        .map(|v| u32::try_from(v).map_err(|_| invalid(column, v)))
        .transpose()
}

fn money(row: &PgRow, column: &str) -> Result<Money> {
    let cents: i64 = get(row, column)?;
    u64::try_from(cents)
        .map(Money::from_cents)
        .map_err(|_| invalid(column, cents))
}

fn optional_money(row: &PgRow, column: &str) -> Result<Option<Money>> {
    let cents: Option<i64> = get(row, column)?;
    cents
        .map(|c| u64::try_from(c).map(Money::from_cents).map_err(|_| invalid(column, c)))
        .transpose()
}

pub(crate) fn offering(row: &PgRow) -> Result<Offering> {
    let status: String = get(row, "status")?;
    Ok(Offering {
        id: OfferingId::from_uuid(get(row, "id")?),
        title: get(row, "title")?,
        total_tickets: count(row, "total_tickets")?,
        ticket_price: money(row, "ticket_price_cents")?,
        max_tickets_per_user: optional_count(row, "max_tickets_per_user")?,
        max_participants: optional_count(row, "max_participants")?,
        opens_at: get(row, "opens_at")?,
        closes_at: get(row, "closes_at")?,
        status: OfferingStatus::parse(&status).ok_or_else(|| invalid("offering status", &status))?,
    })
}

pub(crate) fn reservation(row: &PgRow) -> Result<Reservation> {
    let status: String = get(row, "status")?;
    let payment: Option<Uuid> = get(row, "payment_transaction_id")?;
    Ok(Reservation {
        id: ReservationId::from_uuid(get(row, "id")?),
        offering_id: OfferingId::from_uuid(get(row, "offering_id")?),
        user_id: UserId::from_uuid(get(row, "user_id")?),
        quantity: count(row, "quantity")?,
        unit_price: money(row, "unit_price_cents")?,
        total_price: money(row, "total_price_cents")?,
        token: ReservationToken::new(get::<String>(row, "token")?),
        status: ReservationStatus::parse(&status)
            .ok_or_else(|| invalid("reservation status", &status))?,
        expires_at: get(row, "expires_at")?,
        created_at: get(row, "created_at")?,
        updated_at: get(row, "updated_at")?,
        processed_at: get(row, "processed_at")?,
        payment_transaction_id: payment.map(PaymentTransactionId::from_uuid),
        error_message: get(row, "error_message")?,
    })
}

pub(crate) fn ticket(row: &PgRow) -> Result<Ticket> {
    let status: String = get(row, "status")?;
    let number = count(row, "ticket_number")?;
    Ok(Ticket {
        id: TicketId::from_uuid(get(row, "id")?),
        offering_id: OfferingId::from_uuid(get(row, "offering_id")?),
        user_id: UserId::from_uuid(get(row, "user_id")?),
        reservation_id: ReservationId::from_uuid(get(row, "reservation_id")?),
        number: TicketNumber::new(number),
        status: TicketStatus::parse(&status).ok_or_else(|| invalid("ticket status", &status))?,
        purchase_price: money(row, "purchase_price_cents")?,
        payment_transaction_id: PaymentTransactionId::from_uuid(get(
            row,
            "payment_transaction_id",
        )?),
        purchased_at: get(row, "purchased_at")?,
    })
}

pub(crate) fn promotion(row: &PgRow) -> Result<Promotion> {
    Ok(Promotion {
        code: get(row, "code")?,
        active: get(row, "active")?,
        starts_at: get(row, "starts_at")?,
        ends_at: get(row, "ends_at")?,
        per_user_limit: count(row, "per_user_limit")?,
        usage_limit: optional_count(row, "usage_limit")?,
        min_purchase: optional_money(row, "min_purchase_cents")?,
        applicable_offerings: get::<Vec<Uuid>>(row, "applicable_offerings")?
            .into_iter()
            .map(OfferingId::from_uuid)
            .collect(),
    })
}

pub(crate) fn promotion_usage(row: &PgRow) -> Result<PromotionUsage> {
    let status: String = get(row, "status")?;
    Ok(PromotionUsage {
        id: PromotionUsageId::from_uuid(get(row, "id")?),
        transaction_id: ReservationId::from_uuid(get(row, "transaction_id")?),
        user_id: UserId::from_uuid(get(row, "user_id")?),
        code: get(row, "code")?,
        discount: money(row, "discount_cents")?,
        status: PromotionUsageStatus::parse(&status)
            .ok_or_else(|| invalid("usage status", &status))?,
        created_at: get(row, "created_at")?,
        settled_at: get(row, "settled_at")?,
    })
}
