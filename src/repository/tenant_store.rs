//! Typed, host-scoped access to hosts, reservations and invoice versions.
//!
//! Every reservation query carries the owning `host_id`. Functions take any
//! Postgres executor so callers can run them on the pool or inside a
//! transaction (`&mut *tx`).

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::models::{BuildingCode, Host, InvoiceVersion, Reservation};

pub(crate) const INVOICE_NUMBER_TAKEN_SQL: &str = "SELECT EXISTS (
    SELECT 1 FROM reservations
     WHERE host_id = $1
       AND invoice_number = $2
       AND ($3::uuid IS NULL OR id <> $3::uuid)
) AS taken";

const GET_HOST_SQL: &str = "SELECT * FROM hosts WHERE id = $1";
const GET_HOST_FOR_UPDATE_SQL: &str = "SELECT * FROM hosts WHERE id = $1 FOR UPDATE";

const GET_RESERVATION_SQL: &str = "SELECT * FROM reservations WHERE host_id = $1 AND id = $2";
const LIST_RESERVATIONS_SQL: &str =
    "SELECT * FROM reservations WHERE host_id = $1 ORDER BY checkin_date DESC, created_at DESC";
const GET_RESERVATION_FOR_UPDATE_SQL: &str =
    "SELECT * FROM reservations WHERE host_id = $1 AND id = $2 FOR UPDATE";
const GET_RESERVATION_BY_NUMBER_SQL: &str =
    "SELECT * FROM reservations WHERE host_id = $1 AND reservation_number = $2";
const GET_RESERVATION_BY_NUMBER_FOR_UPDATE_SQL: &str =
    "SELECT * FROM reservations WHERE host_id = $1 AND reservation_number = $2 FOR UPDATE";
const LIST_ACTIVE_BUILDING_CODES_SQL: &str = "SELECT * FROM building_codes
  WHERE host_id = $1 AND is_active
  ORDER BY display_order ASC, created_at ASC";

/// Invoice fields written onto a reservation by generation and correction.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceFieldsUpdate<'a> {
    pub invoice_type: Option<&'a str>,
    pub first_name: Option<&'a str>,
    pub last_name: Option<&'a str>,
    pub company_name: Option<&'a str>,
    pub tax_id: Option<&'a str>,
    pub vat_eu: Option<&'a str>,
    pub address: Option<&'a str>,
    pub service_name: Option<&'a str>,
    pub amount_paid: Option<f64>,
    pub vat_rate: Option<f64>,
    pub vat_amount: Option<f64>,
    pub invoice_number: &'a str,
    pub invoice_generated_at: DateTime<Utc>,
}

/// Guest-editable fields stored by the guest portal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestDetailsUpdate {
    pub invoice_type: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company_name: Option<String>,
    pub tax_id: Option<String>,
    pub vat_eu: Option<String>,
    pub address: String,
    pub email: String,
    pub special_requests: Option<String>,
}

pub async fn get_host<'e, E>(executor: E, host_id: Uuid) -> Result<Option<Host>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as::<_, Host>(GET_HOST_SQL)
        .bind(host_id)
        .fetch_optional(executor)
        .await
}

pub async fn get_host_for_update<'e, E>(
    executor: E,
    host_id: Uuid,
) -> Result<Option<Host>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as::<_, Host>(GET_HOST_FOR_UPDATE_SQL)
        .bind(host_id)
        .fetch_optional(executor)
        .await
}

/// Moves the rolling counter forward. `GREATEST` keeps it from ever going back.
pub async fn advance_rolling_counter<'e, E>(
    executor: E,
    host_id: Uuid,
    next_value: i64,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        "UPDATE hosts
            SET rolling_number_current = GREATEST(rolling_number_current, $2),
                updated_at = now()
          WHERE id = $1",
    )
    .bind(host_id)
    .bind(next_value)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn get_reservation<'e, E>(
    executor: E,
    host_id: Uuid,
    reservation_id: Uuid,
) -> Result<Option<Reservation>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as::<_, Reservation>(GET_RESERVATION_SQL)
        .bind(host_id)
        .bind(reservation_id)
        .fetch_optional(executor)
        .await
}

/// Every reservation of the host, newest check-in first.
pub async fn list_reservations<'e, E>(
    executor: E,
    host_id: Uuid,
) -> Result<Vec<Reservation>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as::<_, Reservation>(LIST_RESERVATIONS_SQL)
        .bind(host_id)
        .fetch_all(executor)
        .await
}

pub async fn get_reservation_for_update<'e, E>(
    executor: E,
    host_id: Uuid,
    reservation_id: Uuid,
) -> Result<Option<Reservation>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as::<_, Reservation>(GET_RESERVATION_FOR_UPDATE_SQL)
        .bind(host_id)
        .bind(reservation_id)
        .fetch_optional(executor)
        .await
}

pub async fn get_reservation_by_number<'e, E>(
    executor: E,
    host_id: Uuid,
    reservation_number: &str,
    for_update: bool,
) -> Result<Option<Reservation>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = if for_update {
        GET_RESERVATION_BY_NUMBER_FOR_UPDATE_SQL
    } else {
        GET_RESERVATION_BY_NUMBER_SQL
    };
    sqlx::query_as::<_, Reservation>(sql)
        .bind(host_id)
        .bind(reservation_number)
        .fetch_optional(executor)
        .await
}

/// Active building codes shown to guests, in display order.
pub async fn list_active_building_codes<'e, E>(
    executor: E,
    host_id: Uuid,
) -> Result<Vec<BuildingCode>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as::<_, BuildingCode>(LIST_ACTIVE_BUILDING_CODES_SQL)
        .bind(host_id)
        .fetch_all(executor)
        .await
}

pub async fn update_invoice_fields<'e, E>(
    executor: E,
    host_id: Uuid,
    reservation_id: Uuid,
    fields: &InvoiceFieldsUpdate<'_>,
) -> Result<Reservation, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as::<_, Reservation>(
        "UPDATE reservations SET
                invoice_type = $3,
                first_name = $4,
                last_name = $5,
                company_name = $6,
                tax_id = $7,
                vat_eu = $8,
                address = $9,
                service_name = $10,
                amount_paid = $11,
                vat_rate = $12,
                vat_amount = $13,
                invoice_number = $14,
                invoice_generated_at = $15,
                updated_at = now()
          WHERE host_id = $1 AND id = $2
      RETURNING *",
    )
    .bind(host_id)
    .bind(reservation_id)
    .bind(fields.invoice_type)
    .bind(fields.first_name)
    .bind(fields.last_name)
    .bind(fields.company_name)
    .bind(fields.tax_id)
    .bind(fields.vat_eu)
    .bind(fields.address)
    .bind(fields.service_name)
    .bind(fields.amount_paid)
    .bind(fields.vat_rate)
    .bind(fields.vat_amount)
    .bind(fields.invoice_number)
    .bind(fields.invoice_generated_at)
    .fetch_one(executor)
    .await
}

/// Stores guest details. The first submission time is kept once set.
pub async fn update_guest_details<'e, E>(
    executor: E,
    host_id: Uuid,
    reservation_id: Uuid,
    details: &GuestDetailsUpdate,
    submitted_at: DateTime<Utc>,
) -> Result<Reservation, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as::<_, Reservation>(
        "UPDATE reservations SET
                invoice_type = $3,
                first_name = $4,
                last_name = $5,
                company_name = $6,
                tax_id = $7,
                vat_eu = $8,
                address = $9,
                email = $10,
                special_requests = $11,
                guest_submitted_at = COALESCE(guest_submitted_at, $12),
                updated_at = now()
          WHERE host_id = $1 AND id = $2
      RETURNING *",
    )
    .bind(host_id)
    .bind(reservation_id)
    .bind(&details.invoice_type)
    .bind(&details.first_name)
    .bind(&details.last_name)
    .bind(&details.company_name)
    .bind(&details.tax_id)
    .bind(&details.vat_eu)
    .bind(&details.address)
    .bind(&details.email)
    .bind(&details.special_requests)
    .bind(submitted_at)
    .fetch_one(executor)
    .await
}

/// Returns the reservation to its pristine, pre-submission state.
pub async fn reset_reservation<'e, E>(
    executor: E,
    host_id: Uuid,
    reservation_id: Uuid,
) -> Result<Option<Reservation>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as::<_, Reservation>(
        "UPDATE reservations SET
                invoice_type = NULL,
                first_name = NULL,
                last_name = NULL,
                company_name = NULL,
                tax_id = NULL,
                vat_eu = NULL,
                address = NULL,
                email = NULL,
                special_requests = NULL,
                service_name = 'Apartment Rental',
                amount_paid = NULL,
                vat_rate = 8.0,
                vat_amount = NULL,
                invoice_generated_at = NULL,
                invoice_number = NULL,
                guest_submitted_at = NULL,
                updated_at = now()
          WHERE host_id = $1 AND id = $2
      RETURNING *",
    )
    .bind(host_id)
    .bind(reservation_id)
    .fetch_optional(executor)
    .await
}

pub async fn invoice_number_taken<'e, E>(
    executor: E,
    host_id: Uuid,
    invoice_number: &str,
    exclude_reservation_id: Option<Uuid>,
) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_scalar::<_, bool>(INVOICE_NUMBER_TAKEN_SQL)
        .bind(host_id)
        .bind(invoice_number)
        .bind(exclude_reservation_id)
        .fetch_one(executor)
        .await
}

pub async fn count_invoice_versions<'e, E>(
    executor: E,
    reservation_id: Uuid,
) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*)::bigint FROM invoice_versions WHERE reservation_id = $1",
    )
    .bind(reservation_id)
    .fetch_one(executor)
    .await
}

pub async fn insert_invoice_version<'e, E>(
    executor: E,
    reservation_id: Uuid,
    version_number: i32,
    invoice_number: &str,
    invoice_data: &Value,
    created_at: DateTime<Utc>,
) -> Result<InvoiceVersion, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as::<_, InvoiceVersion>(
        "INSERT INTO invoice_versions
                (reservation_id, version_number, invoice_number, invoice_data, created_at)
         VALUES ($1, $2, $3, $4, $5)
      RETURNING *",
    )
    .bind(reservation_id)
    .bind(version_number)
    .bind(invoice_number)
    .bind(invoice_data)
    .bind(created_at)
    .fetch_one(executor)
    .await
}

pub async fn list_invoice_versions<'e, E>(
    executor: E,
    reservation_id: Uuid,
) -> Result<Vec<InvoiceVersion>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as::<_, InvoiceVersion>(
        "SELECT * FROM invoice_versions
          WHERE reservation_id = $1
          ORDER BY version_number ASC",
    )
    .bind(reservation_id)
    .fetch_all(executor)
    .await
}
