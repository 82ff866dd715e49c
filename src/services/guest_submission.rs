use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use uuid::Uuid;

use crate::{
    models::{Reservation, INVOICE_TYPES},
    repository::tenant_store::{
        get_host, get_reservation_by_number, update_guest_details, GuestDetailsUpdate,
    },
    schemas::GuestSubmissionInput,
    services::{
        guest_window::{can_guest_edit_at, host_timezone},
        invoice_errors::InvoiceError,
    },
};

#[derive(Debug)]
pub enum SubmissionError {
    Invalid(Vec<String>),
    Rejected(InvoiceError),
}

impl From<InvoiceError> for SubmissionError {
    fn from(error: InvoiceError) -> Self {
        Self::Rejected(error)
    }
}

impl From<sqlx::Error> for SubmissionError {
    fn from(error: sqlx::Error) -> Self {
        Self::Rejected(InvoiceError::Storage(error))
    }
}

fn trimmed(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToOwned::to_owned)
}

/// Checks the guest form and normalizes it into the stored shape. Fields
/// belonging to the other invoice type are cleared.
pub fn validate_guest_submission(
    input: &GuestSubmissionInput,
) -> Result<GuestDetailsUpdate, Vec<String>> {
    let invoice_type = trimmed(&input.invoice_type).unwrap_or_default();
    if !INVOICE_TYPES.contains(&invoice_type.as_str()) {
        return Err(vec!["Please select invoice type".to_string()]);
    }

    let mut errors = Vec::new();
    let address = trimmed(&input.address);
    let email = trimmed(&input.email);
    if address.is_none() {
        errors.push("Address is required".to_string());
    }
    if email.is_none() {
        errors.push("Email is required".to_string());
    }

    let mut details = GuestDetailsUpdate {
        invoice_type,
        first_name: None,
        last_name: None,
        company_name: None,
        tax_id: None,
        vat_eu: None,
        address: address.unwrap_or_default(),
        email: email.unwrap_or_default(),
        special_requests: trimmed(&input.special_requests),
    };

    if details.invoice_type == "individual" {
        details.first_name = trimmed(&input.first_name);
        details.last_name = trimmed(&input.last_name);
        if details.first_name.is_none() {
            errors.push("First name is required".to_string());
        }
        if details.last_name.is_none() {
            errors.push("Last name is required".to_string());
        }
    } else {
        details.company_name = trimmed(&input.company_name);
        details.tax_id = trimmed(&input.tax_id);
        details.vat_eu = trimmed(&input.vat_eu);
        if details.company_name.is_none() {
            errors.push("Company name is required".to_string());
        }
        if details.tax_id.is_none() {
            errors.push("Tax identification number is required".to_string());
        }
    }

    if errors.is_empty() {
        Ok(details)
    } else {
        Err(errors)
    }
}

/// Whether a guest may (re)submit right now. A first submission is always
/// accepted; later edits close an hour before checkout.
pub fn submission_allowed(reservation: &Reservation, now: DateTime<Utc>, timezone: Tz) -> bool {
    reservation.guest_submitted_at.is_none()
        || can_guest_edit_at(reservation.checkout_date, now, timezone)
}

pub async fn submit_guest_details(
    pool: &sqlx::PgPool,
    host_id: Uuid,
    reservation_number: &str,
    input: &GuestSubmissionInput,
    now: DateTime<Utc>,
    fallback_tz: Tz,
) -> Result<Reservation, SubmissionError> {
    let mut tx = pool.begin().await?;

    let host = get_host(&mut *tx, host_id)
        .await?
        .ok_or(InvoiceError::HostNotFound)?;
    let reservation = get_reservation_by_number(&mut *tx, host_id, reservation_number, true)
        .await?
        .ok_or(InvoiceError::ReservationNotFound)?;

    let timezone = host_timezone(&host.timezone, fallback_tz);
    if !submission_allowed(&reservation, now, timezone) {
        tracing::warn!(
            host_id = %host_id,
            reservation_id = %reservation.id,
            "Guest edit rejected after cutoff"
        );
        return Err(InvoiceError::EditWindowClosed.into());
    }

    let details = validate_guest_submission(input).map_err(SubmissionError::Invalid)?;
    let updated = update_guest_details(&mut *tx, host_id, reservation.id, &details, now).await?;
    tx.commit().await?;

    tracing::info!(
        host_id = %host_id,
        reservation_id = %updated.id,
        first_submission = reservation.guest_submitted_at.is_none(),
        "Guest details saved"
    );
    Ok(updated)
}
